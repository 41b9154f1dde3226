//! Callback table shared between extensions and the event dispatcher
//!
//! Extensions never touch the table directly. During setup they receive an
//! [`ExtensionContext`] that stages their callbacks and commands; the loader
//! appends the staged entries once setup succeeded. Entries are never
//! removed or reordered.

use super::panic_message;
use crate::commands::CommandSpec;
use crate::gateway::{EventKind, GatewayEvent, Reply};
use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, error};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Callback invoked for a dispatched event
pub type EventCallback =
    Arc<dyn Fn(GatewayEvent) -> BoxFuture<'static, anyhow::Result<Option<Reply>>> + Send + Sync>;

#[derive(Clone)]
struct Handle {
    owner: String,
    kind: EventKind,
    /// Only invoke for this command name
    command: Option<String>,
    callback: EventCallback,
}

impl Handle {
    fn matches(&self, event: &GatewayEvent) -> bool {
        if self.kind != event.kind() {
            return false;
        }
        match (&self.command, event.command_name()) {
            (Some(filter), Some(name)) => filter == name,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

// ============================================================================
// Handle Table
// ============================================================================

/// Append-only table of extension callbacks and declared commands
#[derive(Default)]
pub struct HandleTable {
    extensions: Vec<String>,
    handles: Vec<Handle>,
    commands: Vec<(String, CommandSpec)>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an extension has already committed its entries
    pub fn is_loaded(&self, id: &str) -> bool {
        self.extensions.iter().any(|e| e == id)
    }

    /// Loaded extensions, in load order
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Number of callbacks owned by one extension
    pub fn handles_owned_by(&self, id: &str) -> usize {
        self.handles.iter().filter(|h| h.owner == id).count()
    }

    /// Every declared command, in registration order
    pub fn commands(&self) -> Vec<CommandSpec> {
        self.commands.iter().map(|(_, spec)| spec.clone()).collect()
    }

    /// Extension that declared a command name
    pub fn command_owner(&self, name: &str) -> Option<&str> {
        self.commands
            .iter()
            .find(|(_, spec)| spec.name == name)
            .map(|(owner, _)| owner.as_str())
    }

    /// Append a finished extension context
    pub(crate) fn commit(&mut self, ctx: ExtensionContext) {
        let ExtensionContext {
            id,
            handles,
            commands,
        } = ctx;

        debug!(
            "Committing {} callback(s) and {} command(s) for {}",
            handles.len(),
            commands.len(),
            id
        );

        self.handles.extend(handles);
        self.commands
            .extend(commands.into_iter().map(|spec| (id.clone(), spec)));
        self.extensions.push(id);
    }

    /// Run every callback subscribed to the event, in registration order
    ///
    /// Callback errors and panics are logged and do not stop the remaining
    /// callbacks.
    pub async fn dispatch(&self, event: &GatewayEvent) -> Vec<Reply> {
        let mut replies = Vec::new();

        for handle in self.handles.iter().filter(|h| h.matches(event)) {
            let call = AssertUnwindSafe(async { (handle.callback)(event.clone()).await });
            match call.catch_unwind().await {
                Ok(Ok(Some(reply))) => replies.push(reply),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    error!("[{}] Error handling {:?} event: {:#}", handle.owner, event.kind(), e);
                }
                Err(payload) => {
                    error!(
                        "[{}] Callback panicked handling {:?} event: {}",
                        handle.owner,
                        event.kind(),
                        panic_message(&*payload)
                    );
                }
            }
        }

        replies
    }
}

// ============================================================================
// Extension Context
// ============================================================================

/// Registration capability handed to an extension during setup
pub struct ExtensionContext {
    id: String,
    handles: Vec<Handle>,
    commands: Vec<CommandSpec>,
}

impl ExtensionContext {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            handles: Vec::new(),
            commands: Vec::new(),
        }
    }

    /// Identifier the extension was loaded under
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Subscribe to every event of a kind
    pub fn register<F, Fut>(&mut self, kind: EventKind, callback: F)
    where
        F: Fn(GatewayEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Reply>>> + Send + 'static,
    {
        self.push(kind, None, callback);
    }

    /// Declare a slash command and the callback that answers it
    pub fn command<F, Fut>(&mut self, spec: CommandSpec, callback: F)
    where
        F: Fn(GatewayEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Reply>>> + Send + 'static,
    {
        self.push(EventKind::Command, Some(spec.name.clone()), callback);
        self.commands.push(spec);
    }

    pub(crate) fn commands(&self) -> &[CommandSpec] {
        &self.commands
    }

    fn push<F, Fut>(&mut self, kind: EventKind, command: Option<String>, callback: F)
    where
        F: Fn(GatewayEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Reply>>> + Send + 'static,
    {
        let callback: EventCallback = Arc::new(move |event| callback(event).boxed());
        self.handles.push(Handle {
            owner: self.id.clone(),
            kind,
            command,
            callback,
        });
    }
}
