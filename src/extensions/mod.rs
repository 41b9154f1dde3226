//! # Feature: Extension Loading
//!
//! Extensions are resolved from a static identifier → factory map and set up
//! one by one, in declared order. A broken extension is recorded as a failed
//! [`ExtensionLoadResult`] and never stops the ones after it.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Panicking setup and conflicting command names are isolated per extension
//! - 1.0.0: Initial release with static extension catalog

pub mod fun;
pub mod general;
pub mod handles;

pub use handles::{EventCallback, ExtensionContext, HandleTable};

use crate::error::ExtensionError;
use futures::FutureExt;
use log::{error, info};
use serenity::async_trait;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};

/// Extensions loaded by the bot, in load order
pub const DEFAULT_EXTENSIONS: &[&str] = &["general", "fun"];

/// A pluggable feature module
#[async_trait]
pub trait Extension: Send + Sync {
    /// Register callbacks and commands; may perform async setup
    async fn setup(&self, ctx: &mut ExtensionContext) -> anyhow::Result<()>;
}

/// Constructor for an extension
pub type ExtensionFactory = fn() -> Box<dyn Extension>;

/// Outcome of loading one extension
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded,
    Failed(ExtensionError),
}

/// Per-descriptor load result
#[derive(Debug)]
pub struct ExtensionLoadResult {
    pub id: String,
    pub outcome: LoadOutcome,
}

impl ExtensionLoadResult {
    pub fn is_loaded(&self) -> bool {
        matches!(self.outcome, LoadOutcome::Loaded)
    }

    /// Failure reason, if the extension did not load
    pub fn failure(&self) -> Option<&ExtensionError> {
        match &self.outcome {
            LoadOutcome::Loaded => None,
            LoadOutcome::Failed(e) => Some(e),
        }
    }
}

// ============================================================================
// Loader
// ============================================================================

/// Static catalog of known extensions
#[derive(Default)]
pub struct ExtensionLoader {
    factories: HashMap<String, ExtensionFactory>,
}

impl ExtensionLoader {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the extensions bundled in this crate
    pub fn builtin() -> Self {
        let mut loader = Self::new();
        loader
            .register("general", general::create)
            .register("fun", fun::create);
        loader
    }

    /// Add (or replace) the factory for an identifier
    pub fn register(&mut self, id: impl Into<String>, factory: ExtensionFactory) -> &mut Self {
        self.factories.insert(id.into(), factory);
        self
    }

    /// Load every descriptor in order, committing successful extensions to `table`
    ///
    /// Always returns one result per descriptor, in descriptor order.
    pub async fn load_all<S: AsRef<str>>(
        &self,
        descriptors: &[S],
        table: &mut HandleTable,
    ) -> Vec<ExtensionLoadResult> {
        let mut results = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            let id = descriptor.as_ref();
            let outcome = match self.load_one(id, table).await {
                Ok(()) => {
                    info!("Loaded extension: {}", id);
                    LoadOutcome::Loaded
                }
                Err(e) => {
                    error!("Failed to load extension {}: {}", id, e);
                    LoadOutcome::Failed(e)
                }
            };
            results.push(ExtensionLoadResult {
                id: id.to_string(),
                outcome,
            });
        }

        results
    }

    async fn load_one(&self, id: &str, table: &mut HandleTable) -> Result<(), ExtensionError> {
        if table.is_loaded(id) {
            return Err(ExtensionError::AlreadyLoaded(id.to_string()));
        }

        let factory = self
            .factories
            .get(id)
            .ok_or_else(|| ExtensionError::NotFound(id.to_string()))?;

        let extension = panic::catch_unwind(*factory).map_err(|payload| ExtensionError::Setup {
            id: id.to_string(),
            source: anyhow::anyhow!("constructor panicked: {}", panic_message(&*payload)),
        })?;

        let mut ctx = ExtensionContext::new(id);
        let setup = AssertUnwindSafe(extension.setup(&mut ctx)).catch_unwind().await;

        match setup {
            Ok(Ok(())) => {}
            Ok(Err(source)) => {
                return Err(ExtensionError::Setup {
                    id: id.to_string(),
                    source,
                })
            }
            Err(payload) => {
                return Err(ExtensionError::Setup {
                    id: id.to_string(),
                    source: anyhow::anyhow!("setup panicked: {}", panic_message(&*payload)),
                })
            }
        }

        check_commands(id, &ctx, table)?;
        table.commit(ctx);
        Ok(())
    }
}

/// Reject command names declared twice or already owned by another extension
fn check_commands(
    id: &str,
    ctx: &ExtensionContext,
    table: &HandleTable,
) -> Result<(), ExtensionError> {
    let mut seen = HashSet::new();
    for spec in ctx.commands() {
        if !seen.insert(spec.name.as_str()) {
            return Err(ExtensionError::Setup {
                id: id.to_string(),
                source: anyhow::anyhow!("command /{} declared twice", spec.name),
            });
        }
        if let Some(owner) = table.command_owner(&spec.name) {
            return Err(ExtensionError::Setup {
                id: id.to_string(),
                source: anyhow::anyhow!("command /{} is already registered by {}", spec.name, owner),
            });
        }
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
