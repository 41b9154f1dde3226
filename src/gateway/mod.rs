//! Gateway contract
//!
//! The lifecycle only talks to the messaging platform through
//! [`GatewayClient`]. The serenity-backed implementation lives in
//! [`discord`]; tests drive the lifecycle with recording fakes.

pub mod discord;

use crate::commands::CommandSpec;
use crate::config::Credential;
use crate::error::GatewayError;
use crate::lifecycle::StartupReport;
use serde::{Deserialize, Serialize};
use serenity::async_trait;
use std::collections::HashMap;

pub use discord::DiscordGateway;

// ============================================================================
// Presence
// ============================================================================

/// Activity type shown in front of the status text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    #[default]
    Watching,
    Playing,
    Listening,
    Competing,
}

/// Presence pushed once the connection is ready
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presence {
    pub kind: ActivityKind,
    pub text: String,
}

// ============================================================================
// Connection
// ============================================================================

/// Lifecycle of the gateway connection, owned by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    Failed(GatewayError),
}

/// Details delivered with a Ready signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyInfo {
    pub user_name: String,
    pub guild_count: usize,
}

/// Where the command registry is published
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    Global,
    /// Dev mode: a single guild, updated instantly
    Guild(u64),
}

// ============================================================================
// Events
// ============================================================================

/// Event categories extensions can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The connection became ready (first connect and every reconnect)
    Ready,
    Message,
    Command,
}

/// A chat message posted by a user
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub message_id: u64,
    pub channel_id: u64,
    pub guild_id: Option<u64>,
    pub author_id: u64,
    pub author_name: String,
    pub content: String,
}

/// A slash command invocation
#[derive(Debug, Clone, PartialEq)]
pub struct CommandInvocation {
    pub interaction_id: u64,
    pub token: String,
    pub name: String,
    pub channel_id: u64,
    pub guild_id: Option<u64>,
    pub user_id: u64,
    pub user_name: String,
    pub options: HashMap<String, serde_json::Value>,
}

impl CommandInvocation {
    pub fn option_str(&self, name: &str) -> Option<&str> {
        self.options.get(name).and_then(|v| v.as_str())
    }

    pub fn option_i64(&self, name: &str) -> Option<i64> {
        self.options.get(name).and_then(|v| v.as_i64())
    }
}

/// Inbound event routed to extension callbacks
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Ready(ReadyInfo),
    Message(IncomingMessage),
    Command(CommandInvocation),
}

impl GatewayEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            GatewayEvent::Ready(_) => EventKind::Ready,
            GatewayEvent::Message(_) => EventKind::Message,
            GatewayEvent::Command(_) => EventKind::Command,
        }
    }

    /// Command name, for command events
    pub fn command_name(&self) -> Option<&str> {
        match self {
            GatewayEvent::Command(command) => Some(&command.name),
            GatewayEvent::Ready(_) | GatewayEvent::Message(_) => None,
        }
    }
}

/// Response produced by an extension callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub content: String,
    pub ephemeral: bool,
}

impl Reply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: false,
        }
    }

    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: true,
        }
    }
}

/// Everything the connection reports after `connect` returned
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Ready was delivered again (reconnect/resume)
    Ready(ReadyInfo),
    Event(GatewayEvent),
    /// The connection ended; `Some` carries an unrecoverable error
    Closed(Option<GatewayError>),
}

// ============================================================================
// Client Contract
// ============================================================================

/// Remote messaging connection
#[async_trait]
pub trait GatewayClient: Send {
    /// Open the connection and wait for the first Ready signal
    async fn connect(&mut self, credential: Credential) -> Result<ReadyInfo, GatewayError>;

    /// Wait for the next notification; suspends for as long as the connection runs
    async fn next_notification(&mut self) -> Notification;

    /// Current connection state, as last observed by the client
    fn state(&self) -> ConnectionState;

    /// Publish the command registry, returning how many commands were synced
    async fn sync_commands(
        &mut self,
        commands: &[CommandSpec],
        scope: CommandScope,
    ) -> Result<usize, GatewayError>;

    async fn set_presence(&mut self, presence: &Presence) -> Result<(), GatewayError>;

    /// Deliver a callback's reply for the event that produced it
    async fn reply(&mut self, event: &GatewayEvent, reply: Reply) -> Result<(), GatewayError>;

    async fn send_startup_report(
        &mut self,
        channel_id: u64,
        report: &StartupReport,
    ) -> Result<(), GatewayError>;

    async fn disconnect(&mut self);
}
