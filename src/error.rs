//! Error taxonomy for the bot lifecycle.
//!
//! Fatal errors ([`StartupError`]) abort the process before or while
//! connecting. Everything else is recovered at the step that produced it and
//! only ever shows up as a logged or reported outcome.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal startup errors
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("'{}' not found! Please create the file and try again.", path.display())]
    ConfigMissing { path: PathBuf },

    #[error("Error in '{}': {detail}", path.display())]
    ConfigMalformed { path: PathBuf, detail: String },

    #[error("Gateway connection failed")]
    Connection(#[from] GatewayError),
}

/// Errors reported by a gateway client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("{0} environment variable not set")]
    MissingCredential(String),

    #[error("Connection error: {0}")]
    Connect(String),

    #[error("Command sync failed: {0}")]
    Sync(String),

    #[error("Presence update failed: {0}")]
    Presence(String),

    #[error("Failed to send message: {0}")]
    Send(String),

    #[error("Connection closed: {0}")]
    Closed(String),
}

/// Per-extension load failures
#[derive(Error, Debug)]
pub enum ExtensionError {
    #[error("no extension registered under '{0}'")]
    NotFound(String),

    #[error("extension '{0}' is already loaded")]
    AlreadyLoaded(String),

    #[error("extension '{id}' failed to initialize: {source:#}")]
    Setup {
        id: String,
        #[source]
        source: anyhow::Error,
    },
}
