// Core layer - configuration and error taxonomy
pub mod config;
pub mod error;

// Extensions and their shared callback table
pub mod extensions;

// Gateway contract and the serenity-backed client
pub mod commands;
pub mod gateway;

// Application layer
pub mod lifecycle;
pub mod startup_notification;

pub use config::{Config, Credential};
pub use error::{ExtensionError, GatewayError, StartupError};
pub use extensions::{Extension, ExtensionContext, ExtensionLoader, HandleTable};
pub use gateway::{GatewayClient, GatewayEvent, Reply};
pub use lifecycle::{LifecycleState, Orchestrator, StartupReport, Termination};
