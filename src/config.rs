//! # Feature: Configuration System
//!
//! Loads the static `config.json` document and the bot token from the
//! process environment. The token never lives in the configuration file.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

use crate::error::{GatewayError, StartupError};
use crate::gateway::{ActivityKind, Presence};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

/// Default location of the configuration document
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

// ============================================================================
// Configuration Document
// ============================================================================

/// Static bot configuration, loaded once at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Text shown in the bot's presence (required)
    pub status_message: String,

    /// Presence activity kind shown next to the status text
    #[serde(default)]
    pub activity: ActivityKind,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Environment variable holding the bot token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Dev mode guild ID (commands are synced to this guild only)
    #[serde(default)]
    pub guild_id: Option<String>,

    /// Channel that receives the startup report
    #[serde(default)]
    pub startup_channel_id: Option<String>,
}

// Default value functions for serde
fn default_log_level() -> String {
    "info".to_string()
}

fn default_token_env() -> String {
    "TOKEN".to_string()
}

impl Config {
    /// Load configuration from a JSON file
    ///
    /// A missing file is reported as [`StartupError::ConfigMissing`]; anything
    /// that cannot be read or parsed as the expected document is
    /// [`StartupError::ConfigMalformed`] carrying the underlying detail.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StartupError> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StartupError::ConfigMissing {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => {
                return Err(StartupError::ConfigMalformed {
                    path: path.to_path_buf(),
                    detail: format!("could not read file: {e}"),
                });
            }
        };

        let config = Self::from_json(&content).map_err(|detail| StartupError::ConfigMalformed {
            path: path.to_path_buf(),
            detail,
        })?;

        Ok(config)
    }

    /// Parse and validate a configuration document
    pub fn from_json(content: &str) -> Result<Self, String> {
        let config: Config = serde_json::from_str(content).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ref guild_id) = self.guild_id {
            if guild_id.parse::<u64>().is_err() {
                return Err(format!("guild_id '{}' is not a valid snowflake", guild_id));
            }
        }
        if let Some(ref channel_id) = self.startup_channel_id {
            if channel_id.parse::<u64>().is_err() {
                return Err(format!(
                    "startup_channel_id '{}' is not a valid snowflake",
                    channel_id
                ));
            }
        }
        if self.token_env.is_empty() {
            return Err("token_env must not be empty".to_string());
        }
        Ok(())
    }

    /// Presence derived from the configured status text
    pub fn presence(&self) -> Presence {
        Presence {
            kind: self.activity,
            text: self.status_message.clone(),
        }
    }

    /// Dev mode guild, if configured
    pub fn guild_id(&self) -> Option<u64> {
        self.guild_id.as_ref().and_then(|id| id.parse().ok())
    }

    /// Startup report channel, if configured
    pub fn startup_channel_id(&self) -> Option<u64> {
        self.startup_channel_id.as_ref().and_then(|id| id.parse().ok())
    }
}

// ============================================================================
// Credential
// ============================================================================

/// Bot token read from the environment
///
/// `Debug` is redacted so the token cannot end up in logs.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Credential(token.into())
    }

    /// Read the token from the named environment variable
    pub fn from_env(var: &str) -> Result<Self, GatewayError> {
        match env::var(var) {
            Ok(token) if !token.trim().is_empty() => Ok(Credential(token.trim().to_string())),
            _ => Err(GatewayError::MissingCredential(var.to_string())),
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

// ============================================================================
// Tests
// ============================================================================
