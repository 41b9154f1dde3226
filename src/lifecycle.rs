//! # Feature: Lifecycle Orchestration
//!
//! Drives a single bot process from configuration to shutdown:
//! `Init → ConnectionPending → Starting → Running → Terminated`.
//!
//! The startup sequence (load extensions, sync commands, set presence) runs
//! exactly once, on the first Ready signal. Extensions see that Ready once
//! the bot is Running. Later Ready signals from reconnects skip the startup
//! sequence and are only dispatched to extension callbacks.
//!
//! Every slash command gets exactly one response: the first reply produced
//! by its callbacks, or an ephemeral error when none replied.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

use crate::config::{Config, Credential};
use crate::error::{GatewayError, StartupError};
use crate::extensions::{ExtensionLoadResult, ExtensionLoader, HandleTable};
use crate::gateway::{CommandScope, GatewayClient, GatewayEvent, Notification, ReadyInfo, Reply};
use log::{debug, error, info, warn};
use std::future::Future;
use std::path::Path;

/// Orchestrator states
///
/// Init has no variant: it is [`Orchestrator::load`], and an orchestrator only
/// exists once the configuration loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    ConnectionPending,
    Starting,
    Running,
    Terminated,
}

/// Why the orchestrator stopped running
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// External shutdown signal
    Shutdown,
    /// The gateway closed the connection cleanly
    Disconnected,
    /// The gateway reported an unrecoverable error
    ConnectionLost(GatewayError),
}

/// Outcome of the startup sequence
#[derive(Debug)]
pub struct StartupReport {
    pub ready: ReadyInfo,
    pub extensions: Vec<ExtensionLoadResult>,
    pub synced_commands: Result<usize, GatewayError>,
    pub presence: Result<(), GatewayError>,
}

impl StartupReport {
    /// Identifiers of the extensions that loaded
    pub fn loaded(&self) -> Vec<&str> {
        self.extensions
            .iter()
            .filter(|r| r.is_loaded())
            .map(|r| r.id.as_str())
            .collect()
    }

    /// Failed extensions with their reasons
    pub fn failed(&self) -> Vec<(&str, String)> {
        self.extensions
            .iter()
            .filter_map(|r| r.failure().map(|e| (r.id.as_str(), e.to_string())))
            .collect()
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Owns the gateway connection and the extension handle table
pub struct Orchestrator<G: GatewayClient> {
    config: Config,
    gateway: G,
    loader: ExtensionLoader,
    descriptors: Vec<String>,
    table: HandleTable,
    state: LifecycleState,
    report: Option<StartupReport>,
}

impl<G: GatewayClient> Orchestrator<G> {
    /// Create an orchestrator for an already loaded configuration
    pub fn new<S: AsRef<str>>(
        config: Config,
        gateway: G,
        loader: ExtensionLoader,
        descriptors: &[S],
    ) -> Self {
        Self {
            config,
            gateway,
            loader,
            descriptors: descriptors.iter().map(|d| d.as_ref().to_string()).collect(),
            table: HandleTable::new(),
            state: LifecycleState::ConnectionPending,
            report: None,
        }
    }

    /// Init: load the configuration file, failing before any connection attempt
    pub fn load<P: AsRef<Path>, S: AsRef<str>>(
        config_path: P,
        gateway: G,
        loader: ExtensionLoader,
        descriptors: &[S],
    ) -> Result<Self, StartupError> {
        let config = Config::load(config_path)?;
        Ok(Self::new(config, gateway, loader, descriptors))
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn table(&self) -> &HandleTable {
        &self.table
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Startup outcome, once the startup sequence has run
    pub fn report(&self) -> Option<&StartupReport> {
        self.report.as_ref()
    }

    /// ConnectionPending: read the credential and connect
    ///
    /// Any failure is fatal and moves the orchestrator to `Terminated`.
    pub async fn connect(&mut self) -> Result<ReadyInfo, StartupError> {
        if self.state != LifecycleState::ConnectionPending {
            return Err(StartupError::Connection(GatewayError::Connect(format!(
                "cannot connect from state {:?}",
                self.state
            ))));
        }

        let result = match Credential::from_env(&self.config.token_env) {
            Ok(credential) => {
                info!("Connecting to Discord gateway...");
                self.gateway.connect(credential).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(ready) => {
                info!("Logged in as {}", ready.user_name);
                info!("Connected to {} guilds", ready.guild_count);
                self.state = LifecycleState::Starting;
                Ok(ready)
            }
            Err(e) => {
                error!("Gateway connection failed: {e}");
                self.state = LifecycleState::Terminated;
                Err(StartupError::Connection(e))
            }
        }
    }

    /// Starting: load extensions, sync commands, then set presence
    ///
    /// Once Running, the Ready is dispatched to extension callbacks. Runs at
    /// most once; returns `false` when the sequence was skipped.
    pub async fn start(&mut self, ready: ReadyInfo) -> bool {
        if self.report.is_some() || self.state != LifecycleState::Starting {
            info!("Skipping startup sequence (reconnect)");
            return false;
        }

        let ready_event = GatewayEvent::Ready(ready.clone());
        let extensions = self
            .loader
            .load_all(self.descriptors.as_slice(), &mut self.table)
            .await;

        let scope = match self.config.guild_id() {
            Some(guild_id) => {
                info!("Development mode: Registering commands for guild {guild_id}");
                CommandScope::Guild(guild_id)
            }
            None => CommandScope::Global,
        };
        let commands = self.table.commands();
        let synced_commands = self.gateway.sync_commands(&commands, scope).await;
        match &synced_commands {
            Ok(count) => info!("Synced {count} slash commands."),
            Err(e) => error!("Failed to sync slash commands: {e}"),
        }

        let presence = self.gateway.set_presence(&self.config.presence()).await;
        if let Err(e) = &presence {
            warn!("Failed to update presence: {e}");
        }

        let report = StartupReport {
            ready,
            extensions,
            synced_commands,
            presence,
        };

        if let Some(channel_id) = self.config.startup_channel_id() {
            if let Err(e) = self.gateway.send_startup_report(channel_id, &report).await {
                warn!("Failed to send startup report: {e}");
            }
        }

        info!(
            "Startup complete: {} extension(s) loaded, {} failed",
            report.loaded().len(),
            report.failed().len()
        );

        self.report = Some(report);
        self.state = LifecycleState::Running;

        self.dispatch(ready_event).await;
        true
    }

    /// Running: fan an event out to extension callbacks and deliver replies
    pub async fn dispatch(&mut self, event: GatewayEvent) {
        if self.state != LifecycleState::Running {
            debug!("Dropping {:?} event in state {:?}", event.kind(), self.state);
            return;
        }

        let replies = self.table.dispatch(&event).await;

        match &event {
            GatewayEvent::Ready(_) => {
                if !replies.is_empty() {
                    debug!("Ignoring {} reply(ies) to a ready event", replies.len());
                }
            }
            GatewayEvent::Command(command) => {
                let extra = replies.len().saturating_sub(1);
                if extra > 0 {
                    debug!("Dropping {extra} extra reply(ies) to /{}", command.name);
                }
                let reply = replies.into_iter().next().unwrap_or_else(|| {
                    warn!("/{} produced no response", command.name);
                    no_response(&command.name)
                });
                self.deliver(&event, reply).await;
            }
            GatewayEvent::Message(_) => {
                for reply in replies {
                    self.deliver(&event, reply).await;
                }
            }
        }
    }

    async fn deliver(&mut self, event: &GatewayEvent, reply: Reply) {
        if let Err(e) = self.gateway.reply(event, reply).await {
            error!("Failed to deliver reply: {e}");
        }
    }

    /// Run the whole lifecycle until shutdown or connection loss
    pub async fn run<F>(mut self, shutdown: F) -> Result<Termination, StartupError>
    where
        F: Future<Output = ()>,
    {
        let ready = self.connect().await?;
        self.start(ready).await;

        tokio::pin!(shutdown);

        let termination = loop {
            let next = tokio::select! {
                _ = &mut shutdown => None,
                notification = self.gateway.next_notification() => Some(notification),
            };

            match next {
                None => {
                    info!("Received shutdown signal, disconnecting...");
                    self.gateway.disconnect().await;
                    break Termination::Shutdown;
                }
                Some(Notification::Ready(ready)) => {
                    info!("{} is connected and ready again", ready.user_name);
                    if !self.start(ready.clone()).await {
                        self.dispatch(GatewayEvent::Ready(ready)).await;
                    }
                }
                Some(Notification::Event(event)) => self.dispatch(event).await,
                Some(Notification::Closed(None)) => {
                    info!("Gateway connection closed (state: {:?})", self.gateway.state());
                    break Termination::Disconnected;
                }
                Some(Notification::Closed(Some(e))) => {
                    error!("Gateway connection lost: {e}");
                    break Termination::ConnectionLost(e);
                }
            }
        };

        self.state = LifecycleState::Terminated;
        Ok(termination)
    }
}

/// Ephemeral response for a command none of the callbacks answered
fn no_response(command: &str) -> Reply {
    Reply::ephemeral(format!(
        "Sorry, /{command} failed to respond. Please try again later."
    ))
}
