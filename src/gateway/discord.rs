//! Discord gateway backed by serenity
//!
//! The serenity client runs in its own task. Its event handler only forwards
//! ready, message and interaction events into a channel; everything else
//! happens on the orchestrator's task.

use super::{
    ActivityKind, CommandInvocation, CommandScope, ConnectionState, GatewayClient, GatewayEvent,
    IncomingMessage, Notification, Presence, ReadyInfo, Reply,
};
use crate::commands::{slash, CommandSpec};
use crate::config::Credential;
use crate::error::GatewayError;
use crate::lifecycle::StartupReport;
use crate::startup_notification::build_startup_embed;
use anyhow::{Context as _, Result};
use log::{debug, info};
use serenity::async_trait;
use serenity::client::bridge::gateway::{ShardManager, ShardMessenger};
use serenity::http::Http;
use serenity::model::application::command::Command;
use serenity::model::application::interaction::Interaction;
use serenity::model::channel::Message;
use serenity::model::gateway::{Activity, Ready};
use serenity::model::id::{ChannelId, GuildId};
use serenity::prelude::*;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Interaction response type: reply with a channel message
const CHANNEL_MESSAGE_WITH_SOURCE: u8 = 4;
/// Message flag: only visible to the invoking user
const EPHEMERAL_FLAG: u64 = 1 << 6;

/// What the serenity handler forwards to the gateway
enum Inbound {
    Ready {
        info: ReadyInfo,
        shard: ShardMessenger,
    },
    Event(GatewayEvent),
    Closed(Option<GatewayError>),
}

/// Forwards serenity events into the gateway channel
struct Forwarder {
    tx: mpsc::UnboundedSender<Inbound>,
}

impl Forwarder {
    fn forward(&self, inbound: Inbound) {
        if self.tx.send(inbound).is_err() {
            debug!("Gateway receiver dropped, discarding event");
        }
    }
}

#[async_trait]
impl EventHandler for Forwarder {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("{} is connected and ready!", ready.user.name);

        // Log shard information
        if let Some(shard) = ready.shard {
            info!("Shard: {}/{}", shard[0] + 1, shard[1]);
        }

        self.forward(Inbound::Ready {
            info: ReadyInfo {
                user_name: ready.user.tag(),
                guild_count: ready.guilds.len(),
            },
            shard: ctx.shard.clone(),
        });
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        self.forward(Inbound::Event(GatewayEvent::Message(IncomingMessage {
            message_id: msg.id.0,
            channel_id: msg.channel_id.0,
            guild_id: msg.guild_id.map(|g| g.0),
            author_id: msg.author.id.0,
            author_name: msg.author.name.clone(),
            content: msg.content.clone(),
        })));
    }

    async fn interaction_create(&self, _ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::ApplicationCommand(command) => {
                let options = command
                    .data
                    .options
                    .iter()
                    .filter_map(|opt| opt.value.clone().map(|v| (opt.name.clone(), v)))
                    .collect();

                self.forward(Inbound::Event(GatewayEvent::Command(CommandInvocation {
                    interaction_id: command.id.0,
                    token: command.token.clone(),
                    name: command.data.name.clone(),
                    channel_id: command.channel_id.0,
                    guild_id: command.guild_id.map(|g| g.0),
                    user_id: command.user.id.0,
                    user_name: command.user.name.clone(),
                    options,
                })));
            }
            other => debug!("Ignoring interaction of kind {:?}", other.kind()),
        }
    }
}

// ============================================================================
// Gateway
// ============================================================================

/// Serenity-backed [`GatewayClient`]
pub struct DiscordGateway {
    intents: GatewayIntents,
    state: ConnectionState,
    http: Option<Arc<Http>>,
    shard: Option<ShardMessenger>,
    shard_manager: Option<Arc<Mutex<ShardManager>>>,
    events: Option<mpsc::UnboundedReceiver<Inbound>>,
}

impl Default for DiscordGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscordGateway {
    pub fn new() -> Self {
        Self {
            intents: GatewayIntents::GUILDS
                | GatewayIntents::GUILD_MESSAGES
                | GatewayIntents::DIRECT_MESSAGES
                | GatewayIntents::MESSAGE_CONTENT,
            state: ConnectionState::Disconnected,
            http: None,
            shard: None,
            shard_manager: None,
            events: None,
        }
    }

    fn http(&self) -> Result<&Arc<Http>, GatewayError> {
        self.http
            .as_ref()
            .ok_or_else(|| GatewayError::Send("not connected".to_string()))
    }

    fn fail(&mut self, error: GatewayError) -> GatewayError {
        self.state = ConnectionState::Failed(error.clone());
        error
    }
}

#[async_trait]
impl GatewayClient for DiscordGateway {
    async fn connect(&mut self, credential: Credential) -> Result<ReadyInfo, GatewayError> {
        self.state = ConnectionState::Connecting;

        let application_id = match fetch_application_id(credential.expose()).await {
            Ok(id) => id,
            Err(e) => return Err(self.fail(GatewayError::Connect(format!("{e:#}")))),
        };
        info!("Application ID: {application_id}");

        let (tx, mut rx) = mpsc::unbounded_channel();

        let client = Client::builder(credential.expose(), self.intents)
            .event_handler(Forwarder { tx: tx.clone() })
            .application_id(application_id)
            .await;
        let mut client = match client {
            Ok(client) => client,
            Err(e) => {
                return Err(self.fail(GatewayError::Connect(format!(
                    "Client creation failed: {e}"
                ))))
            }
        };

        self.http = Some(client.cache_and_http.http.clone());
        self.shard_manager = Some(client.shard_manager.clone());

        // Runs until the shards shut down or the connection fails for good
        tokio::spawn(async move {
            let closed = client
                .start()
                .await
                .err()
                .map(|e| GatewayError::Closed(e.to_string()));
            let _ = tx.send(Inbound::Closed(closed));
        });

        loop {
            match rx.recv().await {
                Some(Inbound::Ready { info, shard }) => {
                    self.shard = Some(shard);
                    self.events = Some(rx);
                    self.state = ConnectionState::Ready;
                    return Ok(info);
                }
                Some(Inbound::Event(_)) => continue,
                Some(Inbound::Closed(error)) => {
                    let error = error.unwrap_or_else(|| {
                        GatewayError::Connect("connection closed before ready".to_string())
                    });
                    return Err(self.fail(GatewayError::Connect(error.to_string())));
                }
                None => {
                    return Err(self.fail(GatewayError::Connect(
                        "gateway task ended before ready".to_string(),
                    )))
                }
            }
        }
    }

    async fn next_notification(&mut self) -> Notification {
        let Some(events) = self.events.as_mut() else {
            return Notification::Closed(None);
        };

        match events.recv().await {
            Some(Inbound::Ready { info, shard }) => {
                self.shard = Some(shard);
                self.state = ConnectionState::Ready;
                Notification::Ready(info)
            }
            Some(Inbound::Event(event)) => Notification::Event(event),
            Some(Inbound::Closed(error)) => {
                self.events = None;
                self.state = match &error {
                    Some(e) => ConnectionState::Failed(e.clone()),
                    None => ConnectionState::Disconnected,
                };
                Notification::Closed(error)
            }
            None => {
                self.events = None;
                let error = GatewayError::Closed("gateway task ended".to_string());
                self.state = ConnectionState::Failed(error.clone());
                Notification::Closed(Some(error))
            }
        }
    }

    fn state(&self) -> ConnectionState {
        self.state.clone()
    }

    async fn sync_commands(
        &mut self,
        commands: &[CommandSpec],
        scope: CommandScope,
    ) -> Result<usize, GatewayError> {
        let http = self.http().map_err(|e| GatewayError::Sync(e.to_string()))?;
        let builders = slash::create_commands(commands);

        let registered = match scope {
            CommandScope::Global => {
                Command::set_global_application_commands(http, |c| {
                    c.set_application_commands(builders)
                })
                .await
            }
            CommandScope::Guild(guild_id) => {
                GuildId(guild_id)
                    .set_application_commands(http, |c| c.set_application_commands(builders))
                    .await
            }
        }
        .map_err(|e| GatewayError::Sync(e.to_string()))?;

        Ok(registered.len())
    }

    async fn set_presence(&mut self, presence: &Presence) -> Result<(), GatewayError> {
        let shard = self
            .shard
            .as_ref()
            .ok_or_else(|| GatewayError::Presence("not connected".to_string()))?;

        shard.set_activity(Some(activity(presence)));
        Ok(())
    }

    async fn reply(&mut self, event: &GatewayEvent, reply: Reply) -> Result<(), GatewayError> {
        let http = self.http()?;

        match event {
            GatewayEvent::Command(command) => {
                let mut data = serde_json::json!({ "content": reply.content });
                if reply.ephemeral {
                    data["flags"] = serde_json::json!(EPHEMERAL_FLAG);
                }
                let response = serde_json::json!({
                    "type": CHANNEL_MESSAGE_WITH_SOURCE,
                    "data": data,
                });
                http.create_interaction_response(command.interaction_id, &command.token, &response)
                    .await
                    .map_err(|e| GatewayError::Send(e.to_string()))
            }
            GatewayEvent::Message(message) => ChannelId(message.channel_id)
                .say(http, &reply.content)
                .await
                .map(|_| ())
                .map_err(|e| GatewayError::Send(e.to_string())),
            GatewayEvent::Ready(_) => Err(GatewayError::Send(
                "ready events have no channel to reply to".to_string(),
            )),
        }
    }

    async fn send_startup_report(
        &mut self,
        channel_id: u64,
        report: &StartupReport,
    ) -> Result<(), GatewayError> {
        let http = self.http()?;
        let embed = build_startup_embed(report);

        ChannelId(channel_id)
            .send_message(http, |m| m.set_embed(embed))
            .await
            .map_err(|e| GatewayError::Send(e.to_string()))?;

        info!("Sent startup notification to channel {}", channel_id);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(manager) = self.shard_manager.take() {
            manager.lock().await.shutdown_all().await;
        }
        self.shard = None;
        self.state = ConnectionState::Disconnected;
    }
}

fn activity(presence: &Presence) -> Activity {
    let text = presence.text.clone();
    match presence.kind {
        ActivityKind::Watching => Activity::watching(text),
        ActivityKind::Playing => Activity::playing(text),
        ActivityKind::Listening => Activity::listening(text),
        ActivityKind::Competing => Activity::competing(text),
    }
}

// ============================================================================
// Discord API - Application ID Fetching
// ============================================================================

/// Fetch the application ID from Discord API using the bot token
///
/// This makes a request to GET /users/@me to get the bot's user info,
/// then extracts the application ID from the response.
pub async fn fetch_application_id(token: &str) -> Result<u64> {
    let client = reqwest::Client::new();

    let response = client
        .get("https://discord.com/api/v10/users/@me")
        .header("Authorization", format!("Bot {}", token))
        .send()
        .await
        .context("Failed to connect to Discord API")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("Discord API error ({}): {}", status, body);
    }

    let user_info: serde_json::Value = response
        .json()
        .await
        .context("Failed to parse Discord API response")?;

    parse_application_id(&user_info)
}

/// The user ID is the same as the application ID for bot users
fn parse_application_id(user_info: &serde_json::Value) -> Result<u64> {
    let id = user_info["id"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("Discord API response missing 'id' field"))?;

    id.parse()
        .with_context(|| format!("Discord API returned a non-numeric id '{id}'"))
}
