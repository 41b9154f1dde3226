//! General utility extension: /ping, /uptime, /version

use super::{Extension, ExtensionContext};
use crate::commands::CommandSpec;
use crate::gateway::{GatewayEvent, Reply};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serenity::async_trait;

pub struct General {
    started_at: DateTime<Utc>,
}

pub fn create() -> Box<dyn Extension> {
    Box::new(General {
        started_at: Utc::now(),
    })
}

#[async_trait]
impl Extension for General {
    async fn setup(&self, ctx: &mut ExtensionContext) -> Result<()> {
        let started_at = self.started_at;

        ctx.command(CommandSpec::new("ping", "Test bot responsiveness"), ping);
        ctx.command(
            CommandSpec::new("uptime", "Show how long the bot has been running"),
            move |_| uptime(started_at),
        );
        ctx.command(CommandSpec::new("version", "Show bot version"), version);
        Ok(())
    }
}

async fn ping(_event: GatewayEvent) -> Result<Option<Reply>> {
    Ok(Some(Reply::text("Pong!")))
}

async fn uptime(started_at: DateTime<Utc>) -> Result<Option<Reply>> {
    let elapsed = Utc::now() - started_at;
    Ok(Some(Reply::text(format!(
        "Online for {}",
        format_duration(elapsed)
    ))))
}

async fn version(_event: GatewayEvent) -> Result<Option<Reply>> {
    Ok(Some(Reply::text(format!(
        "strp-bot v{} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH")
    ))))
}

/// Formats a duration as `1d 2h 3m 4s`, dropping leading zero units
fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    let (days, hours, minutes, seconds) = (
        total / 86_400,
        (total % 86_400) / 3_600,
        (total % 3_600) / 60,
        total % 60,
    );

    if days > 0 {
        format!("{days}d {hours}h {minutes}m {seconds}s")
    } else if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
