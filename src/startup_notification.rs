//! # Feature: Startup Notification
//!
//! Posts a rich embed summarising the startup sequence (loaded and failed
//! extensions, command sync) to the configured startup channel.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: true (set `startup_channel_id` in config.json)

use crate::lifecycle::StartupReport;
use serenity::builder::CreateEmbed;
use serenity::utils::Color;

/// Discord allows at most 1024 characters per embed field
const FIELD_LIMIT: usize = 1024;

/// Text content of the startup embed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupSummary {
    pub title: String,
    pub healthy: bool,
    pub fields: Vec<(String, String)>,
    pub footer: String,
}

/// Summarise a startup report for display
pub fn summarize(report: &StartupReport) -> StartupSummary {
    let loaded = report.loaded();
    let failed = report.failed();

    let mut fields = Vec::new();

    let loaded_value = if loaded.is_empty() {
        "none".to_string()
    } else {
        loaded
            .iter()
            .map(|id| format!("`{id}`"))
            .collect::<Vec<_>>()
            .join(", ")
    };
    fields.push((format!("Extensions ({})", loaded.len()), loaded_value));

    if !failed.is_empty() {
        let value = failed
            .iter()
            .map(|(id, reason)| format!("`{id}`: {reason}"))
            .collect::<Vec<_>>()
            .join("\n");
        fields.push((format!("Failed ({})", failed.len()), truncate(&value, FIELD_LIMIT)));
    }

    let commands = match &report.synced_commands {
        Ok(count) => format!("{count} synced"),
        Err(e) => truncate(&format!("sync failed: {e}"), FIELD_LIMIT),
    };
    fields.push(("Slash Commands".to_string(), commands));
    fields.push(("Guilds".to_string(), report.ready.guild_count.to_string()));

    let healthy = failed.is_empty() && report.synced_commands.is_ok();
    let footer = if healthy {
        "All systems operational".to_string()
    } else if failed.is_empty() {
        "Command sync failed".to_string()
    } else {
        format!("{} extension(s) failed to load", failed.len())
    };

    StartupSummary {
        title: format!("{} is Online!", report.ready.user_name),
        healthy,
        fields,
        footer,
    }
}

/// Builds the startup embed
pub fn build_startup_embed(report: &StartupReport) -> CreateEmbed {
    let summary = summarize(report);
    let mut embed = CreateEmbed::default();

    let color = if summary.healthy {
        Color::from_rgb(87, 242, 135)
    } else {
        Color::from_rgb(254, 231, 92)
    };

    embed.title(summary.title).color(color).description(format!(
        "System startup at {}",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    ));

    for (name, value) in summary.fields {
        embed.field(name, value, false);
    }

    let footer = summary.footer;
    embed.footer(|f| f.text(footer));
    embed.timestamp(chrono::Utc::now().to_rfc3339());
    embed
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(limit.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}
