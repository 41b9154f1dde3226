//! Fun extension: /coinflip, /roll

use super::{Extension, ExtensionContext};
use crate::commands::{CommandSpec, OptionKind};
use crate::gateway::{GatewayEvent, Reply};
use anyhow::Result;
use rand::Rng;
use serenity::async_trait;

const DEFAULT_SIDES: i64 = 6;
const MAX_SIDES: i64 = 1000;

pub struct Fun;

pub fn create() -> Box<dyn Extension> {
    Box::new(Fun)
}

#[async_trait]
impl Extension for Fun {
    async fn setup(&self, ctx: &mut ExtensionContext) -> Result<()> {
        ctx.command(CommandSpec::new("coinflip", "Flip a coin"), coinflip);
        ctx.command(
            CommandSpec::new("roll", "Roll a die").option(
                "sides",
                "Number of sides (default 6)",
                OptionKind::Integer,
                false,
            ),
            roll,
        );
        Ok(())
    }
}

async fn coinflip(_event: GatewayEvent) -> Result<Option<Reply>> {
    let face = if rand::rng().random_bool(0.5) {
        "Heads"
    } else {
        "Tails"
    };
    Ok(Some(Reply::text(format!("🪙 {face}!"))))
}

async fn roll(event: GatewayEvent) -> Result<Option<Reply>> {
    let sides = match &event {
        GatewayEvent::Command(command) => command.option_i64("sides").unwrap_or(DEFAULT_SIDES),
        _ => return Ok(None),
    };

    if !(2..=MAX_SIDES).contains(&sides) {
        return Ok(Some(Reply::ephemeral(format!(
            "A die needs between 2 and {MAX_SIDES} sides."
        ))));
    }

    let value = roll_die(sides);
    Ok(Some(Reply::text(format!("🎲 You rolled **{value}** (d{sides})"))))
}

fn roll_die(sides: i64) -> i64 {
    rand::rng().random_range(1..=sides)
}
