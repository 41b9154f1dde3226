//! Conversion of command declarations into serenity application command builders

use super::{CommandSpec, OptionKind};
use serenity::builder::CreateApplicationCommand;
use serenity::model::application::command::CommandOptionType;

/// Creates the builders for every declared command
pub fn create_commands(specs: &[CommandSpec]) -> Vec<CreateApplicationCommand> {
    specs.iter().map(create_command).collect()
}

/// Creates a single application command from its declaration
pub fn create_command(spec: &CommandSpec) -> CreateApplicationCommand {
    let mut command = CreateApplicationCommand::default();
    command.name(&spec.name).description(&spec.description);

    for option in &spec.options {
        command.create_option(|builder| {
            builder
                .name(&option.name)
                .description(&option.description)
                .kind(option_type(option.kind))
                .required(option.required)
        });
    }

    command
}

fn option_type(kind: OptionKind) -> CommandOptionType {
    match kind {
        OptionKind::String => CommandOptionType::String,
        OptionKind::Integer => CommandOptionType::Integer,
        OptionKind::Boolean => CommandOptionType::Boolean,
        OptionKind::User => CommandOptionType::User,
        OptionKind::Channel => CommandOptionType::Channel,
    }
}
