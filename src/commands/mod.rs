//! Slash command declarations
//!
//! Extensions describe their commands with [`CommandSpec`]; the gateway turns
//! them into platform builders when the registry is synced.

pub mod slash;

/// Kind of value a command option accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    String,
    Integer,
    Boolean,
    User,
    Channel,
}

/// A single command option
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOptionSpec {
    pub name: String,
    pub description: String,
    pub kind: OptionKind,
    pub required: bool,
}

/// A slash command published to the command registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: String,
    pub description: String,
    pub options: Vec<CommandOptionSpec>,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            options: Vec::new(),
        }
    }

    /// Adds an option to the command
    pub fn option(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        kind: OptionKind,
        required: bool,
    ) -> Self {
        self.options.push(CommandOptionSpec {
            name: name.into(),
            description: description.into(),
            kind,
            required,
        });
        self
    }
}
