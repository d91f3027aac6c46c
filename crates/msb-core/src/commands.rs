use std::fmt;

use crate::{actions::ComputeActions, Result};

/// The closed set of commands the bot understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandName {
    Start,
    Stop,
    Status,
    Help,
}

impl CommandName {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandName::Start => "start",
            CommandName::Stop => "stop",
            CommandName::Status => "status",
            CommandName::Help => "help",
        }
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static name -> command table.
///
/// Lookups are exact and case-sensitive: `"Start"` and `"status now"` are not
/// commands.
#[derive(Clone, Copy, Debug, Default)]
pub struct CommandRegistry;

impl CommandRegistry {
    const COMMANDS: [CommandName; 4] = [
        CommandName::Start,
        CommandName::Stop,
        CommandName::Status,
        CommandName::Help,
    ];

    pub fn new() -> Self {
        Self
    }

    pub fn lookup(&self, name: &str) -> Option<CommandName> {
        Self::COMMANDS.into_iter().find(|c| c.as_str() == name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Run the command registered under `name`; unknown names are a no-op.
    pub async fn invoke(&self, name: &str, actions: &ComputeActions) -> Result<()> {
        tracing::debug!("Running command by name \"{name}\".");
        let Some(cmd) = self.lookup(name) else {
            return Ok(());
        };
        match cmd {
            CommandName::Start => actions.start().await,
            CommandName::Stop => actions.stop().await,
            CommandName::Status => actions.status().await,
            CommandName::Help => actions.help().await,
        }
    }
}
