//! Host-side plugin contract
//!
//! A plugin is a named unit that handles a set of commands, and optionally
//! listens to every message and runs periodic tasks. Built-in plugins
//! implement [`Plugin`] directly; Wasm modules are adapted to it by
//! [`WasmPlugin`](crate::bridge::WasmPlugin).

use crate::alias::is_command_identifier;
use crate::message::Message;
use crate::transport::TransportClient;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use telehost_plugin_api::{CommandSpec, CronSpec};
use thiserror::Error;

/// How a command was triggered
#[derive(Debug, Clone)]
pub struct TriggerContext {
    /// The command key the user typed (a literal command or an alias)
    pub key: String,

    /// The triggering event was an edit
    pub edited: bool,

    /// The message as the user wrote it, when the handler receives a
    /// rewritten copy
    pub original: Option<Message>,
}

/// Everything a command handler receives
#[derive(Clone)]
pub struct CommandContext {
    /// The registered command being invoked
    pub command: String,

    /// Tokens following the command
    pub args: Vec<String>,

    /// The message, rewritten if the user typed an alias with an expansion
    pub message: Message,

    pub trigger: TriggerContext,

    pub client: Arc<dyn TransportClient>,
}

impl CommandContext {
    /// Replace the triggering message's text
    pub async fn reply(&self, text: &str) -> anyhow::Result<()> {
        self.client.edit_message(&self.message, text).await?;
        Ok(())
    }
}

/// Everything a listener receives
#[derive(Clone)]
pub struct ListenerContext {
    pub message: Message,
    pub edited: bool,
    pub client: Arc<dyn TransportClient>,
}

/// Everything a cron task receives
#[derive(Clone)]
pub struct CronContext {
    pub task: String,
    pub client: Arc<dyn TransportClient>,
}

/// A unit of commands, listeners and periodic tasks
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Display name. Unnamed plugins are named after where they came from.
    fn name(&self) -> Option<&str> {
        None
    }

    fn description(&self) -> &str {
        ""
    }

    /// Commands this plugin handles
    fn commands(&self) -> Vec<CommandSpec>;

    /// Run `cx.command`
    async fn handle(&self, cx: CommandContext) -> anyhow::Result<()>;

    /// Whether [`listen`](Self::listen) should receive every message
    fn has_listener(&self) -> bool {
        false
    }

    async fn listen(&self, _cx: ListenerContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Periodic tasks
    fn cron_tasks(&self) -> Vec<CronSpec> {
        Vec::new()
    }

    async fn run_cron(&self, _cx: CronContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Do not trigger commands from edited messages
    fn ignore_edited(&self) -> bool {
        false
    }

    /// Do not deliver edited messages to the listener
    fn listener_ignore_edited(&self) -> bool {
        false
    }
}

/// Where a plugin was loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginOrigin {
    Builtin(String),
    File(PathBuf),
}

impl PluginOrigin {
    /// Name used when the plugin does not provide one
    pub fn default_name(&self) -> String {
        match self {
            PluginOrigin::Builtin(name) => name.clone(),
            PluginOrigin::File(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        }
    }
}

impl std::fmt::Display for PluginOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginOrigin::Builtin(name) => write!(f, "builtin:{}", name),
            PluginOrigin::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A plugin does not meet the minimum contract
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContractError {
    #[error("Plugin declares no commands, listener or cron tasks")]
    Empty,

    #[error("Invalid command name: {0:?}")]
    InvalidCommand(String),

    #[error("Command declared twice: {0}")]
    DuplicateCommand(String),

    #[error("Cron task {0:?} has an empty schedule")]
    EmptySchedule(String),
}

/// A validated plugin, with its declarations captured at load time
#[derive(Clone)]
pub struct RegisteredPlugin {
    pub name: String,
    pub origin: PluginOrigin,
    pub description: String,
    pub commands: Vec<CommandSpec>,
    pub cron: Vec<CronSpec>,
    pub has_listener: bool,
    pub ignore_edited: bool,
    pub listener_ignore_edited: bool,
    pub plugin: Arc<dyn Plugin>,
}

impl RegisteredPlugin {
    /// Validate `plugin` and capture its declarations
    pub fn new(plugin: Arc<dyn Plugin>, origin: PluginOrigin) -> Result<Self, ContractError> {
        let commands = plugin.commands();
        let cron = plugin.cron_tasks();
        let has_listener = plugin.has_listener();

        if commands.is_empty() && cron.is_empty() && !has_listener {
            return Err(ContractError::Empty);
        }

        let mut seen = std::collections::HashSet::new();
        for command in &commands {
            if !is_command_identifier(&command.name) {
                return Err(ContractError::InvalidCommand(command.name.clone()));
            }
            if !seen.insert(command.name.as_str()) {
                return Err(ContractError::DuplicateCommand(command.name.clone()));
            }
        }

        if let Some(task) = cron.iter().find(|t| t.schedule.trim().is_empty()) {
            return Err(ContractError::EmptySchedule(task.name.clone()));
        }

        let name = plugin
            .name()
            .filter(|n| !n.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| origin.default_name());

        Ok(Self {
            name,
            origin,
            description: plugin.description().to_string(),
            commands,
            cron,
            has_listener,
            ignore_edited: plugin.ignore_edited(),
            listener_ignore_edited: plugin.listener_ignore_edited(),
            plugin,
        })
    }
}

impl std::fmt::Debug for RegisteredPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredPlugin")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("commands", &self.commands.len())
            .field("cron", &self.cron.len())
            .field("has_listener", &self.has_listener)
            .finish()
    }
}
