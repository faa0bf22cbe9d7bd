//! telehost-plugin-api: Shared types for telehost Wasm plugins
//!
//! This crate defines the protocol between the host and a guest (wasm plugin).
//! Communication uses MessagePack serialization.

use serde::{Deserialize, Serialize};

/// API version for compatibility checking
pub const API_VERSION: u32 = 1;

/// Plugin manifest returned by the guest's `plugin_manifest()` export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// API version for compatibility
    pub api_version: u32,

    /// Display name. The host falls back to the module's file stem.
    #[serde(default)]
    pub name: Option<String>,

    /// Short description for help text
    #[serde(default)]
    pub description: String,

    /// Commands this plugin handles
    #[serde(default)]
    pub commands: Vec<CommandSpec>,

    /// Whether the plugin wants every message delivered to its listener
    #[serde(default)]
    pub listener: bool,

    /// Periodic tasks
    #[serde(default)]
    pub cron: Vec<CronSpec>,

    /// Do not trigger commands from edited messages
    #[serde(default)]
    pub ignore_edited: bool,

    /// Do not deliver edited messages to the listener
    #[serde(default)]
    pub listener_ignore_edited: bool,
}

/// A single command declared by a plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Command name as typed after the prefix (e.g. "ping")
    pub name: String,

    /// Short description for help text
    #[serde(default)]
    pub about: String,

    /// Usage hint shown by `help <command>`
    #[serde(default)]
    pub usage: Option<String>,
}

/// A periodic task declared by a plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronSpec {
    /// Task name, unique within the plugin
    pub name: String,

    /// Cron expression (5 fields, or the 6/7 field form with seconds)
    pub schedule: String,
}

/// What the host asks the guest to do
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Invocation {
    /// A command was triggered
    Command {
        /// The command the plugin registered (after alias resolution)
        command: String,
        /// Full message text, possibly rewritten from an alias
        text: String,
        /// Tokens after the command name
        args: Vec<String>,
        /// The triggering event was an edit
        edited: bool,
    },

    /// A message was delivered to the plugin's listener
    Message {
        text: String,
        chat_id: i64,
        edited: bool,
    },

    /// A cron task fired
    Cron { task: String },
}

/// Result of plugin execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecuteResult {
    /// Replace the triggering message's text
    Reply(String),

    /// Post a new message into the same chat
    Send(String),

    /// Nothing to report
    Silent,

    /// Execution failed
    Error(ExecuteError),
}

/// Error details from plugin execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteError {
    /// Error message
    pub message: String,
}

impl ExecuteResult {
    /// Create a reply result
    pub fn reply(output: impl Into<String>) -> Self {
        Self::Reply(output.into())
    }

    /// Create a send result
    pub fn send(output: impl Into<String>) -> Self {
        Self::Send(output.into())
    }

    /// Create an error result
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ExecuteError {
            message: message.into(),
        })
    }
}

impl PluginManifest {
    /// Create an empty manifest at the current API version
    pub fn new() -> Self {
        Self {
            api_version: API_VERSION,
            name: None,
            description: String::new(),
            commands: Vec::new(),
            listener: false,
            cron: Vec::new(),
            ignore_edited: false,
            listener_ignore_edited: false,
        }
    }

    /// Set the display name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a command
    pub fn command(mut self, command: CommandSpec) -> Self {
        self.commands.push(command);
        self
    }

    /// Ask for every message to be delivered to the listener
    pub fn listener(mut self) -> Self {
        self.listener = true;
        self
    }

    /// Add a cron task
    pub fn cron(mut self, name: impl Into<String>, schedule: impl Into<String>) -> Self {
        self.cron.push(CronSpec::new(name, schedule));
        self
    }

    /// Skip commands triggered by edited messages
    pub fn ignore_edited(mut self) -> Self {
        self.ignore_edited = true;
        self
    }

    /// Skip listener delivery of edited messages
    pub fn listener_ignore_edited(mut self) -> Self {
        self.listener_ignore_edited = true;
        self
    }
}

impl Default for PluginManifest {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandSpec {
    /// Create a new command spec
    pub fn new(name: impl Into<String>, about: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            about: about.into(),
            usage: None,
        }
    }

    /// Add a usage hint
    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }
}

impl CronSpec {
    pub fn new(name: impl Into<String>, schedule: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schedule: schedule.into(),
        }
    }
}
