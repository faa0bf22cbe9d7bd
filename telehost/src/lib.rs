//! telehost: command-dispatch core for a chat-bot plugin host
//!
//! Messages the account owner sends are parsed as commands (`.help`,
//! `.g cats`), resolved through user-defined aliases and routed to the
//! plugin that registered the command. Plugins are compiled-in
//! [`builtins`] or Wasm modules discovered on disk, and the whole set can be
//! reloaded at runtime without restarting the host.
//!
//! The pieces, in the order an event passes through them:
//!
//! - [`prefix`]: the command prefixes
//! - [`parser`]: prefix match and tokenizing
//! - [`alias`]: alias stores and longest-match resolution
//! - [`registry`]: loaded plugins and the command index
//! - [`rewrite`]: alias expansion into message text
//! - [`dispatch`]: the per-event state machine
//! - [`fanout`]: listener and cron subscriptions
//! - [`host`]: wiring and reloads

pub mod alias;
pub mod bridge;
pub mod builtins;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod fanout;
pub mod host;
pub mod loader;
pub mod message;
pub mod parser;
pub mod plugin;
pub mod prefix;
pub mod registry;
pub mod rewrite;
pub mod scheduler;
pub mod tracing_support;
pub mod transport;
pub mod watcher;

pub use alias::{AliasRecord, AliasResolver, AliasSource, AliasStore, JsonAliasSource, MemoryAliasSource};
pub use builtins::BuiltinCatalog;
pub use config::{HostConfig, LoadingProfile};
pub use dispatch::{DispatchOutcome, Dispatcher, FAILURE_NOTICE};
pub use host::{Host, HostBuilder, HostError, HostHandle, ReloadSummary};
pub use loader::{LoadedPlugin, LoaderError, PluginInstance, PluginLoader};
pub use message::{Event, EventFilter, Message};
pub use parser::{parse, ParsedCommand};
pub use plugin::{CommandContext, CronContext, ListenerContext, Plugin, PluginOrigin, RegisteredPlugin};
pub use prefix::PrefixTable;
pub use registry::{CommandEntry, CommandIndex, PluginRegistry};
pub use scheduler::{CronHandle, CronJob, CronScheduler, Scheduler, SchedulerError};
pub use telehost_plugin_api::{CommandSpec, CronSpec, ExecuteResult, Invocation, PluginManifest};
pub use transport::{EventHandler, HandlerId, LoopbackTransport, Outgoing, TransportClient, TransportError};
pub use watcher::{HotReloadWatcher, WatcherConfig};
