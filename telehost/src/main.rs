use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use telehost::config::{parse_name_list, parse_prefix_list, APP_NAME};
use telehost::tracing_support::{init_subscriber_with_config, TracingConfig, TracingFormat};
use telehost::{
    Event, Host, HostConfig, HotReloadWatcher, LoadingProfile, LoopbackTransport, Message,
    WatcherConfig,
};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Chat used for console input when no saved chat is configured
const CONSOLE_CHAT: i64 = 1;

/// telehost -- command-dispatch core for a chat-bot plugin host.
///
/// Every line read from stdin is sent as your own message; a line starting
/// with `~` edits the previous one.
#[derive(Parser, Debug)]
#[command(name = "telehost", version, about)]
struct Cli {
    /// Command prefixes, whitespace separated
    #[arg(long, env = "TELEHOST_PREFIX")]
    prefix: Option<String>,

    /// Loading profile (full or minimal)
    #[arg(long, env = "TELEHOST_PROFILE", default_value = "full")]
    profile: LoadingProfile,

    /// Plugins whose listeners always get edited messages, comma separated
    #[arg(long, env = "TELEHOST_EDIT_LISTENERS")]
    edit_listeners: Option<String>,

    /// Plugin directories
    #[arg(long = "plugin-dir", env = "TELEHOST_PLUGIN_DIRS", value_delimiter = ':')]
    plugin_dirs: Vec<PathBuf>,

    /// JSON alias store
    #[arg(long, env = "TELEHOST_ALIAS_STORE")]
    alias_store: Option<PathBuf>,

    /// Run without an alias store
    #[arg(long, conflicts_with = "alias_store")]
    no_aliases: bool,

    /// Chat whose messages are treated as commands
    #[arg(long, env = "TELEHOST_SAVED_CHAT")]
    saved_chat: Option<i64>,

    /// Reload when plugin files change
    #[arg(long, env = "TELEHOST_WATCH")]
    watch: bool,

    /// Log format (pretty, compact or json)
    #[arg(long, env = "TELEHOST_LOG_FORMAT", default_value = "compact")]
    log_format: TracingFormat,
}

impl Cli {
    fn into_config(self) -> HostConfig {
        let mut config = HostConfig::default();
        if let Some(raw) = &self.prefix {
            config.prefixes = parse_prefix_list(raw);
        }
        config.profile = self.profile;
        if let Some(raw) = &self.edit_listeners {
            config.edit_listener_allowlist = parse_name_list(raw);
        }
        if !self.plugin_dirs.is_empty() {
            config.plugin_dirs = self.plugin_dirs;
        }
        if self.no_aliases {
            config.alias_store_path = None;
        } else if let Some(path) = self.alias_store {
            config.alias_store_path = Some(path);
        }
        config.saved_chat_id = self.saved_chat;
        config.watch = self.watch;
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_subscriber_with_config(TracingConfig {
        format: cli.log_format,
        ..TracingConfig::default()
    });

    let config = cli.into_config();
    let chat_id = config.saved_chat_id.unwrap_or(CONSOLE_CHAT);

    let transport = Arc::new(LoopbackTransport::new());
    let mut replies = transport.watch_outgoing().await;
    tokio::spawn(async move {
        while let Some(out) = replies.recv().await {
            println!("{}", out.text());
        }
    });

    let host = Host::new(config.clone(), transport.clone())?;
    let summary = host.start().await;
    tracing::info!(app = APP_NAME, plugins = summary.plugins, commands = summary.commands, "Ready");

    let watcher = if config.watch {
        Some(HotReloadWatcher::new(
            host.handle(),
            &config.plugin_dirs,
            WatcherConfig::default(),
        )?)
    } else {
        None
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut next_id: i64 = 1;
    let mut last: Option<Message> = None;

    while let Some(line) = lines.next_line().await? {
        let event = match (line.strip_prefix('~'), &last) {
            (Some(text), Some(previous)) => {
                let edited = previous.with_text(text);
                last = Some(edited.clone());
                Event::MessageEdited(edited)
            }
            (Some(_), None) => {
                eprintln!("nothing to edit yet");
                continue;
            }
            (None, _) => {
                let message = Message::outgoing(next_id, chat_id, line);
                next_id += 1;
                last = Some(message.clone());
                Event::NewMessage(message)
            }
        };
        transport.emit_and_wait(event).await;
    }

    if let Some(watcher) = watcher {
        watcher.stop();
    }
    host.shutdown().await;
    Ok(())
}
