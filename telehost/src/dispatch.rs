//! Command dispatch
//!
//! For every message event: parse, resolve aliases, look the command up,
//! rewrite if the alias expands to something else, and run the handler.
//! Every step that does not apply ends processing quietly; only a failing
//! handler produces user-visible output.

use crate::alias::AliasResolver;
use crate::message::{Event, Message};
use crate::parser::parse;
use crate::plugin::{CommandContext, TriggerContext};
use crate::prefix::PrefixTable;
use crate::registry::PluginRegistry;
use crate::rewrite::{expansion, rewrite};
use crate::transport::{EventHandler, TransportClient};
use async_trait::async_trait;
use std::sync::Arc;

/// Text the triggering message is replaced with when a handler fails
pub const FAILURE_NOTICE: &str = "❌ Command failed. Check the host logs for details.";

/// What happened to an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Neither outgoing nor in the saved chat
    NotOwnMessage,
    /// No prefix, or nothing after it
    NotACommand,
    /// Not an alias and not a plain identifier
    NoCommandKey,
    /// Parsed, but nothing registered under the key
    NoSuchCommand(String),
    /// The owning plugin ignores edited messages
    EditIgnored(String),
    /// The handler ran to completion
    Handled {
        key: String,
        command: String,
        rewritten: bool,
    },
    /// The handler returned an error or panicked
    Failed { key: String, command: String },
}

/// Routes message events to command handlers
pub struct Dispatcher {
    prefixes: Arc<PrefixTable>,
    resolver: AliasResolver,
    registry: Arc<PluginRegistry>,
    client: Arc<dyn TransportClient>,
    saved_chat_id: Option<i64>,
}

impl Dispatcher {
    pub fn new(
        prefixes: Arc<PrefixTable>,
        resolver: AliasResolver,
        registry: Arc<PluginRegistry>,
        client: Arc<dyn TransportClient>,
        saved_chat_id: Option<i64>,
    ) -> Self {
        Self {
            prefixes,
            resolver,
            registry,
            client,
            saved_chat_id,
        }
    }

    fn is_own(&self, message: &Message) -> bool {
        message.outgoing || self.saved_chat_id == Some(message.chat_id)
    }

    /// Process one event
    pub async fn dispatch(&self, event: Event) -> DispatchOutcome {
        let edited = event.is_edit();
        let message = event.message();

        if !self.is_own(message) {
            return DispatchOutcome::NotOwnMessage;
        }

        let prefixes = self.prefixes.get();
        let Some(parsed) = parse(&message.text, &prefixes) else {
            return DispatchOutcome::NotACommand;
        };

        let Some(key) = self.resolver.resolve(&parsed.tokens) else {
            return DispatchOutcome::NoCommandKey;
        };

        let Some(entry) = self.registry.lookup(&key).await else {
            return DispatchOutcome::NoSuchCommand(key);
        };

        if edited && entry.plugin.ignore_edited {
            return DispatchOutcome::EditIgnored(key);
        }

        let command = entry.command(&key).to_string();

        let (target, original) = match expansion(&entry) {
            Some(expansion) => match rewrite(message, &key, expansion, &prefixes) {
                Ok(rewritten) => {
                    tracing::debug!(
                        key = %key,
                        from = %message.text,
                        to = %rewritten.text,
                        "Alias rewritten"
                    );
                    (rewritten, Some(message.clone()))
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Alias rewrite skipped");
                    (message.clone(), None)
                }
            },
            None => (message.clone(), None),
        };
        let rewritten = original.is_some();

        // Skip whatever names the command in the text the handler gets
        let skip = if rewritten {
            command.split_whitespace().count()
        } else {
            key.split_whitespace().count()
        };
        let args = parse(&target.text, &prefixes)
            .map(|p| p.tokens.into_iter().skip(skip).collect())
            .unwrap_or_default();

        let cx = CommandContext {
            command: command.clone(),
            args,
            message: target,
            trigger: TriggerContext {
                key: key.clone(),
                edited,
                original,
            },
            client: self.client.clone(),
        };

        let plugin = entry.plugin.clone();
        tracing::debug!(key = %key, command = %command, plugin = %plugin.name, "Dispatching command");

        // A separate task so a panicking handler is contained like an error
        let task = tokio::spawn(async move { plugin.plugin.handle(cx).await });
        let failure = match task.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{:#}", e)),
            Err(e) if e.is_panic() => Some("handler panicked".to_string()),
            Err(e) => Some(e.to_string()),
        };

        match failure {
            None => DispatchOutcome::Handled {
                key,
                command,
                rewritten,
            },
            Some(error) => {
                tracing::error!(
                    key = %key,
                    command = %command,
                    plugin = %entry.plugin.name,
                    error = %error,
                    "Command handler failed"
                );
                if let Err(e) = self.client.edit_message(message, FAILURE_NOTICE).await {
                    tracing::warn!(error = %e, "Failed to report command failure");
                }
                DispatchOutcome::Failed { key, command }
            }
        }
    }
}

#[async_trait]
impl EventHandler for Dispatcher {
    async fn handle(&self, event: Event) {
        let outcome = self.dispatch(event).await;
        tracing::trace!(outcome = ?outcome, "Event dispatched");
    }
}
