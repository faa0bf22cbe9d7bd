//! Bridge between Wasm plugin modules and the host [`Plugin`] trait

use crate::loader::{LoadedPlugin, PluginInstance};
use crate::message::Message;
use crate::plugin::{CommandContext, CronContext, ListenerContext, Plugin};
use crate::transport::TransportClient;
use async_trait::async_trait;
use std::sync::Arc;
use telehost_plugin_api::{CommandSpec, CronSpec, ExecuteResult, Invocation, PluginManifest};
use tokio::sync::Mutex;

/// A [`Plugin`] backed by a Wasm module instance
pub struct WasmPlugin {
    manifest: PluginManifest,
    instance: Arc<Mutex<PluginInstance>>,
}

impl WasmPlugin {
    /// Create from a loaded plugin
    pub fn from_loaded(plugin: LoadedPlugin) -> Self {
        Self {
            manifest: plugin.manifest,
            instance: Arc::new(Mutex::new(plugin.instance)),
        }
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    async fn invoke(&self, invocation: Invocation) -> anyhow::Result<ExecuteResult> {
        let mut instance = self.instance.lock().await;
        Ok(instance.execute(&invocation)?)
    }
}

/// Carry out what the guest asked for in reply to `message`
async fn apply(
    result: ExecuteResult,
    message: &Message,
    client: &dyn TransportClient,
) -> anyhow::Result<()> {
    match result {
        ExecuteResult::Reply(text) => client.edit_message(message, &text).await?,
        ExecuteResult::Send(text) => {
            client.send_message(message.chat_id, &text).await?;
        }
        ExecuteResult::Silent => {}
        ExecuteResult::Error(err) => anyhow::bail!(err.message),
    }
    Ok(())
}

#[async_trait]
impl Plugin for WasmPlugin {
    fn name(&self) -> Option<&str> {
        self.manifest.name.as_deref()
    }

    fn description(&self) -> &str {
        &self.manifest.description
    }

    fn commands(&self) -> Vec<CommandSpec> {
        self.manifest.commands.clone()
    }

    async fn handle(&self, cx: CommandContext) -> anyhow::Result<()> {
        let result = self
            .invoke(Invocation::Command {
                command: cx.command.clone(),
                text: cx.message.text.clone(),
                args: cx.args.clone(),
                edited: cx.trigger.edited,
            })
            .await?;
        apply(result, &cx.message, cx.client.as_ref()).await
    }

    fn has_listener(&self) -> bool {
        self.manifest.listener
    }

    async fn listen(&self, cx: ListenerContext) -> anyhow::Result<()> {
        let result = self
            .invoke(Invocation::Message {
                text: cx.message.text.clone(),
                chat_id: cx.message.chat_id,
                edited: cx.edited,
            })
            .await?;
        apply(result, &cx.message, cx.client.as_ref()).await
    }

    fn cron_tasks(&self) -> Vec<CronSpec> {
        self.manifest.cron.clone()
    }

    async fn run_cron(&self, cx: CronContext) -> anyhow::Result<()> {
        let result = self
            .invoke(Invocation::Cron {
                task: cx.task.clone(),
            })
            .await?;
        match result {
            ExecuteResult::Error(err) => anyhow::bail!(err.message),
            ExecuteResult::Reply(text) | ExecuteResult::Send(text) => {
                // a cron firing has no chat to answer in
                tracing::info!(task = %cx.task, output = %text, "Cron task output");
                Ok(())
            }
            ExecuteResult::Silent => Ok(()),
        }
    }

    fn ignore_edited(&self) -> bool {
        self.manifest.ignore_edited
    }

    fn listener_ignore_edited(&self) -> bool {
        self.manifest.listener_ignore_edited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{LoopbackTransport, Outgoing};

    #[tokio::test]
    async fn test_apply_reply_edits_message() {
        let transport = LoopbackTransport::new();
        let msg = Message::outgoing(3, 10, ".echo hi");

        apply(ExecuteResult::reply("hi"), &msg, &transport)
            .await
            .unwrap();

        assert_eq!(
            transport.outbox().await,
            vec![Outgoing::Edit {
                chat_id: 10,
                message_id: 3,
                text: "hi".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_apply_error_fails() {
        let transport = LoopbackTransport::new();
        let msg = Message::outgoing(3, 10, ".echo");

        let err = apply(ExecuteResult::error("nothing to echo"), &msg, &transport)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "nothing to echo");
        assert!(transport.outbox().await.is_empty());
    }

    #[tokio::test]
    async fn test_apply_send_posts_new_message() {
        let transport = LoopbackTransport::new();
        let msg = Message::outgoing(3, 10, ".echo hi");

        apply(ExecuteResult::send("hello"), &msg, &transport)
            .await
            .unwrap();

        let out = transport.outbox().await;
        assert!(matches!(&out[0], Outgoing::Send { chat_id: 10, text, .. } if text == "hello"));
    }
}
