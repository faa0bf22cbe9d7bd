//! Test plugins and a host wired to the loopback transport

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use telehost::{
    AliasSource, BuiltinCatalog, CommandContext, CommandSpec, CronSpec, Event, Host, HostConfig,
    ListenerContext, LoopbackTransport, Message, Outgoing, Plugin, Scheduler,
};

pub const CHAT: i64 = 42;

/// One handled command
#[derive(Debug, Clone)]
pub struct Call {
    pub command: String,
    pub args: Vec<String>,
    pub text: String,
    pub key: String,
    pub original: Option<String>,
    pub edited: bool,
}

/// Configurable plugin that records what it is asked to do.
///
/// `boom` returns an error and `panic` panics; every other command replies
/// `ok:<command>`.
#[derive(Clone)]
pub struct Recorder {
    pub name: &'static str,
    pub commands: Vec<&'static str>,
    pub calls: Arc<Mutex<Vec<Call>>>,
    pub heard: Arc<Mutex<Vec<(String, bool)>>>,
    pub listener: bool,
    pub ignore_edited: bool,
    pub listener_ignore_edited: bool,
    pub cron: Vec<CronSpec>,
}

impl Recorder {
    pub fn new(name: &'static str, commands: Vec<&'static str>) -> Self {
        Self {
            name,
            commands,
            calls: Arc::new(Mutex::new(Vec::new())),
            heard: Arc::new(Mutex::new(Vec::new())),
            listener: false,
            ignore_edited: false,
            listener_ignore_edited: false,
            cron: Vec::new(),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn heard(&self) -> Vec<(String, bool)> {
        self.heard.lock().unwrap().clone()
    }
}

#[async_trait]
impl Plugin for Recorder {
    fn name(&self) -> Option<&str> {
        Some(self.name)
    }

    fn commands(&self) -> Vec<CommandSpec> {
        self.commands
            .iter()
            .map(|c| CommandSpec::new(*c, format!("{} command", c)))
            .collect()
    }

    async fn handle(&self, cx: CommandContext) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(Call {
            command: cx.command.clone(),
            args: cx.args.clone(),
            text: cx.message.text.clone(),
            key: cx.trigger.key.clone(),
            original: cx.trigger.original.as_ref().map(|m| m.text.clone()),
            edited: cx.trigger.edited,
        });
        match cx.command.as_str() {
            "boom" => anyhow::bail!("boom went the handler"),
            "panic" => panic!("handler panicked on purpose"),
            command => cx.reply(&format!("ok:{}", command)).await,
        }
    }

    fn has_listener(&self) -> bool {
        self.listener
    }

    async fn listen(&self, cx: ListenerContext) -> anyhow::Result<()> {
        self.heard.lock().unwrap().push((cx.message.text, cx.edited));
        Ok(())
    }

    fn cron_tasks(&self) -> Vec<CronSpec> {
        self.cron.clone()
    }

    fn ignore_edited(&self) -> bool {
        self.ignore_edited
    }

    fn listener_ignore_edited(&self) -> bool {
        self.listener_ignore_edited
    }
}

/// A host plus the transport it runs on
pub struct Harness {
    pub host: Host,
    pub transport: Arc<LoopbackTransport>,
    next_id: Mutex<i64>,
}

/// Builder for [`Harness`]
pub struct HarnessBuilder {
    config: HostConfig,
    aliases: Option<Arc<dyn AliasSource>>,
    plugins: Vec<Recorder>,
    extras: Vec<(&'static str, Arc<dyn Plugin>)>,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl HarnessBuilder {
    pub fn config(mut self, config: HostConfig) -> Self {
        self.config = config;
        self
    }

    pub fn aliases(mut self, source: Arc<dyn AliasSource>) -> Self {
        self.aliases = Some(source);
        self
    }

    pub fn plugin(mut self, plugin: &Recorder) -> Self {
        self.plugins.push(plugin.clone());
        self
    }

    /// Register any other plugin under `name`
    pub fn extra(mut self, name: &'static str, plugin: Arc<dyn Plugin>) -> Self {
        self.extras.push((name, plugin));
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub async fn start(self) -> Harness {
        let transport = Arc::new(LoopbackTransport::new());

        let mut catalog = BuiltinCatalog::core();
        for plugin in self.plugins {
            let name = plugin.name;
            catalog = catalog.register(name, move |_| Arc::new(plugin.clone()) as Arc<dyn Plugin>);
        }
        for (name, plugin) in self.extras {
            catalog = catalog.register(name, move |_| plugin.clone());
        }

        let mut builder = Host::builder(self.config, transport.clone())
            .builtins(catalog)
            .alias_source(self.aliases);
        if let Some(scheduler) = self.scheduler {
            builder = builder.scheduler(scheduler);
        }
        let host = builder.build().unwrap();
        host.start().await;

        Harness {
            host,
            transport,
            next_id: Mutex::new(1),
        }
    }
}

pub fn harness() -> HarnessBuilder {
    HarnessBuilder {
        config: HostConfig::isolated(),
        aliases: None,
        plugins: Vec::new(),
        extras: Vec::new(),
        scheduler: None,
    }
}

impl Harness {
    fn next_id(&self) -> i64 {
        let mut id = self.next_id.lock().unwrap();
        *id += 1;
        *id
    }

    /// Deliver `text` as a new message of our own and wait until every
    /// subscriber is done with it
    pub async fn send(&self, text: &str) -> Message {
        let message = Message::outgoing(self.next_id(), CHAT, text);
        self.transport
            .emit_and_wait(Event::NewMessage(message.clone()))
            .await;
        message
    }

    /// Deliver an edit of `message` carrying `text`
    pub async fn edit(&self, message: &Message, text: &str) -> Message {
        let edited = message.with_text(text);
        self.transport
            .emit_and_wait(Event::MessageEdited(edited.clone()))
            .await;
        edited
    }

    pub async fn deliver(&self, event: Event) {
        self.transport.emit_and_wait(event).await;
    }

    /// Texts written to the transport since the last call
    pub async fn take_output(&self) -> Vec<Outgoing> {
        let out = self.transport.outbox().await;
        self.transport.clear_outbox().await;
        out
    }
}
