//! The host: owns the registry, the dispatcher and the event fan-out, and
//! performs reloads.

use crate::alias::{AliasResolver, AliasSource, JsonAliasSource};
use crate::builtins::BuiltinCatalog;
use crate::config::HostConfig;
use crate::discovery::PluginScanner;
use crate::dispatch::Dispatcher;
use crate::fanout::{EventFanout, FanoutSummary};
use crate::loader::LoaderError;
use crate::prefix::{PrefixError, PrefixTable};
use crate::registry::{CommandEntry, PluginRegistry};
use crate::scheduler::{CronScheduler, Scheduler};
use crate::transport::TransportClient;
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Invalid prefixes: {0}")]
    Prefix(#[from] PrefixError),

    #[error("Failed to create plugin loader: {0}")]
    Loader(#[from] LoaderError),
}

/// What a reload produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReloadSummary {
    pub plugins: usize,
    pub commands: usize,
    pub handlers: usize,
    pub cron_tasks: usize,
}

struct HostInner {
    config: HostConfig,
    prefixes: Arc<PrefixTable>,
    registry: Arc<PluginRegistry>,
    dispatcher: Arc<Dispatcher>,
    fanout: EventFanout,
    reload_lock: Mutex<()>,
}

impl HostInner {
    async fn reload_all(self: &Arc<Self>) -> ReloadSummary {
        let _guard = self.reload_lock.lock().await;
        let handle = HostHandle {
            inner: Arc::downgrade(self),
        };

        let index = self.registry.load(&handle).await;
        let index = self.registry.install(index).await;
        let FanoutSummary {
            handlers,
            cron_tasks,
        } = self.fanout.rebuild(&index, self.dispatcher.clone()).await;

        let summary = ReloadSummary {
            plugins: index.plugins().len(),
            commands: index.len(),
            handlers,
            cron_tasks,
        };
        tracing::info!(
            plugins = summary.plugins,
            commands = summary.commands,
            handlers = summary.handlers,
            cron_tasks = summary.cron_tasks,
            "Plugins reloaded"
        );
        summary
    }
}

/// A non-owning reference to the host, handed to built-in plugins.
///
/// Every method returns `None` (or an empty value) once the host is gone.
#[derive(Clone)]
pub struct HostHandle {
    inner: Weak<HostInner>,
}

impl HostHandle {
    /// A handle that points at nothing
    pub fn detached() -> Self {
        Self { inner: Weak::new() }
    }

    pub async fn reload(&self) -> Option<ReloadSummary> {
        let inner = self.inner.upgrade()?;
        Some(inner.reload_all().await)
    }

    pub async fn commands(&self) -> Vec<String> {
        match self.inner.upgrade() {
            Some(inner) => inner.registry.list().await,
            None => Vec::new(),
        }
    }

    pub async fn lookup(&self, key: &str) -> Option<CommandEntry> {
        let inner = self.inner.upgrade()?;
        inner.registry.lookup(key).await
    }

    pub fn prefixes(&self) -> Option<Arc<PrefixTable>> {
        self.inner.upgrade().map(|inner| inner.prefixes.clone())
    }
}

/// Builder for [`Host`]
pub struct HostBuilder {
    config: HostConfig,
    client: Arc<dyn TransportClient>,
    scheduler: Option<Arc<dyn Scheduler>>,
    aliases: Option<Option<Arc<dyn AliasSource>>>,
    catalog: Option<BuiltinCatalog>,
    scanner: Option<PluginScanner>,
}

impl HostBuilder {
    /// Use `scheduler` instead of a [`CronScheduler`]
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Use `source` instead of the JSON store named by the config.
    /// `None` disables aliases.
    pub fn alias_source(mut self, source: Option<Arc<dyn AliasSource>>) -> Self {
        self.aliases = Some(source);
        self
    }

    /// Use `catalog` instead of [`BuiltinCatalog::core`]
    pub fn builtins(mut self, catalog: BuiltinCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn scanner(mut self, scanner: PluginScanner) -> Self {
        self.scanner = Some(scanner);
        self
    }

    pub fn build(self) -> Result<Host, HostError> {
        let config = self.config;
        let prefixes = Arc::new(PrefixTable::new(config.prefixes.iter())?);

        let aliases = self.aliases.unwrap_or_else(|| {
            config
                .alias_store_path
                .as_ref()
                .map(|path| Arc::new(JsonAliasSource::new(path)) as Arc<dyn AliasSource>)
        });

        let scanner = match self.scanner {
            Some(scanner) => scanner,
            None => PluginScanner::new()?,
        };

        let registry = Arc::new(PluginRegistry::new(
            scanner,
            self.catalog.unwrap_or_else(BuiltinCatalog::core),
            config.profile,
            config.plugin_dirs.clone(),
            aliases.clone(),
        ));

        let dispatcher = Arc::new(Dispatcher::new(
            prefixes.clone(),
            AliasResolver::new(aliases),
            registry.clone(),
            self.client.clone(),
            config.saved_chat_id,
        ));

        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Arc::new(CronScheduler::new()));
        let fanout = EventFanout::new(
            self.client,
            scheduler,
            config.edit_listener_allowlist.clone(),
        );

        Ok(Host {
            inner: Arc::new(HostInner {
                config,
                prefixes,
                registry,
                dispatcher,
                fanout,
                reload_lock: Mutex::new(()),
            }),
        })
    }
}

/// The command-dispatch core, wired to one transport
pub struct Host {
    inner: Arc<HostInner>,
}

impl Host {
    pub fn builder(config: HostConfig, client: Arc<dyn TransportClient>) -> HostBuilder {
        HostBuilder {
            config,
            client,
            scheduler: None,
            aliases: None,
            catalog: None,
            scanner: None,
        }
    }

    /// A host with every default
    pub fn new(config: HostConfig, client: Arc<dyn TransportClient>) -> Result<Self, HostError> {
        Self::builder(config, client).build()
    }

    /// Load every plugin and subscribe to the transport
    pub async fn start(&self) -> ReloadSummary {
        tracing::info!(
            profile = %self.inner.config.profile,
            prefixes = ?self.inner.prefixes.get(),
            "Starting host"
        );
        self.reload_all().await
    }

    /// Rebuild the command index and every subscription from scratch.
    ///
    /// Concurrent calls are serialized. The subscription set afterwards
    /// depends only on what was loaded, not on how many reloads ran before.
    pub async fn reload_all(&self) -> ReloadSummary {
        self.inner.reload_all().await
    }

    /// Drop every subscription and cron task and empty the index
    pub async fn shutdown(&self) {
        let _guard = self.inner.reload_lock.lock().await;
        self.inner.fanout.teardown().await;
        let old = self.inner.registry.clear().await;
        tracing::info!(plugins = old.plugins().len(), "Host stopped");
    }

    pub fn handle(&self) -> HostHandle {
        HostHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.inner.config
    }

    pub fn prefixes(&self) -> &Arc<PrefixTable> {
        &self.inner.prefixes
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.inner.registry
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.inner.dispatcher
    }

    pub async fn subscriptions(&self) -> FanoutSummary {
        self.inner.fanout.summary().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LoopbackTransport;

    #[tokio::test]
    async fn test_detached_handle() {
        let handle = HostHandle::detached();
        assert!(handle.reload().await.is_none());
        assert!(handle.commands().await.is_empty());
        assert!(handle.prefixes().is_none());
    }

    #[tokio::test]
    async fn test_handle_outlived_host() {
        let client = Arc::new(LoopbackTransport::new());
        let host = Host::new(HostConfig::isolated(), client).unwrap();
        let handle = host.handle();
        assert!(handle.prefixes().is_some());

        drop(host);
        assert!(handle.prefixes().is_none());
    }

    #[test]
    fn test_empty_prefixes_rejected() {
        let client = Arc::new(LoopbackTransport::new());
        let config = HostConfig {
            prefixes: vec![String::new()],
            ..HostConfig::isolated()
        };
        assert!(matches!(
            Host::new(config, client),
            Err(HostError::Prefix(_))
        ));
    }

    #[tokio::test]
    async fn test_start_loads_core_builtins() {
        let client = Arc::new(LoopbackTransport::new());
        let host = Host::new(HostConfig::isolated(), client.clone()).unwrap();

        let summary = host.start().await;
        assert_eq!(summary.plugins, 3);
        assert_eq!(summary.commands, 3);
        // dispatcher on new and edited messages
        assert_eq!(summary.handlers, 2);
        assert_eq!(client.list_event_handlers().await.len(), 2);

        host.shutdown().await;
        assert!(client.list_event_handlers().await.is_empty());
        assert!(host.registry().list().await.is_empty());
    }
}
