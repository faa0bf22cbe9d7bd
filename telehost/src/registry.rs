//! Plugin registry
//!
//! Holds the loaded plugins and the command index built from them. The index
//! is immutable once built: a reload builds a complete new [`CommandIndex`]
//! off to the side and then swaps it in, so a lookup sees either the old
//! table or the new one and never a half-populated one.

use crate::alias::{open_store, AliasRecord, AliasSource};
use crate::builtins::BuiltinCatalog;
use crate::config::LoadingProfile;
use crate::discovery::{PluginScanner, ScanReport};
use crate::host::HostHandle;
use crate::plugin::{PluginOrigin, RegisteredPlugin};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Where a typed command key leads
#[derive(Debug, Clone)]
pub struct CommandEntry {
    /// Plugin that handles it
    pub plugin: Arc<RegisteredPlugin>,

    /// Set when the entry exists only because of an alias: the command the
    /// alias points at
    pub original: Option<String>,

    /// The alias's full expansion (command plus fixed arguments)
    pub alias_final: Option<String>,
}

impl CommandEntry {
    /// The command the plugin registered
    pub fn command<'a>(&'a self, key: &'a str) -> &'a str {
        self.original.as_deref().unwrap_or(key)
    }

    pub fn is_alias(&self) -> bool {
        self.original.is_some()
    }
}

/// Immutable command table plus the plugins it points into
#[derive(Debug, Default)]
pub struct CommandIndex {
    plugins: Vec<Arc<RegisteredPlugin>>,
    entries: HashMap<String, CommandEntry>,
}

impl CommandIndex {
    /// Index `plugins`, adding an entry for every alias that targets one of
    /// their commands.
    ///
    /// On a literal command declared by two plugins, the first one keeps it.
    /// Alias entries are added after all literal ones and replace a literal
    /// command of the same name.
    pub fn build(plugins: Vec<RegisteredPlugin>, aliases: &[AliasRecord]) -> Self {
        let plugins: Vec<Arc<RegisteredPlugin>> = plugins.into_iter().map(Arc::new).collect();
        let mut entries: HashMap<String, CommandEntry> = HashMap::new();

        for plugin in &plugins {
            for command in &plugin.commands {
                if let Some(existing) = entries.get(&command.name) {
                    tracing::warn!(
                        command = %command.name,
                        plugin = %plugin.name,
                        owner = %existing.plugin.name,
                        "Command already registered, skipping"
                    );
                    continue;
                }
                entries.insert(
                    command.name.clone(),
                    CommandEntry {
                        plugin: plugin.clone(),
                        original: None,
                        alias_final: None,
                    },
                );
            }
        }

        let literals: Vec<(String, Arc<RegisteredPlugin>)> = entries
            .iter()
            .map(|(k, e)| (k.clone(), e.plugin.clone()))
            .collect();
        for (command, plugin) in literals {
            for alias in aliases.iter().filter(|a| a.targets(&command)) {
                tracing::debug!(
                    alias = %alias.original,
                    expansion = %alias.expansion,
                    command = %command,
                    "Alias registered"
                );
                entries.insert(
                    alias.original.clone(),
                    CommandEntry {
                        plugin: plugin.clone(),
                        original: Some(command.clone()),
                        alias_final: Some(alias.expansion.clone()),
                    },
                );
            }
        }

        Self { plugins, entries }
    }

    /// Exact-key lookup
    pub fn lookup(&self, key: &str) -> Option<&CommandEntry> {
        self.entries.get(key)
    }

    /// Every invocable key, sorted. Alias keys carry the command they
    /// point at: `"g (google)"`.
    pub fn list(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .map(|(key, entry)| match &entry.original {
                Some(original) => format!("{} ({})", key, original),
                None => key.clone(),
            })
            .collect();
        keys.sort();
        keys
    }

    pub fn plugins(&self) -> &[Arc<RegisteredPlugin>] {
        &self.plugins
    }

    pub fn plugin(&self, name: &str) -> Option<&Arc<RegisteredPlugin>> {
        self.plugins.iter().find(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Registry of loaded plugins and their commands
pub struct PluginRegistry {
    current: RwLock<Arc<CommandIndex>>,
    scanner: Arc<PluginScanner>,
    catalog: BuiltinCatalog,
    profile: LoadingProfile,
    plugin_dirs: Vec<PathBuf>,
    aliases: Option<Arc<dyn AliasSource>>,
}

impl PluginRegistry {
    pub fn new(
        scanner: PluginScanner,
        catalog: BuiltinCatalog,
        profile: LoadingProfile,
        plugin_dirs: Vec<PathBuf>,
        aliases: Option<Arc<dyn AliasSource>>,
    ) -> Self {
        Self {
            current: RwLock::new(Arc::new(CommandIndex::default())),
            scanner: Arc::new(scanner),
            catalog,
            profile,
            plugin_dirs,
            aliases,
        }
    }

    pub fn plugin_dirs(&self) -> &[PathBuf] {
        &self.plugin_dirs
    }

    pub fn profile(&self) -> LoadingProfile {
        self.profile
    }

    /// Build a fresh index from every eligible plugin. Nothing is installed;
    /// see [`install`](Self::install).
    ///
    /// Plugins that fail to load are logged and left out.
    pub async fn load(&self, handle: &HostHandle) -> CommandIndex {
        let mut plugins = Vec::new();

        for (name, factory) in self.catalog.iter() {
            if !self.profile.allows_builtin(name) {
                tracing::debug!(plugin = %name, profile = %self.profile, "Built-in skipped by profile");
                continue;
            }
            match RegisteredPlugin::new(factory(handle), PluginOrigin::Builtin(name.to_string())) {
                Ok(plugin) => plugins.push(plugin),
                Err(e) => tracing::warn!(plugin = %name, error = %e, "Failed to load built-in"),
            }
        }

        if self.profile.scans_directories() {
            let discovered = self.scan().await;
            for (path, e) in &discovered.failed {
                tracing::warn!(path = %path.display(), error = %e, "Failed to load plugin");
            }
            plugins.extend(discovered.loaded);
        }

        // One scoped acquisition for the whole load
        let aliases = match open_store(self.aliases.as_deref()) {
            Some(store) => store.list().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to list aliases");
                Vec::new()
            }),
            None => Vec::new(),
        };

        for plugin in &plugins {
            tracing::info!(
                plugin = %plugin.name,
                origin = %plugin.origin,
                commands = plugin.commands.len(),
                "Plugin loaded"
            );
        }

        CommandIndex::build(plugins, &aliases)
    }

    async fn scan(&self) -> ScanReport {
        let scanner = self.scanner.clone();
        let dirs = self.plugin_dirs.clone();
        // compiling modules is CPU-bound
        match tokio::task::spawn_blocking(move || scanner.scan_all(dirs)).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "Plugin scan aborted");
                ScanReport::default()
            }
        }
    }

    /// Swap in a new index and return it
    pub async fn install(&self, index: CommandIndex) -> Arc<CommandIndex> {
        let index = Arc::new(index);
        *self.current.write().await = index.clone();
        index
    }

    /// Replace the current index with an empty one and return the old one
    pub async fn clear(&self) -> Arc<CommandIndex> {
        std::mem::take(&mut *self.current.write().await)
    }

    /// The index currently in use
    pub async fn snapshot(&self) -> Arc<CommandIndex> {
        self.current.read().await.clone()
    }

    /// Exact-key lookup in the current index
    pub async fn lookup(&self, key: &str) -> Option<CommandEntry> {
        self.current.read().await.lookup(key).cloned()
    }

    /// Sorted command listing of the current index
    pub async fn list(&self) -> Vec<String> {
        self.current.read().await.list()
    }

    /// Check if a command key exists
    pub async fn has_command(&self, key: &str) -> bool {
        self.current.read().await.lookup(key).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{CommandContext, Plugin};
    use async_trait::async_trait;
    use telehost_plugin_api::CommandSpec;

    struct Named(&'static str, Vec<&'static str>);

    #[async_trait]
    impl Plugin for Named {
        fn name(&self) -> Option<&str> {
            Some(self.0)
        }

        fn commands(&self) -> Vec<CommandSpec> {
            self.1.iter().map(|c| CommandSpec::new(*c, "")).collect()
        }

        async fn handle(&self, _cx: CommandContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn registered(name: &'static str, commands: Vec<&'static str>) -> RegisteredPlugin {
        RegisteredPlugin::new(
            Arc::new(Named(name, commands)),
            PluginOrigin::Builtin(name.into()),
        )
        .unwrap()
    }

    #[test]
    fn test_build_indexes_literal_and_alias_entries() {
        let index = CommandIndex::build(
            vec![registered("web", vec!["google", "bing"])],
            &[
                AliasRecord::new("g", "google search"),
                AliasRecord::new("gg", "google"),
                AliasRecord::new("x", "googlex"),
            ],
        );

        let literal = index.lookup("google").unwrap();
        assert!(!literal.is_alias());
        assert_eq!(literal.command("google"), "google");

        let alias = index.lookup("g").unwrap();
        assert_eq!(alias.original.as_deref(), Some("google"));
        assert_eq!(alias.alias_final.as_deref(), Some("google search"));
        assert_eq!(alias.plugin.name, "web");
        assert_eq!(alias.command("g"), "google");

        assert!(index.lookup("gg").is_some());
        // "googlex" is a different command
        assert!(index.lookup("x").is_none());
    }

    #[test]
    fn test_list_is_sorted_and_marks_aliases() {
        let index = CommandIndex::build(
            vec![registered("a", vec!["ping", "help"])],
            &[AliasRecord::new("p", "ping")],
        );
        assert_eq!(index.list(), vec!["help", "p (ping)", "ping"]);
    }

    #[test]
    fn test_first_plugin_keeps_conflicting_command() {
        let index = CommandIndex::build(
            vec![registered("first", vec!["ping"]), registered("second", vec!["ping", "pong"])],
            &[],
        );
        assert_eq!(index.lookup("ping").unwrap().plugin.name, "first");
        assert_eq!(index.lookup("pong").unwrap().plugin.name, "second");
        assert_eq!(index.plugins().len(), 2);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_alias_for_unknown_command_is_ignored() {
        let index = CommandIndex::build(
            vec![registered("a", vec!["ping"])],
            &[AliasRecord::new("w", "weather today")],
        );
        assert!(index.lookup("w").is_none());
        assert_eq!(index.list(), vec!["ping"]);
    }
}
