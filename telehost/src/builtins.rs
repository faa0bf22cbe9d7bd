//! Compiled-in plugins
//!
//! The catalog is a registration table of factories. Factories run on every
//! reload, so a built-in gets a fresh instance each time just like a plugin
//! loaded from disk.

use crate::host::HostHandle;
use crate::plugin::{CommandContext, Plugin};
use async_trait::async_trait;
use std::sync::Arc;
use telehost_plugin_api::CommandSpec;

/// Builds a built-in plugin
pub type BuiltinFactory = Box<dyn Fn(&HostHandle) -> Arc<dyn Plugin> + Send + Sync>;

/// Registration table of built-in plugins, in load order
#[derive(Default)]
pub struct BuiltinCatalog {
    entries: Vec<(String, BuiltinFactory)>,
}

impl BuiltinCatalog {
    /// An empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// The host's own plugins: `help`, `reload` and `prefix`
    pub fn core() -> Self {
        Self::new()
            .register("help", |host| Arc::new(HelpPlugin::new(host.clone())))
            .register("reload", |host| Arc::new(ReloadPlugin::new(host.clone())))
            .register("prefix", |host| Arc::new(PrefixPlugin::new(host.clone())))
    }

    /// Add a built-in. A later registration under the same name replaces
    /// the earlier one.
    pub fn register<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&HostHandle) -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        let name = name.into();
        self.entries.retain(|(n, _)| *n != name);
        self.entries.push((name, Box::new(factory)));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BuiltinFactory)> {
        self.entries.iter().map(|(n, f)| (n.as_str(), f))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }
}

/// Help text for one command
pub fn command_help(prefix: &str, spec: &CommandSpec) -> String {
    let mut help = format!("{}{}", prefix, spec.name);
    if !spec.about.is_empty() {
        help.push_str(&format!(" - {}", spec.about));
    }
    if let Some(usage) = &spec.usage {
        help.push_str(&format!("\nUsage: {}{}", prefix, usage));
    }
    help
}

/// `help [command]`
pub struct HelpPlugin {
    host: HostHandle,
}

impl HelpPlugin {
    pub fn new(host: HostHandle) -> Self {
        Self { host }
    }
}

#[async_trait]
impl Plugin for HelpPlugin {
    fn description(&self) -> &str {
        "Lists commands"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![CommandSpec::new("help", "Lists commands, or describes one").usage("help [command]")]
    }

    async fn handle(&self, cx: CommandContext) -> anyhow::Result<()> {
        let prefix = self
            .host
            .prefixes()
            .and_then(|p| p.get().into_iter().next())
            .unwrap_or_default();

        let text = match cx.args.first() {
            Some(key) => match self.host.lookup(key).await {
                Some(entry) => {
                    let command = entry.command(key);
                    let spec = entry
                        .plugin
                        .commands
                        .iter()
                        .find(|c| c.name == command)
                        .cloned()
                        .unwrap_or_else(|| CommandSpec::new(command, ""));
                    let mut text = command_help(&prefix, &spec);
                    if let Some(expansion) = &entry.alias_final {
                        text = format!("{}{} -> {}{}\n{}", prefix, key, prefix, expansion, text);
                    }
                    text
                }
                None => format!("Unknown command: {}", key),
            },
            None => {
                let commands = self.host.commands().await;
                format!("Commands ({}):\n{}", commands.len(), commands.join("\n"))
            }
        };

        cx.reply(&text).await
    }
}

/// `reload`
pub struct ReloadPlugin {
    host: HostHandle,
}

impl ReloadPlugin {
    pub fn new(host: HostHandle) -> Self {
        Self { host }
    }
}

#[async_trait]
impl Plugin for ReloadPlugin {
    fn description(&self) -> &str {
        "Reloads every plugin"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![CommandSpec::new("reload", "Reloads plugins and aliases")]
    }

    fn ignore_edited(&self) -> bool {
        true
    }

    async fn handle(&self, cx: CommandContext) -> anyhow::Result<()> {
        cx.reply("🔄 Reloading plugins...").await?;
        let Some(summary) = self.host.reload().await else {
            anyhow::bail!("host is shutting down");
        };
        cx.reply(&format!(
            "✅ Reloaded {} plugins, {} commands",
            summary.plugins, summary.commands
        ))
        .await
    }
}

/// `prefix [prefixes...]`
pub struct PrefixPlugin {
    host: HostHandle,
}

impl PrefixPlugin {
    pub fn new(host: HostHandle) -> Self {
        Self { host }
    }
}

#[async_trait]
impl Plugin for PrefixPlugin {
    fn description(&self) -> &str {
        "Shows or changes command prefixes"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![CommandSpec::new("prefix", "Shows or replaces the command prefixes")
            .usage("prefix [new prefixes...]")]
    }

    fn ignore_edited(&self) -> bool {
        true
    }

    async fn handle(&self, cx: CommandContext) -> anyhow::Result<()> {
        let Some(prefixes) = self.host.prefixes() else {
            anyhow::bail!("host is shutting down");
        };

        if !cx.args.is_empty() {
            prefixes.set(cx.args.iter().cloned())?;
        }
        cx.reply(&format!("Prefixes: {}", prefixes.get().join(" ")))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_catalog_order() {
        assert_eq!(BuiltinCatalog::core().names(), vec!["help", "reload", "prefix"]);
    }

    #[test]
    fn test_register_replaces_same_name() {
        let catalog = BuiltinCatalog::core()
            .register("help", |host| Arc::new(HelpPlugin::new(host.clone())));
        assert_eq!(catalog.names(), vec!["reload", "prefix", "help"]);
    }

    #[test]
    fn test_command_help() {
        let spec = CommandSpec::new("echo", "Echoes its arguments").usage("echo <text>");
        assert_eq!(
            command_help(".", &spec),
            ".echo - Echoes its arguments\nUsage: .echo <text>"
        );
        assert_eq!(command_help("!", &CommandSpec::new("ping", "")), "!ping");
    }
}
