//! Host configuration
//!
//! Settings are read once at process start (the binary does it through clap
//! and the environment) and handed to [`Host`](crate::Host) explicitly.

use crate::alias::default_alias_path;
use crate::discovery::default_plugin_dirs;
use crate::prefix::DEFAULT_PREFIXES;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Application name used for default directories
pub const APP_NAME: &str = "telehost";

/// Built-ins loaded under [`LoadingProfile::Minimal`]
pub const MINIMAL_BUILTINS: &[&str] = &["help", "reload"];

/// Which plugins are eligible for loading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadingProfile {
    /// Every built-in and every module in the plugin directories
    #[default]
    Full,

    /// Only the [`MINIMAL_BUILTINS`]; plugin directories are never scanned
    Minimal,
}

impl LoadingProfile {
    pub fn allows_builtin(&self, name: &str) -> bool {
        match self {
            LoadingProfile::Full => true,
            LoadingProfile::Minimal => MINIMAL_BUILTINS.contains(&name),
        }
    }

    pub fn scans_directories(&self) -> bool {
        matches!(self, LoadingProfile::Full)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown loading profile: {0} (expected \"full\" or \"minimal\")")]
pub struct UnknownProfile(String);

impl FromStr for LoadingProfile {
    type Err = UnknownProfile;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "" => Ok(LoadingProfile::Full),
            "minimal" | "core" => Ok(LoadingProfile::Minimal),
            other => Err(UnknownProfile(other.to_string())),
        }
    }
}

impl std::fmt::Display for LoadingProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadingProfile::Full => write!(f, "full"),
            LoadingProfile::Minimal => write!(f, "minimal"),
        }
    }
}

/// Everything the host needs to know at startup
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Command prefixes, in match order
    pub prefixes: Vec<String>,

    pub profile: LoadingProfile,

    /// Plugins that get edited messages on their listener even if they
    /// opted out
    pub edit_listener_allowlist: Vec<String>,

    /// Directories scanned for `*.wasm` plugins
    pub plugin_dirs: Vec<PathBuf>,

    /// JSON alias store. `None` disables aliases.
    pub alias_store_path: Option<PathBuf>,

    /// Chat whose messages count as commands even when not outgoing
    pub saved_chat_id: Option<i64>,

    /// Reload when plugin directories change
    pub watch: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            prefixes: DEFAULT_PREFIXES.iter().map(|p| p.to_string()).collect(),
            profile: LoadingProfile::Full,
            edit_listener_allowlist: Vec::new(),
            plugin_dirs: default_plugin_dirs(APP_NAME),
            alias_store_path: Some(default_alias_path(APP_NAME)),
            saved_chat_id: None,
            watch: false,
        }
    }
}

impl HostConfig {
    /// A config with no plugin directories and no alias store
    pub fn isolated() -> Self {
        Self {
            plugin_dirs: Vec::new(),
            alias_store_path: None,
            ..Self::default()
        }
    }
}

/// Split a whitespace-separated prefix list, as found in the environment
pub fn parse_prefix_list(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Split a comma-separated name list, dropping blanks
pub fn parse_name_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
