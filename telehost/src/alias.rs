//! Alias storage and resolution
//!
//! Aliases map what a user types (`original`) to a literal command, optionally
//! followed by fixed arguments (`final`). The store itself belongs to whatever
//! manages aliases; the host only reads it, through a scoped handle opened per
//! logical operation and closed when dropped.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once, RwLock};
use thiserror::Error;

/// Error type for alias store operations
#[derive(Debug, Error)]
pub enum AliasStoreError {
    #[error("Alias store not found at {0}")]
    Missing(PathBuf),

    #[error("Failed to read alias store: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse alias store: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One stored alias
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRecord {
    /// What the user types. Unique within a store.
    pub original: String,

    /// The literal command (plus fixed arguments) it expands to
    #[serde(rename = "final")]
    pub expansion: String,
}

impl AliasRecord {
    pub fn new(original: impl Into<String>, expansion: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            expansion: expansion.into(),
        }
    }

    /// True if this alias invokes `command`, either bare or with fixed
    /// trailing arguments.
    pub fn targets(&self, command: &str) -> bool {
        self.expansion.split_whitespace().next() == Some(command)
    }
}

/// An open alias store. Dropping it releases the underlying storage.
pub trait AliasStore: Send {
    /// Expansion for `original`, if stored
    fn get(&self, original: &str) -> Result<Option<String>, AliasStoreError>;

    /// Every stored alias
    fn list(&self) -> Result<Vec<AliasRecord>, AliasStoreError>;
}

/// Opens alias stores on demand
pub trait AliasSource: Send + Sync {
    fn open(&self) -> Result<Box<dyn AliasStore>, AliasStoreError>;
}

// ============================================================================
// JSON file store
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct AliasFileData {
    #[serde(default)]
    aliases: Vec<AliasRecord>,
}

/// Alias store backed by a JSON file of the form
/// `{ "aliases": [{ "original": "g", "final": "google search" }] }`.
///
/// The file is read on every [`open`](AliasSource::open), so edits made by
/// the alias manager are visible to the next operation. A missing file makes
/// the store unavailable.
pub struct JsonAliasSource {
    path: PathBuf,
}

impl JsonAliasSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `<config_dir>/<app>/aliases.json`
pub fn default_alias_path(app_name: &str) -> PathBuf {
    let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from(".config"));
    config_dir.join(app_name).join("aliases.json")
}

impl AliasSource for JsonAliasSource {
    fn open(&self) -> Result<Box<dyn AliasStore>, AliasStoreError> {
        if !self.path.exists() {
            return Err(AliasStoreError::Missing(self.path.clone()));
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let data: AliasFileData = serde_json::from_reader(reader)?;
        Ok(Box::new(SnapshotStore::new(data.aliases)))
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// In-memory alias source
#[derive(Default)]
pub struct MemoryAliasSource {
    aliases: RwLock<Vec<AliasRecord>>,
}

impl MemoryAliasSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_aliases(aliases: impl IntoIterator<Item = AliasRecord>) -> Self {
        let source = Self::new();
        for alias in aliases {
            source.insert(alias);
        }
        source
    }

    /// Add or replace an alias
    pub fn insert(&self, alias: AliasRecord) {
        let mut aliases = self
            .aliases
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        aliases.retain(|a| a.original != alias.original);
        aliases.push(alias);
    }

    /// Remove an alias. Returns false if it did not exist.
    pub fn remove(&self, original: &str) -> bool {
        let mut aliases = self
            .aliases
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = aliases.len();
        aliases.retain(|a| a.original != original);
        aliases.len() != before
    }
}

impl AliasSource for MemoryAliasSource {
    fn open(&self) -> Result<Box<dyn AliasStore>, AliasStoreError> {
        let aliases = self
            .aliases
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        Ok(Box::new(SnapshotStore::new(aliases)))
    }
}

/// Open store holding the records read at open time
struct SnapshotStore {
    order: Vec<String>,
    by_original: HashMap<String, String>,
}

impl SnapshotStore {
    fn new(records: Vec<AliasRecord>) -> Self {
        let mut order = Vec::with_capacity(records.len());
        let mut by_original = HashMap::with_capacity(records.len());
        for record in records {
            // originals are unique: a later duplicate replaces the earlier one
            if by_original
                .insert(record.original.clone(), record.expansion)
                .is_none()
            {
                order.push(record.original);
            }
        }
        Self { order, by_original }
    }
}

impl AliasStore for SnapshotStore {
    fn get(&self, original: &str) -> Result<Option<String>, AliasStoreError> {
        Ok(self.by_original.get(original).cloned())
    }

    fn list(&self) -> Result<Vec<AliasRecord>, AliasStoreError> {
        Ok(self
            .order
            .iter()
            .filter_map(|o| {
                self.by_original
                    .get(o)
                    .map(|e| AliasRecord::new(o.clone(), e.clone()))
            })
            .collect())
    }
}

impl Drop for SnapshotStore {
    fn drop(&mut self) {
        tracing::trace!("Alias store closed");
    }
}

// ============================================================================
// Resolution
// ============================================================================

static DEGRADED_WARNING: Once = Once::new();

/// Open the alias store, or `None` when it is unavailable.
///
/// Unavailability is logged once per process; afterwards alias handling
/// silently degrades to literal commands only.
pub fn open_store(source: Option<&dyn AliasSource>) -> Option<Box<dyn AliasStore>> {
    let Some(source) = source else {
        DEGRADED_WARNING.call_once(|| {
            tracing::warn!("No alias store configured, aliases are disabled");
        });
        return None;
    };

    match source.open() {
        Ok(store) => Some(store),
        Err(e) => {
            DEGRADED_WARNING.call_once(|| {
                tracing::warn!(error = %e, "Alias store unavailable, aliases are disabled");
            });
            None
        }
    }
}

/// True for command names made of ASCII letters, digits and underscores
pub fn is_command_identifier(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Maps parsed tokens to the command key to look up in the registry
#[derive(Clone)]
pub struct AliasResolver {
    source: Option<Arc<dyn AliasSource>>,
}

impl AliasResolver {
    pub fn new(source: Option<Arc<dyn AliasSource>>) -> Self {
        Self { source }
    }

    /// Resolver with aliases disabled
    pub fn disabled() -> Self {
        Self { source: None }
    }

    pub fn source(&self) -> Option<&dyn AliasSource> {
        self.source.as_deref()
    }

    /// Resolve `tokens` to a command key.
    ///
    /// The longest run of leading tokens that is a stored alias wins, so
    /// `"foo bar"` beats `"foo"` for input `foo bar baz`. Without an alias
    /// match the first token is used, provided it is a plain identifier.
    pub fn resolve(&self, tokens: &[String]) -> Option<String> {
        if tokens.is_empty() {
            return None;
        }

        if let Some(store) = open_store(self.source()) {
            for len in (1..=tokens.len()).rev() {
                let candidate = tokens[..len].join(" ");
                match store.get(&candidate) {
                    Ok(Some(_)) => return Some(candidate),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::debug!(candidate = %candidate, error = %e, "Alias lookup failed");
                        break;
                    }
                }
            }
        }

        let first = &tokens[0];
        is_command_identifier(first).then(|| first.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tokens(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_targets() {
        let alias = AliasRecord::new("g", "google search");
        assert!(alias.targets("google"));
        assert!(!alias.targets("goo"));
        assert!(!alias.targets("google search extra"));
        assert!(AliasRecord::new("p", "ping").targets("ping"));
        assert!(AliasRecord::new("gt", "google\tsearch").targets("google"));
        assert!(AliasRecord::new("gs", " google  search ").targets("google"));
        assert!(!AliasRecord::new("blank", "  ").targets(""));
    }

    #[test]
    fn test_missing_store_warning_is_logged_once() {
        assert!(open_store(None).is_none());
        assert!(DEGRADED_WARNING.is_completed());

        // later calls stay degraded without touching the warning again
        assert!(open_store(None).is_none());
        let temp = TempDir::new().unwrap();
        let missing = JsonAliasSource::new(temp.path().join("missing.json"));
        assert!(open_store(Some(&missing)).is_none());
        assert!(DEGRADED_WARNING.is_completed());
    }

    #[test]
    fn test_longest_match_wins() {
        let source = MemoryAliasSource::with_aliases([
            AliasRecord::new("foo bar", "echo two words"),
            AliasRecord::new("foo", "echo one word"),
        ]);
        let resolver = AliasResolver::new(Some(Arc::new(source)));

        assert_eq!(
            resolver.resolve(&tokens("foo bar baz")).as_deref(),
            Some("foo bar")
        );
        assert_eq!(resolver.resolve(&tokens("foo baz")).as_deref(), Some("foo"));
    }

    #[test]
    fn test_falls_back_to_identifier() {
        let resolver = AliasResolver::new(Some(Arc::new(MemoryAliasSource::new())));
        assert_eq!(resolver.resolve(&tokens("ping 1")).as_deref(), Some("ping"));
        assert_eq!(resolver.resolve(&tokens("sys_info")).as_deref(), Some("sys_info"));
        assert_eq!(resolver.resolve(&tokens("?? what")), None);
        assert_eq!(resolver.resolve(&tokens("ping!")), None);
        assert_eq!(resolver.resolve(&[]), None);
    }

    #[test]
    fn test_unavailable_store_degrades_to_literal() {
        let temp = TempDir::new().unwrap();
        let source = JsonAliasSource::new(temp.path().join("missing.json"));
        let resolver = AliasResolver::new(Some(Arc::new(source)));

        assert_eq!(
            resolver.resolve(&tokens("anycommand")).as_deref(),
            Some("anycommand")
        );
        assert_eq!(
            AliasResolver::disabled().resolve(&tokens("anycommand")).as_deref(),
            Some("anycommand")
        );
    }

    #[test]
    fn test_json_source_reads_on_every_open() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("aliases.json");
        fs::write(
            &path,
            r#"{ "aliases": [{ "original": "g", "final": "google search" }] }"#,
        )
        .unwrap();

        let source = JsonAliasSource::new(&path);
        let store = source.open().unwrap();
        assert_eq!(store.get("g").unwrap().as_deref(), Some("google search"));
        drop(store);

        fs::write(&path, r#"{ "aliases": [] }"#).unwrap();
        let store = source.open().unwrap();
        assert_eq!(store.get("g").unwrap(), None);
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_json_source_rejects_garbage() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("aliases.json");
        fs::write(&path, "not json").unwrap();

        let result = JsonAliasSource::new(&path).open();
        assert!(matches!(result, Err(AliasStoreError::Parse(_))));
    }

    #[test]
    fn test_memory_source_replaces_duplicates() {
        let source = MemoryAliasSource::new();
        source.insert(AliasRecord::new("g", "google"));
        source.insert(AliasRecord::new("g", "google search"));

        let list = source.open().unwrap().list().unwrap();
        assert_eq!(list, vec![AliasRecord::new("g", "google search")]);

        assert!(source.remove("g"));
        assert!(!source.remove("g"));
    }
}
