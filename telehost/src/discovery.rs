//! Finding plugin modules on disk
//!
//! Every `*.wasm` file in a plugin directory is one plugin. A module that
//! fails to read, compile or validate is reported in the [`ScanReport`] and
//! never stops the others from loading.

use crate::bridge::WasmPlugin;
use crate::loader::{LoaderError, PluginLoader};
use crate::plugin::{ContractError, PluginOrigin, RegisteredPlugin};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Why a plugin could not be loaded
#[derive(Debug, Error)]
pub enum PluginLoadError {
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("Cannot list {dir}: {source}")]
    ListDirectory {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a usable plugin module: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: LoaderError,
    },

    #[error("Plugin {origin} is malformed: {source}")]
    Contract {
        origin: String,
        #[source]
        source: ContractError,
    },
}

/// What a scan found
#[derive(Default)]
pub struct ScanReport {
    pub loaded: Vec<RegisteredPlugin>,
    pub failed: Vec<(PathBuf, PluginLoadError)>,
}

impl ScanReport {
    fn merge(&mut self, other: ScanReport) {
        self.loaded.extend(other.loaded);
        self.failed.extend(other.failed);
    }

    /// Files looked at, loaded or not
    pub fn len(&self) -> usize {
        self.loaded.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// True for files named `*.wasm`
pub fn is_plugin_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "wasm")
}

/// `<data_local_dir>/<app>/plugins`, then `./plugins`
pub fn default_plugin_dirs(app_name: &str) -> Vec<PathBuf> {
    dirs::data_local_dir()
        .map(|dir| dir.join(app_name).join("plugins"))
        .into_iter()
        .chain(std::iter::once(PathBuf::from("plugins")))
        .collect()
}

/// Plugin files directly inside `dir`, sorted by path
fn plugin_files(dir: &Path) -> Result<Vec<PathBuf>, PluginLoadError> {
    if !dir.is_dir() {
        return Err(PluginLoadError::NotADirectory(dir.to_path_buf()));
    }
    let list_error = |source| PluginLoadError::ListDirectory {
        dir: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(list_error)? {
        let path = entry.map_err(list_error)?.path();
        if is_plugin_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Loads every plugin module in a set of directories
pub struct PluginScanner {
    loader: Arc<PluginLoader>,
}

impl PluginScanner {
    pub fn new() -> Result<Self, LoaderError> {
        Ok(Self::with_loader(Arc::new(PluginLoader::new()?)))
    }

    pub fn with_loader(loader: Arc<PluginLoader>) -> Self {
        Self { loader }
    }

    /// Load every plugin in `dir`
    pub fn scan(&self, dir: impl AsRef<Path>) -> Result<ScanReport, PluginLoadError> {
        let mut report = ScanReport::default();
        for path in plugin_files(dir.as_ref())? {
            match self.load_file(&path) {
                Ok(plugin) => report.loaded.push(plugin),
                Err(e) => report.failed.push((path, e)),
            }
        }
        Ok(report)
    }

    /// Load every plugin in `dirs`, in order. Directories that do not exist
    /// are skipped.
    pub fn scan_all(&self, dirs: impl IntoIterator<Item = impl AsRef<Path>>) -> ScanReport {
        let mut report = ScanReport::default();
        for dir in dirs {
            let dir = dir.as_ref();
            match self.scan(dir) {
                Ok(found) => report.merge(found),
                Err(PluginLoadError::NotADirectory(_)) => {
                    tracing::debug!(dir = %dir.display(), "No plugin directory here");
                }
                Err(e) => report.failed.push((dir.to_path_buf(), e)),
            }
        }
        report
    }

    /// Load one plugin module and check it against the plugin contract
    pub fn load_file(&self, path: &Path) -> Result<RegisteredPlugin, PluginLoadError> {
        let bytes = std::fs::read(path).map_err(|source| PluginLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let module = self
            .loader
            .load(&bytes)
            .map_err(|source| PluginLoadError::Load {
                path: path.to_path_buf(),
                source,
            })?;

        let origin = PluginOrigin::File(path.to_path_buf());
        let label = origin.to_string();
        RegisteredPlugin::new(Arc::new(WasmPlugin::from_loaded(module)), origin)
            .map_err(|source| PluginLoadError::Contract { origin: label, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_empty_directory() {
        let temp = TempDir::new().unwrap();
        let report = PluginScanner::new().unwrap().scan(temp.path()).unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn test_missing_directory() {
        let scanner = PluginScanner::new().unwrap();
        assert!(matches!(
            scanner.scan("/nonexistent/telehost/plugins"),
            Err(PluginLoadError::NotADirectory(_))
        ));
        assert!(scanner.scan_all(["/nonexistent/telehost/plugins"]).is_empty());
    }

    #[test]
    fn test_broken_modules_are_reported_in_order() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b_empty.wasm"), b"(module)").unwrap();
        fs::write(temp.path().join("a_garbage.wasm"), b"garbage").unwrap();
        fs::write(temp.path().join("notes.txt"), "not a plugin").unwrap();

        let report = PluginScanner::new().unwrap().scan(temp.path()).unwrap();

        assert!(report.loaded.is_empty());
        assert_eq!(report.len(), 2);
        assert!(report.failed[0].0.ends_with("a_garbage.wasm"));
        assert!(matches!(
            report.failed[1].1,
            PluginLoadError::Load {
                source: LoaderError::MissingExport("memory"),
                ..
            }
        ));
    }

    #[test]
    fn test_scan_all_merges_directories() {
        let one = TempDir::new().unwrap();
        let two = TempDir::new().unwrap();
        fs::write(one.path().join("x.wasm"), b"nope").unwrap();
        fs::write(two.path().join("y.wasm"), b"nope").unwrap();

        let report = PluginScanner::new()
            .unwrap()
            .scan_all([one.path(), Path::new("/nonexistent"), two.path()]);
        assert_eq!(report.failed.len(), 2);
        assert!(report.failed[1].0.ends_with("y.wasm"));
    }

    #[test]
    fn test_default_plugin_dirs() {
        let dirs = default_plugin_dirs("telehost");
        assert_eq!(dirs.last(), Some(&PathBuf::from("plugins")));
    }
}
