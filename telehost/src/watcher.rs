//! Hot reload for plugin directories
//!
//! Watches the plugin directories and triggers a full host reload once the
//! set of `.wasm` files has settled. A reload only runs when the contents
//! actually changed, so touching a file or an editor's save dance does not
//! rebuild every subscription.

use crate::discovery::is_plugin_file;
use crate::host::HostHandle;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Configuration for the hot reload watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Quiet period after the last file event before reloading
    pub debounce: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
        }
    }
}

/// Errors that can occur during watching
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("Failed to initialize watcher: {0}")]
    WatcherInit(#[source] notify::Error),
}

/// Hash of every plugin file in `dirs`, by path and content.
///
/// Unreadable files and missing directories count as absent.
pub fn fingerprint(dirs: &[PathBuf]) -> blake3::Hash {
    let mut files: Vec<PathBuf> = dirs
        .iter()
        .filter_map(|dir| std::fs::read_dir(dir).ok())
        .flat_map(|entries| entries.flatten().map(|e| e.path()))
        .filter(|p| is_plugin_file(p))
        .collect();
    files.sort();

    let mut hasher = blake3::Hasher::new();
    for path in &files {
        if let Ok(bytes) = std::fs::read(path) {
            hasher.update(path.to_string_lossy().as_bytes());
            hasher.update(&[0]);
            hasher.update(blake3::hash(&bytes).as_bytes());
        }
    }
    hasher.finalize()
}

/// Reloads the host when plugin files change
pub struct HotReloadWatcher {
    _watcher: RecommendedWatcher,
    stop_tx: oneshot::Sender<()>,
}

impl HotReloadWatcher {
    /// Start watching `directories`. Directories that do not exist are
    /// skipped.
    pub fn new(
        host: HostHandle,
        directories: impl IntoIterator<Item = impl AsRef<Path>>,
        config: WatcherConfig,
    ) -> Result<Self, WatcherError> {
        let directories: Vec<PathBuf> = directories
            .into_iter()
            .map(|p| p.as_ref().to_path_buf())
            .collect();

        let (events_tx, events_rx) = mpsc::channel::<Event>(100);

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    let _ = events_tx.blocking_send(event);
                }
                Err(e) => tracing::warn!(error = %e, "File watch error"),
            }
        })
        .map_err(WatcherError::WatcherInit)?;

        for dir in &directories {
            if dir.is_dir() {
                watcher
                    .watch(dir, RecursiveMode::NonRecursive)
                    .map_err(WatcherError::WatcherInit)?;
                tracing::info!(dir = %dir.display(), "Watching directory for plugins");
            } else {
                tracing::debug!(dir = %dir.display(), "Directory does not exist, not watching");
            }
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(run(host, directories, events_rx, stop_rx, config.debounce));

        Ok(Self {
            _watcher: watcher,
            stop_tx,
        })
    }

    /// Stop watching
    pub fn stop(self) {
        let _ = self.stop_tx.send(());
    }
}

/// Debounce file events and reload when the fingerprint moves
async fn run(
    host: HostHandle,
    directories: Vec<PathBuf>,
    mut events: mpsc::Receiver<Event>,
    mut stop: oneshot::Receiver<()>,
    debounce: Duration,
) {
    let mut last = fingerprint(&directories);
    let mut deadline: Option<Instant> = None;

    loop {
        let settle = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = &mut stop => break,

            Some(event) = events.recv() => {
                if event.paths.iter().any(|p| is_plugin_file(p)) {
                    deadline = Some(Instant::now() + debounce);
                }
            }

            _ = settle => {
                deadline = None;
                let current = fingerprint(&directories);
                if current == last {
                    tracing::trace!("Plugin files unchanged");
                    continue;
                }
                last = current;

                tracing::info!("Plugin files changed, reloading");
                if host.reload().await.is_none() {
                    break;
                }
            }
        }
    }
    tracing::debug!("Hot reload watcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_fingerprint_tracks_plugin_files_only() {
        let temp = TempDir::new().unwrap();
        let dirs = vec![temp.path().to_path_buf()];
        let empty = fingerprint(&dirs);

        fs::write(temp.path().join("notes.txt"), "hello").unwrap();
        assert_eq!(fingerprint(&dirs), empty);

        fs::write(temp.path().join("echo.wasm"), b"one").unwrap();
        let one = fingerprint(&dirs);
        assert_ne!(one, empty);
        assert_eq!(fingerprint(&dirs), one);

        fs::write(temp.path().join("echo.wasm"), b"two").unwrap();
        assert_ne!(fingerprint(&dirs), one);

        fs::remove_file(temp.path().join("echo.wasm")).unwrap();
        assert_eq!(fingerprint(&dirs), empty);
    }

    #[test]
    fn test_fingerprint_of_missing_directory() {
        let dirs = vec![PathBuf::from("/nonexistent/telehost/plugins")];
        assert_eq!(fingerprint(&dirs), fingerprint(&[]));
    }

    #[tokio::test]
    async fn test_watcher_on_detached_host() {
        let temp = TempDir::new().unwrap();
        let watcher = HotReloadWatcher::new(
            HostHandle::detached(),
            vec![temp.path()],
            WatcherConfig {
                debounce: Duration::from_millis(50),
            },
        )
        .unwrap();
        watcher.stop();
    }
}
