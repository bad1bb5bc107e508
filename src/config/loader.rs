use super::ConfigTree;
use crate::error::{Error, Result};
use crate::materialize::{materialize, MaterializeOptions};
use crate::snapshot::ConfigSnapshot;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Absolute directory containing `path`, bound as `%(here)s`.
pub fn config_directory(path: &Path) -> Result<PathBuf> {
    let absolute = path.canonicalize()?;
    Ok(absolute
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or(absolute))
}

/// Decode and materialize the file at `path`.
///
/// `options.config_directory` is replaced by the file's own directory.
pub fn load_snapshot(path: &Path, options: &MaterializeOptions) -> Result<ConfigSnapshot> {
    let tree = ConfigTree::from_file(path)?;
    let options = MaterializeOptions {
        config_directory: config_directory(path)?,
        ..options.clone()
    };
    materialize(&tree, &options)
}

struct Shared {
    path: PathBuf,
    options: MaterializeOptions,
    current: RwLock<Arc<ConfigSnapshot>>,
    generation: AtomicU64,
}

impl Shared {
    fn reload(&self) -> Result<Arc<ConfigSnapshot>> {
        let snapshot = Arc::new(load_snapshot(&self.path, &self.options)?);

        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = snapshot.clone();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        info!(
            "Loaded {} (generation {}, {} entries)",
            self.path.display(),
            generation,
            snapshot.entries().len()
        );
        Ok(snapshot)
    }
}

/// Owns the published snapshot for one configuration file.
///
/// A reload builds a complete snapshot first and swaps it in afterwards;
/// readers holding the previous `Arc` keep a consistent view. A failed
/// reload leaves the current snapshot untouched.
pub struct ConfigLoader {
    shared: Arc<Shared>,
    watcher: Option<notify::RecommendedWatcher>,
    reload_tx: Option<mpsc::Sender<PathBuf>>,
}

impl ConfigLoader {
    /// Create a loader with an empty snapshot; call [`reload`](Self::reload)
    /// to populate it.
    pub fn new(path: impl Into<PathBuf>, options: MaterializeOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                path: path.into(),
                options,
                current: RwLock::new(Arc::new(ConfigSnapshot::default())),
                generation: AtomicU64::new(0),
            }),
            watcher: None,
            reload_tx: None,
        }
    }

    /// Create a loader and perform the initial load.
    pub fn load(path: impl Into<PathBuf>, options: MaterializeOptions) -> Result<Self> {
        let loader = Self::new(path, options);
        loader.reload()?;
        Ok(loader)
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Re-read the file and publish the resulting snapshot.
    pub fn reload(&self) -> Result<Arc<ConfigSnapshot>> {
        self.shared.reload()
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.shared
            .current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of successful loads so far.
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    /// Start the background task that reloads on change notifications.
    pub fn enable_hot_reload(&mut self) {
        let (tx, mut rx) = mpsc::channel::<PathBuf>(10);
        self.reload_tx = Some(tx);

        let shared = self.shared.clone();
        tokio::spawn(async move {
            while let Some(path) = rx.recv().await {
                debug!("Change detected in {}", path.display());
                let shared = shared.clone();
                let outcome = tokio::task::spawn_blocking(move || shared.reload()).await;
                match outcome {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!("Reload failed, keeping previous configuration: {}", e),
                    Err(e) => warn!("Reload task failed: {}", e),
                }
            }
        });
    }

    /// Watch the configuration file and forward changes to the reload task.
    ///
    /// The parent directory is watched so that editors replacing the file
    /// by rename are still noticed.
    pub fn watch_config_file(&mut self) -> Result<()> {
        let tx = self.reload_tx.clone().ok_or_else(|| {
            Error::Io(std::io::Error::other("hot reload not enabled"))
        })?;

        let target = self.shared.path.canonicalize()?;
        let file_name = target.file_name().map(|n| n.to_os_string());
        let dir = config_directory(&target)?;

        let mut watcher =
            notify::recommended_watcher(move |res: std::result::Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        let touches_target = event
                            .paths
                            .iter()
                            .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                        if touches_target {
                            let _ = tx.blocking_send(target.clone());
                        }
                    }
                }
            })?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        self.watcher = Some(watcher);

        Ok(())
    }
}
