//! Filesystem watching for configuration and template changes
//!
//! The configuration file and every template root are watched through one
//! debounced watcher. A configuration change triggers a guarded reload; a
//! template change drops that file from the file and include caches.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::{DebouncedEvent, Debouncer, new_debouncer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::context::{RefreshOutcome, SharedContext};
use crate::error::{Error, Result};

/// Default debounce duration for filesystem events (in milliseconds).
const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Events emitted by the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The configuration file was written, replaced or removed
    ConfigChanged,
    /// A file under a template root changed
    TemplateChanged(PathBuf),
}

/// Configuration for the watcher.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Debounce duration in milliseconds
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

/// What the watcher is looking at.
#[derive(Debug, Clone, Default)]
struct Targets {
    config_file: Option<PathBuf>,
    template_roots: Vec<PathBuf>,
}

impl Targets {
    fn classify(&self, path: &Path) -> Option<WatchEvent> {
        if self.config_file.as_deref() == Some(path) {
            return Some(WatchEvent::ConfigChanged);
        }
        self.template_roots
            .iter()
            .any(|root| path.starts_with(root))
            .then(|| WatchEvent::TemplateChanged(path.to_path_buf()))
    }
}

/// Debounced watcher over the configuration file and template roots.
pub struct TemplateWatcher {
    /// The debouncer wrapping the underlying watcher
    _debouncer: Debouncer<notify::RecommendedWatcher>,

    /// Receiver for watch events
    event_rx: mpsc::UnboundedReceiver<WatchEvent>,
}

impl TemplateWatcher {
    /// Start watching.
    ///
    /// The configuration file's directory is watched rather than the file
    /// itself, so editors that save by replacing the file are still seen.
    pub fn new(config_file: Option<&Path>, template_roots: &[PathBuf], config: WatchConfig) -> Result<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let config_file = config_file
            .map(|path| path.canonicalize().unwrap_or_else(|_| path.to_path_buf()));
        let targets = Targets {
            config_file: config_file.clone(),
            template_roots: template_roots.to_vec(),
        };

        let mut debouncer = new_debouncer(
            Duration::from_millis(config.debounce_ms),
            move |res: std::result::Result<Vec<DebouncedEvent>, notify::Error>| match res {
                Ok(events) => {
                    for event in events {
                        let Some(watch_event) = targets.classify(&event.path) else {
                            continue;
                        };
                        debug!(path = %event.path.display(), "File change detected");
                        if event_tx.send(watch_event).is_err() {
                            debug!("Event receiver dropped, stopping watcher");
                            break;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Filesystem watch error");
                }
            },
        )
        .map_err(|e| Error::Watch(format!("failed to create filesystem watcher: {e}")))?;

        if let Some(dir) = config_file.as_deref().and_then(Path::parent) {
            debouncer
                .watcher()
                .watch(dir, RecursiveMode::NonRecursive)
                .map_err(|e| Error::Watch(format!("failed to watch config directory: {e}")))?;
        }
        for root in template_roots {
            debouncer
                .watcher()
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| Error::Watch(format!("failed to watch {}: {e}", root.display())))?;
        }

        info!(
            config_file = ?config_file,
            roots = template_roots.len(),
            debounce_ms = config.debounce_ms,
            "Started filesystem watcher"
        );

        Ok(Self {
            _debouncer: debouncer,
            event_rx,
        })
    }

    /// Receive the next watch event.
    ///
    /// Returns `None` if the watcher has been stopped.
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.event_rx.recv().await
    }
}

/// Apply watch events to the server context until the watcher stops.
pub fn spawn_watch_loop(ctx: SharedContext, mut watcher: TemplateWatcher) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = watcher.recv().await {
            match event {
                WatchEvent::ConfigChanged => {
                    let outcome = ctx.refresh_config().await;
                    if outcome == RefreshOutcome::Reloaded {
                        // Cached includes may depend on the old configuration
                        ctx.engine().clear_include_cache();
                    }
                    debug!(?outcome, "Configuration change handled");
                }
                WatchEvent::TemplateChanged(path) => ctx.invalidate_template(&path),
            }
        }
        debug!("Watch loop finished");
    })
}
