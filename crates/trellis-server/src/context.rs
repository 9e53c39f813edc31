//! Server context - shared state for the render service
//!
//! Holds the template engine, the disk file cache it reads through, and the
//! guard that keeps configuration refreshes single-flight.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};
use trellis_template::{
    DiskFileCache, Engine, EngineConfig, Localizer, NoLocalizer, OverlayResolver,
    StaticLocalizer,
};

use crate::error::{Error, Result};

/// Configuration for the render service.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Host to bind to
    pub host: String,

    /// Engine configuration file (`.toml` or `.json`).
    /// When absent the built-in defaults are used and never reloaded.
    pub config_path: Option<PathBuf>,

    /// Template roots in precedence order (site first, framework last)
    pub template_roots: Vec<PathBuf>,

    /// Directory of `<lang>.json` message bundles
    pub locales: Option<PathBuf>,

    /// Upper bound on a single render.
    /// Default: 5000ms.
    pub render_timeout_ms: u64,

    /// Watch the config file and template roots for changes.
    /// Default: true.
    pub watch_enabled: bool,

    /// Debounce duration for filesystem events in milliseconds.
    /// Default: 500ms.
    pub watch_debounce_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "127.0.0.1".to_string(),
            config_path: None,
            template_roots: Vec::new(),
            locales: None,
            render_timeout_ms: 5000,
            watch_enabled: true,
            watch_debounce_ms: 500,
        }
    }
}

impl ServerConfig {
    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }
}

/// What a configuration refresh did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The new configuration is live.
    Reloaded,
    /// Loading failed; the previous configuration stays live.
    Failed,
    /// Another refresh was already running.
    Skipped,
    /// There is no configuration file to reload.
    Disabled,
}

/// Shared context for the render service.
///
/// This is wrapped in `Arc` and shared across all request handlers and the
/// watch task.
pub struct AppContext {
    engine: Arc<Engine>,

    /// The same cache the engine reads through, kept for invalidation
    files: Arc<DiskFileCache>,

    config: ServerConfig,

    /// Set while a configuration refresh is in flight
    refreshing: AtomicBool,
}

pub type SharedContext = Arc<AppContext>;

impl AppContext {
    /// Build the engine described by `config`.
    ///
    /// Template roots are canonicalized so that paths reported by the file
    /// watcher match the paths the resolver produces.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let engine_config = match &config.config_path {
            Some(path) => {
                let loaded = EngineConfig::load(path)?;
                info!(path = %path.display(), "Loaded engine configuration");
                loaded
            }
            None => EngineConfig::default(),
        };

        let roots = config
            .template_roots
            .iter()
            .map(|root| {
                root.canonicalize()
                    .map_err(|_| Error::TemplateRootNotFound(root.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        let localizer: Arc<dyn Localizer> = match &config.locales {
            Some(dir) => {
                let loaded = StaticLocalizer::load_dir(dir).map_err(|source| Error::Locales {
                    path: dir.clone(),
                    source,
                })?;
                info!(
                    path = %dir.display(),
                    languages = loaded.languages().count(),
                    "Loaded message bundles"
                );
                Arc::new(loaded)
            }
            None => Arc::new(NoLocalizer),
        };

        let files = Arc::new(DiskFileCache::new());
        let engine = Engine::builder()
            .config(engine_config)
            .resolver(Arc::new(OverlayResolver::new(roots.clone())))
            .files(files.clone())
            .localizer(localizer)
            .build();

        info!(roots = ?roots, "Template engine initialized");

        let config = ServerConfig {
            template_roots: roots,
            ..config
        };
        Ok(Self::with_engine(Arc::new(engine), files, config))
    }

    /// Wrap an already-built engine. `files` should be the cache the engine
    /// reads through.
    pub fn with_engine(engine: Arc<Engine>, files: Arc<DiskFileCache>, config: ServerConfig) -> Self {
        Self {
            engine,
            files,
            config,
            refreshing: AtomicBool::new(false),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Reload the configuration file and swap it in.
    ///
    /// At most one refresh runs at a time; a call made while another is in
    /// flight returns [`RefreshOutcome::Skipped`]. Renders already running
    /// keep the snapshot they started with.
    pub async fn refresh_config(&self) -> RefreshOutcome {
        let Some(path) = self.config.config_path.clone() else {
            return RefreshOutcome::Disabled;
        };
        if self.refreshing.swap(true, Ordering::AcqRel) {
            debug!("Configuration refresh already in flight");
            return RefreshOutcome::Skipped;
        }

        let loaded = tokio::task::spawn_blocking(move || EngineConfig::load(&path)).await;
        let outcome = match loaded {
            Ok(Ok(config)) => {
                self.engine.reload_config(config);
                RefreshOutcome::Reloaded
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Configuration reload failed, keeping previous configuration");
                RefreshOutcome::Failed
            }
            Err(e) => {
                warn!(error = %e, "Configuration reload task failed");
                RefreshOutcome::Failed
            }
        };

        self.refreshing.store(false, Ordering::Release);
        outcome
    }

    /// Drop cached state for a template file that changed on disk.
    pub fn invalidate_template(&self, path: &Path) {
        self.files.invalidate(path);
        self.engine.invalidate_include(path);
        debug!(path = %path.display(), "Template invalidated");
    }

    /// Whether `path` lives under one of the template roots.
    pub fn is_template_path(&self, path: &Path) -> bool {
        self.config
            .template_roots
            .iter()
            .any(|root| path.starts_with(root))
    }

    /// Number of template files currently held in the file cache.
    pub fn cached_files(&self) -> usize {
        self.files.len()
    }
}
