/*
 * config.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Engine configuration and the shared configuration snapshot.
//!
//! [`EngineConfig`] is the deserialized configuration document. A
//! [`ConfigSnapshot`] is its immutable, render-ready form (site document
//! converted to a template value, filter patterns compiled, timezone
//! parsed). The [`SnapshotCell`] holds the current snapshot and replaces it
//! atomically on refresh: a render that already loaded the old snapshot
//! keeps using it until it finishes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono_tz::Tz;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filter::ContextFilter;
use crate::value::TemplateValue;

/// Default recursion limit for includes, components and nested blocks.
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported config format: {0} (expected .toml or .json)")]
    UnsupportedFormat(PathBuf),
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub app: AppConfig,
    pub template: TemplateSettings,
    /// Free-form site configuration, exposed to templates as `config`.
    pub site: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub name: String,
    pub version: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "trellis".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateSettings {
    pub max_include_depth: usize,
    pub cache_includes: CacheIncludes,
    pub context_filter: FilterLists,
    pub default_language: String,
    pub server_timezone: String,
    pub default_theme: String,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
            cache_includes: CacheIncludes::default(),
            context_filter: FilterLists::default(),
            default_language: "en".to_string(),
            server_timezone: "UTC".to_string(),
            default_theme: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheIncludes {
    pub enabled: bool,
}

impl Default for CacheIncludes {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Auth-state-keyed path lists for [`ContextFilter`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterLists {
    pub with_auth: Vec<String>,
    pub without_auth: Vec<String>,
    pub always_allow: Vec<String>,
}

impl EngineConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(source)?)
    }

    /// Load from a `.toml` or `.json` file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let parse: fn(&str) -> Result<Self, ConfigError> = match extension.as_deref() {
            Some("toml") => Self::from_toml_str,
            Some("json") => Self::from_json_str,
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        parse(&content)
    }
}

/// Immutable, render-ready configuration.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    config: EngineConfig,
    site: TemplateValue,
    filter: ContextFilter,
    server_timezone: Tz,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl ConfigSnapshot {
    pub fn new(config: EngineConfig) -> Self {
        let site = TemplateValue::from(config.site.clone());
        let filter = ContextFilter::new(&config.template.context_filter);
        let server_timezone = config
            .template
            .server_timezone
            .parse::<Tz>()
            .unwrap_or_else(|_| {
                tracing::warn!(
                    timezone = %config.template.server_timezone,
                    "unknown server timezone, using UTC"
                );
                Tz::UTC
            });
        Self {
            config,
            site,
            filter,
            server_timezone,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The site configuration document as a template value.
    pub fn site(&self) -> &TemplateValue {
        &self.site
    }

    pub fn filter(&self) -> &ContextFilter {
        &self.filter
    }

    pub fn server_timezone(&self) -> Tz {
        self.server_timezone
    }

    pub fn max_include_depth(&self) -> usize {
        self.config.template.max_include_depth
    }

    pub fn cache_includes(&self) -> bool {
        self.config.template.cache_includes.enabled
    }
}

/// Holder of the current snapshot, swapped atomically on refresh.
#[derive(Debug, Default)]
pub struct SnapshotCell {
    current: RwLock<Arc<ConfigSnapshot>>,
}

impl SnapshotCell {
    pub fn new(snapshot: ConfigSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The current snapshot. Never blocks on a refresh in progress longer
    /// than the pointer swap.
    pub fn load(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Install a new snapshot, returning the previous one.
    pub fn replace(&self, snapshot: ConfigSnapshot) -> Arc<ConfigSnapshot> {
        std::mem::replace(&mut *self.current.write(), Arc::new(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config.template.max_include_depth, 16);
        assert!(config.template.cache_includes.enabled);
        assert_eq!(config.template.default_language, "en");
        assert_eq!(config.app.name, "trellis");
    }

    #[test]
    fn test_toml_camel_case_keys() {
        let config = EngineConfig::from_toml_str(
            r#"
            [template]
            maxIncludeDepth = 4
            serverTimezone = "Europe/Paris"

            [template.cacheIncludes]
            enabled = false

            [template.contextFilter]
            withoutAuth = ["config.smtp*"]
            alwaysAllow = ["config.site"]

            [site]
            title = "Docs"
            "#,
        )
        .unwrap();
        assert_eq!(config.template.max_include_depth, 4);
        assert!(!config.template.cache_includes.enabled);
        assert_eq!(config.template.context_filter.without_auth, vec!["config.smtp*"]);

        let snapshot = ConfigSnapshot::new(config);
        assert_eq!(snapshot.server_timezone(), Tz::Europe__Paris);
        assert_eq!(snapshot.site().get_path(&["title"]), Some(&"Docs".into()));
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("trellis.json");
        std::fs::write(&json, r#"{"app": {"name": "site"}}"#).unwrap();
        assert_eq!(EngineConfig::load(&json).unwrap().app.name, "site");

        let yaml = dir.path().join("trellis.yaml");
        std::fs::write(&yaml, "app: {}").unwrap();
        assert!(matches!(
            EngineConfig::load(&yaml),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_invalid_timezone_falls_back_to_utc() {
        let mut config = EngineConfig::default();
        config.template.server_timezone = "Mars/Olympus".into();
        assert_eq!(ConfigSnapshot::new(config).server_timezone(), Tz::UTC);
    }

    #[test]
    fn test_snapshot_cell_replace() {
        let cell = SnapshotCell::default();
        let before = cell.load();
        let mut config = EngineConfig::default();
        config.template.max_include_depth = 3;
        let previous = cell.replace(ConfigSnapshot::new(config));
        assert!(Arc::ptr_eq(&before, &previous));
        assert_eq!(before.max_include_depth(), 16);
        assert_eq!(cell.load().max_include_depth(), 3);
    }
}
