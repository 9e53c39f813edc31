//! Error types for trellis-server

use std::path::PathBuf;

use trellis_template::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Template root not found: {0}")]
    TemplateRootNotFound(PathBuf),

    #[error("Failed to load configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to load locales from {path}: {source}")]
    Locales {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Server error: {0}")]
    Server(String),
}

pub type Result<T> = std::result::Result<T, Error>;
