//! trellis-server: HTTP render service for trellis templates
//!
//! This crate provides:
//! - A render action (`POST /api/render`) that never fails past its boundary
//! - Helper discovery (`GET /api/helpers`)
//! - Request facts derived from the incoming HTTP request
//! - Debounced watching of the configuration file and template roots

pub mod context;
pub mod error;
pub mod request;
pub mod server;
pub mod watch;

pub use context::{AppContext, RefreshOutcome, ServerConfig, SharedContext};
pub use error::{Error, Result};
