/*
 * resolver.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Module path resolution for `file.*` helpers.
//!
//! Template arguments name files relative to the template roots
//! (`partials/header.html`). A [`ModuleResolver`] turns such a name into a
//! concrete path and is the single place path-traversal attempts are
//! rejected.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Errors from module resolution.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// An absolute path or a drive/UNC prefix.
    #[error("absolute paths are not allowed: {0}")]
    Absolute(String),

    /// A `..` segment.
    #[error("path traversal is not allowed: {0}")]
    Traversal(String),

    /// No root contains the path.
    #[error("module not found: {0}")]
    NotFound(String),
}

/// Trait for resolving a template-relative module path.
pub trait ModuleResolver: Send + Sync {
    /// Resolve `relative` to a path the [`crate::FileCache`] can read.
    fn resolve_module(&self, relative: &str) -> Result<PathBuf, ResolveError>;
}

/// Validate a template-supplied relative path and normalize it.
///
/// Backslashes are treated as separators, `.` segments are dropped and
/// empty segments collapse. Absolute paths, drive prefixes and `..` are
/// rejected.
pub fn normalize_relative(relative: &str) -> Result<PathBuf, ResolveError> {
    let unified = relative.replace('\\', "/");
    if unified.starts_with('/') || has_drive_prefix(&unified) {
        return Err(ResolveError::Absolute(relative.to_string()));
    }

    let mut normalized = PathBuf::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::Normal(segment) => normalized.push(segment),
            Component::CurDir => {}
            Component::ParentDir => return Err(ResolveError::Traversal(relative.to_string())),
            Component::RootDir | Component::Prefix(_) => {
                return Err(ResolveError::Absolute(relative.to_string()));
            }
        }
    }
    if normalized.as_os_str().is_empty() {
        return Err(ResolveError::NotFound(relative.to_string()));
    }
    Ok(normalized)
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Resolver over an ordered list of directories.
///
/// Roots are searched in order (site first, then plugins, then the
/// framework); the first root that contains the path wins.
#[derive(Debug, Clone, Default)]
pub struct OverlayResolver {
    roots: Vec<PathBuf>,
}

impl OverlayResolver {
    pub fn new(roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    /// Add a root with lower precedence than the existing ones.
    pub fn push_root(&mut self, root: impl Into<PathBuf>) -> &mut Self {
        self.roots.push(root.into());
        self
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

impl ModuleResolver for OverlayResolver {
    fn resolve_module(&self, relative: &str) -> Result<PathBuf, ResolveError> {
        let normalized = normalize_relative(relative)?;
        self.roots
            .iter()
            .map(|root| root.join(&normalized))
            .find(|candidate| candidate.exists())
            .ok_or_else(|| ResolveError::NotFound(relative.to_string()))
    }
}
