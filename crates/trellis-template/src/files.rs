/*
 * files.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! File access for `file.*` helpers and includes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;

use crate::resolver::{ModuleResolver, ResolveError, normalize_relative};

/// Read access to template files.
///
/// Paths are the ones returned by a [`ModuleResolver`].
pub trait FileCache: Send + Sync {
    /// File content, or `None` if it cannot be read.
    fn get_file(&self, path: &Path) -> Option<Arc<str>>;

    /// Last modification time.
    fn modified(&self, path: &Path) -> Option<SystemTime>;

    /// Names of the entries of a directory, sorted.
    fn list(&self, dir: &Path) -> Vec<String>;

    fn exists(&self, path: &Path) -> bool {
        self.get_file(path).is_some() || !self.list(path).is_empty()
    }
}

#[derive(Debug)]
struct CachedFile {
    content: Arc<str>,
    modified: Option<SystemTime>,
}

/// Read-through cache over the filesystem.
///
/// An entry is reused while the file's modification time is unchanged;
/// [`DiskFileCache::invalidate`] drops it immediately (used by the file
/// watcher).
#[derive(Debug, Default)]
pub struct DiskFileCache {
    entries: RwLock<HashMap<PathBuf, CachedFile>>,
}

impl DiskFileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&self, path: &Path) {
        self.entries.write().remove(path);
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl FileCache for DiskFileCache {
    fn get_file(&self, path: &Path) -> Option<Arc<str>> {
        let modified = self.modified(path);
        if let Some(entry) = self.entries.read().get(path) {
            if entry.modified == modified {
                return Some(Arc::clone(&entry.content));
            }
        }

        match std::fs::read_to_string(path) {
            Ok(content) => {
                let content: Arc<str> = Arc::from(content);
                self.entries.write().insert(
                    path.to_path_buf(),
                    CachedFile {
                        content: Arc::clone(&content),
                        modified,
                    },
                );
                Some(content)
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "file not readable");
                self.invalidate(path);
                None
            }
        }
    }

    fn modified(&self, path: &Path) -> Option<SystemTime> {
        std::fs::metadata(path).and_then(|m| m.modified()).ok()
    }

    fn list(&self, dir: &Path) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        names.sort();
        names
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// In-memory files, usable as both the file cache and the resolver.
///
/// Useful for testing and for templates bundled into the application.
#[derive(Debug, Default)]
pub struct MemoryFiles {
    files: RwLock<HashMap<PathBuf, (Arc<str>, SystemTime)>>,
}

impl MemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with the given `(relative path, content)` pairs.
    pub fn with_files(
        files: impl IntoIterator<Item = (impl AsRef<str>, impl Into<String>)>,
    ) -> Self {
        let memory = Self::new();
        for (path, content) in files {
            memory.add(path.as_ref(), content);
        }
        memory
    }

    /// Add or replace a file. Invalid paths are ignored.
    pub fn add(&self, path: &str, content: impl Into<String>) -> &Self {
        match normalize_relative(path) {
            Ok(normalized) => {
                let content: Arc<str> = Arc::from(content.into());
                self.files
                    .write()
                    .insert(normalized, (content, SystemTime::now()));
            }
            Err(e) => tracing::warn!(path, error = %e, "ignoring in-memory file"),
        }
        self
    }

    pub fn remove(&self, path: &str) {
        if let Ok(normalized) = normalize_relative(path) {
            self.files.write().remove(&normalized);
        }
    }
}

impl FileCache for MemoryFiles {
    fn get_file(&self, path: &Path) -> Option<Arc<str>> {
        self.files.read().get(path).map(|(c, _)| Arc::clone(c))
    }

    fn modified(&self, path: &Path) -> Option<SystemTime> {
        self.files.read().get(path).map(|(_, m)| *m)
    }

    fn list(&self, dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = self
            .files
            .read()
            .keys()
            .filter_map(|p| p.strip_prefix(dir).ok())
            .filter_map(|rest| rest.components().next())
            .filter_map(|c| c.as_os_str().to_str().map(str::to_string))
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

impl ModuleResolver for MemoryFiles {
    fn resolve_module(&self, relative: &str) -> Result<PathBuf, ResolveError> {
        let normalized = normalize_relative(relative)?;
        if self.exists(&normalized) {
            Ok(normalized)
        } else {
            Err(ResolveError::NotFound(relative.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_cache_reads_and_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.html");
        std::fs::write(&path, "one").unwrap();

        let cache = DiskFileCache::new();
        assert_eq!(cache.get_file(&path).as_deref(), Some("one"));
        assert_eq!(cache.len(), 1);

        std::fs::write(&path, "two").unwrap();
        cache.invalidate(&path);
        assert_eq!(cache.get_file(&path).as_deref(), Some("two"));

        std::fs::remove_file(&path).unwrap();
        assert_eq!(cache.get_file(&path), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_disk_list_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.html"), "").unwrap();
        std::fs::write(dir.path().join("a.html"), "").unwrap();
        assert_eq!(DiskFileCache::new().list(dir.path()), vec!["a.html", "b.html"]);
    }

    #[test]
    fn test_memory_files() {
        let files = MemoryFiles::with_files([
            ("partials/header.html", "<h1>"),
            ("partials/footer.html", "</footer>"),
            ("page.html", "page"),
        ]);

        let path = files.resolve_module("./partials/header.html").unwrap();
        assert_eq!(files.get_file(&path).as_deref(), Some("<h1>"));
        assert_eq!(
            files.list(Path::new("partials")),
            vec!["footer.html", "header.html"]
        );
        assert!(files.resolve_module("partials").is_ok());
        assert!(matches!(
            files.resolve_module("nope.html"),
            Err(ResolveError::NotFound(_))
        ));
        assert!(matches!(
            files.resolve_module("../page.html"),
            Err(ResolveError::Traversal(_))
        ));
    }
}
