//! Content cache with modification-time validation.
//!
//! File content is cached by absolute path. Every read stats the file; the
//! cached bytes are reused only while the modification time is unchanged.
//! The rewritten-output cache lives in [`rewrite`].

pub mod rewrite;

pub use rewrite::{CachedRewrite, RewriteCache};

use moka::sync::Cache;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::runtime::Runtime;

/// A cached file body with what HTTP conditional requests need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedContent {
    pub content: Arc<str>,
    /// Quoted entity tag derived from the bytes.
    pub etag: String,
    /// Milliseconds since epoch, as observed when the entry was filled.
    pub last_modified: Option<u64>,
}

impl CachedContent {
    pub fn new(content: impl Into<Arc<str>>, last_modified: Option<u64>) -> Self {
        let content = content.into();
        let etag = etag(&content);
        Self {
            content,
            etag,
            last_modified,
        }
    }

    /// Whether an `If-None-Match` value still matches this body.
    pub fn matches_etag(&self, if_none_match: &str) -> bool {
        if_none_match
            .split(',')
            .map(str::trim)
            .any(|tag| tag == "*" || tag.trim_start_matches("W/") == self.etag)
    }
}

fn etag(content: &str) -> String {
    let hash = blake3::hash(content.as_bytes());
    format!("\"{:x}-{}\"", content.len(), &hash.to_hex()[..16])
}

/// Path-keyed content cache.
#[derive(Debug)]
pub struct ContentCache {
    runtime: Arc<dyn Runtime>,
    entries: Cache<PathBuf, Arc<CachedContent>>,
}

impl ContentCache {
    pub fn new(runtime: Arc<dyn Runtime>, capacity: usize) -> Self {
        Self {
            runtime,
            entries: Cache::new(capacity as u64),
        }
    }

    /// Read a file through the cache.
    ///
    /// Files without a modification time are always re-read.
    pub async fn read(&self, file: &Path) -> Result<Arc<CachedContent>> {
        let metadata = self.runtime.metadata(file).await?;

        if let Some(modified) = metadata.modified {
            if let Some(hit) = self.entries.get(file) {
                if hit.last_modified == Some(modified) {
                    tracing::debug!(path = %file.display(), "content cache hit");
                    return Ok(hit);
                }
            }
        }

        let bytes = self.runtime.read_file(file).await?;
        let content = String::from_utf8(bytes).map_err(|_| Error::NotUtf8(file.to_path_buf()))?;
        let entry = Arc::new(CachedContent::new(content, metadata.modified));

        tracing::debug!(path = %file.display(), etag = %entry.etag, "content cache fill");
        self.entries.insert(file.to_path_buf(), Arc::clone(&entry));
        Ok(entry)
    }

    /// Drop a file's entry. Returns whether one existed.
    pub fn bust(&self, file: &Path) -> bool {
        self.entries.remove(file).is_some()
    }

    /// Cached entry without validation.
    pub fn peek(&self, file: &Path) -> Option<Arc<CachedContent>> {
        self.entries.get(file)
    }

    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        self.entries.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
