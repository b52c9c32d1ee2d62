//! Rewritten-output cache.
//!
//! Entries are keyed by a fingerprint of `(importer, source)`. Resolution
//! depends on the importer's location, so identical text in two modules is
//! cached separately. Each entry keeps the resolved importee and acceptance
//! sets so a hit can replay the graph update without re-parsing.

use moka::sync::Cache;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::rewrite::Diagnostic;

type Fingerprint = [u8; 32];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRewrite {
    pub code: Arc<str>,
    pub importees: Vec<String>,
    pub accepted: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug)]
pub struct RewriteCache {
    entries: Cache<Fingerprint, Arc<CachedRewrite>>,
    /// Latest fingerprint per importer, so a bust needs no source text.
    by_importer: Mutex<FxHashMap<String, Fingerprint>>,
}

fn fingerprint(importer: &str, source: &str) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();
    hasher.update(importer.as_bytes());
    hasher.update(&[0]);
    hasher.update(source.as_bytes());
    *hasher.finalize().as_bytes()
}

impl RewriteCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Cache::new(capacity as u64),
            by_importer: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn get(&self, importer: &str, source: &str) -> Option<Arc<CachedRewrite>> {
        self.entries.get(&fingerprint(importer, source))
    }

    pub fn insert(&self, importer: &str, source: &str, rewrite: CachedRewrite) {
        let key = fingerprint(importer, source);
        let previous = self.by_importer.lock().insert(importer.to_string(), key);
        if let Some(previous) = previous.filter(|previous| *previous != key) {
            self.entries.invalidate(&previous);
        }
        self.entries.insert(key, Arc::new(rewrite));
    }

    /// Drop the entry of a changed module.
    pub fn bust(&self, importer: &str) -> bool {
        let key = self.by_importer.lock().remove(importer);
        key.is_some_and(|key| self.entries.remove(&key).is_some())
    }

    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        self.entries.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
