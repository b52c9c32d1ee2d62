use indexmap::IndexMap;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

/// Modules on an update's propagation path, keyed by update timestamp.
///
/// Only the newest `capacity` timestamps are kept.
#[derive(Debug)]
pub struct DirtyFiles {
    capacity: usize,
    by_timestamp: Mutex<IndexMap<u64, FxHashSet<String>>>,
}

impl DirtyFiles {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            by_timestamp: Mutex::new(IndexMap::new()),
        }
    }

    /// Add paths to a timestamp's set, creating it if needed.
    pub fn record<I>(&self, timestamp: u64, paths: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut map = self.by_timestamp.lock();
        map.entry(timestamp).or_default().extend(paths);
        while map.len() > self.capacity {
            if let Some((evicted, _)) = map.shift_remove_index(0) {
                tracing::debug!(timestamp = evicted, "evicted dirty set");
            }
        }
    }

    pub fn is_dirty(&self, timestamp: u64, public_path: &str) -> bool {
        self.by_timestamp
            .lock()
            .get(&timestamp)
            .is_some_and(|set| set.contains(public_path))
    }

    /// Sorted snapshot of one timestamp's set.
    pub fn get(&self, timestamp: u64) -> Option<Vec<String>> {
        self.by_timestamp.lock().get(&timestamp).map(|set| {
            let mut paths: Vec<String> = set.iter().cloned().collect();
            paths.sort();
            paths
        })
    }

    pub fn len(&self) -> usize {
        self.by_timestamp.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_timestamp.lock().is_empty()
    }
}
