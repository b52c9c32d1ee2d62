//! Live import graph.
//!
//! Two adjacency maps keyed by public path (`importers`, `importees`) plus an
//! acceptance map. A module's outgoing edges are only ever replaced as a
//! whole, under one write lock, so readers never see a half-updated module.

mod dirty;

pub use dirty::DirtyFiles;

use parking_lot::{RwLock, RwLockReadGuard};
use rustc_hash::{FxHashMap, FxHashSet};

type EdgeMap = FxHashMap<String, FxHashSet<String>>;

#[derive(Debug, Default)]
struct GraphInner {
    importers: EdgeMap,
    importees: EdgeMap,
    accepted: EdgeMap,
}

/// Edges changed by one [`ModuleGraph::update_module`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl EdgeDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ModuleGraph {
    inner: RwLock<GraphInner>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `importer`'s outgoing edges and acceptance set.
    ///
    /// Accepted dependencies are importees too. Back-edges of importees that
    /// are no longer referenced are pruned; self-edges are never recorded.
    pub fn update_module<I, A>(&self, importer: &str, importees: I, accepted: A) -> EdgeDiff
    where
        I: IntoIterator<Item = String>,
        A: IntoIterator<Item = String>,
    {
        let accepted: FxHashSet<String> = accepted.into_iter().collect();
        let next: FxHashSet<String> = importees
            .into_iter()
            .chain(accepted.iter().cloned())
            .filter(|id| id != importer)
            .collect();

        let mut inner = self.inner.write();
        let previous = inner.importees.remove(importer).unwrap_or_default();

        let mut diff = EdgeDiff::default();
        for stale in previous.difference(&next) {
            if let Some(set) = inner.importers.get_mut(stale) {
                set.remove(importer);
                if set.is_empty() {
                    inner.importers.remove(stale);
                }
            }
            tracing::debug!(importer, importee = %stale, "pruned import edge");
            diff.removed.push(stale.clone());
        }
        for importee in &next {
            let inserted = inner
                .importers
                .entry(importee.clone())
                .or_default()
                .insert(importer.to_string());
            if !previous.contains(importee) {
                tracing::debug!(importer, importee = %importee, "recorded import edge");
                diff.added.push(importee.clone());
            } else {
                debug_assert!(!inserted, "importers out of sync with importees");
            }
        }

        if !next.is_empty() {
            inner.importees.insert(importer.to_string(), next);
        }
        if accepted.is_empty() {
            inner.accepted.remove(importer);
        } else {
            inner.accepted.insert(importer.to_string(), accepted);
        }

        diff.added.sort();
        diff.removed.sort();
        diff
    }

    /// Lock the graph for a consistent multi-step read.
    pub fn read(&self) -> GraphView<'_> {
        GraphView {
            inner: self.inner.read(),
        }
    }

    pub fn importers(&self, id: &str) -> Vec<String> {
        self.read().importers(id)
    }

    pub fn importees(&self, id: &str) -> Vec<String> {
        sorted(self.inner.read().importees.get(id))
    }

    pub fn accepted_deps(&self, id: &str) -> Vec<String> {
        sorted(self.inner.read().accepted.get(id))
    }

    pub fn has_importers(&self, id: &str) -> bool {
        self.read().has_importers(id)
    }

    pub fn is_self_accepting(&self, id: &str) -> bool {
        self.read().is_self_accepting(id)
    }

    /// Whether every edge has its back-edge.
    pub fn is_symmetric(&self) -> bool {
        let inner = self.inner.read();
        let forward = inner.importees.iter().all(|(from, tos)| {
            tos.iter()
                .all(|to| inner.importers.get(to).is_some_and(|set| set.contains(from)))
        });
        let backward = inner.importers.iter().all(|(to, froms)| {
            froms
                .iter()
                .all(|from| inner.importees.get(from).is_some_and(|set| set.contains(to)))
        });
        forward && backward
    }
}

fn sorted(set: Option<&FxHashSet<String>>) -> Vec<String> {
    let mut out: Vec<String> = set.map(|s| s.iter().cloned().collect()).unwrap_or_default();
    out.sort();
    out
}

/// Read-locked view of the graph.
pub struct GraphView<'a> {
    inner: RwLockReadGuard<'a, GraphInner>,
}

impl GraphView<'_> {
    /// Importers in sorted order.
    pub fn importers(&self, id: &str) -> Vec<String> {
        sorted(self.inner.importers.get(id))
    }

    pub fn has_importers(&self, id: &str) -> bool {
        self.inner.importers.get(id).is_some_and(|set| !set.is_empty())
    }

    pub fn is_self_accepting(&self, id: &str) -> bool {
        self.accepts(id, id)
    }

    /// Whether `importer` declared it can hot-swap `dep`.
    pub fn accepts(&self, importer: &str, dep: &str) -> bool {
        self.inner
            .accepted
            .get(importer)
            .is_some_and(|set| set.contains(dep))
    }
}
