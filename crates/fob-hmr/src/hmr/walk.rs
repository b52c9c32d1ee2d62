//! Update propagation through the import graph.

use indexmap::IndexSet;
use rustc_hash::FxHashSet;

use crate::graph::GraphView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundaryKind {
    /// A framework component importing the changed chain.
    Component,
    /// A module that accepts itself or the dependency it was reached from.
    Dependency,
}

/// Where an update stops propagating.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Boundary {
    pub kind: BoundaryKind,
    pub path: String,
}

impl Boundary {
    fn component(path: &str) -> Self {
        Self {
            kind: BoundaryKind::Component,
            path: path.to_string(),
        }
    }

    fn dependency(path: &str) -> Self {
        Self {
            kind: BoundaryKind::Dependency,
            path: path.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Propagation {
    /// Every chain ended at a boundary.
    Boundaries {
        boundaries: Vec<Boundary>,
        /// Modules between the change and its boundaries, the change included.
        dirty: Vec<String>,
    },
    /// A chain ran out of importers at this module.
    DeadEnd(String),
    /// Every chain looped back without reaching a boundary.
    NoBoundary,
    /// Nothing imports the module and it is not an entry.
    NotImported,
}

/// Module classification the walk needs beyond the graph.
pub trait BoundaryRules {
    fn is_component(&self, public_path: &str) -> bool;
    fn is_entry(&self, public_path: &str) -> bool;
}

impl BoundaryRules for fob_config::DevConfig {
    fn is_component(&self, public_path: &str) -> bool {
        fob_config::DevConfig::is_component(self, public_path)
    }

    fn is_entry(&self, public_path: &str) -> bool {
        fob_config::DevConfig::is_entry(self, public_path)
    }
}

/// Walk importer chains outward from `changed` until each one reaches a
/// boundary or runs out of importers.
///
/// Component importers win over acceptance lists. Every module is expanded
/// at most once; a dead end anywhere decides the whole walk.
pub fn propagate(graph: &GraphView<'_>, rules: &dyn BoundaryRules, changed: &str) -> Propagation {
    let mut dirty: IndexSet<String> = IndexSet::new();
    dirty.insert(changed.to_string());

    if graph.is_self_accepting(changed) {
        return Propagation::Boundaries {
            boundaries: vec![Boundary::dependency(changed)],
            dirty: dirty.into_iter().collect(),
        };
    }

    if !graph.has_importers(changed) {
        if rules.is_entry(changed) {
            return Propagation::Boundaries {
                boundaries: vec![Boundary::dependency(changed)],
                dirty: dirty.into_iter().collect(),
            };
        }
        return Propagation::NotImported;
    }

    let mut boundaries: IndexSet<Boundary> = IndexSet::new();
    let mut visited: FxHashSet<String> = FxHashSet::default();
    visited.insert(changed.to_string());

    // (module, modules walked through to reach it, excluding the change)
    let mut stack: Vec<(String, Vec<String>)> = vec![(changed.to_string(), Vec::new())];

    while let Some((importee, chain)) = stack.pop() {
        for importer in graph.importers(&importee) {
            if rules.is_component(&importer) {
                boundaries.insert(Boundary::component(&importer));
                dirty.insert(importer.clone());
                dirty.extend(chain.iter().cloned());
                continue;
            }
            if graph.accepts(&importer, &importee) {
                // the accepting module itself is not dirty
                boundaries.insert(Boundary::dependency(&importer));
                dirty.extend(chain.iter().cloned());
                continue;
            }
            if !visited.insert(importer.clone()) {
                // another arm already walks on from here
                dirty.extend(chain.iter().cloned());
                dirty.insert(importer.clone());
                continue;
            }

            let mut next_chain = chain.clone();
            next_chain.push(importer.clone());

            if graph.is_self_accepting(&importer) {
                boundaries.insert(Boundary::dependency(&importer));
                dirty.extend(next_chain);
                continue;
            }
            if !graph.has_importers(&importer) {
                if rules.is_entry(&importer) {
                    boundaries.insert(Boundary::dependency(&importer));
                    dirty.extend(next_chain);
                    continue;
                }
                tracing::debug!(changed, dead_end = %importer, "import chain has no boundary");
                return Propagation::DeadEnd(importer);
            }
            stack.push((importer, next_chain));
        }
    }

    if boundaries.is_empty() {
        return Propagation::NoBoundary;
    }
    Propagation::Boundaries {
        boundaries: boundaries.into_iter().collect(),
        dirty: dirty.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ModuleGraph;
    use fob_config::DevConfig;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn walk(graph: &ModuleGraph, changed: &str) -> Propagation {
        let rules = DevConfig::default().with_entry("/src/main.js");
        propagate(&graph.read(), &rules, changed)
    }

    #[test]
    fn test_self_accepting_change_is_its_own_boundary() {
        let graph = ModuleGraph::new();
        graph.update_module("/b.js", ids(&["/a.js"]), Vec::new());
        graph.update_module("/a.js", Vec::new(), ids(&["/a.js"]));

        assert_eq!(
            walk(&graph, "/a.js"),
            Propagation::Boundaries {
                boundaries: vec![Boundary::dependency("/a.js")],
                dirty: ids(&["/a.js"]),
            }
        );
    }

    #[test]
    fn test_explicit_accept_stops_the_walk() {
        let graph = ModuleGraph::new();
        graph.update_module("/root.js", ids(&["/a.js"]), Vec::new());
        graph.update_module("/a.js", ids(&["/b.js"]), ids(&["/b.js"]));

        assert_eq!(
            walk(&graph, "/b.js"),
            Propagation::Boundaries {
                boundaries: vec![Boundary::dependency("/a.js")],
                dirty: ids(&["/b.js"]),
            }
        );
    }

    #[test]
    fn test_intermediate_modules_are_dirty() {
        let graph = ModuleGraph::new();
        graph.update_module("/a.js", ids(&["/mid.js"]), ids(&["/mid.js"]));
        graph.update_module("/mid.js", ids(&["/leaf.js"]), Vec::new());

        assert_eq!(
            walk(&graph, "/leaf.js"),
            Propagation::Boundaries {
                boundaries: vec![Boundary::dependency("/a.js")],
                dirty: ids(&["/leaf.js", "/mid.js"]),
            }
        );
    }

    #[test]
    fn test_dead_end() {
        let graph = ModuleGraph::new();
        graph.update_module("/a.js", ids(&["/b.js"]), Vec::new());

        assert_eq!(walk(&graph, "/b.js"), Propagation::DeadEnd("/a.js".into()));
    }

    #[test]
    fn test_dead_end_overrides_other_boundaries() {
        let graph = ModuleGraph::new();
        graph.update_module("/accepting.js", ids(&["/b.js"]), ids(&["/b.js"]));
        graph.update_module("/plain.js", ids(&["/b.js"]), Vec::new());

        assert_eq!(
            walk(&graph, "/b.js"),
            Propagation::DeadEnd("/plain.js".into())
        );
    }

    #[test]
    fn test_component_wins_over_acceptance() {
        let graph = ModuleGraph::new();
        graph.update_module("/App.vue", ids(&["/util.js"]), ids(&["/util.js"]));

        assert_eq!(
            walk(&graph, "/util.js"),
            Propagation::Boundaries {
                boundaries: vec![Boundary::component("/App.vue")],
                dirty: ids(&["/util.js", "/App.vue"]),
            }
        );
    }

    #[test]
    fn test_entry_without_importers_is_a_boundary() {
        let graph = ModuleGraph::new();
        graph.update_module("/src/main.js", ids(&["/src/a.js"]), Vec::new());

        assert_eq!(
            walk(&graph, "/src/a.js"),
            Propagation::Boundaries {
                boundaries: vec![Boundary::dependency("/src/main.js")],
                dirty: ids(&["/src/a.js", "/src/main.js"]),
            }
        );
        assert_eq!(
            walk(&graph, "/src/main.js"),
            Propagation::Boundaries {
                boundaries: vec![Boundary::dependency("/src/main.js")],
                dirty: ids(&["/src/main.js"]),
            }
        );
    }

    #[test]
    fn test_unimported_module() {
        let graph = ModuleGraph::new();
        assert_eq!(walk(&graph, "/lonely.js"), Propagation::NotImported);
    }

    #[test]
    fn test_cycle_terminates_without_duplicates() {
        let graph = ModuleGraph::new();
        graph.update_module("/a.js", ids(&["/b.js"]), Vec::new());
        graph.update_module("/b.js", ids(&["/a.js"]), Vec::new());
        graph.update_module("/host.js", ids(&["/a.js", "/b.js"]), ids(&["/a.js", "/b.js"]));

        match walk(&graph, "/a.js") {
            Propagation::Boundaries { boundaries, .. } => {
                assert_eq!(boundaries, vec![Boundary::dependency("/host.js")]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_diamond_marks_both_arms_dirty() {
        let graph = ModuleGraph::new();
        graph.update_module("/p.js", ids(&["/x.js"]), Vec::new());
        graph.update_module("/q.js", ids(&["/x.js"]), Vec::new());
        graph.update_module("/r.js", ids(&["/p.js", "/q.js"]), Vec::new());
        graph.update_module("/s.js", ids(&["/r.js"]), ids(&["/r.js"]));

        match walk(&graph, "/x.js") {
            Propagation::Boundaries { boundaries, dirty } => {
                assert_eq!(boundaries, vec![Boundary::dependency("/s.js")]);
                for id in ["/x.js", "/p.js", "/q.js", "/r.js"] {
                    assert!(dirty.iter().any(|d| d == id), "{id} missing from {dirty:?}");
                }
                assert!(!dirty.iter().any(|d| d == "/s.js"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_closed_cycle_has_no_boundary() {
        let graph = ModuleGraph::new();
        graph.update_module("/a.js", ids(&["/b.js"]), Vec::new());
        graph.update_module("/b.js", ids(&["/a.js"]), Vec::new());

        assert_eq!(walk(&graph, "/a.js"), Propagation::NoBoundary);
    }
}
