//! Hot update decisions.
//!
//! [`HmrEngine`] turns one changed module into the messages clients need:
//! plain stylesheets are swapped in place, components are diffed block by
//! block, and everything else is propagated through the import graph by
//! [`walk::propagate`].

pub mod component;
mod message;
pub mod walk;

pub use component::{ComponentCache, ComponentDescriptor, ComponentParser, SfcBlock, SfcBlockParser};
pub use message::HmrMessage;
pub use walk::{Boundary, BoundaryKind, BoundaryRules, Propagation};

use fob_config::DevConfig;
use std::sync::Arc;

use crate::graph::{DirtyFiles, ModuleGraph};
use crate::paths;

/// Outcome of one file event.
#[derive(Debug, Clone, PartialEq)]
pub enum HmrUpdate {
    /// No client has the module loaded, or nothing observable changed.
    None,
    /// In-place updates, one message per boundary or changed block.
    Targeted(Vec<HmrMessage>),
    FullReload(HmrMessage),
}

impl HmrUpdate {
    pub fn messages(&self) -> Vec<HmrMessage> {
        match self {
            HmrUpdate::None => Vec::new(),
            HmrUpdate::Targeted(messages) => messages.clone(),
            HmrUpdate::FullReload(message) => vec![message.clone()],
        }
    }

    pub fn is_full_reload(&self) -> bool {
        matches!(self, HmrUpdate::FullReload(_))
    }
}

#[derive(Debug)]
pub struct HmrEngine {
    config: DevConfig,
    graph: Arc<ModuleGraph>,
    dirty: Arc<DirtyFiles>,
    components: ComponentCache,
}

impl HmrEngine {
    pub fn new(
        config: &DevConfig,
        graph: Arc<ModuleGraph>,
        dirty: Arc<DirtyFiles>,
        parser: Arc<dyn ComponentParser>,
    ) -> Self {
        Self {
            config: config.clone(),
            graph,
            dirty,
            components: ComponentCache::new(parser),
        }
    }

    pub fn components(&self) -> &ComponentCache {
        &self.components
    }

    /// Classify a changed module and compute its update.
    ///
    /// `source` is the new content; it is only needed for components.
    pub fn on_change(&self, public_path: &str, source: Option<&str>, timestamp: u64) -> HmrUpdate {
        let path = paths::clean_url(public_path);
        if self.config.is_component(path) {
            match source {
                Some(source) => self.on_component_changed(path, source, timestamp),
                None => HmrUpdate::None,
            }
        } else if self.config.is_plain_style(path) {
            self.on_style_changed(path, timestamp)
        } else {
            self.on_module_changed(path, timestamp)
        }
    }

    /// Plain stylesheets swap without a walk.
    pub fn on_style_changed(&self, public_path: &str, timestamp: u64) -> HmrUpdate {
        tracing::info!(path = public_path, timestamp, "style updated");
        HmrUpdate::Targeted(vec![HmrMessage::StyleUpdate {
            path: public_path.to_string(),
            id: paths::hash_id(public_path),
            timestamp,
        }])
    }

    pub fn on_component_changed(&self, public_path: &str, source: &str, timestamp: u64) -> HmrUpdate {
        match self.components.update(public_path, source, timestamp) {
            Ok(messages) if messages.is_empty() => HmrUpdate::None,
            Ok(messages) => {
                tracing::info!(path = public_path, timestamp, count = messages.len(), "component updated");
                HmrUpdate::Targeted(messages)
            }
            Err(e) => {
                // a broken component cannot be patched in place
                tracing::warn!(path = public_path, error = %e, "failed to parse component");
                HmrUpdate::FullReload(HmrMessage::full_reload(public_path, timestamp))
            }
        }
    }

    /// Walk the graph from a changed script-like module.
    pub fn on_module_changed(&self, public_path: &str, timestamp: u64) -> HmrUpdate {
        let propagation = {
            let view = self.graph.read();
            walk::propagate(&view, &self.config, public_path)
        };

        match propagation {
            Propagation::Boundaries { boundaries, dirty } => {
                self.dirty.record(timestamp, dirty);
                let messages = boundaries
                    .into_iter()
                    .map(|boundary| {
                        tracing::info!(
                            path = %boundary.path,
                            changed = public_path,
                            timestamp,
                            "hot update"
                        );
                        match boundary.kind {
                            BoundaryKind::Component => HmrMessage::ComponentReload {
                                path: boundary.path,
                                change_src_path: Some(public_path.to_string()),
                                timestamp,
                            },
                            BoundaryKind::Dependency => HmrMessage::DependencyUpdate {
                                path: boundary.path,
                                change_src_path: public_path.to_string(),
                                timestamp,
                            },
                        }
                    })
                    .collect();
                HmrUpdate::Targeted(messages)
            }
            Propagation::DeadEnd(at) => {
                tracing::info!(path = public_path, dead_end = %at, timestamp, "page reloaded");
                HmrUpdate::FullReload(HmrMessage::full_reload(public_path, timestamp))
            }
            Propagation::NoBoundary => {
                tracing::info!(path = public_path, timestamp, "import cycle without boundary, page reloaded");
                HmrUpdate::FullReload(HmrMessage::full_reload(public_path, timestamp))
            }
            Propagation::NotImported => {
                tracing::debug!(path = public_path, "no importers");
                HmrUpdate::None
            }
        }
    }

    /// A deleted module reloads every page that imported it.
    pub fn on_removed(&self, public_path: &str, timestamp: u64) -> HmrUpdate {
        let path = paths::clean_url(public_path);
        self.components.remove(path);
        if self.graph.has_importers(path) {
            tracing::info!(path, timestamp, "imported module removed, page reloaded");
            HmrUpdate::FullReload(HmrMessage::full_reload(path, timestamp))
        } else {
            HmrUpdate::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn engine() -> (Arc<ModuleGraph>, Arc<DirtyFiles>, HmrEngine) {
        let config = DevConfig::default();
        let graph = Arc::new(ModuleGraph::new());
        let dirty = Arc::new(DirtyFiles::new(config.dirty_history));
        let engine = HmrEngine::new(&config, graph.clone(), dirty.clone(), Arc::new(SfcBlockParser));
        (graph, dirty, engine)
    }

    #[test]
    fn test_dependency_update_records_dirty_set() {
        let (graph, dirty, engine) = engine();
        graph.update_module("/src/a.js", ids(&["/src/b.js"]), ids(&["/src/b.js"]));
        graph.update_module("/src/root.js", ids(&["/src/a.js"]), Vec::new());

        let update = engine.on_change("/src/b.js", None, 100);
        assert_eq!(
            update,
            HmrUpdate::Targeted(vec![HmrMessage::DependencyUpdate {
                path: "/src/a.js".into(),
                change_src_path: "/src/b.js".into(),
                timestamp: 100,
            }])
        );
        assert_eq!(dirty.get(100), Some(ids(&["/src/b.js"])));
    }

    #[test]
    fn test_component_boundary_message() {
        let (graph, _, engine) = engine();
        graph.update_module("/src/App.vue", ids(&["/src/util.js"]), Vec::new());

        let update = engine.on_change("/src/util.js", None, 1);
        assert_eq!(
            update.messages(),
            vec![HmrMessage::ComponentReload {
                path: "/src/App.vue".into(),
                change_src_path: Some("/src/util.js".into()),
                timestamp: 1,
            }]
        );
    }

    #[test]
    fn test_dead_end_is_one_full_reload() {
        let (graph, dirty, engine) = engine();
        graph.update_module("/src/a.js", ids(&["/src/b.js"]), Vec::new());

        let update = engine.on_change("/src/b.js", None, 5);
        assert!(update.is_full_reload());
        assert_eq!(update.messages().len(), 1);
        assert!(dirty.get(5).is_none());
    }

    #[test]
    fn test_plain_style_skips_the_walk() {
        let (_, _, engine) = engine();
        let update = engine.on_change("/src/app.css", None, 3);
        assert_eq!(
            update,
            HmrUpdate::Targeted(vec![HmrMessage::StyleUpdate {
                path: "/src/app.css".into(),
                id: paths::hash_id("/src/app.css"),
                timestamp: 3,
            }])
        );
    }

    #[test]
    fn test_style_module_walks_like_a_script() {
        let (graph, _, engine) = engine();
        graph.update_module("/src/a.js", ids(&["/src/app.module.css"]), ids(&["/src/app.module.css"]));

        let update = engine.on_change("/src/app.module.css", None, 3);
        assert!(matches!(
            &update.messages()[..],
            [HmrMessage::DependencyUpdate { path, .. }] if path == "/src/a.js"
        ));
    }

    #[test]
    fn test_component_change_uses_descriptor_cache() {
        let (_, _, engine) = engine();
        let source = "<template><p>a</p></template>\n<script>export default {}</script>\n";
        assert_eq!(engine.on_change("/src/App.vue", Some(source), 1), HmrUpdate::None);

        engine.components().record("/src/App.vue", source).unwrap();
        let update = engine.on_change("/src/App.vue", Some(&source.replace("<p>a", "<p>b")), 2);
        assert_eq!(
            update,
            HmrUpdate::Targeted(vec![HmrMessage::ComponentTemplateUpdate {
                path: "/src/App.vue".into(),
                timestamp: 2,
            }])
        );
    }

    #[test]
    fn test_removed_module() {
        let (graph, _, engine) = engine();
        graph.update_module("/src/a.js", ids(&["/src/b.js"]), Vec::new());

        assert!(engine.on_removed("/src/b.js", 1).is_full_reload());
        assert_eq!(engine.on_removed("/src/unused.js", 1), HmrUpdate::None);
    }
}
