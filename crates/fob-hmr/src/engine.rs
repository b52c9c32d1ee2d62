//! The dev engine service object.
//!
//! [`DevEngine`] owns one instance of every component for a server: resolver,
//! content cache, rewriter, graph, HMR engine and update channel. Requests go
//! through [`DevEngine::load_module`]; watcher events through
//! [`DevEngine::handle_event`] or [`DevEngine::run`], one at a time.

use fob_config::DevConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

use crate::cache::ContentCache;
use crate::channel::UpdateChannel;
use crate::error::Result;
use crate::graph::{DirtyFiles, ModuleGraph};
use crate::hmr::{ComponentParser, HmrEngine, HmrMessage, HmrUpdate, SfcBlockParser};
use crate::paths::{self, MODULE_PREFIX};
use crate::resolver::{OptimizeCacheDir, OptimizedDeps, Resolver};
use crate::rewrite::{Diagnostic, ImportRewriter, RewriteStatus, SCRIPT_EXTENSIONS};
use crate::runtime::Runtime;
use crate::transform::{CssModule, JsonModule, SourceTransform};
use crate::watcher::FileEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Script,
    Component,
    Style,
    Html,
    Other,
}

/// A module ready to serve.
#[derive(Debug, Clone)]
pub struct LoadedModule {
    /// Request path without its query.
    pub public_path: String,
    pub file: PathBuf,
    pub kind: ModuleKind,
    pub code: Arc<str>,
    /// Entity tag of the file on disk.
    pub etag: String,
    pub last_modified: Option<u64>,
    /// `None` when the module was served without rewriting.
    pub status: Option<RewriteStatus>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct DevEngineBuilder {
    config: DevConfig,
    runtime: Arc<dyn Runtime>,
    optimized: Option<Arc<dyn OptimizedDeps>>,
    component_parser: Arc<dyn ComponentParser>,
    transforms: Vec<Arc<dyn SourceTransform>>,
}

impl DevEngineBuilder {
    /// Replace the pre-optimized dependency lookup.
    pub fn optimized(mut self, optimized: Arc<dyn OptimizedDeps>) -> Self {
        self.optimized = Some(optimized);
        self
    }

    pub fn component_parser(mut self, parser: Arc<dyn ComponentParser>) -> Self {
        self.component_parser = parser;
        self
    }

    /// Add a transform. Transforms run in insertion order.
    pub fn transform(mut self, transform: Arc<dyn SourceTransform>) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn build(self) -> Result<DevEngine> {
        self.config.validate()?;
        let config = self.config;

        let optimized = self.optimized.unwrap_or_else(|| {
            Arc::new(OptimizeCacheDir::new(
                config.optimize_dir(),
                Arc::clone(&self.runtime),
            ))
        });
        let resolver = Arc::new(Resolver::with_optimized(
            &config,
            Arc::clone(&self.runtime),
            optimized,
        ));
        let graph = Arc::new(ModuleGraph::new());
        let dirty = Arc::new(DirtyFiles::new(config.dirty_history));
        let rewriter = ImportRewriter::new(
            &config,
            Arc::clone(&resolver),
            Arc::clone(&graph),
            Arc::clone(&dirty),
        );
        let hmr = HmrEngine::new(
            &config,
            Arc::clone(&graph),
            Arc::clone(&dirty),
            self.component_parser,
        );

        tracing::debug!(root = %config.root.display(), "dev engine ready");
        Ok(DevEngine {
            content: ContentCache::new(Arc::clone(&self.runtime), config.read_cache_capacity),
            channel: Arc::new(UpdateChannel::new(config.channel_capacity)),
            clock: AtomicU64::new(0),
            transforms: self.transforms,
            resolver,
            graph,
            dirty,
            rewriter,
            hmr,
            config,
        })
    }
}

#[derive(Debug)]
pub struct DevEngine {
    config: DevConfig,
    resolver: Arc<Resolver>,
    content: ContentCache,
    graph: Arc<ModuleGraph>,
    dirty: Arc<DirtyFiles>,
    rewriter: ImportRewriter,
    hmr: HmrEngine,
    channel: Arc<UpdateChannel>,
    transforms: Vec<Arc<dyn SourceTransform>>,
    /// Last issued update timestamp.
    clock: AtomicU64,
}

impl DevEngine {
    /// Builder with the block-splitting component parser, JSON modules and
    /// imported stylesheets.
    pub fn builder(config: DevConfig, runtime: Arc<dyn Runtime>) -> DevEngineBuilder {
        let transforms: Vec<Arc<dyn SourceTransform>> =
            vec![Arc::new(JsonModule), Arc::new(CssModule::new(&config))];
        DevEngineBuilder {
            config,
            runtime,
            optimized: None,
            component_parser: Arc::new(SfcBlockParser),
            transforms,
        }
    }

    pub fn new(config: DevConfig, runtime: Arc<dyn Runtime>) -> Result<Self> {
        Self::builder(config, runtime).build()
    }

    pub fn config(&self) -> &DevConfig {
        &self.config
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn content(&self) -> &ContentCache {
        &self.content
    }

    pub fn graph(&self) -> &ModuleGraph {
        &self.graph
    }

    pub fn dirty(&self) -> &DirtyFiles {
        &self.dirty
    }

    pub fn rewriter(&self) -> &ImportRewriter {
        &self.rewriter
    }

    pub fn hmr(&self) -> &HmrEngine {
        &self.hmr
    }

    pub fn channel(&self) -> Arc<UpdateChannel> {
        Arc::clone(&self.channel)
    }

    pub fn kind_of(&self, public_path: &str) -> ModuleKind {
        let path = paths::clean_url(public_path);
        if path.ends_with(".html") {
            ModuleKind::Html
        } else if self.config.is_component(path) {
            ModuleKind::Component
        } else if self
            .config
            .style_extensions
            .iter()
            .any(|ext| path.ends_with(ext.as_str()))
        {
            ModuleKind::Style
        } else if SCRIPT_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            ModuleKind::Script
        } else {
            ModuleKind::Other
        }
    }

    /// Resolve, read, transform and rewrite one request.
    ///
    /// `timestamp` defaults to the request's `t` query parameter.
    ///
    /// # Errors
    ///
    /// Fails only when the file cannot be resolved or read; everything else
    /// is reported through [`LoadedModule::diagnostics`].
    pub async fn load_module(&self, request: &str, timestamp: Option<u64>) -> Result<LoadedModule> {
        let public_path = self.module_id(request);
        let timestamp = timestamp.or_else(|| {
            paths::query_param(request, "t").and_then(|t| t.parse().ok())
        });

        let file = self.resolver.to_file(&public_path)?;
        let cached = self.content.read(&file).await?;
        let kind = self.kind_of(&public_path);

        if kind == ModuleKind::Component {
            if let Err(e) = self.hmr.components().record(&public_path, &cached.content) {
                tracing::warn!(path = %public_path, error = %e, "failed to parse component");
            }
        }

        let mut code: Arc<str> = Arc::clone(&cached.content);
        let mut is_module = kind == ModuleKind::Script;
        for transform in self.transforms.iter().filter(|t| t.applies_to(request)) {
            match transform.transform(&code, &public_path) {
                Ok(out) => {
                    code = out.into();
                    is_module |= transform.yields_module();
                }
                Err(e) => {
                    tracing::warn!(
                        path = %public_path,
                        transform = transform.name(),
                        error = %e,
                        "transform failed, serving untransformed source"
                    );
                }
            }
        }

        let (code, status, diagnostics) = if kind == ModuleKind::Html {
            let out = self.rewriter.rewrite_html(&code, &public_path, timestamp).await;
            (out.code, Some(out.status), out.diagnostics)
        } else if is_module {
            let out = self.rewriter.rewrite(&code, &public_path, timestamp).await;
            (out.code, Some(out.status), out.diagnostics)
        } else {
            (code, None, Vec::new())
        };

        Ok(LoadedModule {
            public_path,
            file,
            kind,
            code,
            etag: cached.etag.clone(),
            last_modified: cached.last_modified,
            status,
            diagnostics,
        })
    }

    /// Graph id of a request: its path, with inferred extensions filled in
    /// so `/src/late` and `/src/late.js` are one module.
    fn module_id(&self, request: &str) -> String {
        let path = paths::clean_url(request);
        if paths::has_extension(path) || path.starts_with(MODULE_PREFIX) || path.ends_with('/') {
            return path.to_string();
        }
        match self.resolver.complete(path) {
            Ok(completed) => completed,
            Err(_) => path.to_string(),
        }
    }

    /// Extension-less ids an import of `public_path` is recorded under
    /// while the file does not exist yet.
    fn unresolved_ids(public_path: &str) -> Vec<String> {
        let mut ids = Vec::new();
        if public_path.starts_with(MODULE_PREFIX) {
            return ids;
        }
        if let Some(ext) = paths::extension(public_path) {
            let stem = &public_path[..public_path.len() - ext.len()];
            if let Some(dir) = stem.strip_suffix("/index") {
                ids.push(if dir.is_empty() { "/".to_string() } else { dir.to_string() });
                ids.push(format!("{dir}/"));
            }
            ids.push(stem.to_string());
        }
        ids.dedup();
        ids
    }

    /// Importers whose import of `public_path` failed before the file existed.
    ///
    /// Their cached rewrites are dropped so the next request resolves again.
    fn reconnect_unresolved(&self, public_path: &str) -> Vec<String> {
        let mut importers: Vec<String> = Self::unresolved_ids(public_path)
            .iter()
            .flat_map(|id| self.graph.importers(id))
            .collect();
        importers.sort();
        importers.dedup();
        for importer in &importers {
            self.rewriter.bust(importer);
            tracing::debug!(importer = %importer, path = %public_path, "import now resolves");
        }
        importers
    }

    /// Next update timestamp: wall-clock milliseconds, strictly increasing.
    pub fn next_timestamp(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let mut last = self.clock.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self
                .clock
                .compare_exchange(last, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    pub async fn handle_event(&self, event: FileEvent) -> HmrUpdate {
        let timestamp = self.next_timestamp();
        match event {
            FileEvent::Changed(file) => self.on_file_changed(&file, timestamp).await,
            FileEvent::Removed(file) => self.on_file_removed(&file, timestamp).await,
        }
    }

    /// Invalidate a changed file, compute its update and broadcast it.
    pub async fn on_file_changed(&self, file: &Path, timestamp: u64) -> HmrUpdate {
        let public_path = self.resolver.to_public(file);
        self.content.bust(file);
        self.rewriter.bust(&public_path);

        let source = if self.config.is_component(&public_path) {
            match self.content.read(file).await {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::error!(path = %file.display(), error = %e, "failed to read changed component");
                    None
                }
            }
        } else {
            None
        };

        let update = if self.reconnect_unresolved(&public_path).is_empty() {
            self.hmr.on_change(
                &public_path,
                source.as_ref().map(|entry| entry.content.as_ref()),
                timestamp,
            )
        } else {
            // the importers failed to load in the browser
            HmrUpdate::FullReload(HmrMessage::full_reload(&public_path, timestamp))
        };
        self.channel.broadcast_all(&update.messages());
        update
    }

    /// Drop everything cached for a deleted file and reload its importers.
    pub async fn on_file_removed(&self, file: &Path, timestamp: u64) -> HmrUpdate {
        let public_path = self.resolver.to_public(file);
        self.content.bust(file);
        self.rewriter.bust(&public_path);
        self.resolver.forget(file);

        let update = self.hmr.on_removed(&public_path, timestamp);
        self.channel.broadcast_all(&update.messages());
        update
    }

    pub fn send_custom(&self, event: impl Into<String>, data: serde_json::Value) -> usize {
        self.channel.send_custom(event, data)
    }

    /// Consume watcher events until the sender side closes.
    pub async fn run(&self, mut events: mpsc::Receiver<FileEvent>) {
        while let Some(event) = events.recv().await {
            let update = self.handle_event(event).await;
            tracing::debug!(?update, "handled file event");
        }
        tracing::debug!("file event stream closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::test_utils::TestRuntime;

    fn engine(runtime: &Arc<TestRuntime>) -> DevEngine {
        DevEngine::new(DevConfig::new("/app"), runtime.clone()).unwrap()
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = DevConfig {
            hmr_path: "hmr".into(),
            ..DevConfig::new("/app")
        };
        assert!(DevEngine::new(config, Arc::new(TestRuntime::new())).is_err());
    }

    #[test]
    fn test_timestamps_increase() {
        let engine = engine(&Arc::new(TestRuntime::new()));
        let a = engine.next_timestamp();
        let b = engine.next_timestamp();
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_load_script_records_edges() {
        let runtime = Arc::new(TestRuntime::new());
        runtime.write("/app/src/main.js", "import './a'");
        runtime.write("/app/src/a.js", "export const a = 1");
        let engine = engine(&runtime);

        let module = engine.load_module("/src/main.js", None).await.unwrap();
        assert_eq!(module.kind, ModuleKind::Script);
        assert_eq!(module.code.as_ref(), "import '/src/a.js'");
        assert_eq!(module.status, Some(RewriteStatus::Rewritten));
        assert_eq!(engine.graph().importers("/src/a.js"), vec!["/src/main.js"]);
    }

    #[tokio::test]
    async fn test_json_is_served_as_module() {
        let runtime = Arc::new(TestRuntime::new());
        runtime.write("/app/src/data.json", "{\"a\": 1}");
        let engine = engine(&runtime);

        let module = engine.load_module("/src/data.json?import", None).await.unwrap();
        assert_eq!(module.code.as_ref(), r#"export default {"a":1}"#);
        assert_eq!(module.public_path, "/src/data.json");
    }

    #[tokio::test]
    async fn test_failed_transform_serves_source() {
        let runtime = Arc::new(TestRuntime::new());
        runtime.write("/app/src/bad.json", "{ nope");
        let engine = engine(&runtime);

        let module = engine.load_module("/src/bad.json", None).await.unwrap();
        assert_eq!(module.code.as_ref(), "{ nope");
        assert_eq!(module.status, None);
    }

    #[test]
    fn test_unresolved_ids() {
        assert_eq!(DevEngine::unresolved_ids("/src/late.js"), vec!["/src/late"]);
        assert_eq!(
            DevEngine::unresolved_ids("/src/util/index.ts"),
            vec!["/src/util", "/src/util/", "/src/util/index"]
        );
        assert!(DevEngine::unresolved_ids("/@modules/vue/index.js").is_empty());
        assert!(DevEngine::unresolved_ids("/src/LICENSE").is_empty());
    }

    #[tokio::test]
    async fn test_missing_module_is_an_error() {
        let engine = engine(&Arc::new(TestRuntime::new()));
        let err = engine.load_module("/src/nope.js", None).await.unwrap_err();
        assert!(matches!(err, crate::Error::Resolve(_)));
    }

    #[tokio::test]
    async fn test_change_busts_caches_and_broadcasts() {
        let runtime = Arc::new(TestRuntime::new());
        runtime.write("/app/src/main.js", "import './a.js'\nimport.meta.hot.accept()");
        runtime.write("/app/src/a.js", "export const a = 1");
        let engine = engine(&runtime);
        let (_, mut rx) = engine.channel().register();
        rx.recv().await.unwrap();

        engine.load_module("/src/main.js", None).await.unwrap();
        let update = engine
            .on_file_changed(Path::new("/app/src/a.js"), 10)
            .await;

        assert_eq!(
            update.messages(),
            vec![crate::HmrMessage::DependencyUpdate {
                path: "/src/main.js".into(),
                change_src_path: "/src/a.js".into(),
                timestamp: 10,
            }]
        );
        assert!(rx.recv().await.is_some());
        assert_eq!(engine.dirty().get(10), Some(vec!["/src/a.js".to_string(), "/src/main.js".to_string()]));
    }
}
