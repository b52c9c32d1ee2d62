//! Import rewriting.
//!
//! Turns every static, re-export and literal dynamic import specifier into a
//! request the browser can fetch, records the resulting edges in the
//! [`ModuleGraph`], and rewrites hot-API calls so the client runtime knows
//! which module registered them.
//!
//! Work happens in three phases so no AST is held across an `await`:
//! a synchronous scan into owned records, async resolution, then text edits.

mod edits;
mod html;
pub mod scan;

pub use edits::SourceEdits;

use fob_config::DevConfig;
use indexmap::IndexSet;
use std::sync::Arc;

use crate::cache::{CachedRewrite, RewriteCache};
use crate::graph::{DirtyFiles, ModuleGraph};
use crate::paths::{self, IMPORT_MARKER, MODULE_PREFIX};
use crate::resolver::Resolver;
use scan::{HotMethod, HotTarget, Literal};

/// Extensions the browser can execute once transformed.
pub(crate) const SCRIPT_EXTENSIONS: &[&str] = &[".js", ".mjs", ".jsx", ".ts", ".tsx"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteStatus {
    Rewritten,
    Unchanged,
    /// The source did not parse and is returned as-is.
    ParseFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    ParseFailure,
    NonLiteralDynamicImport,
    MalformedHotAccept,
    UnresolvedImport,
    DeepImportOfOptimized,
}

/// A recoverable problem found while rewriting one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub importer: String,
    /// Byte offset in the importer's source, when known.
    pub offset: Option<u32>,
    pub message: String,
}

impl Diagnostic {
    fn new(
        kind: DiagnosticKind,
        importer: &str,
        offset: Option<u32>,
        message: impl Into<String>,
    ) -> Self {
        let diagnostic = Self {
            kind,
            importer: importer.to_string(),
            offset,
            message: message.into(),
        };
        tracing::warn!(
            importer,
            kind = ?diagnostic.kind,
            offset = ?offset,
            "{}",
            diagnostic.message
        );
        diagnostic
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutput {
    pub code: Arc<str>,
    pub status: RewriteStatus,
    pub diagnostics: Vec<Diagnostic>,
    /// Graph ids this module now imports.
    pub importees: Vec<String>,
    pub from_cache: bool,
}

impl RewriteOutput {
    pub fn has(&self, kind: DiagnosticKind) -> bool {
        self.diagnostics.iter().any(|d| d.kind == kind)
    }
}

/// One resolved specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImport {
    /// Text that replaces the specifier.
    pub request: String,
    /// Graph id to record, `None` for untracked imports.
    pub importee: Option<String>,
    pub diagnostic: Option<Diagnostic>,
}

/// Result of rewriting without touching the graph.
#[derive(Debug, Default)]
struct Pass {
    code: String,
    changed: bool,
    importees: IndexSet<String>,
    accepted: IndexSet<String>,
    diagnostics: Vec<Diagnostic>,
}

#[derive(Debug)]
pub struct ImportRewriter {
    resolver: Arc<Resolver>,
    graph: Arc<ModuleGraph>,
    dirty: Arc<DirtyFiles>,
    cache: RewriteCache,
    client_path: String,
    component_extensions: Vec<String>,
}

impl ImportRewriter {
    pub fn new(
        config: &DevConfig,
        resolver: Arc<Resolver>,
        graph: Arc<ModuleGraph>,
        dirty: Arc<DirtyFiles>,
    ) -> Self {
        Self {
            resolver,
            graph,
            dirty,
            cache: RewriteCache::new(config.rewrite_cache_capacity),
            client_path: config.client_path.clone(),
            component_extensions: config.component_extensions.clone(),
        }
    }

    /// Rewrite one module and replace its edges in the graph.
    ///
    /// Without a timestamp the output cache is consulted; a hit still
    /// replays the recorded edges into the graph.
    pub async fn rewrite(
        &self,
        source: &str,
        importer: &str,
        timestamp: Option<u64>,
    ) -> RewriteOutput {
        if timestamp.is_none() {
            if let Some(hit) = self.cache.get(importer, source) {
                tracing::debug!(importer, "rewrite cache hit");
                self.graph
                    .update_module(importer, hit.importees.clone(), hit.accepted.clone());
                let status = if hit.code.as_ref() == source {
                    RewriteStatus::Unchanged
                } else {
                    RewriteStatus::Rewritten
                };
                return RewriteOutput {
                    code: Arc::clone(&hit.code),
                    status,
                    diagnostics: hit.diagnostics.clone(),
                    importees: hit.importees.clone(),
                    from_cache: true,
                };
            }
        }

        let pass = match self.rewrite_pass(source, importer, timestamp).await {
            Ok(pass) => pass,
            Err(diagnostic) => {
                // previous edges stay until the next successful rewrite
                return RewriteOutput {
                    code: source.into(),
                    status: RewriteStatus::ParseFailed,
                    diagnostics: vec![diagnostic],
                    importees: self.graph.importees(importer),
                    from_cache: false,
                };
            }
        };

        let importees: Vec<String> = pass.importees.into_iter().collect();
        let accepted: Vec<String> = pass.accepted.into_iter().collect();
        self.graph
            .update_module(importer, importees.clone(), accepted.clone());

        let code: Arc<str> = pass.code.into();
        // unresolved imports must be retried once the file shows up
        let unresolved = pass
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::UnresolvedImport);
        if timestamp.is_none() && !unresolved {
            self.cache.insert(
                importer,
                source,
                CachedRewrite {
                    code: Arc::clone(&code),
                    importees: importees.clone(),
                    accepted,
                    diagnostics: pass.diagnostics.clone(),
                },
            );
        }

        RewriteOutput {
            code,
            status: if pass.changed {
                RewriteStatus::Rewritten
            } else {
                RewriteStatus::Unchanged
            },
            diagnostics: pass.diagnostics,
            importees,
            from_cache: false,
        }
    }

    /// Drop the cached output of a changed module.
    pub fn bust(&self, importer: &str) -> bool {
        self.cache.bust(importer)
    }

    /// Resolve one specifier as seen from `importer`.
    pub async fn resolve_import(
        &self,
        importer: &str,
        spec: &str,
        timestamp: Option<u64>,
    ) -> ResolvedImport {
        let id = self.resolver.alias(spec).unwrap_or(spec);

        if paths::is_external(id) || paths::clean_url(id) == self.client_path {
            return ResolvedImport {
                request: id.to_string(),
                importee: None,
                diagnostic: None,
            };
        }

        if paths::is_bare(id) {
            let bare = self.resolver.resolve_bare(id).await;
            let diagnostic = bare.deep_import_of.as_deref().map(|package| {
                Diagnostic::new(
                    DiagnosticKind::DeepImportOfOptimized,
                    importer,
                    None,
                    format!(
                        "avoid deep import '{id}' since '{package}' is a pre-optimized dependency"
                    ),
                )
            });
            return ResolvedImport {
                importee: Some(bare.request.clone()),
                request: bare.request,
                diagnostic,
            };
        }

        if id.starts_with(MODULE_PREFIX) {
            return ResolvedImport {
                request: id.to_string(),
                importee: Some(paths::clean_url(id).to_string()),
                diagnostic: None,
            };
        }

        let resolved = paths::resolve_relative(importer, id);
        let mut request = if paths::has_extension(&resolved) {
            resolved
        } else {
            match self.resolver.complete(&resolved) {
                Ok(completed) => completed,
                Err(e) => {
                    // keep the edge; creating the file later reloads the importer
                    let diagnostic = Diagnostic::new(
                        DiagnosticKind::UnresolvedImport,
                        importer,
                        None,
                        format!("failed to resolve '{spec}': {e}"),
                    );
                    return ResolvedImport {
                        importee: Some(paths::clean_url(&resolved).to_string()),
                        request: resolved,
                        diagnostic: Some(diagnostic),
                    };
                }
            }
        };

        let pathname = paths::clean_url(&request).to_string();
        if !self.is_script(&pathname) && !paths::has_query_param(&request, IMPORT_MARKER) {
            request = paths::append_query(&request, IMPORT_MARKER);
        }

        if let Some(timestamp) = timestamp {
            let sub_request =
                self.is_component(&pathname) && paths::has_query_param(&request, "type");
            if (sub_request || self.dirty.is_dirty(timestamp, &pathname))
                && !paths::has_query_param(&request, "t")
            {
                request = paths::append_query(&request, &format!("t={timestamp}"));
            }
        }

        ResolvedImport {
            request,
            importee: Some(pathname),
            diagnostic: None,
        }
    }

    fn is_script(&self, pathname: &str) -> bool {
        SCRIPT_EXTENSIONS.iter().any(|ext| pathname.ends_with(ext)) || self.is_component(pathname)
    }

    fn is_component(&self, pathname: &str) -> bool {
        self.component_extensions
            .iter()
            .any(|ext| pathname.ends_with(ext.as_str()))
    }

    async fn rewrite_pass(
        &self,
        source: &str,
        importer: &str,
        timestamp: Option<u64>,
    ) -> Result<Pass, Diagnostic> {
        let scan = scan::scan(source, importer).map_err(|e| {
            Diagnostic::new(
                DiagnosticKind::ParseFailure,
                importer,
                None,
                format!("failed to parse: {}", e.messages.join("; ")),
            )
        })?;

        let mut pass = Pass::default();
        let mut edits = SourceEdits::new();

        for offset in &scan.non_literal_dynamic {
            pass.diagnostics.push(Diagnostic::new(
                DiagnosticKind::NonLiteralDynamicImport,
                importer,
                Some(*offset),
                "dynamic import with a non-literal argument is left untracked",
            ));
        }

        for record in &scan.imports {
            let resolved = self
                .resolve_import(importer, &record.specifier.value, timestamp)
                .await;
            self.apply(&mut pass, &mut edits, source, &record.specifier, resolved);
        }

        let quoted = json_string(importer);
        for call in &scan.hot_calls {
            if let Some(at) = call.inject_at {
                let mut injected = vec![quoted.as_str()];
                if call.inject_self {
                    injected.push(quoted.as_str());
                }
                let text = if call.has_args {
                    format!("{}, ", injected.join(", "))
                } else {
                    injected.join(", ")
                };
                edits.insert(at, text);
            }

            let deps = match &call.target {
                HotTarget::Malformed => {
                    pass.diagnostics.push(Diagnostic::new(
                        DiagnosticKind::MalformedHotAccept,
                        importer,
                        Some(call.offset),
                        format!(
                            "hot.{}() expects a dep string, an array of deps, or a callback",
                            call.method.as_str()
                        ),
                    ));
                    continue;
                }
                HotTarget::SelfAccept => &[][..],
                HotTarget::Deps(deps) => deps.as_slice(),
            };

            if call.method != HotMethod::Accept {
                continue;
            }
            if call.target == HotTarget::SelfAccept {
                pass.accepted.insert(importer.to_string());
            }
            for dep in deps {
                let resolved = self.resolve_import(importer, &dep.value, None).await;
                if let Some(importee) = &resolved.importee {
                    tracing::debug!(importer, importee = %importee, "accepts dependency");
                    pass.accepted.insert(importee.clone());
                }
                self.apply(&mut pass, &mut edits, source, dep, resolved);
            }
        }

        pass.changed = !edits.is_empty();
        pass.code = edits.apply(source);
        Ok(pass)
    }

    fn apply(
        &self,
        pass: &mut Pass,
        edits: &mut SourceEdits,
        source: &str,
        literal: &Literal,
        resolved: ResolvedImport,
    ) {
        edits.overwrite(source, literal.start, literal.end, resolved.request);
        if let Some(importee) = resolved.importee {
            pass.importees.insert(importee);
        }
        pass.diagnostics.extend(resolved.diagnostic);
    }
}

fn json_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::test_utils::TestRuntime;

    struct Fixture {
        graph: Arc<ModuleGraph>,
        dirty: Arc<DirtyFiles>,
        rewriter: ImportRewriter,
    }

    fn fixture() -> Fixture {
        let runtime = Arc::new(TestRuntime::new());
        runtime.write("/app/src/main.js", "");
        runtime.write("/app/src/a.js", "");
        runtime.write("/app/src/util/index.ts", "");
        runtime.write("/app/src/App.vue", "");
        runtime.write("/app/src/style.css", "");
        runtime.write("/app/node_modules/.fob_opt_cache/vue.js", "");

        let config = DevConfig::new("/app").with_alias("@util", "/src/util");
        let resolver = Arc::new(Resolver::new(&config, runtime));
        let graph = Arc::new(ModuleGraph::new());
        let dirty = Arc::new(DirtyFiles::new(config.dirty_history));
        let rewriter = ImportRewriter::new(&config, resolver, graph.clone(), dirty.clone());
        Fixture {
            graph,
            dirty,
            rewriter,
        }
    }

    #[tokio::test]
    async fn test_rewrites_relative_bare_and_alias() {
        let f = fixture();
        let source = "import { a } from './a'\nimport { createApp } from 'vue'\nimport u from '@util'\nimport './style.css'\n";
        let out = f.rewriter.rewrite(source, "/src/main.js", None).await;

        assert_eq!(out.status, RewriteStatus::Rewritten);
        assert_eq!(
            out.code.as_ref(),
            "import { a } from '/src/a.js'\nimport { createApp } from '/@modules/vue'\nimport u from '/src/util/index.ts'\nimport '/src/style.css?import'\n"
        );
        assert_eq!(
            f.graph.importees("/src/main.js"),
            vec!["/@modules/vue", "/src/a.js", "/src/style.css", "/src/util/index.ts"]
        );
        assert_eq!(f.graph.importers("/src/a.js"), vec!["/src/main.js"]);
    }

    #[tokio::test]
    async fn test_rewrite_is_idempotent() {
        let f = fixture();
        let source = "import './a'\nimport 'vue'\nimport './style.css'\nimport.meta.hot.accept()\nhot.accept('./a.js', () => {})\n";
        let first = f.rewriter.rewrite(source, "/src/main.js", None).await;
        let second = f.rewriter.rewrite(&first.code, "/src/main.js", None).await;

        assert_eq!(second.status, RewriteStatus::Unchanged);
        assert_eq!(first.code, second.code);
        assert_eq!(first.importees, second.importees);
    }

    #[tokio::test]
    async fn test_external_and_client_imports_are_untracked() {
        let f = fixture();
        let source = "import 'https://cdn.example/x.js'\nimport '/@fob/client'\n";
        let out = f.rewriter.rewrite(source, "/src/main.js", None).await;

        assert_eq!(out.code.as_ref(), source);
        assert_eq!(out.status, RewriteStatus::Unchanged);
        assert!(out.diagnostics.is_empty());
        assert!(f.graph.importees("/src/main.js").is_empty());
    }

    #[tokio::test]
    async fn test_hot_accept_injection() {
        let f = fixture();
        let source = "import.meta.hot.accept()\nhot.accept(() => {})\nhot.accept('./a', m => {})\nhot.dispose(() => {})\n";
        let out = f.rewriter.rewrite(source, "/src/main.js", None).await;

        assert_eq!(
            out.code.as_ref(),
            "import.meta.hot.accept(\"/src/main.js\", \"/src/main.js\")\n\
             hot.accept(\"/src/main.js\", \"/src/main.js\", () => {})\n\
             hot.accept(\"/src/main.js\", '/src/a.js', m => {})\n\
             hot.dispose(\"/src/main.js\", () => {})\n"
        );
        assert!(f.graph.is_self_accepting("/src/main.js"));
        assert_eq!(f.graph.accepted_deps("/src/main.js"), vec!["/src/a.js", "/src/main.js"]);
        assert_eq!(f.graph.importers("/src/a.js"), vec!["/src/main.js"]);
    }

    #[tokio::test]
    async fn test_malformed_hot_accept_is_injected_but_not_recorded() {
        let f = fixture();
        let source = "hot.accept(handler)\nhot.accept([dep])\n";
        let out = f.rewriter.rewrite(source, "/src/main.js", None).await;

        assert_eq!(
            out.code.as_ref(),
            "hot.accept(\"/src/main.js\", handler)\nhot.accept(\"/src/main.js\", [dep])\n"
        );
        assert_eq!(out.status, RewriteStatus::Rewritten);
        assert_eq!(
            out.diagnostics
                .iter()
                .filter(|d| d.kind == DiagnosticKind::MalformedHotAccept)
                .count(),
            2
        );
        assert!(f.graph.accepted_deps("/src/main.js").is_empty());
    }

    #[tokio::test]
    async fn test_parse_failure_keeps_previous_edges() {
        let f = fixture();
        f.rewriter
            .rewrite("import './a'", "/src/main.js", None)
            .await;

        let broken = "import { from './a'";
        let out = f.rewriter.rewrite(broken, "/src/main.js", None).await;

        assert_eq!(out.status, RewriteStatus::ParseFailed);
        assert_eq!(out.code.as_ref(), broken);
        assert!(out.has(DiagnosticKind::ParseFailure));
        assert_eq!(f.graph.importees("/src/main.js"), vec!["/src/a.js"]);
    }

    #[tokio::test]
    async fn test_non_literal_dynamic_import() {
        let f = fixture();
        let source = "const m = import(`./pages/${name}.js`)\nimport('./a')";
        let out = f.rewriter.rewrite(source, "/src/main.js", None).await;

        assert!(out.has(DiagnosticKind::NonLiteralDynamicImport));
        assert!(out.code.contains("import(`./pages/${name}.js`)"));
        assert!(out.code.contains("import('/src/a.js')"));
    }

    #[tokio::test]
    async fn test_unresolved_import_is_reported() {
        let f = fixture();
        let out = f
            .rewriter
            .rewrite("import './missing'", "/src/main.js", None)
            .await;

        assert!(out.has(DiagnosticKind::UnresolvedImport));
        assert_eq!(out.code.as_ref(), "import '/src/missing'");
        assert_eq!(f.graph.importers("/src/missing"), vec!["/src/main.js"]);

        let again = f
            .rewriter
            .rewrite("import './missing'", "/src/main.js", None)
            .await;
        assert!(!again.from_cache);
    }

    #[tokio::test]
    async fn test_timestamp_only_for_dirty_and_sub_requests() {
        let f = fixture();
        f.dirty.record(42, ["/src/a.js".to_string()]);
        let source = "import './a.js'\nimport './style.css'\nimport './App.vue?type=template'\n";
        let out = f.rewriter.rewrite(source, "/src/main.js", Some(42)).await;

        assert_eq!(
            out.code.as_ref(),
            "import '/src/a.js?t=42'\nimport '/src/style.css?import'\nimport '/src/App.vue?type=template&t=42'\n"
        );
        assert!(!out.from_cache);
    }

    #[tokio::test]
    async fn test_cache_hit_replays_edges() {
        let f = fixture();
        let source = "import './a.js'";
        f.rewriter.rewrite(source, "/src/main.js", None).await;
        f.graph.update_module("/src/main.js", Vec::new(), Vec::new());
        assert!(f.graph.importers("/src/a.js").is_empty());

        let out = f.rewriter.rewrite(source, "/src/main.js", None).await;
        assert!(out.from_cache);
        assert_eq!(f.graph.importers("/src/a.js"), vec!["/src/main.js"]);

        assert!(f.rewriter.bust("/src/main.js"));
        let out = f.rewriter.rewrite(source, "/src/main.js", None).await;
        assert!(!out.from_cache);
    }

    #[tokio::test]
    async fn test_stale_edges_pruned_on_rewrite() {
        let f = fixture();
        f.rewriter
            .rewrite("import './a.js'\nimport './style.css'", "/src/main.js", None)
            .await;
        f.rewriter
            .rewrite("import './a.js'", "/src/main.js", None)
            .await;

        assert!(f.graph.importers("/src/style.css").is_empty());
        assert_eq!(f.graph.importers("/src/a.js"), vec!["/src/main.js"]);
        assert!(f.graph.is_symmetric());
    }
}
