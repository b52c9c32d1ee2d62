//! HTML entry documents.
//!
//! Module scripts of an HTML page are rewritten like any other module, with
//! the page itself as the importer. The client runtime is injected into
//! `<head>` so every page opens the update channel.

use indexmap::IndexSet;
use regex::Regex;
use std::sync::{Arc, LazyLock};

use super::{Diagnostic, ImportRewriter, RewriteOutput, RewriteStatus, SourceEdits};

static SCRIPT_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b([^>]*)>(.*?)</script\s*>").ok());

static SRC_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)\bsrc\s*=\s*["']([^"']+)["']"#).ok());

static MODULE_TYPE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)\btype\s*=\s*["']?module["']?"#).ok());

static HEAD_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?i)<head\b[^>]*>").ok());

impl ImportRewriter {
    /// Rewrite the module scripts of an HTML page and record their imports
    /// as the page's edges.
    pub async fn rewrite_html(
        &self,
        html: &str,
        importer: &str,
        timestamp: Option<u64>,
    ) -> RewriteOutput {
        let (Some(script_re), Some(src_re), Some(module_re)) = (
            SCRIPT_RE.as_ref(),
            SRC_RE.as_ref(),
            MODULE_TYPE_RE.as_ref(),
        ) else {
            return RewriteOutput {
                code: html.into(),
                status: RewriteStatus::Unchanged,
                diagnostics: Vec::new(),
                importees: Vec::new(),
                from_cache: false,
            };
        };

        let mut edits = SourceEdits::new();
        let mut importees: IndexSet<String> = IndexSet::new();
        let mut accepted: IndexSet<String> = IndexSet::new();
        let mut diagnostics: Vec<Diagnostic> = Vec::new();

        for script in script_re.captures_iter(html) {
            let (Some(attrs), Some(body)) = (script.get(1), script.get(2)) else {
                continue;
            };
            if !module_re.is_match(attrs.as_str()) {
                continue;
            }

            if let Some(src) = src_re.captures(attrs.as_str()).and_then(|c| c.get(1)) {
                let resolved = self.resolve_import(importer, src.as_str(), timestamp).await;
                let start = (attrs.start() + src.start()) as u32;
                let end = (attrs.start() + src.end()) as u32;
                edits.overwrite(html, start, end, resolved.request);
                importees.extend(resolved.importee);
                diagnostics.extend(resolved.diagnostic);
                continue;
            }

            if body.as_str().trim().is_empty() {
                continue;
            }
            match self.rewrite_pass(body.as_str(), importer, timestamp).await {
                Ok(pass) => {
                    if pass.changed {
                        edits.overwrite(html, body.start() as u32, body.end() as u32, pass.code);
                    }
                    importees.extend(pass.importees);
                    accepted.extend(pass.accepted);
                    diagnostics.extend(pass.diagnostics);
                }
                Err(diagnostic) => diagnostics.push(diagnostic),
            }
        }

        if !html.contains(self.client_path.as_str()) {
            let tag = format!(
                "<script type=\"module\">import \"{}\"</script>",
                self.client_path
            );
            let at = HEAD_RE
                .as_ref()
                .and_then(|re| re.find(html))
                .map_or(0, |head| head.end() as u32);
            edits.insert(at, tag);
        }

        let importees: Vec<String> = importees.into_iter().collect();
        self.graph
            .update_module(importer, importees.clone(), accepted);

        let status = if edits.is_empty() {
            RewriteStatus::Unchanged
        } else {
            RewriteStatus::Rewritten
        };
        let code: Arc<str> = edits.apply(html).into();
        RewriteOutput {
            code,
            status,
            diagnostics,
            importees,
            from_cache: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{DirtyFiles, ModuleGraph};
    use crate::resolver::Resolver;
    use crate::runtime::test_utils::TestRuntime;
    use fob_config::DevConfig;

    fn rewriter() -> (Arc<ModuleGraph>, ImportRewriter) {
        let runtime = Arc::new(TestRuntime::new());
        runtime.write("/app/src/main.ts", "");
        runtime.write("/app/src/inline.js", "");
        let config = DevConfig::new("/app");
        let resolver = Arc::new(Resolver::new(&config, runtime));
        let graph = Arc::new(ModuleGraph::new());
        let dirty = Arc::new(DirtyFiles::new(config.dirty_history));
        let rewriter = ImportRewriter::new(&config, resolver, graph.clone(), dirty);
        (graph, rewriter)
    }

    const PAGE: &str = r#"<!doctype html>
<html>
  <head>
    <title>app</title>
  </head>
  <body>
    <script type="module" src="/src/main"></script>
    <script type="module">
      import './src/inline'
    </script>
    <script>window.legacy = true</script>
  </body>
</html>
"#;

    #[tokio::test]
    async fn test_rewrites_scripts_and_records_edges() {
        let (graph, rewriter) = rewriter();
        let out = rewriter.rewrite_html(PAGE, "/index.html", None).await;

        assert_eq!(out.status, RewriteStatus::Rewritten);
        assert!(out.code.contains(r#"src="/src/main.ts""#));
        assert!(out.code.contains("import '/src/inline.js'"));
        assert!(out.code.contains("window.legacy = true"));
        assert!(out.code.contains(
            "<head><script type=\"module\">import \"/@fob/client\"</script>"
        ));
        assert_eq!(
            graph.importees("/index.html"),
            vec!["/src/inline.js", "/src/main.ts"]
        );
        assert_eq!(graph.importers("/src/main.ts"), vec!["/index.html"]);
    }

    #[tokio::test]
    async fn test_client_is_injected_once() {
        let (_, rewriter) = rewriter();
        let first = rewriter.rewrite_html(PAGE, "/index.html", None).await;
        let second = rewriter.rewrite_html(&first.code, "/index.html", None).await;

        assert_eq!(second.status, RewriteStatus::Unchanged);
        assert_eq!(first.code, second.code);
        assert_eq!(second.code.matches("/@fob/client").count(), 1);
    }

    #[tokio::test]
    async fn test_page_without_head() {
        let (graph, rewriter) = rewriter();
        let out = rewriter
            .rewrite_html("<p>hi</p>", "/plain.html", None)
            .await;

        assert!(out.code.starts_with("<script type=\"module\">import \"/@fob/client\"</script>"));
        assert!(graph.importees("/plain.html").is_empty());
    }
}
