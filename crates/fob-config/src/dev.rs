//! Development engine configuration types.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};

/// Extensions probed when an import omits one, in probing order.
///
/// The order decides which file wins when several candidates exist
/// (`foo.js` beats `foo.ts`), so it is part of the resolution contract.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[".mjs", ".js", ".ts", ".jsx", ".tsx", ".json"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevConfig {
    /// Project root. Public paths are root-relative.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Exact-match import aliases (`"vue" -> "vue/dist/vue.esm-browser.js"`).
    #[serde(default)]
    pub alias: IndexMap<String, String>,

    /// Public paths treated as application entry boundaries.
    #[serde(default)]
    pub entries: Vec<String>,

    /// Directory (relative to root) holding pre-optimized dependencies.
    #[serde(default = "default_optimize_cache_dir")]
    pub optimize_cache_dir: PathBuf,

    /// Suffixes of framework single-file components.
    #[serde(default = "default_component_extensions")]
    pub component_extensions: Vec<String>,

    /// Suffixes of plain stylesheets, which hot-update without a graph walk.
    #[serde(default = "default_style_extensions")]
    pub style_extensions: Vec<String>,

    /// Style modules export class maps to JS and are walked like scripts.
    #[serde(default = "default_style_module_suffix")]
    pub style_module_suffix: String,

    /// Public path of the browser HMR runtime.
    #[serde(default = "default_client_path")]
    pub client_path: String,

    /// Websocket route of the update channel.
    #[serde(default = "default_hmr_path")]
    pub hmr_path: String,

    #[serde(default = "default_read_cache_capacity")]
    pub read_cache_capacity: usize,

    #[serde(default = "default_rewrite_cache_capacity")]
    pub rewrite_cache_capacity: usize,

    /// How many update timestamps keep their dirty set.
    #[serde(default = "default_dirty_history")]
    pub dirty_history: usize,

    /// Watcher ignore patterns: directory names or `*.ext` globs.
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Outbound buffer per connected client.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            alias: IndexMap::new(),
            entries: Vec::new(),
            optimize_cache_dir: default_optimize_cache_dir(),
            component_extensions: default_component_extensions(),
            style_extensions: default_style_extensions(),
            style_module_suffix: default_style_module_suffix(),
            client_path: default_client_path(),
            hmr_path: default_hmr_path(),
            read_cache_capacity: default_read_cache_capacity(),
            rewrite_cache_capacity: default_rewrite_cache_capacity(),
            dirty_history: default_dirty_history(),
            ignore: default_ignore(),
            debounce_ms: default_debounce_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl DevConfig {
    /// Create a default config rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Add an alias entry.
    pub fn with_alias(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.alias.insert(from.into(), to.into());
        self
    }

    /// Mark a public path as an entry boundary.
    pub fn with_entry(mut self, public_path: impl Into<String>) -> Self {
        self.entries.push(public_path.into());
        self
    }

    /// Absolute directory of pre-optimized dependencies.
    pub fn optimize_dir(&self) -> PathBuf {
        self.root.join(&self.optimize_cache_dir)
    }

    pub fn is_component(&self, path: &str) -> bool {
        self.component_extensions
            .iter()
            .any(|ext| path.ends_with(ext.as_str()))
    }

    /// Plain stylesheet (not a style module).
    pub fn is_plain_style(&self, path: &str) -> bool {
        !path.ends_with(self.style_module_suffix.as_str())
            && self
                .style_extensions
                .iter()
                .any(|ext| path.ends_with(ext.as_str()))
    }

    pub fn is_entry(&self, public_path: &str) -> bool {
        self.entries.iter().any(|e| e == public_path)
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("hmr_path", &self.hmr_path),
            ("client_path", &self.client_path),
        ] {
            if !value.starts_with('/') {
                return Err(ConfigError::invalid(
                    field,
                    format!("'{value}' must be a root-relative path starting with '/'"),
                ));
            }
        }

        for (field, value) in [
            ("read_cache_capacity", self.read_cache_capacity),
            ("rewrite_cache_capacity", self.rewrite_cache_capacity),
            ("dirty_history", self.dirty_history),
            ("channel_capacity", self.channel_capacity),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be greater than zero"));
            }
        }

        let extensions = self
            .component_extensions
            .iter()
            .map(|ext| ("component_extensions", ext))
            .chain(self.style_extensions.iter().map(|ext| ("style_extensions", ext)))
            .chain(std::iter::once(("style_module_suffix", &self.style_module_suffix)));
        for (field, ext) in extensions {
            if !ext.starts_with('.') || ext.len() < 2 {
                return Err(ConfigError::invalid(
                    field,
                    format!("'{ext}' must look like '.ext'"),
                ));
            }
        }

        for entry in &self.entries {
            if !entry.starts_with('/') {
                return Err(ConfigError::invalid(
                    "entries",
                    format!("entry '{entry}' must be a public path starting with '/'"),
                ));
            }
        }

        Ok(())
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_optimize_cache_dir() -> PathBuf {
    PathBuf::from("node_modules/.fob_opt_cache")
}

fn default_component_extensions() -> Vec<String> {
    vec![".vue".into()]
}

fn default_style_extensions() -> Vec<String> {
    vec![".css".into()]
}

fn default_style_module_suffix() -> String {
    ".module.css".into()
}

fn default_client_path() -> String {
    "/@fob/client".into()
}

fn default_hmr_path() -> String {
    "/__fob_hmr__".into()
}

fn default_read_cache_capacity() -> usize {
    10_000
}

fn default_rewrite_cache_capacity() -> usize {
    1024
}

fn default_dirty_history() -> usize {
    10
}

fn default_ignore() -> Vec<String> {
    vec!["node_modules".into(), "dist".into()]
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_channel_capacity() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = DevConfig::default();
        config.validate().unwrap();
        assert_eq!(config.hmr_path, "/__fob_hmr__");
        assert_eq!(config.dirty_history, 10);
        assert_eq!(config.read_cache_capacity, 10_000);
    }

    #[test]
    fn classifies_styles_and_components() {
        let config = DevConfig::default();
        assert!(config.is_plain_style("/src/app.css"));
        assert!(!config.is_plain_style("/src/app.module.css"));
        assert!(!config.is_plain_style("/src/app.js"));
        assert!(config.is_component("/src/App.vue"));
        assert!(!config.is_component("/src/App.vue.js"));
    }

    #[test]
    fn rejects_relative_hmr_path() {
        let config = DevConfig {
            hmr_path: "hmr".into(),
            ..DevConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("hmr_path"));
    }

    #[test]
    fn rejects_zero_capacity() {
        let config = DevConfig {
            dirty_history: 0,
            ..DevConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_extension() {
        let config = DevConfig {
            component_extensions: vec!["vue".into()],
            ..DevConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_deserialization_fills_defaults() {
        let config: DevConfig =
            serde_json::from_str(r#"{ "entries": ["/src/main.ts"], "alias": { "@": "/src" } }"#)
                .unwrap();
        assert_eq!(config.entries, vec!["/src/main.ts".to_string()]);
        assert_eq!(config.alias.get("@").map(String::as_str), Some("/src"));
        assert_eq!(config.client_path, "/@fob/client");
        assert!(config.is_entry("/src/main.ts"));
    }
}
