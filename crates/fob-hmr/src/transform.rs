//! Source transforms applied before import rewriting.
//!
//! Transpilers and preprocessors plug in here. A failing transform never
//! fails the request: the engine logs it and serves the untransformed text.

use fob_config::DevConfig;

use crate::error::{Error, Result};
use crate::paths::{self, IMPORT_MARKER};

pub trait SourceTransform: Send + Sync + std::fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Whether this transform handles `request`, query string included.
    fn applies_to(&self, request: &str) -> bool;

    /// Whether the output is an ES module that should have its imports rewritten.
    fn yields_module(&self) -> bool {
        true
    }

    fn transform(&self, source: &str, public_path: &str) -> Result<String>;
}

/// Serves `.json` files as `export default <json>` modules.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonModule;

impl SourceTransform for JsonModule {
    fn name(&self) -> &str {
        "json"
    }

    fn applies_to(&self, request: &str) -> bool {
        paths::extension(request) == Some(".json")
    }

    fn transform(&self, source: &str, public_path: &str) -> Result<String> {
        let value: serde_json::Value =
            serde_json::from_str(source).map_err(|e| Error::Transform {
                path: public_path.to_string(),
                message: e.to_string(),
            })?;
        Ok(format!("export default {value}"))
    }
}

/// Serves stylesheets imported from scripts (`?import`) as modules that
/// register the stylesheet with the client runtime.
///
/// Plain requests for the same path still get the raw CSS.
#[derive(Debug, Clone)]
pub struct CssModule {
    client_path: String,
    extensions: Vec<String>,
}

impl CssModule {
    pub fn new(config: &DevConfig) -> Self {
        Self {
            client_path: config.client_path.clone(),
            extensions: config.style_extensions.clone(),
        }
    }
}

impl SourceTransform for CssModule {
    fn name(&self) -> &str {
        "css"
    }

    fn applies_to(&self, request: &str) -> bool {
        let path = paths::clean_url(request);
        paths::has_query_param(request, IMPORT_MARKER)
            && self.extensions.iter().any(|ext| path.ends_with(ext.as_str()))
    }

    fn transform(&self, _source: &str, public_path: &str) -> Result<String> {
        let json = |value: &str| serde_json::to_string(value);
        Ok(format!(
            "import {{ updateStyle }} from {}\nupdateStyle({}, {})",
            json(&self.client_path)?,
            json(&paths::hash_id(public_path))?,
            json(public_path)?,
        ))
    }
}
