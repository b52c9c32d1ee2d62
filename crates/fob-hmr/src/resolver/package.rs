//! Package manifest entry selection.

use serde::Deserialize;
use serde_json::Value;

/// The subset of `package.json` that decides a package's browser entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageManifest {
    #[serde(default)]
    pub exports: Option<Value>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub main: Option<String>,
}

impl PackageManifest {
    pub fn parse(source: &str) -> serde_json::Result<Self> {
        serde_json::from_str(source)
    }

    /// Entry file relative to the package directory.
    ///
    /// `exports` (a string, a `"."` string, or `"."."import"`), then
    /// `module`, then `main`, then `index.js`.
    pub fn entry(&self) -> &str {
        self.exports_entry()
            .or(self.module.as_deref())
            .or(self.main.as_deref())
            .unwrap_or("index.js")
    }

    fn exports_entry(&self) -> Option<&str> {
        match self.exports.as_ref()? {
            Value::String(entry) => Some(entry.as_str()),
            Value::Object(map) => match map.get(".")? {
                Value::String(entry) => Some(entry.as_str()),
                Value::Object(conditions) => conditions.get("import")?.as_str(),
                _ => None,
            },
            _ => None,
        }
    }
}
