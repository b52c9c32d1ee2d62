//! File-based config discovery.
//!
//! Handles finding and layering the dev configuration:
//! defaults < `fob.toml` `[dev]` (or `package.json` `fob.dev`) < `FOB_DEV_*` env.

use std::fs;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format as _, Serialized, Toml};
use serde_json::Value;

use crate::dev::DevConfig;
use crate::error::{ConfigError, Result};

/// Environment prefix for overrides (`FOB_DEV_HMR_PATH=/hmr`).
pub const ENV_PREFIX: &str = "FOB_DEV_";

/// File-based configuration discovery.
///
/// # Example
///
/// ```no_run
/// use fob_config::ConfigDiscovery;
///
/// let config = ConfigDiscovery::new(".").load().unwrap();
/// println!("serving {}", config.root.display());
/// ```
pub struct ConfigDiscovery {
    root: PathBuf,
}

impl ConfigDiscovery {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Find a config file in the root directory.
    ///
    /// Searches in this order:
    /// 1. TOML config: fob.toml
    /// 2. package.json with a `fob` field
    pub fn find(&self) -> Option<PathBuf> {
        let toml_path = self.root.join("fob.toml");
        if toml_path.is_file() {
            return Some(toml_path);
        }

        let pkg_path = self.root.join("package.json");
        let content = fs::read_to_string(&pkg_path).ok()?;
        let parsed: Value = serde_json::from_str(&content).ok()?;
        parsed
            .get("fob")
            .filter(|fob| !fob.is_null())
            .map(|_| pkg_path)
    }

    /// Layer every source into a figment without extracting it.
    pub fn figment(&self) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(DevConfig::new(&self.root)));

        match self.find() {
            Some(path) if path.extension().is_some_and(|ext| ext == "toml") => {
                tracing::debug!(path = %path.display(), "loading dev config from fob.toml");
                figment = figment.merge(Figment::from(Toml::file(&path)).focus("dev"));
            }
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading dev config from package.json");
                let parsed: Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
                if let Some(dev) = parsed.get("fob").and_then(|fob| fob.get("dev")) {
                    if !dev.is_object() {
                        return Err(ConfigError::invalid("fob.dev", "must be an object"));
                    }
                    figment = figment.merge(Serialized::defaults(dev.clone()));
                }
            }
            None => tracing::debug!(root = %self.root.display(), "no config file, using defaults"),
        }

        Ok(figment.merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Load and validate the dev config.
    ///
    /// A relative `root` is resolved against the discovery directory.
    pub fn load(&self) -> Result<DevConfig> {
        if !self.root.is_dir() {
            return Err(ConfigError::RootNotFound(self.root.clone()));
        }

        let mut config: DevConfig = self.figment()?.extract()?;
        if config.root.is_relative() {
            config.root = self.root.join(&config.root);
        }
        config.validate()?;
        Ok(config)
    }
}

/// Discover and load config from the current directory.
pub fn discover() -> Result<DevConfig> {
    let root = std::env::current_dir()?;
    ConfigDiscovery::new(&root).load()
}
