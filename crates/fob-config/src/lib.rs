//! Configuration for the fob unbundled dev engine.
//!
//! [`DevConfig`] holds every knob the engine reads. Library users build it
//! directly (every field has a default); the CLI path goes through
//! [`ConfigDiscovery`], which layers `fob.toml` / `package.json` and
//! `FOB_DEV_*` environment variables on top of the defaults.

pub mod dev;
pub mod discovery;
pub mod error;

pub use dev::{DevConfig, SUPPORTED_EXTENSIONS};
pub use discovery::{ConfigDiscovery, discover};
pub use error::{ConfigError, Result};
