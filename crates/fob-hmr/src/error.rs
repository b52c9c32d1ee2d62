use std::path::PathBuf;

use crate::resolver::ResolveError;
use crate::runtime::RuntimeError;

/// Error types for dev engine operations.
///
/// Recoverable per-module conditions (parse failures, malformed hot calls,
/// unresolved imports) are not errors: they travel as diagnostics on
/// [`crate::RewriteOutput`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Config(#[from] fob_config::ConfigError),

    /// Served source files must be UTF-8.
    #[error("{0} is not valid UTF-8")]
    NotUtf8(PathBuf),

    #[error("Transform failed for {path}: {message}")]
    Transform { path: String, message: String },

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result type alias for dev engine operations.
pub type Result<T> = std::result::Result<T, Error>;
