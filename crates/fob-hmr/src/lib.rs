#![cfg_attr(docsrs, feature(doc_cfg))]

//! # fob-hmr
//!
//! Fob dev engine - serves ES modules to the browser unbundled, one request
//! per module, and pushes hot updates over a websocket when files change.
//!
//! Every served module has its import specifiers rewritten into fetchable
//! requests. The rewrite records importer/importee edges in a live
//! [`ModuleGraph`]; when a file changes, [`HmrEngine`] walks that graph to
//! the nearest modules able to take the update and [`UpdateChannel`]
//! broadcasts the result to connected clients.
//!
//! ## Quick Start
//!
//! ```no_run
//! use fob_config::DevConfig;
//! use fob_hmr::{DevEngine, FileWatcher, NativeRuntime, server::hmr_router};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DevConfig::new("./app").with_entry("/index.html");
//! let engine = Arc::new(DevEngine::new(config.clone(), Arc::new(NativeRuntime::new()))?);
//!
//! let module = engine.load_module("/src/main.js", None).await?;
//! println!("{}", module.code);
//!
//! let (_watcher, events) = FileWatcher::new(config.root.clone(), config.ignore.clone(), config.debounce_ms)?;
//! let app: axum::Router = hmr_router(&config.hmr_path, engine.channel());
//! # let _ = app;
//! engine.run(events).await;
//! # Ok(()) }
//! ```

pub mod cache;
pub mod channel;
pub mod engine;
pub mod error;
pub mod graph;
pub mod hmr;
pub mod paths;
pub mod resolver;
pub mod rewrite;
pub mod runtime;
pub mod server;
pub mod transform;
pub mod watcher;

// Logging utilities (optional, enabled with "logging" feature)
#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub mod logging;

#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub use logging::{LogLevel, init_logging, init_logging_from_env};

pub use cache::{CachedContent, ContentCache};
pub use channel::UpdateChannel;
pub use engine::{DevEngine, DevEngineBuilder, LoadedModule, ModuleKind};
pub use error::{Error, Result};
pub use graph::{DirtyFiles, EdgeDiff, ModuleGraph};
pub use hmr::{
    ComponentDescriptor, ComponentParser, HmrEngine, HmrMessage, HmrUpdate, Propagation,
    SfcBlockParser,
};
pub use resolver::{OptimizeCacheDir, OptimizedDeps, ResolveError, Resolver};
pub use rewrite::{Diagnostic, DiagnosticKind, ImportRewriter, RewriteOutput, RewriteStatus};
pub use runtime::native::NativeRuntime;
pub use runtime::{FileMetadata, Runtime, RuntimeError, RuntimeResult};
pub use transform::{CssModule, JsonModule, SourceTransform};
pub use watcher::{Debouncer, FileEvent, FileWatcher};

pub use fob_config::DevConfig;
