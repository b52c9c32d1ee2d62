//! Pre-optimized dependency lookup.

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use crate::runtime::Runtime;

/// Answers "is this bare id pre-optimized, and where is it".
///
/// The optimizer itself runs elsewhere; the dev engine only consults its
/// output.
pub trait OptimizedDeps: Send + Sync + Debug {
    fn resolve(&self, id: &str) -> Option<PathBuf>;
}

/// Optimizer output laid out as `<dir>/<id>.js`.
#[derive(Debug)]
pub struct OptimizeCacheDir {
    dir: PathBuf,
    runtime: Arc<dyn Runtime>,
}

impl OptimizeCacheDir {
    pub fn new(dir: impl Into<PathBuf>, runtime: Arc<dyn Runtime>) -> Self {
        Self {
            dir: dir.into(),
            runtime,
        }
    }
}

impl OptimizedDeps for OptimizeCacheDir {
    fn resolve(&self, id: &str) -> Option<PathBuf> {
        let file = if id.ends_with(".js") {
            self.dir.join(id)
        } else {
            self.dir.join(format!("{id}.js"))
        };
        self.runtime.is_file(&file).then_some(file)
    }
}
