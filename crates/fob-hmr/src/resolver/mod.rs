//! Public path <-> file path resolution.
//!
//! Root-relative public paths map directly under the project root. Bare
//! imports are addressed as `/@modules/<id>` and located through the
//! pre-optimized cache, then `node_modules`. Paths without an extension are
//! completed by probing [`SUPPORTED_EXTENSIONS`] in order, then
//! `<path>/index<ext>` in the same order.
//!
//! Successful lookups are cached; failures are not, so a file created later
//! is picked up without a restart.

mod optimized;
mod package;

pub use optimized::{OptimizeCacheDir, OptimizedDeps};
pub use package::PackageManifest;

use dashmap::DashMap;
use fob_config::{DevConfig, SUPPORTED_EXTENSIONS};
use indexmap::IndexMap;
use path_clean::PathClean;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::paths::{self, MODULE_PREFIX};
use crate::runtime::Runtime;

/// Resolution failures. Surfaced to the serving layer as "not found".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("No file found for '{0}'")]
    NotFound(String),

    #[error("'{0}' resolves outside the project root")]
    OutsideRoot(String),
}

/// Outcome of resolving a bare import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BareResolution {
    /// `/@modules/...` request the browser will fetch.
    pub request: String,
    /// Set when `id` deep-imports into this pre-optimized package.
    pub deep_import_of: Option<String>,
}

/// A located file and the suffix inference added to the request.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Located {
    file: PathBuf,
    suffix: String,
}

#[derive(Debug)]
pub struct Resolver {
    root: PathBuf,
    runtime: Arc<dyn Runtime>,
    alias: IndexMap<String, String>,
    optimized: Arc<dyn OptimizedDeps>,
    /// Clean request path -> located file.
    requests: DashMap<String, Located>,
    /// Module file -> the `/@modules/` request that first reached it.
    module_requests: DashMap<PathBuf, String>,
    /// Package name -> `<pkg>/<entry>`.
    package_entries: DashMap<String, String>,
}

impl Resolver {
    pub fn new(config: &DevConfig, runtime: Arc<dyn Runtime>) -> Self {
        let optimized = Arc::new(OptimizeCacheDir::new(
            config.optimize_dir(),
            Arc::clone(&runtime),
        ));
        Self::with_optimized(config, runtime, optimized)
    }

    pub fn with_optimized(
        config: &DevConfig,
        runtime: Arc<dyn Runtime>,
        optimized: Arc<dyn OptimizedDeps>,
    ) -> Self {
        Self {
            root: config.root.clean(),
            runtime,
            alias: config.alias.clone(),
            optimized,
            requests: DashMap::new(),
            module_requests: DashMap::new(),
            package_entries: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Exact-match alias for an import identifier.
    pub fn alias(&self, id: &str) -> Option<&str> {
        self.alias.get(id).map(String::as_str)
    }

    /// Map a public path to the file that serves it.
    pub fn to_file(&self, public_path: &str) -> Result<PathBuf, ResolveError> {
        self.locate(public_path).map(|located| located.file)
    }

    /// Complete an extension-less request with the suffix inference found
    /// (`/src/util` -> `/src/util/index.ts`). Query strings are preserved.
    pub fn complete(&self, request: &str) -> Result<String, ResolveError> {
        let (path, query) = paths::split_query(request);
        if paths::has_extension(path) {
            return Ok(request.to_string());
        }
        let located = self.locate(path)?;
        Ok(format!(
            "{}{}{}",
            path.trim_end_matches('/'),
            located.suffix,
            query
        ))
    }

    /// Map a file back to its public path.
    pub fn to_public(&self, file: &Path) -> String {
        if let Some(request) = self.module_requests.get(file) {
            return request.clone();
        }
        match file.strip_prefix(&self.root) {
            Ok(relative) => format!("/{}", paths::slash(relative)),
            Err(_) => paths::slash(file),
        }
    }

    /// Resolve a bare identifier to its `/@modules/` request.
    ///
    /// Pre-optimized ids are served verbatim; otherwise the package entry is
    /// read from `package.json`. Anything else is passed through as a deep
    /// import into `node_modules`.
    pub async fn resolve_bare(&self, id: &str) -> BareResolution {
        if self.optimized.resolve(id).is_some() {
            return BareResolution {
                request: format!("{MODULE_PREFIX}{id}"),
                deep_import_of: None,
            };
        }

        if let Some(entry) = self.package_entry(id).await {
            return BareResolution {
                request: format!("{MODULE_PREFIX}{entry}"),
                deep_import_of: None,
            };
        }

        let package = paths::package_name(id);
        let deep_import_of = (package != id && self.optimized.resolve(package).is_some())
            .then(|| package.to_string());
        BareResolution {
            request: format!("{MODULE_PREFIX}{id}"),
            deep_import_of,
        }
    }

    /// Drop every cached resolution that points at `file`.
    pub fn forget(&self, file: &Path) {
        self.requests.retain(|_, located| located.file != file);
        self.module_requests.remove(file);
    }

    async fn package_entry(&self, id: &str) -> Option<String> {
        if let Some(entry) = self.package_entries.get(id) {
            return Some(entry.clone());
        }

        let manifest_path = self
            .node_modules_dirs()
            .map(|dir| dir.join(id).join("package.json"))
            .find(|candidate| self.runtime.is_file(candidate))?;

        let bytes = match self.runtime.read_file(&manifest_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(path = %manifest_path.display(), error = %e, "failed to read package.json");
                return None;
            }
        };
        let manifest = match std::str::from_utf8(&bytes)
            .ok()
            .and_then(|source| PackageManifest::parse(source).ok())
        {
            Some(manifest) => manifest,
            None => {
                tracing::warn!(path = %manifest_path.display(), "invalid package.json");
                return None;
            }
        };

        let entry = paths::normalize(&format!("/{id}/{}", manifest.entry()))
            .trim_start_matches('/')
            .to_string();
        tracing::debug!(id, entry = %entry, "resolved package entry");
        self.package_entries.insert(id.to_string(), entry.clone());
        Some(entry)
    }

    fn node_modules_dirs(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.root.ancestors().map(|dir| dir.join("node_modules"))
    }

    fn locate(&self, public_path: &str) -> Result<Located, ResolveError> {
        let path = paths::clean_url(public_path);
        if let Some(located) = self.requests.get(path) {
            return Ok(located.clone());
        }

        let located = match path.strip_prefix(MODULE_PREFIX) {
            Some(id) => self.locate_module(id)?,
            None => {
                let relative = path.trim_start_matches('/');
                let file = self.root.join(relative).clean();
                if !file.starts_with(&self.root) {
                    return Err(ResolveError::OutsideRoot(path.to_string()));
                }
                self.infer(&file, path.ends_with('/'))
                    .ok_or_else(|| ResolveError::NotFound(path.to_string()))?
            }
        };

        self.requests.insert(path.to_string(), located.clone());
        Ok(located)
    }

    fn locate_module(&self, id: &str) -> Result<Located, ResolveError> {
        let request = format!("{MODULE_PREFIX}{id}");
        let located = match self.optimized.resolve(id) {
            Some(file) => Located {
                file,
                suffix: String::new(),
            },
            None => self
                .node_modules_dirs()
                .find_map(|dir| self.infer(&dir.join(id), id.ends_with('/')))
                .ok_or_else(|| ResolveError::NotFound(request.clone()))?,
        };
        self.module_requests
            .entry(located.file.clone())
            .or_insert(request);
        Ok(located)
    }

    /// Probe `path` as given, then with each extension, then `index<ext>`.
    fn infer(&self, path: &Path, directory: bool) -> Option<Located> {
        let has_ext = path
            .file_name()
            .map(|name| paths::has_extension(&name.to_string_lossy()))
            .unwrap_or(false);
        if !directory && has_ext {
            return self.runtime.is_file(path).then(|| Located {
                file: path.to_path_buf(),
                suffix: String::new(),
            });
        }

        let base = path.as_os_str().to_string_lossy();
        if !directory {
            for ext in SUPPORTED_EXTENSIONS {
                let candidate = PathBuf::from(format!("{base}{ext}"));
                if self.runtime.is_file(&candidate) {
                    return Some(Located {
                        file: candidate,
                        suffix: (*ext).to_string(),
                    });
                }
            }
        }
        for ext in SUPPORTED_EXTENSIONS {
            let candidate = path.join(format!("index{ext}"));
            if self.runtime.is_file(&candidate) {
                return Some(Located {
                    file: candidate,
                    suffix: format!("/index{ext}"),
                });
            }
        }
        (!directory && self.runtime.is_file(path)).then(|| Located {
            file: path.to_path_buf(),
            suffix: String::new(),
        })
    }
}
