//! Test utilities for the dev engine.
//!
//! `TestRuntime` is an in-memory filesystem whose modification times are
//! driven by a logical clock, so cache invalidation can be tested without
//! sleeping past the filesystem's timestamp resolution.

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};

use super::{FileMetadata, Runtime, RuntimeError, RuntimeResult};

#[derive(Debug, Clone)]
struct MemFile {
    content: Vec<u8>,
    modified: u64,
}

#[derive(Debug, Default)]
struct MemFs {
    files: FxHashMap<PathBuf, MemFile>,
    clock: u64,
    reads: usize,
}

/// In-memory runtime for tests.
///
/// ```rust
/// use fob_hmr::runtime::test_utils::TestRuntime;
/// use fob_hmr::Runtime;
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let runtime = TestRuntime::new();
/// runtime.write("/app/src/main.js", "import './dep.js'");
/// assert!(runtime.exists(Path::new("/app/src")));
/// let bytes = runtime.read_file(Path::new("/app/src/main.js")).await.unwrap();
/// assert_eq!(bytes, b"import './dep.js'");
/// # }
/// ```
#[derive(Debug, Default)]
pub struct TestRuntime {
    fs: Mutex<MemFs>,
}

impl TestRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a file, advancing its modification time.
    pub fn write(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let mut fs = self.fs.lock();
        fs.clock += 1;
        let modified = fs.clock;
        fs.files.insert(
            path.as_ref().to_path_buf(),
            MemFile {
                content: content.into(),
                modified,
            },
        );
    }

    /// Advance a file's modification time without changing its bytes.
    pub fn touch(&self, path: impl AsRef<Path>) {
        let mut fs = self.fs.lock();
        fs.clock += 1;
        let now = fs.clock;
        if let Some(file) = fs.files.get_mut(path.as_ref()) {
            file.modified = now;
        }
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        self.fs.lock().files.remove(path.as_ref());
    }

    /// Number of `read_file` calls that hit an existing file.
    pub fn read_count(&self) -> usize {
        self.fs.lock().reads
    }

    fn is_dir(fs: &MemFs, path: &Path) -> bool {
        fs.files
            .keys()
            .any(|file| file != path && file.starts_with(path))
    }
}

#[async_trait]
impl Runtime for TestRuntime {
    async fn read_file(&self, path: &Path) -> RuntimeResult<Vec<u8>> {
        let mut fs = self.fs.lock();
        let content = fs
            .files
            .get(path)
            .map(|file| file.content.clone())
            .ok_or_else(|| RuntimeError::FileNotFound(path.to_path_buf()))?;
        fs.reads += 1;
        Ok(content)
    }

    async fn metadata(&self, path: &Path) -> RuntimeResult<FileMetadata> {
        let fs = self.fs.lock();
        if let Some(file) = fs.files.get(path) {
            return Ok(FileMetadata {
                size: file.content.len() as u64,
                is_dir: false,
                is_file: true,
                modified: Some(file.modified),
            });
        }
        if Self::is_dir(&fs, path) {
            return Ok(FileMetadata {
                size: 0,
                is_dir: true,
                is_file: false,
                modified: None,
            });
        }
        Err(RuntimeError::FileNotFound(path.to_path_buf()))
    }

    fn exists(&self, path: &Path) -> bool {
        let fs = self.fs.lock();
        fs.files.contains_key(path) || Self::is_dir(&fs, path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.fs.lock().files.contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read() {
        let runtime = TestRuntime::new();
        runtime.write("/app/a.js", "a");

        let content = runtime.read_file(Path::new("/app/a.js")).await.unwrap();
        assert_eq!(content, b"a");
        assert_eq!(runtime.read_count(), 1);
    }

    #[tokio::test]
    async fn test_touch_advances_mtime() {
        let runtime = TestRuntime::new();
        runtime.write("/app/a.js", "a");
        let before = runtime.metadata(Path::new("/app/a.js")).await.unwrap();

        runtime.touch("/app/a.js");
        let after = runtime.metadata(Path::new("/app/a.js")).await.unwrap();

        assert!(after.modified > before.modified);
        assert_eq!(after.size, before.size);
    }

    #[test]
    fn test_directories_are_implied() {
        let runtime = TestRuntime::new();
        runtime.write("/app/src/util/index.ts", "");

        assert!(runtime.exists(Path::new("/app/src/util")));
        assert!(!runtime.is_file(Path::new("/app/src/util")));
        assert!(!runtime.exists(Path::new("/app/src/ut")));
    }

    #[tokio::test]
    async fn test_remove() {
        let runtime = TestRuntime::new();
        runtime.write("/app/a.js", "a");
        runtime.remove("/app/a.js");

        assert!(!runtime.exists(Path::new("/app/a.js")));
        assert!(matches!(
            runtime.read_file(Path::new("/app/a.js")).await,
            Err(RuntimeError::FileNotFound(_))
        ));
    }
}
