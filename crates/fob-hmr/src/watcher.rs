//! File system watcher feeding the engine.
//!
//! Watches the project root recursively and forwards relevant changes over a
//! bounded channel, ignoring hidden files, configured patterns and repeats
//! of the same event on the same path inside the debounce window.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::runtime::RuntimeError;

/// Buffered events between the watcher thread and the engine.
const EVENT_BUFFER: usize = 256;

/// Debounce entries kept before old ones are swept.
const DEBOUNCE_SWEEP: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// Created or modified.
    Changed(PathBuf),
    Removed(PathBuf),
}

impl FileEvent {
    pub fn path(&self) -> &Path {
        match self {
            FileEvent::Changed(p) | FileEvent::Removed(p) => p,
        }
    }

    pub fn is_removal(&self) -> bool {
        matches!(self, FileEvent::Removed(_))
    }
}

/// Drops an event when the last admitted event for its path was of the same
/// kind and arrived within the window.
///
/// A change of kind always passes, so an unlink after an edit and the final
/// write of a remove-then-create save are both delivered.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_seen: FxHashMap<PathBuf, (bool, Instant)>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: FxHashMap::default(),
        }
    }

    pub fn admit(&mut self, event: &FileEvent, now: Instant) -> bool {
        let removal = event.is_removal();
        let repeat = self.last_seen.get(event.path()).is_some_and(|(kind, at)| {
            *kind == removal && now.saturating_duration_since(*at) < self.window
        });
        if repeat {
            return false;
        }
        if self.last_seen.len() >= DEBOUNCE_SWEEP {
            let window = self.window;
            self.last_seen
                .retain(|_, (_, at)| now.saturating_duration_since(*at) < window);
        }
        self.last_seen
            .insert(event.path().to_path_buf(), (removal, now));
        true
    }
}

/// Keeps the underlying watcher alive; dropping it stops the event stream.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher").field("root", &self.root).finish()
    }
}

impl FileWatcher {
    /// Start watching `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` does not exist or cannot be watched.
    pub fn new(
        root: PathBuf,
        ignore: Vec<String>,
        debounce_ms: u64,
    ) -> Result<(Self, mpsc::Receiver<FileEvent>)> {
        if !root.exists() {
            return Err(RuntimeError::FileNotFound(root).into());
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let mut debouncer = Debouncer::new(Duration::from_millis(debounce_ms));
        let filter_root = root.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "watch error");
                    return;
                }
            };

            for path in &event.paths {
                if should_ignore(path, &filter_root, &ignore) {
                    continue;
                }

                let change = match event.kind {
                    EventKind::Create(_) | EventKind::Modify(_) => FileEvent::Changed(path.clone()),
                    EventKind::Remove(_) => FileEvent::Removed(path.clone()),
                    _ => continue,
                };

                if !debouncer.admit(&change, Instant::now()) {
                    continue;
                }

                if tx.blocking_send(change).is_err() {
                    // receiver dropped; the engine has stopped
                    return;
                }
            }
        })?;

        watcher.watch(&root, RecursiveMode::Recursive)?;
        tracing::debug!(root = %root.display(), "watching for changes");

        Ok((
            Self {
                _watcher: watcher,
                root,
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Whether a path is outside the root, hidden, or matches an ignore pattern.
///
/// Patterns are either `*.ext` suffixes or exact path segment names.
pub fn should_ignore(path: &Path, root: &Path, ignore: &[String]) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return true;
    };
    if relative.as_os_str().is_empty() {
        return true;
    }

    let name = relative.to_string_lossy();
    for pattern in ignore {
        if let Some(suffix) = pattern.strip_prefix('*') {
            if name.ends_with(suffix) {
                return true;
            }
        }
    }

    relative.components().any(|component| {
        let Some(segment) = component.as_os_str().to_str() else {
            return false;
        };
        (segment.starts_with('.') && segment != "." && segment != "..")
            || ignore.iter().any(|pattern| pattern == segment)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> Vec<String> {
        vec!["node_modules".into(), "dist".into(), "*.log".into()]
    }

    #[test]
    fn test_ignores_configured_directories() {
        let root = PathBuf::from("/project");
        assert!(should_ignore(
            Path::new("/project/node_modules/vue/index.js"),
            &root,
            &patterns()
        ));
        assert!(should_ignore(Path::new("/project/dist/app.js"), &root, &patterns()));
        assert!(!should_ignore(Path::new("/project/src/index.js"), &root, &patterns()));
        // segment match, not prefix match
        assert!(!should_ignore(Path::new("/project/distance.js"), &root, &patterns()));
    }

    #[test]
    fn test_ignores_extension_patterns() {
        let root = PathBuf::from("/project");
        assert!(should_ignore(Path::new("/project/debug.log"), &root, &patterns()));
    }

    #[test]
    fn test_ignores_hidden_and_outside_paths() {
        let root = PathBuf::from("/project");
        assert!(should_ignore(Path::new("/project/.git/config"), &root, &[]));
        assert!(should_ignore(Path::new("/project/src/.cache/x.js"), &root, &[]));
        assert!(should_ignore(Path::new("/other/file.js"), &root, &[]));
    }

    #[test]
    fn test_debounce_drops_repeats_of_the_same_kind() {
        let mut debouncer = Debouncer::new(Duration::from_millis(50));
        let start = Instant::now();
        let changed = FileEvent::Changed(PathBuf::from("/project/a.js"));

        assert!(debouncer.admit(&changed, start));
        assert!(!debouncer.admit(&changed, start + Duration::from_millis(10)));
        assert!(debouncer.admit(&changed, start + Duration::from_millis(100)));
        // other paths are independent
        let other = FileEvent::Changed(PathBuf::from("/project/b.js"));
        assert!(debouncer.admit(&other, start + Duration::from_millis(100)));
    }

    #[test]
    fn test_debounce_passes_a_change_of_kind() {
        let mut debouncer = Debouncer::new(Duration::from_millis(50));
        let start = Instant::now();
        let path = PathBuf::from("/project/a.js");
        let changed = FileEvent::Changed(path.clone());
        let removed = FileEvent::Removed(path);

        assert!(debouncer.admit(&changed, start));
        assert!(debouncer.admit(&removed, start + Duration::from_millis(1)));
        // remove-then-create atomic save
        assert!(debouncer.admit(&changed, start + Duration::from_millis(2)));
        assert!(!debouncer.admit(&changed, start + Duration::from_millis(3)));
    }

    #[test]
    fn test_missing_root() {
        let err = FileWatcher::new(PathBuf::from("/definitely/not/here"), Vec::new(), 50);
        assert!(err.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reports_changes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let (_watcher, mut rx) = FileWatcher::new(root.clone(), patterns(), 0).unwrap();

        let file = root.join("main.js");
        std::fs::write(&file, "export {}").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.path(), file.as_path());
    }
}
