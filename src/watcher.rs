//! Watching the open document for external edits.

use std::collections::hash_map::DefaultHasher;
use std::ffi::OsString;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::scheduler::Debouncer;

/// Watches one document and reports debounced external changes.
///
/// Writes announced through [`expect_own_write`](Self::expect_own_write)
/// are not reported, so saving a committed note does not trigger a reload.
pub struct DocumentWatcher {
    _watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
    watch_root: PathBuf,
    target_path: PathBuf,
    target_name: Option<OsString>,
    started: Instant,
    pending: Debouncer<()>,
    own_write: Option<u64>,
}

impl DocumentWatcher {
    /// Watch `path`, reporting a change once events stop for `debounce`.
    ///
    /// # Errors
    /// Returns an error if the platform watcher cannot be created or the
    /// containing directory cannot be watched.
    pub fn new(path: impl AsRef<Path>, debounce: Duration) -> notify::Result<Self> {
        // Event paths arrive canonical
        let target_path = path
            .as_ref()
            .canonicalize()
            .unwrap_or_else(|_| path.as_ref().to_path_buf());
        let target_name = target_path.file_name().map(std::ffi::OsStr::to_os_string);
        let watch_root = watch_root_for(&target_path);

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        watcher.watch(&watch_root, RecursiveMode::NonRecursive)?;

        #[allow(clippy::cast_possible_truncation)]
        let debounce_ms = debounce.as_millis() as u64;
        Ok(Self {
            _watcher: watcher,
            rx,
            watch_root,
            target_path,
            target_name,
            started: Instant::now(),
            pending: Debouncer::new(debounce_ms),
            own_write: None,
        })
    }

    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    /// Announce that the engine is about to write `contents` to the file.
    pub fn expect_own_write(&mut self, contents: &str) {
        self.own_write = Some(content_hash(contents));
    }

    /// Returns true once a debounced external change is ready.
    pub fn take_change_ready(&mut self) -> bool {
        let now_ms = self.now_ms();
        let mut relevant = 0u32;
        let mut ignored = 0u32;
        while let Ok(event) = self.rx.try_recv() {
            match event {
                Ok(ev) if self.is_relevant(&ev) => relevant += 1,
                Ok(ev) => {
                    ignored += 1;
                    crate::perf::log_event(
                        "watcher.ignored",
                        format!("kind={:?} paths={:?}", ev.kind, ev.paths),
                    );
                }
                Err(err) => tracing::warn!("file watcher error: {err}"),
            }
        }
        if relevant > 0 {
            crate::perf::log_event(
                "watcher.poll",
                format!(
                    "relevant={relevant} ignored={ignored} target={} root={}",
                    self.target_path.display(),
                    self.watch_root.display()
                ),
            );
            self.pending.queue((), now_ms);
        }

        if self.pending.take_ready(now_ms).is_none() {
            return false;
        }
        if self.own_write.is_some() {
            let current = std::fs::read_to_string(&self.target_path).ok();
            if self.take_own_write(current.as_deref()) {
                tracing::debug!(path = %self.target_path.display(), "skipping own write");
                return false;
            }
        }
        true
    }

    /// Whether `current` is the announced write. The announcement is used up
    /// either way, so later writes of the same content are reported.
    fn take_own_write(&mut self, current: Option<&str>) -> bool {
        self.own_write
            .take()
            .is_some_and(|expected| current.map(content_hash) == Some(expected))
    }

    fn now_ms(&self) -> u64 {
        #[allow(clippy::cast_possible_truncation)]
        let elapsed = self.started.elapsed().as_millis() as u64;
        elapsed
    }

    fn is_relevant(&self, event: &Event) -> bool {
        event.paths.iter().any(|path| {
            path == &self.watch_root
                || path == &self.target_path
                || self
                    .target_name
                    .as_ref()
                    .is_some_and(|name| path.file_name().is_some_and(|f| f == name))
        })
    }
}

fn content_hash(contents: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    contents.hash(&mut hasher);
    hasher.finish()
}

fn watch_root_for(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::EventKind;
    use tempfile::tempdir;

    fn wait_for_change(watcher: &mut DocumentWatcher, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if watcher.take_change_ready() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        false
    }

    #[test]
    fn test_directory_level_event_is_relevant() {
        let dir = tempdir().expect("tempdir");
        let canonical_dir = dir.path().canonicalize().expect("canonicalize");
        let path = canonical_dir.join("notes.md");
        std::fs::write(&path, "hi").expect("write");
        let watcher = DocumentWatcher::new(&path, Duration::from_millis(10)).expect("watcher");

        let event = Event {
            kind: EventKind::Any,
            paths: vec![canonical_dir],
            attrs: notify::event::EventAttributes::new(),
        };
        assert!(watcher.is_relevant(&event));
    }

    #[test]
    fn test_sibling_file_event_is_ignored() {
        let dir = tempdir().expect("tempdir");
        let canonical_dir = dir.path().canonicalize().expect("canonicalize");
        let path = canonical_dir.join("notes.md");
        std::fs::write(&path, "hi").expect("write");
        let watcher = DocumentWatcher::new(&path, Duration::from_millis(10)).expect("watcher");

        let event = Event {
            kind: EventKind::Any,
            paths: vec![canonical_dir.join("other.md")],
            attrs: notify::event::EventAttributes::new(),
        };
        assert!(!watcher.is_relevant(&event));
    }

    #[test]
    fn test_watch_root_for_relative_file_is_dot() {
        assert_eq!(watch_root_for(Path::new("notes.md")), PathBuf::from("."));
    }

    #[test]
    fn test_own_write_announcement_is_used_once() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().canonicalize().expect("canonicalize").join("notes.md");
        std::fs::write(&path, "original").expect("write");
        let mut watcher = DocumentWatcher::new(&path, Duration::from_millis(10)).expect("watcher");

        watcher.expect_own_write("saved");
        assert!(watcher.take_own_write(Some("saved")));
        // An external write restoring the same content is a real change
        assert!(!watcher.take_own_write(Some("saved")));

        watcher.expect_own_write("saved");
        assert!(!watcher.take_own_write(Some("edited elsewhere")));
        assert!(!watcher.take_own_write(Some("saved")));
    }

    #[test]
    fn test_external_modification_detected() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().canonicalize().expect("canonicalize").join("notes.md");
        std::fs::write(&path, "original").expect("write");
        let mut watcher = DocumentWatcher::new(&path, Duration::from_millis(50)).expect("watcher");

        // Let the backend register the watch
        std::thread::sleep(Duration::from_millis(500));
        std::fs::write(&path, "modified").expect("write");

        assert!(wait_for_change(&mut watcher, Duration::from_secs(5)));
    }

    #[test]
    fn test_own_write_is_not_reported() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().canonicalize().expect("canonicalize").join("notes.md");
        std::fs::write(&path, "original").expect("write");
        let mut watcher = DocumentWatcher::new(&path, Duration::from_millis(50)).expect("watcher");

        std::thread::sleep(Duration::from_millis(500));
        watcher.expect_own_write("saved by engine");
        std::fs::write(&path, "saved by engine").expect("write");

        assert!(!wait_for_change(&mut watcher, Duration::from_secs(1)));
    }
}
