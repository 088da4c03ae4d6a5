//! Preset discovery: walks a directory tree for `.milk` / `.prjm` files and
//! rebuilds the engine playlist from what it finds.

use std::{
    fs, io,
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use walkdir::WalkDir;

use crate::{
    engine::{EngineHandle, PlaylistEntry},
    Result, VisualiserError,
};

/// Recognised preset extensions, matched case-insensitively.
pub const PRESET_EXTENSIONS: [&str; 2] = ["milk", "prjm"];

/// Cooperative cancellation flag checked between directory entries.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub fn is_preset_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            PRESET_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Iterator over the presets below a root directory, in file-name order with
/// each directory listed before its contents. It ends early, without error,
/// once the abort signal is raised.
pub struct PresetScan {
    walker: walkdir::IntoIter,
    abort: AbortSignal,
    aborted: bool,
}

impl PresetScan {
    /// Resolves `root` to a canonical directory. Fails with
    /// [`VisualiserError::DirectoryUnavailable`] if it is missing, not a
    /// directory, or unreadable.
    pub fn new(root: &Path, abort: AbortSignal) -> Result<Self> {
        let unavailable = |source: io::Error| VisualiserError::DirectoryUnavailable {
            path: root.to_path_buf(),
            source,
        };
        let canonical = fs::canonicalize(root).map_err(unavailable)?;
        if !canonical.is_dir() {
            return Err(unavailable(io::Error::new(
                io::ErrorKind::Other,
                "not a directory",
            )));
        }
        fs::read_dir(&canonical).map_err(unavailable)?;

        let walker = WalkDir::new(&canonical)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter();
        Ok(Self {
            walker,
            abort,
            aborted: false,
        })
    }

    pub fn was_aborted(&self) -> bool {
        self.aborted
    }
}

impl Iterator for PresetScan {
    type Item = PlaylistEntry;

    fn next(&mut self) -> Option<PlaylistEntry> {
        loop {
            if self.aborted {
                return None;
            }
            if self.abort.is_raised() {
                self.aborted = true;
                return None;
            }

            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(%err, "skipping unreadable preset entry");
                    continue;
                }
            };
            if entry.file_type().is_dir() || !is_preset_file(entry.path()) {
                continue;
            }

            let display_name = entry
                .path()
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Some(PlaylistEntry::new(entry.into_path(), display_name));
        }
    }
}

/// Result of a full scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub entries: Vec<PlaylistEntry>,
    pub aborted: bool,
}

pub fn scan_presets(root: &Path, abort: &AbortSignal) -> Result<ScanOutcome> {
    let mut scan = PresetScan::new(root, abort.clone())?;
    let entries: Vec<_> = scan.by_ref().collect();
    Ok(ScanOutcome {
        entries,
        aborted: scan.was_aborted(),
    })
}

/// Rebuilds the engine playlist from `root`.
///
/// The scan runs without the engine lock; the collected set then replaces
/// the playlist in one locked step. An empty `root` clears the playlist. If
/// the directory is unavailable the playlist is cleared and the error
/// returned. An aborted scan publishes what it found so far.
pub fn reload(root: &Path, abort: &AbortSignal, engine: &EngineHandle) -> Result<usize> {
    if root.as_os_str().is_empty() {
        engine.clear_playlist();
        return Ok(0);
    }

    let mut scan = match PresetScan::new(root, abort.clone()) {
        Ok(scan) => scan,
        Err(err) => {
            engine.clear_playlist();
            return Err(err);
        }
    };
    let count = publish(scan.by_ref(), engine);
    if scan.was_aborted() {
        tracing::info!(root = %root.display(), found = count, "preset scan aborted");
    }
    tracing::debug!(root = %root.display(), count, "playlist rebuilt");
    Ok(count)
}

/// Drains `entries` without the engine lock, then swaps them in as the new
/// playlist in one locked step. Returns the published size.
pub fn publish(entries: impl Iterator<Item = PlaylistEntry>, engine: &EngineHandle) -> usize {
    let entries: Vec<_> = entries.collect();
    engine.replace_playlist(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EventLog, RecordingEngine};
    use tempfile::TempDir;

    fn preset_tree() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.milk"), "").unwrap();
        fs::write(dir.path().join("b.txt"), "").unwrap();
        fs::write(dir.path().join("c.PRJM"), "").unwrap();
        fs::create_dir(dir.path().join("subdir")).unwrap();
        fs::write(dir.path().join("subdir").join("d.milk"), "").unwrap();
        dir
    }

    fn engine() -> EngineHandle {
        EngineHandle::from_engine(Box::new(RecordingEngine::new(EventLog::default())))
    }

    #[test]
    fn matches_extensions_case_insensitively() {
        assert!(is_preset_file(Path::new("x/a.milk")));
        assert!(is_preset_file(Path::new("x/a.MILK")));
        assert!(is_preset_file(Path::new("x/a.Prjm")));
        assert!(!is_preset_file(Path::new("x/a.txt")));
        assert!(!is_preset_file(Path::new("x/milk")));
    }

    #[test]
    fn finds_presets_recursively() {
        let dir = preset_tree();

        let outcome = scan_presets(dir.path(), &AbortSignal::new()).unwrap();

        let names: Vec<_> = outcome
            .entries
            .iter()
            .map(|entry| entry.display_name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "c", "d"]);
        assert!(!outcome.aborted);
        assert!(outcome.entries.iter().all(|entry| entry.rating == Default::default()));
        assert!(outcome.entries.iter().all(|entry| entry.path.is_absolute()));
        assert!(outcome.entries[2].path.ends_with("subdir/d.milk"));
    }

    #[test]
    fn reload_populates_engine() {
        let dir = preset_tree();
        let engine = engine();

        let count = reload(dir.path(), &AbortSignal::new(), &engine).unwrap();

        assert_eq!(count, 3);
        assert_eq!(engine.playlist_size(), 3);
    }

    #[test]
    fn abort_after_first_entry_returns_partial_result() {
        let dir = preset_tree();
        let abort = AbortSignal::new();
        let mut scan = PresetScan::new(dir.path(), abort.clone()).unwrap();

        let first = scan.next().unwrap();
        abort.raise();
        let rest: Vec<_> = scan.by_ref().collect();

        assert_eq!(first.display_name, "a");
        assert!(rest.is_empty());
        assert!(scan.was_aborted());
    }

    #[test]
    fn abort_mid_reload_publishes_the_partial_set() {
        let dir = preset_tree();
        let engine = engine();
        reload(dir.path(), &AbortSignal::new(), &engine).unwrap();
        assert_eq!(engine.playlist_size(), 3);

        let abort = AbortSignal::new();
        let mut scan = PresetScan::new(dir.path(), abort.clone()).unwrap();
        let count = publish(scan.by_ref().inspect(|_| abort.raise()), &engine);

        assert!(scan.was_aborted());
        assert_eq!(count, 1);
        assert_eq!(engine.playlist_size(), count);
    }

    #[test]
    fn abort_raised_during_reload_is_not_an_error() {
        let root = tempfile::tempdir().unwrap();
        for index in 0..2000 {
            fs::write(root.path().join(format!("p{index:04}.milk")), "").unwrap();
        }
        let engine = engine();
        let abort = AbortSignal::new();

        let raiser = {
            let abort = abort.clone();
            std::thread::spawn(move || abort.raise())
        };
        let count = reload(root.path(), &abort, &engine).unwrap();
        raiser.join().unwrap();

        assert!(count <= 2000);
        assert_eq!(engine.playlist_size(), count);
    }

    #[test]
    fn raised_signal_yields_empty_playlist_without_error() {
        let dir = preset_tree();
        let engine = engine();
        let abort = AbortSignal::new();
        abort.raise();

        assert_eq!(reload(dir.path(), &abort, &engine).unwrap(), 0);
        assert_eq!(engine.playlist_size(), 0);
    }

    #[test]
    fn empty_root_clears_playlist() {
        let dir = preset_tree();
        let engine = engine();
        reload(dir.path(), &AbortSignal::new(), &engine).unwrap();

        assert_eq!(reload(Path::new(""), &AbortSignal::new(), &engine).unwrap(), 0);
        assert_eq!(engine.playlist_size(), 0);
    }

    #[test]
    fn missing_directory_clears_and_reports() {
        let dir = preset_tree();
        let engine = engine();
        reload(dir.path(), &AbortSignal::new(), &engine).unwrap();

        let missing = dir.path().join("nope");
        let err = reload(&missing, &AbortSignal::new(), &engine).unwrap_err();

        assert!(matches!(err, VisualiserError::DirectoryUnavailable { .. }));
        assert_eq!(engine.playlist_size(), 0);
    }

    #[test]
    fn file_as_root_is_unavailable() {
        let dir = preset_tree();
        let err = scan_presets(&dir.path().join("a.milk"), &AbortSignal::new()).unwrap_err();
        assert!(matches!(err, VisualiserError::DirectoryUnavailable { .. }));
    }
}
