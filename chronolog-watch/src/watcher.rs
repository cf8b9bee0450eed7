// Copyright 2025 ChronoLog Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Filesystem event source.
//!
//! A `notify` watcher attached recursively to the working-tree root
//! normalizes OS events into [`SaveSignal`]s on a bounded channel. The
//! callback runs on the watcher's own thread and does only cheap work:
//! structural filtering of the metadata directory, the ignore-filter
//! check, and the send. Renames are normalized into delete+create; this
//! engine has no move events.

use chronolog_core::{IgnoreFilter, Result, IGNORE_FILE_NAME};
use crossbeam_channel::Sender;
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{trace, warn};

use chronolog_storage::METADATA_DIR;

/// Normalized watcher-to-worker message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveSignal {
    /// A file was created or modified; debounce then ingest.
    Modified(PathBuf),
    /// A file disappeared; not debounced.
    Removed(PathBuf),
    /// The ignore pattern file changed; recompile before the next event.
    IgnoreFileChanged,
    /// Drain pending work and exit.
    Shutdown,
}

/// Attach a recursive watcher to `root`. Events flow into `signals` until
/// the returned watcher is dropped.
pub fn spawn(
    root: &Path,
    ignore: Arc<RwLock<IgnoreFilter>>,
    signals: Sender<SaveSignal>,
) -> Result<RecommendedWatcher> {
    let root_owned = root.to_path_buf();
    let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
        match event {
            Ok(event) => dispatch(&root_owned, &ignore, &signals, event),
            Err(e) => warn!(error = %e, "watcher error"),
        }
    })
    .map_err(into_io)?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(into_io)?;
    Ok(watcher)
}

fn dispatch(
    root: &Path,
    ignore: &RwLock<IgnoreFilter>,
    signals: &Sender<SaveSignal>,
    event: Event,
) {
    let (removed_paths, modified_paths) = split_paths(&event);

    for path in removed_paths {
        if let Some(signal) = classify(root, ignore, path, true) {
            forward(signals, signal);
        }
    }
    for path in modified_paths {
        if let Some(signal) = classify(root, ignore, path, false) {
            forward(signals, signal);
        }
    }
}

/// Partition an OS event's paths into (removed, modified) sets, folding
/// renames into delete+create.
fn split_paths(event: &Event) -> (Vec<&PathBuf>, Vec<&PathBuf>) {
    let mut removed = Vec::new();
    let mut modified = Vec::new();
    match &event.kind {
        EventKind::Create(CreateKind::Folder) => {}
        EventKind::Create(_) => modified.extend(event.paths.iter()),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => removed.extend(event.paths.iter()),
            RenameMode::To => modified.extend(event.paths.iter()),
            RenameMode::Both if event.paths.len() == 2 => {
                removed.push(&event.paths[0]);
                modified.push(&event.paths[1]);
            }
            _ => {
                for path in &event.paths {
                    if path.exists() {
                        modified.push(path);
                    } else {
                        removed.push(path);
                    }
                }
            }
        },
        EventKind::Modify(ModifyKind::Metadata(_)) => {}
        EventKind::Modify(_) => modified.extend(event.paths.iter()),
        EventKind::Remove(_) => removed.extend(event.paths.iter()),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
    }
    (removed, modified)
}

fn classify(
    root: &Path,
    ignore: &RwLock<IgnoreFilter>,
    path: &Path,
    removed: bool,
) -> Option<SaveSignal> {
    // The metadata directory is skipped structurally, not via patterns.
    let rel = path.strip_prefix(root).ok()?;
    if rel.components().next()?.as_os_str() == METADATA_DIR {
        return None;
    }

    if rel == Path::new(IGNORE_FILE_NAME) && !removed {
        return Some(SaveSignal::IgnoreFileChanged);
    }

    if !removed && path.is_dir() {
        return None;
    }
    if ignore.read().is_ignored(rel, false) {
        trace!(path = %rel.display(), "ignored event");
        return None;
    }

    Some(if removed {
        SaveSignal::Removed(path.to_path_buf())
    } else {
        SaveSignal::Modified(path.to_path_buf())
    })
}

fn forward(signals: &Sender<SaveSignal>, signal: SaveSignal) {
    // The channel is bounded; per-path coalescing happens in the worker's
    // debounce queue, so a full channel means the worker is far behind and
    // dropping is the lesser evil.
    if let Err(e) = signals.try_send(signal) {
        warn!(error = %e, "event queue full, dropping event");
    }
}

fn into_io(e: notify::Error) -> chronolog_core::ChronologError {
    chronolog_core::ChronologError::Io(std::io::Error::other(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    fn setup() -> (
        Arc<RwLock<IgnoreFilter>>,
        Sender<SaveSignal>,
        crossbeam_channel::Receiver<SaveSignal>,
    ) {
        let (tx, rx) = bounded(64);
        (Arc::new(RwLock::new(IgnoreFilter::defaults())), tx, rx)
    }

    #[test]
    fn metadata_directory_is_structurally_skipped() {
        let root = Path::new("/repo");
        let (ignore, _tx, _rx) = setup();
        let signal = classify(
            root,
            &ignore,
            Path::new("/repo/.chronolog/history.db"),
            false,
        );
        assert!(signal.is_none());
    }

    #[test]
    fn ignore_file_change_is_signaled() {
        let root = Path::new("/repo");
        let (ignore, _tx, _rx) = setup();
        let signal = classify(root, &ignore, Path::new("/repo/.chronologignore"), false);
        assert_eq!(signal, Some(SaveSignal::IgnoreFileChanged));
    }

    #[test]
    fn ignored_paths_produce_no_signal() {
        let root = Path::new("/repo");
        let (ignore, _tx, _rx) = setup();
        assert!(classify(root, &ignore, Path::new("/repo/file.swp"), false).is_none());
        assert!(classify(root, &ignore, Path::new("/repo/notes.txt"), false).is_some());
    }

    #[test]
    fn paths_outside_root_are_dropped() {
        let root = Path::new("/repo");
        let (ignore, _tx, _rx) = setup();
        assert!(classify(root, &ignore, Path::new("/elsewhere/f.txt"), false).is_none());
    }

    #[test]
    fn removals_map_to_removed_signals() {
        let root = Path::new("/repo");
        let (ignore, _tx, _rx) = setup();
        let signal = classify(root, &ignore, Path::new("/repo/gone.txt"), true);
        assert_eq!(
            signal,
            Some(SaveSignal::Removed(PathBuf::from("/repo/gone.txt")))
        );
    }

    #[test]
    fn rename_events_split_into_delete_and_create() {
        let event = Event {
            kind: EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            paths: vec![PathBuf::from("/repo/old.txt"), PathBuf::from("/repo/new.txt")],
            attrs: Default::default(),
        };
        let (removed, modified) = split_paths(&event);
        assert_eq!(removed, vec![&PathBuf::from("/repo/old.txt")]);
        assert_eq!(modified, vec![&PathBuf::from("/repo/new.txt")]);
    }
}
