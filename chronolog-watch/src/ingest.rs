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

//! The ingest worker.
//!
//! A single thread drains the save-signal channel, owns all debounce
//! state, and is the sole writer into the repository. Ingest failures are
//! logged and the path skipped; nothing here surfaces to query callers.

use crate::debounce::DebounceQueue;
use crate::watcher::SaveSignal;
use chronolog_core::{content, BinaryPolicy, IgnoreFilter};
use chronolog_storage::Repository;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Runs the worker loop until a `Shutdown` signal arrives, then flushes
/// pending debounce entries, drains the channel, and reports on `done`.
pub struct IngestWorker {
    repo: Arc<Repository>,
    ignore: Arc<RwLock<IgnoreFilter>>,
    signals: Receiver<SaveSignal>,
    done: Sender<()>,
    queue: DebounceQueue,
}

impl IngestWorker {
    pub fn new(
        repo: Arc<Repository>,
        ignore: Arc<RwLock<IgnoreFilter>>,
        signals: Receiver<SaveSignal>,
        done: Sender<()>,
    ) -> Self {
        let config = repo.config();
        let queue = DebounceQueue::new(
            Duration::from_millis(config.debounce_ms),
            config.queue_capacity,
        );
        Self {
            repo,
            ignore,
            signals,
            done,
            queue,
        }
    }

    pub fn run(mut self) {
        loop {
            let received = match self.queue.next_deadline() {
                Some(deadline) => {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match self.signals.recv_timeout(wait) {
                        Ok(signal) => Some(signal),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match self.signals.recv() {
                    Ok(signal) => Some(signal),
                    Err(_) => break,
                },
            };

            match received {
                Some(SaveSignal::Shutdown) => break,
                Some(signal) => self.handle(signal),
                None => {}
            }

            for path in self.queue.pop_due(Instant::now()) {
                self.ingest(&path);
            }
        }

        // Stop: flush pending timers, then drain whatever the watcher
        // already queued.
        for path in self.queue.drain() {
            self.ingest(&path);
        }
        while let Ok(signal) = self.signals.try_recv() {
            if let SaveSignal::Modified(path) = signal {
                self.ingest(&path);
            }
        }
        let _ = self.done.send(());
        info!("ingest worker stopped");
    }

    fn handle(&mut self, signal: SaveSignal) {
        match signal {
            SaveSignal::Modified(path) => {
                if let Some(evicted) = self.queue.note_modified(path) {
                    self.ingest(&evicted);
                }
            }
            SaveSignal::Removed(path) => {
                // Renames surface as delete+create; history keeps the old
                // path's versions, so a delete only cancels pending work.
                self.queue.forget(&path);
                debug!(path = %path.display(), "delete marker");
            }
            SaveSignal::IgnoreFileChanged => {
                match self.repo.load_ignore_filter() {
                    Ok(filter) => {
                        *self.ignore.write() = filter;
                        info!("reloaded ignore patterns");
                    }
                    Err(e) => warn!(error = %e, "failed to reload ignore patterns"),
                }
                // The pattern file itself is an ordinary tracked file.
                let path = self.repo.root().join(chronolog_core::IGNORE_FILE_NAME);
                if let Some(evicted) = self.queue.note_modified(path) {
                    self.ingest(&evicted);
                }
            }
            SaveSignal::Shutdown => {}
        }
    }

    fn ingest(&self, path: &Path) {
        if let Err(e) = self.try_ingest(path) {
            warn!(path = %path.display(), error = %e, "ingest failed, skipping");
        }
    }

    fn try_ingest(&self, path: &Path) -> chronolog_core::Result<()> {
        let rel = match path.strip_prefix(self.repo.root()) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => return Ok(()),
        };
        // Re-check against the current filter: patterns may have changed
        // while the event sat in the debounce window. Never retroactive,
        // always effective for new ingests.
        if self.ignore.read().is_ignored(&rel, false) {
            return Ok(());
        }

        let Some(bytes) = self.stable_read(path)? else {
            return Ok(());
        };

        let config = self.repo.config();
        if content::is_binary(&bytes, config.binary_scan_limit)
            && config.binary_policy == BinaryPolicy::Skip
        {
            debug!(path = %rel.display(), "binary content skipped");
            return Ok(());
        }

        if let Some(record) = self.repo.commit_bytes(&rel, &bytes, None, true)? {
            info!(path = %rel.display(), version = %record.version_hash, "versioned");
        }
        Ok(())
    }

    /// Read the file, confirming size and mtime did not change mid-read.
    /// Covers editors that write via rename-over. `None` means the file
    /// vanished or never settled within the retry budget.
    fn stable_read(&self, path: &Path) -> chronolog_core::Result<Option<Vec<u8>>> {
        let retries = self.repo.config().read_retry_limit;
        for attempt in 0..=retries {
            let before = match std::fs::metadata(path) {
                Ok(meta) if meta.is_file() => meta,
                _ => return Ok(None),
            };
            let bytes = match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            let after = match std::fs::metadata(path) {
                Ok(meta) => meta,
                Err(_) => return Ok(None),
            };
            let settled = before.len() == after.len()
                && before.modified().ok() == after.modified().ok()
                && bytes.len() as u64 == after.len();
            if settled {
                return Ok(Some(bytes));
            }
            debug!(path = %path.display(), attempt, "file changed mid-read, retrying");
        }
        warn!(path = %path.display(), "file never settled, skipping");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use tempfile::TempDir;

    fn worker_fixture() -> (TempDir, Arc<Repository>, Sender<SaveSignal>, Receiver<()>) {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(Repository::init(dir.path()).unwrap());
        let ignore = Arc::new(RwLock::new(IgnoreFilter::defaults()));
        let (tx, rx) = bounded(64);
        let (done_tx, done_rx) = bounded(1);
        let worker = IngestWorker::new(Arc::clone(&repo), ignore, rx, done_tx);
        std::thread::spawn(move || worker.run());
        (dir, repo, tx, done_rx)
    }

    #[test]
    fn modified_signal_results_in_a_version() {
        let (dir, repo, tx, done) = worker_fixture();
        let file = dir.path().join("w.txt");
        std::fs::write(&file, b"watched\n").unwrap();
        tx.send(SaveSignal::Modified(file)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if repo.log(Path::new("w.txt"), None).is_ok() {
                break;
            }
            assert!(Instant::now() < deadline, "version never appeared");
            std::thread::sleep(Duration::from_millis(25));
        }

        tx.send(SaveSignal::Shutdown).unwrap();
        done.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn shutdown_flushes_pending_paths() {
        let (dir, repo, tx, done) = worker_fixture();
        let file = dir.path().join("flush.txt");
        std::fs::write(&file, b"pending\n").unwrap();
        tx.send(SaveSignal::Modified(file)).unwrap();
        // Shutdown lands well inside the debounce window; the flush must
        // still record the version.
        tx.send(SaveSignal::Shutdown).unwrap();
        done.recv_timeout(Duration::from_secs(5)).unwrap();

        assert_eq!(repo.log(Path::new("flush.txt"), None).unwrap().len(), 1);
    }

    #[test]
    fn vanished_files_are_skipped() {
        let (dir, _repo, tx, done) = worker_fixture();
        tx.send(SaveSignal::Modified(dir.path().join("never-existed.txt")))
            .unwrap();
        tx.send(SaveSignal::Shutdown).unwrap();
        done.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn binary_files_are_skipped_under_default_policy() {
        let (dir, repo, tx, done) = worker_fixture();
        let file = dir.path().join("image.bin");
        std::fs::write(&file, b"\x00\x01\x02").unwrap();
        tx.send(SaveSignal::Modified(file)).unwrap();
        tx.send(SaveSignal::Shutdown).unwrap();
        done.recv_timeout(Duration::from_secs(5)).unwrap();

        assert!(repo.log(Path::new("image.bin"), None).is_err());
    }
}
