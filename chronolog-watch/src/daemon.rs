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

//! Daemon lifecycle.
//!
//! `start` wires watcher thread → bounded channel → ingest worker and
//! records the process in `daemon.pid`. `stop` closes the event source,
//! asks the worker to drain, and waits out the grace period. Both are
//! idempotent.

use crate::ingest::IngestWorker;
use crate::watcher::{self, SaveSignal};
use chronolog_core::{IgnoreFilter, Result};
use chronolog_storage::Repository;
use crossbeam_channel::{bounded, Receiver, Sender};
use notify::RecommendedWatcher;
use parking_lot::RwLock;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

const PID_FILE: &str = "daemon.pid";

/// Daemon probe result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonStatus {
    Running(u32),
    Stopped,
}

struct Running {
    /// Dropping the watcher closes the OS event source.
    watcher: RecommendedWatcher,
    signals: Sender<SaveSignal>,
    done: Receiver<()>,
    worker: JoinHandle<()>,
}

/// The background watcher/ingest pair for one repository.
pub struct Daemon {
    repo: Arc<Repository>,
    pid_file: PathBuf,
    running: Option<Running>,
}

impl Daemon {
    pub fn new(repo: Arc<Repository>) -> Self {
        let pid_file = repo.metadata_dir().join(PID_FILE);
        Self {
            repo,
            pid_file,
            running: None,
        }
    }

    /// Spawn the watcher and worker threads. A no-op when already running.
    pub fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            info!("daemon already running");
            return Ok(());
        }

        let ignore = Arc::new(RwLock::new(self.repo.load_ignore_filter()?));
        let capacity = self.repo.config().queue_capacity;
        let (signal_tx, signal_rx) = bounded(capacity);
        let (done_tx, done_rx) = bounded(1);

        let watcher = watcher::spawn(self.repo.root(), Arc::clone(&ignore), signal_tx.clone())?;
        let worker = {
            let worker = IngestWorker::new(
                Arc::clone(&self.repo),
                ignore,
                signal_rx,
                done_tx,
            );
            std::thread::Builder::new()
                .name("chronolog-ingest".into())
                .spawn(move || worker.run())?
        };

        fs::write(&self.pid_file, format!("{}\n", std::process::id()))?;
        self.running = Some(Running {
            watcher,
            signals: signal_tx,
            done: done_rx,
            worker,
        });
        info!(root = %self.repo.root().display(), "daemon started");
        Ok(())
    }

    /// Close the event source, flush pending timers, drain the queue, and
    /// join the worker within the configured grace period. Idempotent.
    pub fn stop(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            info!("daemon not running");
            return Ok(());
        };

        // Closing the event source first: no new signals after this.
        drop(running.watcher);
        let _ = running.signals.send(SaveSignal::Shutdown);

        let grace = Duration::from_millis(self.repo.config().stop_grace_ms);
        match running.done.recv_timeout(grace) {
            Ok(()) => {
                let _ = running.worker.join();
            }
            Err(_) => {
                // The worker is wedged on I/O; abandon it rather than hang
                // the caller. In-flight object writes stay as .tmp files
                // and are swept on next open.
                warn!(grace_ms = grace.as_millis() as u64, "worker did not drain in time");
            }
        }

        if self.pid_file.exists() {
            fs::remove_file(&self.pid_file)?;
        }
        info!("daemon stopped");
        Ok(())
    }

    /// Probe the daemon. Answers for this handle first; otherwise reads
    /// `daemon.pid` and checks process liveness.
    pub fn status(&self) -> DaemonStatus {
        if self.running.is_some() {
            return DaemonStatus::Running(std::process::id());
        }
        let Ok(raw) = fs::read_to_string(&self.pid_file) else {
            return DaemonStatus::Stopped;
        };
        let Ok(pid) = raw.trim().parse::<u32>() else {
            warn!("malformed daemon.pid");
            return DaemonStatus::Stopped;
        };
        if process_alive(pid) {
            DaemonStatus::Running(pid)
        } else {
            warn!(pid, "stale daemon.pid");
            DaemonStatus::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.status(), DaemonStatus::Running(_))
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        if self.running.is_some() {
            let _ = self.stop();
        }
    }
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(pid: u32) -> bool {
    // Without a portable probe, trust the pid file; stop() removes it.
    let _ = pid;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn daemon() -> (TempDir, Daemon) {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(Repository::init(dir.path()).unwrap());
        (dir, Daemon::new(repo))
    }

    #[test]
    fn start_writes_pid_and_stop_removes_it() {
        let (dir, mut daemon) = daemon();
        let pid_file = dir.path().join(".chronolog/daemon.pid");

        daemon.start().unwrap();
        assert!(pid_file.exists());
        assert_eq!(daemon.status(), DaemonStatus::Running(std::process::id()));

        daemon.stop().unwrap();
        assert!(!pid_file.exists());
        assert_eq!(daemon.status(), DaemonStatus::Stopped);
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let (_dir, mut daemon) = daemon();
        daemon.start().unwrap();
        daemon.start().unwrap();
        daemon.stop().unwrap();
        daemon.stop().unwrap();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn stale_pid_file_reports_stopped() {
        let (dir, daemon) = daemon();
        // A pid that cannot be a live process.
        fs::write(dir.path().join(".chronolog/daemon.pid"), "4294967294\n").unwrap();
        assert_eq!(daemon.status(), DaemonStatus::Stopped);
    }
}
