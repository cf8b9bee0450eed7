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

//! Trailing-edge debounce of save events.
//!
//! Per-path state machine: an event arms (or re-arms) a deadline one
//! window into the future; the path is released for ingest only once the
//! deadline passes with no further events. The pending set is bounded;
//! a duplicate path merges into its existing entry, and overflow of
//! distinct paths releases the oldest entry immediately rather than
//! dropping it.
//!
//! The queue is owned by the ingest worker alone. The watcher thread
//! never touches it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Pending save deadlines, owned by the worker.
#[derive(Debug)]
pub struct DebounceQueue {
    window: Duration,
    capacity: usize,
    pending: HashMap<PathBuf, Instant>,
}

impl DebounceQueue {
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            window,
            capacity,
            pending: HashMap::new(),
        }
    }

    /// Arm (or extend) the deadline for `path`. Returns a path evicted to
    /// make room, which the caller must ingest immediately.
    pub fn note_modified(&mut self, path: PathBuf) -> Option<PathBuf> {
        let deadline = Instant::now() + self.window;
        if self.pending.contains_key(&path) || self.pending.len() < self.capacity {
            self.pending.insert(path, deadline);
            return None;
        }
        // Full of distinct paths: release the entry closest to its
        // deadline, then admit the newcomer.
        let evicted = self
            .pending
            .iter()
            .min_by_key(|(_, deadline)| **deadline)
            .map(|(path, _)| path.clone());
        if let Some(evicted_path) = &evicted {
            self.pending.remove(evicted_path);
        }
        self.pending.insert(path, deadline);
        evicted
    }

    /// Forget a path (deletes are not debounced).
    pub fn forget(&mut self, path: &PathBuf) {
        self.pending.remove(path);
    }

    /// The soonest deadline, if anything is pending.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    /// Paths whose deadline has passed, removed from the pending set.
    pub fn pop_due(&mut self, now: Instant) -> Vec<PathBuf> {
        let due: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &due {
            self.pending.remove(path);
        }
        due
    }

    /// Flush everything regardless of deadline (daemon stop).
    pub fn drain(&mut self) -> Vec<PathBuf> {
        let mut all: Vec<PathBuf> = self.pending.drain().map(|(path, _)| path).collect();
        all.sort();
        all
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(50);

    #[test]
    fn deadline_is_armed_one_window_out() {
        let mut queue = DebounceQueue::new(WINDOW, 16);
        let before = Instant::now();
        queue.note_modified(PathBuf::from("a.txt"));
        let deadline = queue.next_deadline().unwrap();
        assert!(deadline >= before + WINDOW);
    }

    #[test]
    fn further_events_extend_the_deadline() {
        let mut queue = DebounceQueue::new(WINDOW, 16);
        queue.note_modified(PathBuf::from("a.txt"));
        let first = queue.next_deadline().unwrap();
        std::thread::sleep(Duration::from_millis(10));
        queue.note_modified(PathBuf::from("a.txt"));
        let second = queue.next_deadline().unwrap();
        assert!(second > first);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn pop_due_releases_only_expired_paths() {
        let mut queue = DebounceQueue::new(WINDOW, 16);
        queue.note_modified(PathBuf::from("a.txt"));
        assert!(queue.pop_due(Instant::now()).is_empty());

        let later = Instant::now() + WINDOW + Duration::from_millis(1);
        assert_eq!(queue.pop_due(later), vec![PathBuf::from("a.txt")]);
        assert!(queue.is_empty());
    }

    #[test]
    fn duplicate_paths_merge_instead_of_growing() {
        let mut queue = DebounceQueue::new(WINDOW, 2);
        for _ in 0..10 {
            assert!(queue.note_modified(PathBuf::from("same.txt")).is_none());
        }
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn overflow_evicts_the_oldest_entry() {
        let mut queue = DebounceQueue::new(WINDOW, 2);
        assert!(queue.note_modified(PathBuf::from("first.txt")).is_none());
        std::thread::sleep(Duration::from_millis(5));
        assert!(queue.note_modified(PathBuf::from("second.txt")).is_none());
        std::thread::sleep(Duration::from_millis(5));

        let evicted = queue.note_modified(PathBuf::from("third.txt"));
        assert_eq!(evicted, Some(PathBuf::from("first.txt")));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn forget_removes_without_release() {
        let mut queue = DebounceQueue::new(WINDOW, 16);
        queue.note_modified(PathBuf::from("gone.txt"));
        queue.forget(&PathBuf::from("gone.txt"));
        assert!(queue.is_empty());
        let later = Instant::now() + WINDOW * 2;
        assert!(queue.pop_due(later).is_empty());
    }

    #[test]
    fn drain_flushes_everything() {
        let mut queue = DebounceQueue::new(WINDOW, 16);
        queue.note_modified(PathBuf::from("b.txt"));
        queue.note_modified(PathBuf::from("a.txt"));
        assert_eq!(
            queue.drain(),
            vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]
        );
        assert!(queue.is_empty());
    }
}
