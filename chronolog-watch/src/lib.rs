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

//! ChronoLog Watch
//!
//! The ingestion front end: a `notify` watcher thread observes the
//! working tree, a bounded channel carries normalized save signals, and a
//! single ingest worker debounces them and commits stable saves through
//! the repository handle. The worker is the only metadata writer; query
//! paths never suspend on it.
//!
//! ```text
//! OS events ──► watcher thread ──► bounded channel ──► ingest worker
//!                   │ (ignore filter, read)                │ (debounce,
//!                   ▼                                      ▼  sole writer)
//!             IgnoreFilter (RwLock) ◄──── reload ──── Repository
//! ```

pub mod daemon;
pub mod debounce;
pub mod ingest;
pub mod watcher;

pub use daemon::{Daemon, DaemonStatus};
pub use debounce::DebounceQueue;
pub use ingest::IngestWorker;
pub use watcher::SaveSignal;
