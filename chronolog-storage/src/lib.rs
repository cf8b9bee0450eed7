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

//! ChronoLog Storage
//!
//! The persistent half of the engine: a content-addressed object store,
//! the SQLite metadata database, branch/tag refs, history walking, line
//! diff, the full-text search index, the three-way merge engine, and the
//! `Repository` handle tying them together.
//!
//! ## Architecture
//!
//! ```text
//! Repository ──► RefManager ──► Database (history.db, WAL)
//!     │                             ▲
//!     ├──► SearchIndex ─────────────┤
//!     ├──► history / diff / merge   │
//!     └──► ObjectStore (objects/<aa>/<hex>, 1-byte codec header)
//! ```
//!
//! Writes follow a single-writer discipline: one transaction at a time
//! commits versions, heads, and search terms atomically. Readers use
//! WAL snapshot connections and never block the writer.

pub mod compression;
pub mod database;
pub mod diff;
pub mod gc;
pub mod history;
pub mod merge;
pub mod object_store;
pub mod refs;
pub mod repository;
pub mod search;

pub use database::{BranchRecord, Database, TagRecord, VersionRecord, SCHEMA_VERSION};
pub use diff::{unified_diff, DiffOptions, FileDiff, DEFAULT_CONTEXT};
pub use gc::{GcStats, MIN_ORPHAN_AGE};
pub use history::LogEntry;
pub use merge::{
    has_conflicts, resolve_markers, three_way_merge, ConflictRegion, MergePolicy, MergeResult,
    ResolveSide, MARKER_OURS, MARKER_SEP, MARKER_THEIRS,
};
pub use object_store::{ObjectStore, StoreStats, VerifyReport};
pub use refs::{validate_ref_name, RefManager, DEFAULT_BRANCH};
pub use repository::{Repository, METADATA_DIR};
pub use search::{
    tokenize, ChangeHit, ChangeKind, ReindexReport, SearchHit, SearchIndex, SearchOptions,
    SearchStats,
};
