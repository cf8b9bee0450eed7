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

//! Post-commit notification events.
//!
//! The ingest pipeline publishes one [`CommitEvent`] per committed version
//! on an in-process channel. Hook execution lives outside the core; it
//! subscribes to this stream. Publishing is fire-and-forget and never
//! fails the commit that produced it.

use crate::hash::ContentHash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A version was committed to the repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitEvent {
    /// Identity of the recorded version event.
    pub version_hash: ContentHash,
    /// Identity of the stored content.
    pub blob_hash: ContentHash,
    /// Repo-relative path of the file.
    pub path: PathBuf,
    /// Branch the version was recorded on.
    pub branch: String,
    /// Optional annotation (checkout provenance, etc).
    pub annotation: Option<String>,
    /// Commit time.
    pub timestamp: DateTime<Utc>,
}
