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

//! Error taxonomy for the ChronoLog engine.
//!
//! Every public boundary returns `Result<T>` with one of these variants;
//! callers never see panics or exception-style control flow. The variants
//! group into user-input errors, repository-state errors, and I/O errors,
//! which the CLI wrapper maps to exit codes via [`ChronologError::exit_code`].

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used across all ChronoLog crates.
pub type Result<T> = std::result::Result<T, ChronologError>;

/// Unified error type for the engine.
#[derive(Debug, Error)]
pub enum ChronologError {
    // === User input ===
    #[error("unknown version: {0}")]
    HashUnknown(String),

    #[error("ambiguous version prefix '{0}': multiple matches")]
    HashAmbiguous(String),

    #[error("hash prefix '{0}' too short (minimum 4 hex characters)")]
    HashPrefixTooShort(String),

    #[error("no history for path: {}", .0.display())]
    NotTracked(PathBuf),

    #[error("branch already exists: {0}")]
    BranchExists(String),

    #[error("branch not found: {0}")]
    BranchMissing(String),

    #[error("cannot delete the current HEAD branch: {0}")]
    BranchIsHead(String),

    #[error("tag already exists: {0}")]
    TagExists(String),

    #[error("tag not found: {0}")]
    TagMissing(String),

    #[error("invalid reference name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("invalid ignore pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("invalid regular expression: {0}")]
    InvalidRegex(String),

    #[error("binary content: {0}")]
    BinaryContent(String),

    // === Repository state ===
    #[error("not a ChronoLog repository (no .chronolog found from {})", .0.display())]
    NotARepository(PathBuf),

    #[error("repository already initialized at {}", .0.display())]
    AlreadyInitialized(PathBuf),

    #[error("repository schema version {found} is newer than supported {supported}; upgrade ChronoLog")]
    SchemaTooNew { found: u32, supported: u32 },

    #[error("corrupt object {hash}: stored content hashes to {actual}")]
    CorruptObject { hash: String, actual: String },

    #[error("unknown compression header byte {0:#04x}")]
    UnknownCompression(u8),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // === I/O and database ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("config serialization error: {0}")]
    ConfigFormat(#[from] serde_json::Error),
}

impl ChronologError {
    /// Exit code contract for the CLI wrapper: 0 success, 1 user error,
    /// 2 repository-state error, 3 I/O error.
    pub fn exit_code(&self) -> i32 {
        use ChronologError::*;
        match self {
            HashUnknown(_) | HashAmbiguous(_) | HashPrefixTooShort(_) | NotTracked(_)
            | BranchExists(_) | BranchMissing(_) | BranchIsHead(_) | TagExists(_)
            | TagMissing(_) | InvalidName { .. } | InvalidPattern { .. } | InvalidRegex(_)
            | BinaryContent(_) => 1,
            NotARepository(_) | AlreadyInitialized(_) | SchemaTooNew { .. }
            | CorruptObject { .. } | UnknownCompression(_) | InvalidConfig(_) | Database(_)
            | ConfigFormat(_) => 2,
            Io(_) => 3,
        }
    }

    /// True for errors a caller may retry with backoff (locked metadata
    /// store, interrupted reads).
    pub fn is_transient(&self) -> bool {
        match self {
            ChronologError::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            ChronologError::Io(e) => e.kind() == std::io::ErrorKind::Interrupted,
            _ => false,
        }
    }
}
