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

//! Version-chain walking.
//!
//! History is the parent-pointer chain rooted at a file head. Walking
//! crosses branch forks naturally: the first version on a fork points at
//! the head it was forked from.

use crate::database::{Database, VersionRecord};
use chrono::{DateTime, Utc};
use chronolog_core::{ContentHash, Result};
use rusqlite::Connection;

/// One line of `log` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub version_hash: ContentHash,
    pub short_hash: String,
    pub blob_hash: ContentHash,
    pub timestamp: DateTime<Utc>,
    pub size: u64,
    pub annotation: Option<String>,
}

impl From<&VersionRecord> for LogEntry {
    fn from(record: &VersionRecord) -> Self {
        Self {
            version_hash: record.version_hash,
            short_hash: record.version_hash.short(),
            blob_hash: record.blob_hash,
            timestamp: DateTime::from_timestamp_micros(record.timestamp).unwrap_or_default(),
            size: record.size,
            annotation: record.annotation.clone(),
        }
    }
}

/// Walk history for `(path, branch)` from its head backwards. A path with
/// no head on the branch yields an empty list.
pub fn log(
    conn: &Connection,
    path: &str,
    branch_id: i64,
    limit: Option<usize>,
) -> Result<Vec<LogEntry>> {
    let mut entries = Vec::new();
    let Some(head) = Database::file_head(conn, path, branch_id)? else {
        return Ok(entries);
    };

    let mut current = Some(head);
    while let Some(record) = current {
        if limit.is_some_and(|max| entries.len() >= max) {
            break;
        }
        entries.push(LogEntry::from(&record));
        current = match record.parent_hash {
            Some(parent) => Database::version_by_hash(conn, &parent)?,
            None => None,
        };
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::now_micros;
    use tempfile::TempDir;

    fn record(
        branch_id: i64,
        path: &str,
        content: &[u8],
        parent: Option<ContentHash>,
        ts: i64,
    ) -> VersionRecord {
        let blob_hash = ContentHash::of(content);
        let seed = format!(
            "{}:{}:{ts}:{path}",
            blob_hash.to_hex(),
            parent.map(|p| p.to_hex()).unwrap_or_else(|| "-".into())
        );
        VersionRecord {
            version_hash: ContentHash::of(seed.as_bytes()),
            file_path: path.to_string(),
            blob_hash,
            timestamp: ts,
            parent_hash: parent,
            branch_id,
            annotation: None,
            size: content.len() as u64,
        }
    }

    #[test]
    fn log_walks_newest_first() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path().join("history.db")).unwrap();
        let conn = db.writer();
        let branch = Database::create_branch(&conn, "main", None, now_micros()).unwrap();

        let v1 = record(branch.id, "a.txt", b"one", None, 10);
        let v2 = record(branch.id, "a.txt", b"two", Some(v1.version_hash), 20);
        let v3 = record(branch.id, "a.txt", b"three", Some(v2.version_hash), 30);
        for v in [&v1, &v2, &v3] {
            Database::insert_version(&conn, v).unwrap();
        }
        Database::set_file_head(&conn, "a.txt", branch.id, &v3.version_hash).unwrap();

        let entries = log(&conn, "a.txt", branch.id, None).unwrap();
        assert_eq!(
            entries.iter().map(|e| e.version_hash).collect::<Vec<_>>(),
            vec![v3.version_hash, v2.version_hash, v1.version_hash]
        );
        assert_eq!(entries[0].short_hash.len(), chronolog_core::SHORT_LEN);

        let limited = log(&conn, "a.txt", branch.id, Some(2)).unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].version_hash, v3.version_hash);
    }

    #[test]
    fn untracked_path_yields_empty() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path().join("history.db")).unwrap();
        let conn = db.writer();
        let branch = Database::create_branch(&conn, "main", None, now_micros()).unwrap();
        assert!(log(&conn, "ghost.txt", branch.id, None).unwrap().is_empty());
    }
}
