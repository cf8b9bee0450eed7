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

//! Garbage collection of unreferenced blobs.
//!
//! Ingest never deletes; failed transactions may leave orphan blobs
//! behind, and that is the deal: orphans are harmless until a deliberate
//! collection proves no version references them and reclaims the space.

use crate::database::Database;
use crate::object_store::ObjectStore;
use chronolog_core::Result;
use std::collections::HashSet;
use std::time::{Duration, SystemTime};
use tracing::info;

/// Blobs younger than this are never collected: they may belong to an
/// ingest transaction that has written the blob but not yet committed.
pub const MIN_ORPHAN_AGE: Duration = Duration::from_secs(3600);

/// Collection outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub scanned: u64,
    pub deleted: u64,
    pub bytes_freed: u64,
}

/// Delete blobs no version references. Holds the writer lock so no ingest
/// commits mid-scan.
pub fn collect(db: &Database, objects: &ObjectStore, min_age: Duration) -> Result<GcStats> {
    let writer = db.writer();
    let referenced: HashSet<_> = Database::referenced_blob_hashes(&writer)?
        .into_iter()
        .collect();

    let mut stats = GcStats::default();
    let now = SystemTime::now();
    for hash in objects.list()? {
        stats.scanned += 1;
        if referenced.contains(&hash) {
            continue;
        }
        let (dir, file) = hash.fan_out();
        let path = objects.root().join(dir).join(file);
        let age_ok = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|mtime| now.duration_since(mtime).ok())
            .is_some_and(|age| age >= min_age);
        if !age_ok {
            continue;
        }
        stats.bytes_freed += objects.delete(&hash)?;
        stats.deleted += 1;
    }
    drop(writer);

    info!(
        scanned = stats.scanned,
        deleted = stats.deleted,
        bytes_freed = stats.bytes_freed,
        "garbage collection complete"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{now_micros, VersionRecord};
    use chronolog_core::{CompressionAlgo, ContentHash};
    use tempfile::TempDir;

    #[test]
    fn orphans_are_collected_and_referenced_blobs_kept() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path().join("history.db")).unwrap();
        let objects =
            ObjectStore::open(dir.path().join("objects"), CompressionAlgo::Zlib).unwrap();

        let kept = objects.put(b"referenced").unwrap();
        let orphan = objects.put(b"orphan").unwrap();

        {
            let conn = db.writer();
            let branch = Database::create_branch(&conn, "main", None, now_micros()).unwrap();
            let record = VersionRecord {
                version_hash: ContentHash::of(b"version"),
                file_path: "a.txt".into(),
                blob_hash: kept,
                timestamp: 1,
                parent_hash: None,
                branch_id: branch.id,
                annotation: None,
                size: 10,
            };
            Database::insert_version(&conn, &record).unwrap();
        }

        // Zero grace so freshly written orphans qualify.
        let stats = collect(&db, &objects, Duration::ZERO).unwrap();
        assert_eq!(stats.scanned, 2);
        assert_eq!(stats.deleted, 1);
        assert!(stats.bytes_freed > 0);
        assert!(objects.has(&kept));
        assert!(!objects.has(&orphan));
    }

    #[test]
    fn young_orphans_survive_the_grace_window() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path().join("history.db")).unwrap();
        let objects =
            ObjectStore::open(dir.path().join("objects"), CompressionAlgo::Zlib).unwrap();
        let orphan = objects.put(b"fresh orphan").unwrap();

        let stats = collect(&db, &objects, MIN_ORPHAN_AGE).unwrap();
        assert_eq!(stats.deleted, 0);
        assert!(objects.has(&orphan));
    }
}
