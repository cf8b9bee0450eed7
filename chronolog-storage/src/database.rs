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

//! Metadata store.
//!
//! A single SQLite database (`history.db`) in WAL mode holds versions,
//! file heads, branches, tags, search terms, the ignore-rule snapshot, and
//! repo metadata. One writer connection lives behind a mutex; read paths
//! open short-lived read-only connections so WAL snapshot reads never
//! queue behind an ingest transaction.

use chronolog_core::{ChronologError, ContentHash, Result};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Transaction};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Schema understood by this binary.
pub const SCHEMA_VERSION: u32 = 1;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const WRITE_RETRY_LIMIT: u32 = 3;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS branches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT UNIQUE NOT NULL,
    parent_id INTEGER REFERENCES branches(id),
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS versions (
    version_hash TEXT PRIMARY KEY,
    file_path TEXT NOT NULL,
    blob_hash TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    parent_hash TEXT,
    -- Not a foreign key: versions survive deletion of their branch ref.
    branch_id INTEGER NOT NULL,
    annotation TEXT,
    size INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_versions_path_branch_time
    ON versions(file_path, branch_id, timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_versions_blob ON versions(blob_hash);

CREATE TABLE IF NOT EXISTS file_heads (
    file_path TEXT NOT NULL,
    branch_id INTEGER NOT NULL REFERENCES branches(id),
    version_hash TEXT NOT NULL REFERENCES versions(version_hash),
    PRIMARY KEY (file_path, branch_id)
);

CREATE TABLE IF NOT EXISTS tags (
    name TEXT PRIMARY KEY,
    version_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS search_terms (
    version_hash TEXT NOT NULL,
    file_path TEXT NOT NULL,
    term TEXT NOT NULL,
    positions TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_search_terms_term ON search_terms(term);
CREATE INDEX IF NOT EXISTS idx_search_terms_version ON search_terms(version_hash);

CREATE TABLE IF NOT EXISTS ignore_snapshot (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    content TEXT NOT NULL,
    loaded_at INTEGER NOT NULL
);
"#;

/// One recorded save event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord {
    pub version_hash: ContentHash,
    pub file_path: String,
    pub blob_hash: ContentHash,
    /// Microseconds since the Unix epoch.
    pub timestamp: i64,
    pub parent_hash: Option<ContentHash>,
    pub branch_id: i64,
    pub annotation: Option<String>,
    pub size: u64,
}

/// A branch namespace entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRecord {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    /// Microseconds since the Unix epoch.
    pub created_at: i64,
}

/// A tag namespace entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRecord {
    pub name: String,
    pub version_hash: ContentHash,
    /// Microseconds since the Unix epoch.
    pub created_at: i64,
    pub description: Option<String>,
}

/// Handle over `history.db`.
pub struct Database {
    path: PathBuf,
    writer: Mutex<Connection>,
}

impl Database {
    /// Open (creating if needed) and migrate the metadata store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let conn = Connection::open(&path)?;
        configure(&conn)?;
        init_schema(&conn)?;
        Ok(Self {
            path,
            writer: Mutex::new(conn),
        })
    }

    /// The single writer connection. Ingest and ref operations hold this
    /// for the duration of one transaction.
    pub fn writer(&self) -> MutexGuard<'_, Connection> {
        self.writer.lock()
    }

    /// A fresh read-only connection over the same file. WAL gives it a
    /// stable snapshot that does not block the writer.
    pub fn reader(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Run `f` inside a writer transaction, retrying bounded times on a
    /// locked database.
    pub fn with_tx<T>(&self, f: impl Fn(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            let mut conn = self.writer();
            let result: Result<T> = (|| {
                let tx = conn.transaction()?;
                let value = f(&tx)?;
                tx.commit()?;
                Ok(value)
            })();
            match result {
                Err(e) if e.is_transient() && attempt < WRITE_RETRY_LIMIT => {
                    attempt += 1;
                    drop(conn);
                    debug!(attempt, "metadata store busy, retrying");
                    std::thread::sleep(Duration::from_millis(50 * u64::from(attempt)));
                }
                other => return other,
            }
        }
    }

    // === meta ===

    pub fn meta_get(conn: &Connection, key: &str) -> Result<Option<String>> {
        let value = conn
            .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn meta_set(conn: &Connection, key: &str, value: &str) -> Result<()> {
        conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    // === versions ===

    pub fn insert_version(conn: &Connection, record: &VersionRecord) -> Result<()> {
        conn.execute(
            "INSERT INTO versions
                 (version_hash, file_path, blob_hash, timestamp, parent_hash,
                  branch_id, annotation, size)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.version_hash.to_hex(),
                record.file_path,
                record.blob_hash.to_hex(),
                record.timestamp,
                record.parent_hash.map(|h| h.to_hex()),
                record.branch_id,
                record.annotation,
                record.size as i64,
            ],
        )?;
        Ok(())
    }

    pub fn version_by_hash(conn: &Connection, hash: &ContentHash) -> Result<Option<VersionRecord>> {
        let record = conn
            .query_row(
                "SELECT version_hash, file_path, blob_hash, timestamp, parent_hash,
                        branch_id, annotation, size
                 FROM versions WHERE version_hash = ?1",
                [hash.to_hex()],
                version_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Resolve an abbreviated version hash. At least four hex characters;
    /// a unique match wins, multiple matches are ambiguous.
    pub fn resolve_version_prefix(conn: &Connection, prefix: &str) -> Result<ContentHash> {
        if prefix.len() < chronolog_core::MIN_PREFIX_LEN {
            return Err(ChronologError::HashPrefixTooShort(prefix.to_string()));
        }
        if !chronolog_core::is_valid_prefix(prefix) {
            return Err(ChronologError::HashUnknown(prefix.to_string()));
        }
        let mut stmt = conn.prepare(
            "SELECT version_hash FROM versions WHERE version_hash LIKE ?1 || '%' LIMIT 2",
        )?;
        let mut matches: Vec<String> = Vec::new();
        let mut rows = stmt.query([prefix])?;
        while let Some(row) = rows.next()? {
            matches.push(row.get(0)?);
        }
        match matches.len() {
            0 => Err(ChronologError::HashUnknown(prefix.to_string())),
            1 => ContentHash::from_hex(&matches[0])
                .ok_or_else(|| ChronologError::HashUnknown(prefix.to_string())),
            _ => Err(ChronologError::HashAmbiguous(prefix.to_string())),
        }
    }

    /// Greatest timestamp recorded for `(path, branch)`, if any. Ingest
    /// clamps new timestamps to keep the per-file order monotonic.
    pub fn last_timestamp(conn: &Connection, path: &str, branch_id: i64) -> Result<Option<i64>> {
        let ts = conn
            .query_row(
                "SELECT MAX(timestamp) FROM versions WHERE file_path = ?1 AND branch_id = ?2",
                params![path, branch_id],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?
            .flatten();
        Ok(ts)
    }

    /// All versions, oldest first. Used by reindex.
    pub fn versions_by_time(conn: &Connection) -> Result<Vec<VersionRecord>> {
        let mut stmt = conn.prepare(
            "SELECT version_hash, file_path, blob_hash, timestamp, parent_hash,
                    branch_id, annotation, size
             FROM versions ORDER BY timestamp ASC, version_hash ASC",
        )?;
        let rows = stmt.query_map([], version_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Distinct file paths with at least one version on `branch_id`.
    pub fn tracked_paths(conn: &Connection, branch_id: i64) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT file_path FROM versions WHERE branch_id = ?1 ORDER BY file_path",
        )?;
        let rows = stmt.query_map([branch_id], |row| row.get(0))?;
        let mut paths = Vec::new();
        for row in rows {
            paths.push(row?);
        }
        Ok(paths)
    }

    /// Every blob hash referenced by any version. Drives GC liveness.
    pub fn referenced_blob_hashes(conn: &Connection) -> Result<Vec<ContentHash>> {
        let mut stmt = conn.prepare("SELECT DISTINCT blob_hash FROM versions")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut hashes = Vec::new();
        for row in rows {
            if let Some(hash) = ContentHash::from_hex(&row?) {
                hashes.push(hash);
            }
        }
        Ok(hashes)
    }

    /// The most recently recorded version across all paths and branches.
    pub fn latest_version(conn: &Connection) -> Result<Option<VersionRecord>> {
        let record = conn
            .query_row(
                "SELECT version_hash, file_path, blob_hash, timestamp, parent_hash,
                        branch_id, annotation, size
                 FROM versions ORDER BY timestamp DESC, version_hash DESC LIMIT 1",
                [],
                version_from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn version_count(conn: &Connection) -> Result<u64> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM versions", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // === file heads ===

    pub fn file_head(
        conn: &Connection,
        path: &str,
        branch_id: i64,
    ) -> Result<Option<VersionRecord>> {
        let record = conn
            .query_row(
                "SELECT v.version_hash, v.file_path, v.blob_hash, v.timestamp, v.parent_hash,
                        v.branch_id, v.annotation, v.size
                 FROM file_heads h
                 JOIN versions v ON v.version_hash = h.version_hash
                 WHERE h.file_path = ?1 AND h.branch_id = ?2",
                params![path, branch_id],
                version_from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn set_file_head(
        conn: &Connection,
        path: &str,
        branch_id: i64,
        version_hash: &ContentHash,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO file_heads (file_path, branch_id, version_hash)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(file_path, branch_id) DO UPDATE SET version_hash = excluded.version_hash",
            params![path, branch_id, version_hash.to_hex()],
        )?;
        Ok(())
    }

    /// Copy every file head from one branch to another. Used when a new
    /// branch is forked so it starts at the source branch's tips.
    pub fn copy_file_heads(conn: &Connection, from_branch: i64, to_branch: i64) -> Result<u64> {
        let copied = conn.execute(
            "INSERT INTO file_heads (file_path, branch_id, version_hash)
             SELECT file_path, ?2, version_hash FROM file_heads WHERE branch_id = ?1",
            params![from_branch, to_branch],
        )?;
        Ok(copied as u64)
    }

    // === branches ===

    pub fn create_branch(
        conn: &Connection,
        name: &str,
        parent_id: Option<i64>,
        created_at: i64,
    ) -> Result<BranchRecord> {
        conn.execute(
            "INSERT INTO branches (name, parent_id, created_at) VALUES (?1, ?2, ?3)",
            params![name, parent_id, created_at],
        )?;
        Ok(BranchRecord {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            parent_id,
            created_at,
        })
    }

    pub fn branch_by_name(conn: &Connection, name: &str) -> Result<Option<BranchRecord>> {
        let record = conn
            .query_row(
                "SELECT id, name, parent_id, created_at FROM branches WHERE name = ?1",
                [name],
                branch_from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn list_branches(conn: &Connection) -> Result<Vec<BranchRecord>> {
        let mut stmt =
            conn.prepare("SELECT id, name, parent_id, created_at FROM branches ORDER BY name")?;
        let rows = stmt.query_map([], branch_from_row)?;
        let mut branches = Vec::new();
        for row in rows {
            branches.push(row?);
        }
        Ok(branches)
    }

    pub fn delete_branch(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM file_heads WHERE branch_id = ?1", [id])?;
        conn.execute("DELETE FROM branches WHERE id = ?1", [id])?;
        Ok(())
    }

    // === tags ===

    pub fn create_tag(conn: &Connection, tag: &TagRecord) -> Result<()> {
        conn.execute(
            "INSERT INTO tags (name, version_hash, created_at, description)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                tag.name,
                tag.version_hash.to_hex(),
                tag.created_at,
                tag.description
            ],
        )?;
        Ok(())
    }

    pub fn tag_by_name(conn: &Connection, name: &str) -> Result<Option<TagRecord>> {
        let record = conn
            .query_row(
                "SELECT name, version_hash, created_at, description FROM tags WHERE name = ?1",
                [name],
                tag_from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn list_tags(conn: &Connection) -> Result<Vec<TagRecord>> {
        let mut stmt = conn
            .prepare("SELECT name, version_hash, created_at, description FROM tags ORDER BY name")?;
        let rows = stmt.query_map([], tag_from_row)?;
        let mut tags = Vec::new();
        for row in rows {
            tags.push(row?);
        }
        Ok(tags)
    }

    pub fn delete_tag(conn: &Connection, name: &str) -> Result<bool> {
        let deleted = conn.execute("DELETE FROM tags WHERE name = ?1", [name])?;
        Ok(deleted > 0)
    }

    // === search terms ===

    pub fn insert_search_terms(
        conn: &Connection,
        version_hash: &ContentHash,
        file_path: &str,
        terms: &[(String, String)],
    ) -> Result<()> {
        let mut stmt = conn.prepare_cached(
            "INSERT INTO search_terms (version_hash, file_path, term, positions)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (term, positions) in terms {
            stmt.execute(params![version_hash.to_hex(), file_path, term, positions])?;
        }
        Ok(())
    }

    pub fn delete_search_terms(conn: &Connection, version_hash: &ContentHash) -> Result<()> {
        conn.execute(
            "DELETE FROM search_terms WHERE version_hash = ?1",
            [version_hash.to_hex()],
        )?;
        Ok(())
    }

    pub fn clear_search_terms(conn: &Connection) -> Result<()> {
        conn.execute("DELETE FROM search_terms", [])?;
        Ok(())
    }

    pub fn search_term_count(conn: &Connection) -> Result<u64> {
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM search_terms", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Version hashes currently carrying index terms.
    pub fn indexed_version_hashes(conn: &Connection) -> Result<Vec<ContentHash>> {
        let mut stmt = conn.prepare("SELECT DISTINCT version_hash FROM search_terms")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut hashes = Vec::new();
        for row in rows {
            if let Some(hash) = ContentHash::from_hex(&row?) {
                hashes.push(hash);
            }
        }
        Ok(hashes)
    }

    // === ignore snapshot ===

    pub fn set_ignore_snapshot(conn: &Connection, content: &str, loaded_at: i64) -> Result<()> {
        conn.execute(
            "INSERT INTO ignore_snapshot (id, content, loaded_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET content = excluded.content,
                                           loaded_at = excluded.loaded_at",
            params![content, loaded_at],
        )?;
        Ok(())
    }

    pub fn ignore_snapshot(conn: &Connection) -> Result<Option<(String, i64)>> {
        let snapshot = conn
            .query_row(
                "SELECT content, loaded_at FROM ignore_snapshot WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(snapshot)
    }
}

fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = FULL;
         PRAGMA foreign_keys = ON;",
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    match Database::meta_get(conn, "schema_version")? {
        None => {
            Database::meta_set(conn, "schema_version", &SCHEMA_VERSION.to_string())?;
            info!(version = SCHEMA_VERSION, "initialized metadata schema");
        }
        Some(raw) => {
            let found: u32 = raw
                .parse()
                .map_err(|_| ChronologError::InvalidConfig(format!("schema_version '{raw}'")))?;
            if found > SCHEMA_VERSION {
                return Err(ChronologError::SchemaTooNew {
                    found,
                    supported: SCHEMA_VERSION,
                });
            }
            // Forward migrations slot in here as the schema grows.
            if found < SCHEMA_VERSION {
                Database::meta_set(conn, "schema_version", &SCHEMA_VERSION.to_string())?;
                info!(from = found, to = SCHEMA_VERSION, "migrated metadata schema");
            }
        }
    }
    Ok(())
}

fn version_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<VersionRecord> {
    let version_hex: String = row.get(0)?;
    let blob_hex: String = row.get(2)?;
    let parent_hex: Option<String> = row.get(4)?;
    Ok(VersionRecord {
        version_hash: hash_from_hex(&version_hex, 0)?,
        file_path: row.get(1)?,
        blob_hash: hash_from_hex(&blob_hex, 2)?,
        timestamp: row.get(3)?,
        parent_hash: match parent_hex {
            Some(hex) => Some(hash_from_hex(&hex, 4)?),
            None => None,
        },
        branch_id: row.get(5)?,
        annotation: row.get(6)?,
        size: row.get::<_, i64>(7)? as u64,
    })
}

fn branch_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BranchRecord> {
    Ok(BranchRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        parent_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn tag_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TagRecord> {
    let version_hex: String = row.get(1)?;
    Ok(TagRecord {
        name: row.get(0)?,
        version_hash: hash_from_hex(&version_hex, 1)?,
        created_at: row.get(2)?,
        description: row.get(3)?,
    })
}

fn hash_from_hex(hex: &str, column: usize) -> rusqlite::Result<ContentHash> {
    ContentHash::from_hex(hex).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Text,
            format!("invalid hash '{hex}'").into(),
        )
    })
}

/// Current wall-clock in microseconds since the Unix epoch.
pub fn now_micros() -> i64 {
    chrono::Utc::now().timestamp_micros()
}
