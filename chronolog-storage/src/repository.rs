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

//! The repository handle.
//!
//! `Repository` owns the object store, metadata database, ref manager, and
//! search index for one working tree, and exposes the stable in-process
//! API the outer layers (CLI, TUI, web) are built on. There is no global
//! repository context: everything flows through this explicit handle.

use crate::database::{now_micros, BranchRecord, Database, TagRecord, VersionRecord};
use crate::diff::{self, DiffOptions, FileDiff};
use crate::gc::{self, GcStats};
use crate::history::{self, LogEntry};
use crate::merge::{self, MergePolicy, MergeResult};
use crate::object_store::{ObjectStore, StoreStats, VerifyReport};
use crate::refs::RefManager;
use crate::search::{
    ChangeHit, ReindexReport, SearchHit, SearchIndex, SearchOptions, SearchStats,
};
use chronolog_core::{
    ChronologError, CommitEvent, ContentHash, IgnoreFilter, RepositoryConfig, Result,
};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the metadata directory under the working-tree root.
pub const METADATA_DIR: &str = ".chronolog";

const DB_FILE: &str = "history.db";
const CONFIG_FILE: &str = "config.json";
const HEAD_FILE: &str = "HEAD";
const OBJECTS_DIR: &str = "objects";

/// Flag set when a search update was skipped after a commit; `reindex`
/// clears it.
const SEARCH_DIRTY_KEY: &str = "search_dirty";

/// A handle over one initialized working tree.
pub struct Repository {
    root: PathBuf,
    dir: PathBuf,
    config: RepositoryConfig,
    db: Arc<Database>,
    objects: Arc<ObjectStore>,
    refs: RefManager,
    search: SearchIndex,
    subscribers: Mutex<Vec<Sender<CommitEvent>>>,
}

impl Repository {
    /// Initialize a new repository at `root`.
    pub fn init(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().canonicalize()?;
        let dir = root.join(METADATA_DIR);
        if dir.exists() {
            return Err(ChronologError::AlreadyInitialized(root));
        }
        fs::create_dir_all(&dir)?;

        let config = RepositoryConfig::default();
        config.store(&dir.join(CONFIG_FILE))?;

        let repo = Self::load(root, config)?;
        repo.refs.bootstrap()?;
        repo.snapshot_ignore_rules()?;
        info!(root = %repo.root.display(), "initialized repository");
        Ok(repo)
    }

    /// Open an existing repository, walking up from `start` to find the
    /// metadata directory.
    pub fn open(start: impl AsRef<Path>) -> Result<Self> {
        let start = start.as_ref().canonicalize()?;
        let root = Self::find_root(&start)
            .ok_or_else(|| ChronologError::NotARepository(start.clone()))?;
        let config = RepositoryConfig::load(&root.join(METADATA_DIR).join(CONFIG_FILE))?;
        Self::load(root, config)
    }

    /// Locate the working-tree root containing `.chronolog`, starting at
    /// `start` and walking toward the filesystem root.
    pub fn find_root(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .find(|dir| dir.join(METADATA_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    fn load(root: PathBuf, config: RepositoryConfig) -> Result<Self> {
        let dir = root.join(METADATA_DIR);
        let db = Arc::new(Database::open(dir.join(DB_FILE))?);
        let objects = Arc::new(ObjectStore::open(dir.join(OBJECTS_DIR), config.compression)?);
        let refs = RefManager::new(Arc::clone(&db), dir.join(HEAD_FILE));
        let search = SearchIndex::new(
            Arc::clone(&db),
            Arc::clone(&objects),
            config.binary_scan_limit,
            config.fallback_encoding,
        );
        Ok(Self {
            root,
            dir,
            config,
            db,
            objects,
            refs,
            search,
            subscribers: Mutex::new(Vec::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn metadata_dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn objects(&self) -> &Arc<ObjectStore> {
        &self.objects
    }

    // === Ingest primitive ===

    /// Record `content` as a new version of `path` on the HEAD branch.
    ///
    /// This is the single commit path: the watcher's ingest worker and
    /// `checkout` both go through it. Returns `None` when
    /// `skip_if_unchanged` is set and the content equals the current file
    /// head (the no-op-save skip).
    pub fn commit_bytes(
        &self,
        path: &Path,
        content: &[u8],
        annotation: Option<String>,
        skip_if_unchanged: bool,
    ) -> Result<Option<VersionRecord>> {
        let rel = self.normalize_rel(path)?;
        let blob_hash = ContentHash::of(content);

        let committed = self.db.with_tx(|tx| {
            // HEAD is read at the start of each transaction.
            let branch = head_branch_tx(tx)?;
            let prior = Database::file_head(tx, &rel, branch.id)?;

            if skip_if_unchanged {
                if let Some(prior) = &prior {
                    if prior.blob_hash == blob_hash {
                        debug!(path = %rel, "unchanged content, skipping");
                        return Ok(None);
                    }
                }
            }

            // The blob write is not transactional; a failure past this
            // point leaves an orphan for gc to reclaim.
            self.objects.put(content)?;

            let last = Database::last_timestamp(tx, &rel, branch.id)?;
            let timestamp = now_micros().max(last.unwrap_or(i64::MIN));
            let parent_hash = prior.as_ref().map(|p| p.version_hash);
            let record = VersionRecord {
                version_hash: mint_version_hash(
                    &blob_hash,
                    parent_hash.as_ref(),
                    timestamp,
                    branch.id,
                    &rel,
                ),
                file_path: rel.clone(),
                blob_hash,
                timestamp,
                parent_hash,
                branch_id: branch.id,
                annotation: annotation.clone(),
                size: content.len() as u64,
            };

            Database::insert_version(tx, &record)?;
            Database::set_file_head(tx, &rel, branch.id, &record.version_hash)?;

            // A failed index update must not lose the version; flag it for
            // reconcile instead.
            if let Err(e) = self.search.update_for_commit(
                tx,
                &record,
                parent_hash.as_ref(),
                content,
            ) {
                warn!(path = %rel, error = %e, "search update failed, queued for reconcile");
                Database::meta_set(tx, SEARCH_DIRTY_KEY, "1")?;
            }

            Ok(Some((record, branch.name.clone())))
        })?;

        Ok(committed.map(|(record, branch_name)| {
            debug!(path = %rel, version = %record.version_hash, "recorded version");
            self.publish(CommitEvent {
                version_hash: record.version_hash,
                blob_hash: record.blob_hash,
                path: PathBuf::from(&record.file_path),
                branch: branch_name,
                annotation: record.annotation.clone(),
                timestamp: chrono::DateTime::from_timestamp_micros(record.timestamp)
                    .unwrap_or_default(),
            });
            record
        }))
    }

    // === History & content ===

    /// Version history for a path on the HEAD branch, newest first.
    pub fn log(&self, path: &Path, limit: Option<usize>) -> Result<Vec<LogEntry>> {
        let rel = self.normalize_rel(path)?;
        let branch = self.refs.head_branch()?;
        let conn = self.db.reader()?;
        let entries = history::log(&conn, &rel, branch.id, limit)?;
        if entries.is_empty() {
            return Err(ChronologError::NotTracked(PathBuf::from(rel)));
        }
        Ok(entries)
    }

    /// Resolve a (possibly abbreviated) version hash to its record.
    pub fn version_info(&self, hash_or_prefix: &str) -> Result<VersionRecord> {
        let conn = self.db.reader()?;
        let hash = Database::resolve_version_prefix(&conn, hash_or_prefix)?;
        Database::version_by_hash(&conn, &hash)?
            .ok_or_else(|| ChronologError::HashUnknown(hash_or_prefix.to_string()))
    }

    /// Raw blob bytes of a version.
    pub fn show(&self, hash_or_prefix: &str) -> Result<Vec<u8>> {
        let record = self.version_info(hash_or_prefix)?;
        self.objects.get(&record.blob_hash)
    }

    /// Unified diff between two versions, or between a version and the
    /// current working-tree content when `b` is `None`.
    pub fn diff(&self, a: &str, b: Option<&str>) -> Result<FileDiff> {
        let record_a = self.version_info(a)?;
        let content_a = self.objects.get(&record_a.blob_hash)?;
        let label_a = format!("{} ({})", record_a.file_path, record_a.version_hash.short());

        let (content_b, label_b) = match b {
            Some(b) => {
                let record_b = self.version_info(b)?;
                let content = self.objects.get(&record_b.blob_hash)?;
                let label = format!("{} ({})", record_b.file_path, record_b.version_hash.short());
                (content, label)
            }
            None => {
                let current = self.root.join(&record_a.file_path);
                let content = fs::read(&current)?;
                (content, format!("{} (current)", record_a.file_path))
            }
        };

        diff::unified_diff(
            &content_a,
            &content_b,
            &label_a,
            &label_b,
            &DiffOptions {
                fallback_encoding: self.config.fallback_encoding,
                binary_scan_limit: self.config.binary_scan_limit,
                ..Default::default()
            },
        )
    }

    /// Restore a version's content into the working tree.
    ///
    /// The write is atomic, and the restoration itself is recorded through
    /// the ordinary commit path so history stays append-only. Unsaved
    /// working-tree content is captured first.
    pub fn checkout(&self, hash_or_prefix: &str, path: &Path) -> Result<VersionRecord> {
        let record = self.version_info(hash_or_prefix)?;
        let content = self.objects.get(&record.blob_hash)?;
        let rel = self.normalize_rel(path)?;
        let target = self.root.join(&rel);
        let short = record.version_hash.short();

        if target.exists() {
            let current = fs::read(&target)?;
            let branch = self.refs.head_branch()?;
            let conn = self.db.reader()?;
            let head = Database::file_head(&conn, &rel, branch.id)?;
            drop(conn);
            if head.map(|h| h.blob_hash) != Some(ContentHash::of(&current)) {
                self.commit_bytes(
                    path,
                    &current,
                    Some(format!("before checkout to {short}")),
                    false,
                )?;
            }
        }

        // Never leave a half-written file: stage next to the target, then
        // rename over it.
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let staged = target.with_extension("chronolog-staged");
        fs::write(&staged, &content)?;
        fs::rename(&staged, &target)?;

        let recorded = self
            .commit_bytes(
                path,
                &content,
                Some(format!("checked out from {short}")),
                false,
            )?
            .expect("checkout always records");
        info!(path = %rel, from = %short, "checked out version");
        Ok(recorded)
    }

    // === Branches & tags ===

    pub fn head_branch(&self) -> Result<BranchRecord> {
        self.refs.head_branch()
    }

    pub fn branch_create(&self, name: &str, from: Option<&str>) -> Result<BranchRecord> {
        self.refs.branch_create(name, from)
    }

    pub fn branch_switch(&self, name: &str) -> Result<BranchRecord> {
        self.refs.branch_switch(name)
    }

    pub fn branch_delete(&self, name: &str) -> Result<()> {
        self.refs.branch_delete(name)
    }

    pub fn branch_list(&self) -> Result<(String, Vec<BranchRecord>)> {
        self.refs.branch_list()
    }

    /// Tag a version. With no target, the most recently recorded version
    /// is tagged.
    pub fn tag_create(
        &self,
        name: &str,
        hash_or_prefix: Option<&str>,
        description: Option<&str>,
    ) -> Result<TagRecord> {
        let version_hash = match hash_or_prefix {
            Some(prefix) => self.version_info(prefix)?.version_hash,
            None => {
                let conn = self.db.reader()?;
                Database::latest_version(&conn)?
                    .ok_or_else(|| ChronologError::HashUnknown("latest".to_string()))?
                    .version_hash
            }
        };
        self.refs.tag_create(name, version_hash, description)
    }

    pub fn tag_delete(&self, name: &str) -> Result<()> {
        self.refs.tag_delete(name)
    }

    pub fn tag_list(&self) -> Result<Vec<TagRecord>> {
        self.refs.tag_list()
    }

    // === Search ===

    pub fn search(&self, pattern: &str, opts: &SearchOptions) -> Result<Vec<SearchHit>> {
        self.search.query(pattern, opts)
    }

    pub fn search_changes(
        &self,
        added: Option<&str>,
        removed: Option<&str>,
    ) -> Result<Vec<ChangeHit>> {
        self.search.search_changes(added, removed)
    }

    pub fn reindex(
        &self,
        progress: Option<&mut dyn FnMut(u64, u64)>,
    ) -> Result<ReindexReport> {
        let report = self.search.reindex_all(progress)?;
        self.db.with_tx(|tx| {
            Database::meta_set(tx, SEARCH_DIRTY_KEY, "0")?;
            Ok(())
        })?;
        Ok(report)
    }

    pub fn search_stats(&self) -> Result<SearchStats> {
        self.search.stats()
    }

    /// True when a commit skipped its index update and a reindex is due.
    pub fn search_needs_reconcile(&self) -> Result<bool> {
        let conn = self.db.reader()?;
        Ok(Database::meta_get(&conn, SEARCH_DIRTY_KEY)?.as_deref() == Some("1"))
    }

    // === Merge ===

    /// Three-way merge of three version refs.
    pub fn merge(
        &self,
        base: &str,
        ours: &str,
        theirs: &str,
        policy: MergePolicy,
    ) -> Result<MergeResult> {
        let base_blob = self.show(base)?;
        let ours_blob = self.show(ours)?;
        let theirs_blob = self.show(theirs)?;
        Ok(merge::three_way_merge(
            &base_blob,
            &ours_blob,
            &theirs_blob,
            policy,
            self.config.binary_scan_limit,
        ))
    }

    // === Maintenance ===

    /// Collect blobs no version references.
    pub fn gc(&self) -> Result<GcStats> {
        gc::collect(&self.db, &self.objects, gc::MIN_ORPHAN_AGE)
    }

    /// Verify object integrity, quarantining corrupt blobs.
    pub fn verify(&self) -> Result<VerifyReport> {
        self.objects.verify()
    }

    pub fn store_stats(&self) -> Result<StoreStats> {
        self.objects.stats()
    }

    // === Ignore rules ===

    /// Compile the current ignore rules and record the snapshot used.
    pub fn load_ignore_filter(&self) -> Result<IgnoreFilter> {
        let filter = IgnoreFilter::load(&self.root)?;
        self.snapshot_ignore_rules()?;
        Ok(filter)
    }

    fn snapshot_ignore_rules(&self) -> Result<()> {
        let file = self.root.join(chronolog_core::IGNORE_FILE_NAME);
        let content = if file.exists() {
            fs::read_to_string(&file)?
        } else {
            String::new()
        };
        self.db.with_tx(|tx| {
            Database::set_ignore_snapshot(tx, &content, now_micros())?;
            Ok(())
        })
    }

    // === Events ===

    /// Subscribe to post-commit events. Hook execution lives outside the
    /// core and consumes this stream.
    pub fn subscribe_commits(&self) -> Receiver<CommitEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    fn publish(&self, event: CommitEvent) {
        // Fire-and-forget; disconnected subscribers are dropped.
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Normalize a user-supplied path to the repo-relative, forward-slash
    /// form used as the metadata key.
    fn normalize_rel(&self, path: &Path) -> Result<String> {
        let rel = if path.is_absolute() {
            path.strip_prefix(&self.root)
                .map_err(|_| ChronologError::NotTracked(path.to_path_buf()))?
        } else {
            path
        };
        let mut parts = Vec::new();
        for component in rel.components() {
            match component {
                std::path::Component::Normal(part) => {
                    parts.push(part.to_string_lossy().into_owned())
                }
                std::path::Component::CurDir => {}
                _ => return Err(ChronologError::NotTracked(path.to_path_buf())),
            }
        }
        if parts.is_empty() {
            return Err(ChronologError::NotTracked(path.to_path_buf()));
        }
        Ok(parts.join("/"))
    }
}

fn head_branch_tx(conn: &rusqlite::Connection) -> Result<BranchRecord> {
    let name = Database::meta_get(conn, "head_branch")?
        .ok_or_else(|| ChronologError::InvalidConfig("missing head_branch".into()))?;
    Database::branch_by_name(conn, &name)?.ok_or(ChronologError::BranchMissing(name))
}

/// Version identity: hash of the canonical commit line. Identical content
/// re-saved in a different context still mints a distinct id.
fn mint_version_hash(
    blob_hash: &ContentHash,
    parent: Option<&ContentHash>,
    timestamp: i64,
    branch_id: i64,
    path: &str,
) -> ContentHash {
    let line = format!(
        "{}\n{}\n{timestamp}\n{branch_id}\n{path}\n",
        blob_hash.to_hex(),
        parent.map(|p| p.to_hex()).unwrap_or_else(|| "-".into()),
    );
    ContentHash::of(line.as_bytes())
}
