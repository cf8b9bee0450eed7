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

//! Content-addressable object store.
//!
//! Blobs live under `objects/<aa>/<remaining-hex>` where `<aa>` is the
//! first two hex characters of the SHA-256 of the *uncompressed* content.
//! Files are written to `objects/tmp/` and atomically renamed into place,
//! so a crash can only leave `.tmp` leftovers (swept on open) and never a
//! torn object. `put` is idempotent; concurrent writers of the same hash
//! are safe because they race to rename identical bytes onto one path.

use crate::compression;
use chronolog_core::{ChronologError, CompressionAlgo, ContentHash, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

const TMP_DIR: &str = "tmp";
const QUARANTINE_DIR: &str = "quarantine";
const TMP_SUFFIX: &str = ".tmp";

/// Counters describing the store contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub object_count: u64,
    pub bytes_on_disk: u64,
}

/// Report from a full-store verification pass.
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    pub checked: u64,
    /// Hashes whose stored content no longer matches; files were moved to
    /// the quarantine directory, not deleted.
    pub quarantined: Vec<ContentHash>,
}

/// Content-addressable blob storage rooted at `objects/`.
pub struct ObjectStore {
    root: PathBuf,
    algo: CompressionAlgo,
    tmp_counter: AtomicU64,
}

impl ObjectStore {
    /// Open (or create) the store at `root`, sweeping in-flight leftovers
    /// from a previous crash.
    pub fn open(root: impl Into<PathBuf>, algo: CompressionAlgo) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(TMP_DIR))?;
        let store = Self {
            root,
            algo,
            tmp_counter: AtomicU64::new(0),
        };
        store.sweep_tmp()?;
        Ok(store)
    }

    /// Store content, returning its hash. Idempotent: existing objects are
    /// not rewritten.
    pub fn put(&self, content: &[u8]) -> Result<ContentHash> {
        let hash = ContentHash::of(content);
        let path = self.object_path(&hash);
        if path.exists() {
            return Ok(hash);
        }

        let encoded = compression::encode(content, self.algo)?;
        let tmp = self.tmp_path();
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&encoded)?;
            file.sync_all()?;
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&tmp, &path)?;
        debug!(hash = %hash, bytes = content.len(), "stored object");
        Ok(hash)
    }

    /// Fetch content by hash, verifying identity on the way out.
    pub fn get(&self, hash: &ContentHash) -> Result<Vec<u8>> {
        let path = self.object_path(hash);
        let encoded = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ChronologError::HashUnknown(hash.to_hex()))
            }
            Err(e) => return Err(e.into()),
        };
        let content = compression::decode(&encoded)?;
        let actual = ContentHash::of(&content);
        if actual != *hash {
            return Err(ChronologError::CorruptObject {
                hash: hash.to_hex(),
                actual: actual.to_hex(),
            });
        }
        Ok(content)
    }

    /// Whether an object exists.
    pub fn has(&self, hash: &ContentHash) -> bool {
        self.object_path(hash).exists()
    }

    /// Remove an object. Only garbage collection calls this, after proving
    /// no live version references the hash.
    pub fn delete(&self, hash: &ContentHash) -> Result<u64> {
        let path = self.object_path(hash);
        let size = fs::metadata(&path)?.len();
        fs::remove_file(&path)?;
        Ok(size)
    }

    /// All hashes currently on disk.
    pub fn list(&self) -> Result<Vec<ContentHash>> {
        let mut hashes = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let dir_name = entry.file_name().to_string_lossy().into_owned();
            if !entry.file_type()?.is_dir() || dir_name.len() != 2 {
                continue;
            }
            for object in fs::read_dir(entry.path())? {
                let object = object?;
                let file_name = object.file_name().to_string_lossy().into_owned();
                if let Some(hash) = ContentHash::from_hex(&format!("{dir_name}{file_name}")) {
                    hashes.push(hash);
                }
            }
        }
        Ok(hashes)
    }

    /// Object count and on-disk footprint.
    pub fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();
        for hash in self.list()? {
            stats.object_count += 1;
            stats.bytes_on_disk += fs::metadata(self.object_path(&hash))?.len();
        }
        Ok(stats)
    }

    /// Recompute every stored object's hash; move mismatches into the
    /// quarantine directory for operator inspection.
    pub fn verify(&self) -> Result<VerifyReport> {
        let mut report = VerifyReport::default();
        for hash in self.list()? {
            report.checked += 1;
            let path = self.object_path(&hash);
            let healthy = fs::read(&path)
                .ok()
                .and_then(|encoded| compression::decode(&encoded).ok())
                .is_some_and(|content| ContentHash::of(&content) == hash);
            if !healthy {
                let jail = self.root.join(QUARANTINE_DIR);
                fs::create_dir_all(&jail)?;
                fs::rename(&path, jail.join(hash.to_hex()))?;
                warn!(hash = %hash, "quarantined corrupt object");
                report.quarantined.push(hash);
            }
        }
        Ok(report)
    }

    /// Remove `.tmp` files left by writes that never completed.
    pub fn sweep_tmp(&self) -> Result<()> {
        let tmp_dir = self.root.join(TMP_DIR);
        for entry in fs::read_dir(&tmp_dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().ends_with(TMP_SUFFIX) {
                warn!(path = %entry.path().display(), "sweeping abandoned write");
                let _ = fs::remove_file(entry.path());
            }
        }
        Ok(())
    }

    fn object_path(&self, hash: &ContentHash) -> PathBuf {
        let (dir, file) = hash.fan_out();
        self.root.join(dir).join(file)
    }

    fn tmp_path(&self) -> PathBuf {
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        self.root
            .join(TMP_DIR)
            .join(format!("{}-{n}{TMP_SUFFIX}", std::process::id()))
    }

    /// The `objects/` directory this store is rooted at.
    pub fn root(&self) -> &Path {
        &self.root
    }
}
