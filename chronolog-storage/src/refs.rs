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

//! Branch and tag management.
//!
//! Branches and tags are mutable namespace rows in the metadata store; the
//! active branch is tracked in `meta.head_branch` and mirrored into the
//! plain-text `HEAD` file for the stable on-disk layout. Switching a
//! branch never rewrites the working tree; ingest simply starts recording
//! against the new branch's file heads.

use crate::database::{now_micros, BranchRecord, Database, TagRecord};
use chronolog_core::{ChronologError, ContentHash, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Default branch created at `init`.
pub const DEFAULT_BRANCH: &str = "main";

const HEAD_KEY: &str = "head_branch";

/// Branch/tag operations over the metadata store.
pub struct RefManager {
    db: Arc<Database>,
    head_file: PathBuf,
}

impl RefManager {
    pub fn new(db: Arc<Database>, head_file: PathBuf) -> Self {
        Self { db, head_file }
    }

    /// Create the default branch and HEAD pointer. Called once at `init`.
    pub fn bootstrap(&self) -> Result<BranchRecord> {
        let branch = self.db.with_tx(|tx| {
            let branch = Database::create_branch(tx, DEFAULT_BRANCH, None, now_micros())?;
            Database::meta_set(tx, HEAD_KEY, DEFAULT_BRANCH)?;
            Ok(branch)
        })?;
        self.write_head_file(DEFAULT_BRANCH)?;
        Ok(branch)
    }

    /// The branch HEAD currently points at.
    pub fn head_branch(&self) -> Result<BranchRecord> {
        let conn = self.db.reader()?;
        let name = Database::meta_get(&conn, HEAD_KEY)?
            .ok_or_else(|| ChronologError::InvalidConfig("missing head_branch".into()))?;
        Database::branch_by_name(&conn, &name)?
            .ok_or_else(|| ChronologError::BranchMissing(name))
    }

    /// Create `name`, forked from `from` (default: HEAD). The new branch
    /// starts at the source branch's file heads.
    pub fn branch_create(&self, name: &str, from: Option<&str>) -> Result<BranchRecord> {
        validate_ref_name(name)?;
        let branch = self.db.with_tx(|tx| {
            if Database::branch_by_name(tx, name)?.is_some() {
                return Err(ChronologError::BranchExists(name.to_string()));
            }
            let source_name = match from {
                Some(from_name) => from_name.to_string(),
                None => Database::meta_get(tx, HEAD_KEY)?
                    .ok_or_else(|| ChronologError::InvalidConfig("missing head_branch".into()))?,
            };
            let source = Database::branch_by_name(tx, &source_name)?
                .ok_or_else(|| ChronologError::BranchMissing(source_name))?;
            let branch = Database::create_branch(tx, name, Some(source.id), now_micros())?;
            Database::copy_file_heads(tx, source.id, branch.id)?;
            Ok(branch)
        })?;
        info!(branch = name, "created branch");
        Ok(branch)
    }

    /// Atomically move HEAD to `name`. The working tree is untouched.
    pub fn branch_switch(&self, name: &str) -> Result<BranchRecord> {
        let branch = self.db.with_tx(|tx| {
            let branch = Database::branch_by_name(tx, name)?
                .ok_or_else(|| ChronologError::BranchMissing(name.to_string()))?;
            Database::meta_set(tx, HEAD_KEY, name)?;
            Ok(branch)
        })?;
        self.write_head_file(name)?;
        info!(branch = name, "switched HEAD");
        Ok(branch)
    }

    /// Delete `name`. Refused for the HEAD branch; versions recorded on
    /// the branch remain, unreachable by branch name.
    pub fn branch_delete(&self, name: &str) -> Result<()> {
        self.db.with_tx(|tx| {
            let head = Database::meta_get(tx, HEAD_KEY)?.unwrap_or_default();
            if head == name {
                return Err(ChronologError::BranchIsHead(name.to_string()));
            }
            let branch = Database::branch_by_name(tx, name)?
                .ok_or_else(|| ChronologError::BranchMissing(name.to_string()))?;
            Database::delete_branch(tx, branch.id)?;
            Ok(())
        })?;
        info!(branch = name, "deleted branch");
        Ok(())
    }

    /// All branches plus the current HEAD name.
    pub fn branch_list(&self) -> Result<(String, Vec<BranchRecord>)> {
        let conn = self.db.reader()?;
        let head = Database::meta_get(&conn, HEAD_KEY)?
            .ok_or_else(|| ChronologError::InvalidConfig("missing head_branch".into()))?;
        Ok((head, Database::list_branches(&conn)?))
    }

    /// Attach a tag to an already-resolved version hash.
    pub fn tag_create(
        &self,
        name: &str,
        version_hash: ContentHash,
        description: Option<&str>,
    ) -> Result<TagRecord> {
        validate_ref_name(name)?;
        let tag = TagRecord {
            name: name.to_string(),
            version_hash,
            created_at: now_micros(),
            description: description.map(str::to_string),
        };
        self.db.with_tx(|tx| {
            if Database::tag_by_name(tx, name)?.is_some() {
                return Err(ChronologError::TagExists(name.to_string()));
            }
            Database::create_tag(tx, &tag)?;
            Ok(())
        })?;
        info!(tag = name, version = %version_hash, "created tag");
        Ok(tag)
    }

    /// Remove a tag. Deleting a tag never touches its version.
    pub fn tag_delete(&self, name: &str) -> Result<()> {
        self.db.with_tx(|tx| {
            if !Database::delete_tag(tx, name)? {
                return Err(ChronologError::TagMissing(name.to_string()));
            }
            Ok(())
        })
    }

    pub fn tag_list(&self) -> Result<Vec<TagRecord>> {
        let conn = self.db.reader()?;
        Database::list_tags(&conn)
    }

    pub fn tag_by_name(&self, name: &str) -> Result<Option<TagRecord>> {
        let conn = self.db.reader()?;
        Database::tag_by_name(&conn, name)
    }

    fn write_head_file(&self, branch: &str) -> Result<()> {
        std::fs::write(&self.head_file, format!("{branch}\n"))?;
        Ok(())
    }
}

/// Branch and tag names follow git-like rules.
pub fn validate_ref_name(name: &str) -> Result<()> {
    let fail = |reason: &str| {
        Err(ChronologError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    if name.is_empty() {
        return fail("empty name");
    }
    if name.starts_with('.') || name.ends_with('.') {
        return fail("cannot start or end with '.'");
    }
    if name.contains("..") {
        return fail("cannot contain '..'");
    }
    if name.contains("//") || name.starts_with('/') || name.ends_with('/') {
        return fail("malformed path separator");
    }
    for c in ['~', '^', ':', '\\', '?', '*', '[', ' ', '\t', '\n'] {
        if name.contains(c) {
            return fail(&format!("cannot contain '{}'", c.escape_default()));
        }
    }
    Ok(())
}
