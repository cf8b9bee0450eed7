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

//! Full-text search over tracked content.
//!
//! The index holds one token row per term of each live file head; ingest
//! replaces the rows of the head it supersedes, and `reindex_all` replays
//! every version in timestamp order to reach the identical state. Token
//! rows narrow candidates; matches are confirmed against blob content, so
//! regex and case-sensitive queries stay exact.

use crate::database::{Database, VersionRecord};
use crate::object_store::ObjectStore;
use chrono::{DateTime, Utc};
use chronolog_core::{content, ChronologError, ContentHash, FallbackEncoding, Result};
use globset::Glob;
use similar::{ChangeTag, TextDiff};
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Query modifiers. The default is a case-insensitive substring search
/// over everything indexed.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Treat the pattern as a regular expression.
    pub regex: bool,
    /// Match at word boundaries only.
    pub whole_word: bool,
    pub case_sensitive: bool,
    /// Only versions recorded within the last N days.
    pub recent_days: Option<u32>,
    /// Glob over file paths (e.g. `*.md`).
    pub file_glob: Option<String>,
    /// Substring filter over file paths.
    pub path_contains: Option<String>,
    pub limit: Option<usize>,
}

/// One search result, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub version_hash: ContentHash,
    pub file_path: String,
    pub timestamp: DateTime<Utc>,
    pub annotation: Option<String>,
    /// Context around the first match, with `<mark>` tags.
    pub snippet: String,
}

/// Direction of a content change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Removed,
}

/// A version where a line containing the pattern was added or removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeHit {
    pub version_hash: ContentHash,
    pub file_path: String,
    pub timestamp: DateTime<Utc>,
    pub kind: ChangeKind,
    /// The changed line that matched.
    pub line: String,
}

/// Result of a full rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReindexReport {
    pub versions_indexed: u64,
    pub total_versions: u64,
    pub term_count: u64,
}

/// Index health counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchStats {
    pub indexed_versions: u64,
    pub total_versions: u64,
    pub coverage_percent: f64,
    pub index_bytes: u64,
    /// Most-indexed file extensions, descending.
    pub top_extensions: Vec<(String, u64)>,
}

/// Tokenized full-text index backed by the metadata store.
pub struct SearchIndex {
    db: Arc<Database>,
    objects: Arc<ObjectStore>,
    binary_scan_limit: usize,
    fallback_encoding: FallbackEncoding,
}

impl SearchIndex {
    pub fn new(
        db: Arc<Database>,
        objects: Arc<ObjectStore>,
        binary_scan_limit: usize,
        fallback_encoding: FallbackEncoding,
    ) -> Self {
        Self {
            db,
            objects,
            binary_scan_limit,
            fallback_encoding,
        }
    }

    /// Index a freshly committed version inside the ingest transaction,
    /// retiring the terms of the head it replaces.
    pub fn update_for_commit(
        &self,
        conn: &rusqlite::Connection,
        record: &VersionRecord,
        replaced_head: Option<&ContentHash>,
        blob: &[u8],
    ) -> Result<()> {
        if let Some(prior) = replaced_head {
            Database::delete_search_terms(conn, prior)?;
        }
        if content::is_binary(blob, self.binary_scan_limit) {
            debug!(path = %record.file_path, "binary content not indexed");
            return Ok(());
        }
        let text = content::decode_text(blob, self.fallback_encoding);
        let terms = encode_terms(&text);
        Database::insert_search_terms(conn, &record.version_hash, &record.file_path, &terms)?;
        Ok(())
    }

    /// Drop a version's terms.
    pub fn remove_version(&self, conn: &rusqlite::Connection, hash: &ContentHash) -> Result<()> {
        Database::delete_search_terms(conn, hash)
    }

    /// Run a query against the index.
    pub fn query(&self, pattern: &str, opts: &SearchOptions) -> Result<Vec<SearchHit>> {
        if pattern.is_empty() {
            return Ok(Vec::new());
        }
        let matcher = build_matcher(pattern, opts)?;
        let path_glob = match opts.file_glob.as_deref() {
            Some(pattern) => Some(
                Glob::new(pattern)
                    .map_err(|source| ChronologError::InvalidPattern {
                        pattern: pattern.to_string(),
                        source,
                    })?
                    .compile_matcher(),
            ),
            None => None,
        };

        let conn = self.db.reader()?;
        let mut sql = String::from(
            "SELECT DISTINCT st.version_hash, st.file_path, v.timestamp, v.annotation, v.blob_hash
             FROM search_terms st
             JOIN versions v ON v.version_hash = st.version_hash",
        );
        let mut clauses: Vec<String> = Vec::new();
        let mut bound: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(days) = opts.recent_days {
            let cutoff = Utc::now().timestamp_micros() - i64::from(days) * 86_400_000_000;
            clauses.push("v.timestamp >= ?".into());
            bound.push(Box::new(cutoff));
        }
        // Token rows can pre-narrow single-token patterns; content
        // verification below keeps the result exact.
        if !opts.regex && is_single_token(pattern) {
            if opts.whole_word {
                clauses.push("st.term = ?".into());
                bound.push(Box::new(pattern.to_lowercase()));
            } else {
                clauses.push("st.term LIKE '%' || ? || '%'".into());
                bound.push(Box::new(pattern.to_lowercase()));
            }
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY v.timestamp DESC");

        let mut stmt = conn.prepare(&sql)?;
        let params_ref: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(params_ref.as_slice(), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut hits = Vec::new();
        for row in rows {
            let (version_hex, file_path, timestamp, annotation, blob_hex) = row?;
            if opts.limit.is_some_and(|max| hits.len() >= max) {
                break;
            }
            if let Some(glob) = &path_glob {
                if !glob.is_match(&file_path) {
                    continue;
                }
            }
            if let Some(fragment) = &opts.path_contains {
                if !file_path.contains(fragment.as_str()) {
                    continue;
                }
            }
            let (Some(version_hash), Some(blob_hash)) = (
                ContentHash::from_hex(&version_hex),
                ContentHash::from_hex(&blob_hex),
            ) else {
                continue;
            };
            let blob = match self.objects.get(&blob_hash) {
                Ok(blob) => blob,
                Err(e) => {
                    warn!(hash = %blob_hash, error = %e, "skipping unreadable blob in search");
                    continue;
                }
            };
            let text = content::decode_text(&blob, self.fallback_encoding);
            if let Some(m) = matcher.find(&text) {
                hits.push(SearchHit {
                    version_hash,
                    file_path,
                    timestamp: DateTime::from_timestamp_micros(timestamp).unwrap_or_default(),
                    annotation,
                    snippet: make_snippet(&text, m),
                });
            }
        }
        Ok(hits)
    }

    /// Find versions whose delta against their parent added or removed a
    /// line containing the given text.
    pub fn search_changes(
        &self,
        added: Option<&str>,
        removed: Option<&str>,
    ) -> Result<Vec<ChangeHit>> {
        let conn = self.db.reader()?;
        let versions = Database::versions_by_time(&conn)?;
        let mut blob_cache: HashMap<ContentHash, String> = HashMap::new();
        let mut hits = Vec::new();

        for record in &versions {
            let Some(parent_hash) = record.parent_hash else {
                continue;
            };
            let Some(parent) = Database::version_by_hash(&conn, &parent_hash)? else {
                continue;
            };
            if parent.blob_hash == record.blob_hash {
                continue;
            }
            let Some(old_text) = self.cached_text(&mut blob_cache, &parent.blob_hash) else {
                continue;
            };
            let Some(new_text) = self.cached_text(&mut blob_cache, &record.blob_hash) else {
                continue;
            };

            let diff = TextDiff::from_lines(old_text.as_str(), new_text.as_str());
            for change in diff.iter_all_changes() {
                let line = change.value().trim_end_matches('\n');
                match change.tag() {
                    ChangeTag::Insert => {
                        if let Some(pattern) = added {
                            if line.contains(pattern) {
                                hits.push(change_hit(record, ChangeKind::Added, line));
                            }
                        }
                    }
                    ChangeTag::Delete => {
                        if let Some(pattern) = removed {
                            if line.contains(pattern) {
                                hits.push(change_hit(record, ChangeKind::Removed, line));
                            }
                        }
                    }
                    ChangeTag::Equal => {}
                }
            }
        }
        Ok(hits)
    }

    /// Rebuild the whole index by replaying versions in timestamp order.
    /// Converges to the exact state incremental updates maintain.
    pub fn reindex_all(
        &self,
        mut progress: Option<&mut dyn FnMut(u64, u64)>,
    ) -> Result<ReindexReport> {
        let mut conn = self.db.writer();
        let tx = conn.transaction()?;
        Database::clear_search_terms(&tx)?;

        let versions = Database::versions_by_time(&tx)?;
        let total = versions.len() as u64;
        let mut heads: HashMap<(String, i64), ContentHash> = HashMap::new();
        let mut indexed = 0u64;

        for (i, record) in versions.iter().enumerate() {
            let key = (record.file_path.clone(), record.branch_id);
            if let Some(prior) = heads.insert(key, record.version_hash) {
                Database::delete_search_terms(&tx, &prior)?;
            }
            match self.objects.get(&record.blob_hash) {
                Ok(blob) if !content::is_binary(&blob, self.binary_scan_limit) => {
                    let text = content::decode_text(&blob, self.fallback_encoding);
                    let terms = encode_terms(&text);
                    Database::insert_search_terms(
                        &tx,
                        &record.version_hash,
                        &record.file_path,
                        &terms,
                    )?;
                    indexed += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(hash = %record.blob_hash, error = %e, "blob unreadable during reindex");
                }
            }
            if let Some(cb) = progress.as_mut() {
                cb(i as u64 + 1, total);
            }
        }

        let term_count = Database::search_term_count(&tx)?;
        tx.commit()?;
        info!(indexed, total, term_count, "search reindex complete");
        Ok(ReindexReport {
            versions_indexed: indexed,
            total_versions: total,
            term_count,
        })
    }

    /// Index health counters.
    pub fn stats(&self) -> Result<SearchStats> {
        let conn = self.db.reader()?;
        let indexed_versions: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT version_hash) FROM search_terms",
            [],
            |row| row.get(0),
        )?;
        let total_versions = Database::version_count(&conn)? as i64;
        let index_bytes: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(term) + LENGTH(positions)), 0) FROM search_terms",
            [],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT DISTINCT version_hash, file_path FROM search_terms",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
        let mut by_extension: BTreeMap<String, u64> = BTreeMap::new();
        for row in rows {
            let path = row?;
            if let Some((_, ext)) = path.rsplit_once('.') {
                *by_extension.entry(format!(".{ext}")).or_default() += 1;
            }
        }
        let mut top_extensions: Vec<(String, u64)> = by_extension.into_iter().collect();
        top_extensions.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_extensions.truncate(10);

        Ok(SearchStats {
            indexed_versions: indexed_versions as u64,
            total_versions: total_versions as u64,
            coverage_percent: if total_versions > 0 {
                indexed_versions as f64 / total_versions as f64 * 100.0
            } else {
                0.0
            },
            index_bytes: index_bytes as u64,
            top_extensions,
        })
    }

    fn cached_text(
        &self,
        cache: &mut HashMap<ContentHash, String>,
        hash: &ContentHash,
    ) -> Option<String> {
        if let Some(text) = cache.get(hash) {
            return Some(text.clone());
        }
        let blob = self.objects.get(hash).ok()?;
        if content::is_binary(&blob, self.binary_scan_limit) {
            return None;
        }
        let text = content::decode_text(&blob, self.fallback_encoding);
        cache.insert(*hash, text.clone());
        Some(text)
    }
}

fn change_hit(record: &VersionRecord, kind: ChangeKind, line: &str) -> ChangeHit {
    ChangeHit {
        version_hash: record.version_hash,
        file_path: record.file_path.clone(),
        timestamp: DateTime::from_timestamp_micros(record.timestamp).unwrap_or_default(),
        kind,
        line: line.to_string(),
    }
}

/// Split on non-alphanumeric, lowercase, and record 0-based token
/// positions. Returns `(term, positions-as-JSON)` rows.
pub fn tokenize(text: &str) -> BTreeMap<String, Vec<u32>> {
    let mut terms: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for (position, token) in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .enumerate()
    {
        terms
            .entry(token.to_lowercase())
            .or_default()
            .push(position as u32);
    }
    terms
}

fn encode_terms(text: &str) -> Vec<(String, String)> {
    tokenize(text)
        .into_iter()
        .map(|(term, positions)| {
            let encoded = serde_json::to_string(&positions).unwrap_or_else(|_| "[]".into());
            (term, encoded)
        })
        .collect()
}

fn is_single_token(pattern: &str) -> bool {
    !pattern.is_empty() && pattern.chars().all(char::is_alphanumeric)
}

/// A compiled pattern ready to scan content.
struct Matcher {
    regex: regex::Regex,
}

impl Matcher {
    fn find(&self, text: &str) -> Option<Range<usize>> {
        self.regex.find(text).map(|m| m.range())
    }
}

fn build_matcher(pattern: &str, opts: &SearchOptions) -> Result<Matcher> {
    let mut source = if opts.regex {
        pattern.to_string()
    } else {
        regex::escape(pattern)
    };
    if opts.whole_word {
        source = format!(r"\b(?:{source})\b");
    }
    if !opts.case_sensitive {
        source = format!("(?i){source}");
    }
    let regex = regex::Regex::new(&source)
        .map_err(|e| ChronologError::InvalidRegex(e.to_string()))?;
    Ok(Matcher { regex })
}

const SNIPPET_CONTEXT: usize = 40;

fn make_snippet(text: &str, m: Range<usize>) -> String {
    let before: String = text[..m.start]
        .chars()
        .rev()
        .take(SNIPPET_CONTEXT)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let after: String = text[m.end..].chars().take(SNIPPET_CONTEXT).collect();
    let truncated_front = text[..m.start].chars().count() > SNIPPET_CONTEXT;
    let truncated_back = text[m.end..].chars().count() > SNIPPET_CONTEXT;

    let mut snippet = String::new();
    if truncated_front {
        snippet.push_str("...");
    }
    snippet.push_str(&before);
    snippet.push_str("<mark>");
    snippet.push_str(&text[m.start..m.end]);
    snippet.push_str("</mark>");
    snippet.push_str(&after);
    if truncated_back {
        snippet.push_str("...");
    }
    snippet.replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::now_micros;
    use chronolog_core::CompressionAlgo;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        db: Arc<Database>,
        objects: Arc<ObjectStore>,
        index: SearchIndex,
        branch_id: i64,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let db = Arc::new(Database::open(dir.path().join("history.db")).unwrap());
            let objects = Arc::new(
                ObjectStore::open(dir.path().join("objects"), CompressionAlgo::Zlib).unwrap(),
            );
            let branch_id = {
                let conn = db.writer();
                Database::create_branch(&conn, "main", None, now_micros())
                    .unwrap()
                    .id
            };
            let index = SearchIndex::new(
                Arc::clone(&db),
                Arc::clone(&objects),
                chronolog_core::DEFAULT_BINARY_SCAN_LIMIT,
                FallbackEncoding::default(),
            );
            Self {
                _dir: dir,
                db,
                objects,
                index,
                branch_id,
            }
        }

        /// Commit a version the way ingest does: blob, row, head, index.
        fn commit(&self, path: &str, text: &str, ts: i64) -> VersionRecord {
            let blob_hash = self.objects.put(text.as_bytes()).unwrap();
            let conn = self.db.writer();
            let prior = Database::file_head(&conn, path, self.branch_id).unwrap();
            let seed = format!(
                "{}\n{}\n{ts}\n{}\n{path}\n",
                blob_hash.to_hex(),
                prior
                    .as_ref()
                    .map(|p| p.version_hash.to_hex())
                    .unwrap_or_else(|| "-".into()),
                self.branch_id
            );
            let record = VersionRecord {
                version_hash: ContentHash::of(seed.as_bytes()),
                file_path: path.to_string(),
                blob_hash,
                timestamp: ts,
                parent_hash: prior.as_ref().map(|p| p.version_hash),
                branch_id: self.branch_id,
                annotation: None,
                size: text.len() as u64,
            };
            Database::insert_version(&conn, &record).unwrap();
            Database::set_file_head(&conn, path, self.branch_id, &record.version_hash).unwrap();
            self.index
                .update_for_commit(
                    &conn,
                    &record,
                    prior.as_ref().map(|p| &p.version_hash),
                    text.as_bytes(),
                )
                .unwrap();
            record
        }
    }

    #[test]
    fn tokenizer_splits_and_positions() {
        let terms = tokenize("Hello, world! hello again");
        assert_eq!(terms["hello"], vec![0, 2]);
        assert_eq!(terms["world"], vec![1]);
        assert_eq!(terms["again"], vec![3]);
    }

    #[test]
    fn plain_search_finds_and_snippets() {
        let f = Fixture::new();
        f.commit("notes.txt", "the meeting notes mention chronolog today\n", 10);

        let hits = f.index.query("chronolog", &SearchOptions::default()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_path, "notes.txt");
        assert!(hits[0].snippet.contains("<mark>chronolog</mark>"));
    }

    #[test]
    fn search_is_case_insensitive_by_default() {
        let f = Fixture::new();
        f.commit("a.txt", "Mixed CASE Content\n", 10);
        assert_eq!(f.index.query("mixed case", &SearchOptions::default()).unwrap().len(), 1);

        let sensitive = SearchOptions {
            case_sensitive: true,
            ..Default::default()
        };
        assert!(f.index.query("mixed case", &sensitive).unwrap().is_empty());
        assert_eq!(f.index.query("Mixed CASE", &sensitive).unwrap().len(), 1);
    }

    #[test]
    fn whole_word_respects_boundaries() {
        let f = Fixture::new();
        f.commit("a.txt", "cat catalog\n", 10);
        let opts = SearchOptions {
            whole_word: true,
            ..Default::default()
        };
        let hits = f.index.query("cat", &opts).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].snippet.starts_with("<mark>cat</mark>"));
    }

    #[test]
    fn regex_search_works_and_invalid_is_an_error() {
        let f = Fixture::new();
        f.commit("a.txt", "error code E042 observed\n", 10);
        let opts = SearchOptions {
            regex: true,
            ..Default::default()
        };
        assert_eq!(f.index.query(r"E\d+", &opts).unwrap().len(), 1);
        assert!(matches!(
            f.index.query(r"E[\d", &opts),
            Err(ChronologError::InvalidRegex(_))
        ));
    }

    #[test]
    fn file_glob_filters_paths() {
        let f = Fixture::new();
        f.commit("readme.md", "shared keyword\n", 10);
        f.commit("main.rs", "shared keyword\n", 20);
        let opts = SearchOptions {
            file_glob: Some("*.md".into()),
            ..Default::default()
        };
        let hits = f.index.query("shared", &opts).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_path, "readme.md");
    }

    #[test]
    fn only_the_live_head_is_indexed() {
        let f = Fixture::new();
        f.commit("a.txt", "first draft wording\n", 10);
        f.commit("a.txt", "second draft wording\n", 20);

        assert!(f.index.query("first", &SearchOptions::default()).unwrap().is_empty());
        assert_eq!(f.index.query("second", &SearchOptions::default()).unwrap().len(), 1);
    }

    #[test]
    fn results_are_newest_first_and_limited() {
        let f = Fixture::new();
        f.commit("a.txt", "keyword alpha\n", 10);
        f.commit("b.txt", "keyword beta\n", 20);
        f.commit("c.txt", "keyword gamma\n", 30);

        let hits = f.index.query("keyword", &SearchOptions::default()).unwrap();
        assert_eq!(
            hits.iter().map(|h| h.file_path.as_str()).collect::<Vec<_>>(),
            vec!["c.txt", "b.txt", "a.txt"]
        );

        let limited = f
            .index
            .query(
                "keyword",
                &SearchOptions {
                    limit: Some(2),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn binary_content_is_not_indexed() {
        let f = Fixture::new();
        f.commit("blob.bin", "prefix\0suffix", 10);
        assert!(f.index.query("prefix", &SearchOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn change_search_filters_by_sign() {
        let f = Fixture::new();
        f.commit("a.txt", "stable\nold feature\n", 10);
        f.commit("a.txt", "stable\nnew feature\n", 20);

        let added = f.index.search_changes(Some("new feature"), None).unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].kind, ChangeKind::Added);
        assert_eq!(added[0].line, "new feature");

        let removed = f.index.search_changes(None, Some("old feature")).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].kind, ChangeKind::Removed);

        // "stable" never changed sign.
        assert!(f.index.search_changes(Some("stable"), None).unwrap().is_empty());
    }

    #[test]
    fn reindex_reproduces_incremental_state() {
        let f = Fixture::new();
        f.commit("a.txt", "alpha beta\n", 10);
        f.commit("a.txt", "alpha gamma\n", 20);
        f.commit("b.txt", "delta\n", 30);

        let before = f.index.query("alpha", &SearchOptions::default()).unwrap();
        let term_count_before = {
            let conn = f.db.writer();
            Database::search_term_count(&conn).unwrap()
        };

        let report = f.index.reindex_all(None).unwrap();
        assert_eq!(report.total_versions, 3);
        assert_eq!(report.versions_indexed, 3);
        assert_eq!(report.term_count, term_count_before);

        let after = f.index.query("alpha", &SearchOptions::default()).unwrap();
        assert_eq!(before, after);
        // Superseded content stays unindexed after the rebuild.
        assert!(f.index.query("beta", &SearchOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn reindex_reports_progress() {
        let f = Fixture::new();
        f.commit("a.txt", "one\n", 10);
        f.commit("b.txt", "two\n", 20);

        let mut seen = Vec::new();
        let mut cb = |done: u64, total: u64| seen.push((done, total));
        f.index.reindex_all(Some(&mut cb)).unwrap();
        assert_eq!(seen, vec![(1, 2), (2, 2)]);
    }

    #[test]
    fn stats_report_coverage_and_extensions() {
        let f = Fixture::new();
        f.commit("a.md", "words here\n", 10);
        f.commit("b.md", "more words\n", 20);
        f.commit("c.txt", "other\n", 30);

        let stats = f.index.stats().unwrap();
        assert_eq!(stats.indexed_versions, 3);
        assert_eq!(stats.total_versions, 3);
        assert!((stats.coverage_percent - 100.0).abs() < f64::EPSILON);
        assert!(stats.index_bytes > 0);
        assert_eq!(stats.top_extensions[0].0, ".md");
        assert_eq!(stats.top_extensions[0].1, 2);
    }

    #[test]
    fn recency_window_filters_old_versions() {
        let f = Fixture::new();
        let old_ts = (Utc::now() - chrono::Duration::days(30)).timestamp_micros();
        f.commit("old.txt", "ancient needle\n", old_ts);
        let new_ts = Utc::now().timestamp_micros();
        f.commit("new.txt", "fresh needle\n", new_ts);

        let opts = SearchOptions {
            recent_days: Some(7),
            ..Default::default()
        };
        let hits = f.index.query("needle", &opts).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_path, "new.txt");
    }
}
