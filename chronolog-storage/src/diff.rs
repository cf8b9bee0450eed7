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

//! Line diff between blobs.
//!
//! Produces classic unified output with three lines of context. Binary
//! inputs are never line-diffed: the caller gets a structured marker
//! instead of text.

use chronolog_core::{content, FallbackEncoding, Result};
use similar::{ChangeTag, TextDiff};

/// Context lines around each hunk.
pub const DEFAULT_CONTEXT: usize = 3;

/// Outcome of diffing two blobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileDiff {
    /// Unified diff text; empty when the inputs are identical.
    Text(String),
    /// At least one side is binary; line diff refused.
    Binary { old_size: usize, new_size: usize },
}

impl FileDiff {
    /// The unified text, if this was a text diff.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FileDiff::Text(text) => Some(text),
            FileDiff::Binary { .. } => None,
        }
    }
}

/// Options for [`unified_diff`].
#[derive(Debug, Clone)]
pub struct DiffOptions {
    pub context: usize,
    pub fallback_encoding: FallbackEncoding,
    pub binary_scan_limit: usize,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            context: DEFAULT_CONTEXT,
            fallback_encoding: FallbackEncoding::default(),
            binary_scan_limit: chronolog_core::DEFAULT_BINARY_SCAN_LIMIT,
        }
    }
}

/// Diff two blobs into unified format with `---`/`+++` labels.
pub fn unified_diff(
    old: &[u8],
    new: &[u8],
    old_label: &str,
    new_label: &str,
    opts: &DiffOptions,
) -> Result<FileDiff> {
    if content::is_binary(old, opts.binary_scan_limit)
        || content::is_binary(new, opts.binary_scan_limit)
    {
        return Ok(FileDiff::Binary {
            old_size: old.len(),
            new_size: new.len(),
        });
    }

    let old_text = content::decode_text(old, opts.fallback_encoding);
    let new_text = content::decode_text(new, opts.fallback_encoding);

    let diff = TextDiff::from_lines(old_text.as_str(), new_text.as_str());
    let groups = diff.grouped_ops(opts.context);
    if groups.is_empty() {
        return Ok(FileDiff::Text(String::new()));
    }

    let mut out = String::new();
    out.push_str(&format!("--- {old_label}\n"));
    out.push_str(&format!("+++ {new_label}\n"));

    for group in &groups {
        let old_start = group.first().map(|op| op.old_range().start).unwrap_or(0);
        let new_start = group.first().map(|op| op.new_range().start).unwrap_or(0);
        let old_count: usize = group.iter().map(|op| op.old_range().len()).sum();
        let new_count: usize = group.iter().map(|op| op.new_range().len()).sum();

        out.push_str(&format!(
            "@@ -{},{} +{},{} @@\n",
            hunk_start(old_start, old_count),
            old_count,
            hunk_start(new_start, new_count),
            new_count,
        ));

        for op in group {
            for change in diff.iter_changes(op) {
                let prefix = match change.tag() {
                    ChangeTag::Equal => ' ',
                    ChangeTag::Insert => '+',
                    ChangeTag::Delete => '-',
                };
                out.push(prefix);
                out.push_str(change.value().trim_end_matches('\n'));
                out.push('\n');
            }
        }
    }

    Ok(FileDiff::Text(out))
}

// Unified headers are 1-indexed, except that an empty range reports the
// line before it.
fn hunk_start(start: usize, count: usize) -> usize {
    if count == 0 {
        start
    } else {
        start + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diff(old: &str, new: &str) -> String {
        match unified_diff(
            old.as_bytes(),
            new.as_bytes(),
            "a",
            "b",
            &DiffOptions::default(),
        )
        .unwrap()
        {
            FileDiff::Text(text) => text,
            FileDiff::Binary { .. } => panic!("unexpected binary"),
        }
    }

    #[test]
    fn identical_inputs_diff_empty() {
        assert_eq!(diff("same\n", "same\n"), "");
    }

    #[test]
    fn single_line_change() {
        let out = diff("line1\nline2\nline3\n", "line1\nchanged\nline3\n");
        assert!(out.contains("--- a\n+++ b\n"));
        assert!(out.contains("-line2\n"));
        assert!(out.contains("+changed\n"));
        assert!(out.contains(" line1\n"));
    }

    #[test]
    fn hunk_header_counts_lines() {
        let out = diff("1\n2\n3\n", "1\n2a\n3\n");
        assert!(out.contains("@@ -1,3 +1,3 @@\n"), "got:\n{out}");
    }

    #[test]
    fn addition_to_empty_file() {
        let out = diff("", "new\n");
        assert!(out.contains("@@ -0,0 +1,1 @@\n"), "got:\n{out}");
        assert!(out.contains("+new\n"));
    }

    #[test]
    fn binary_input_refuses_line_diff() {
        let result = unified_diff(b"a\0b", b"text\n", "a", "b", &DiffOptions::default()).unwrap();
        assert_eq!(
            result,
            FileDiff::Binary {
                old_size: 3,
                new_size: 5
            }
        );
    }

    #[test]
    fn context_is_limited() {
        let old = "1\n2\n3\n4\n5\n6\n7\n8\n9\n10\n";
        let new = "1\n2\n3\n4\n5x\n6\n7\n8\n9\n10\n";
        let out = diff(old, new);
        // Three lines of context either side of the change, not the whole file.
        assert!(!out.contains(" 1\n"), "got:\n{out}");
        assert!(out.contains(" 2\n"));
        assert!(out.contains(" 8\n"));
        assert!(!out.contains(" 9\n"));
    }

    /// Applying a parsed unified diff to the old content must reproduce the
    /// new content.
    #[test]
    fn round_trip_applies_cleanly() {
        let old = "alpha\nbeta\ngamma\ndelta\n";
        let new = "alpha\nBETA\ngamma\nextra\ndelta\n";
        let out = diff(old, new);
        assert_eq!(apply_unified(old, &out), new);
    }

    #[test]
    fn round_trip_with_multiple_hunks() {
        let old: String = (1..=30).map(|n| format!("line{n}\n")).collect();
        let new = old.replace("line3\n", "LINE3\n").replace("line27\n", "");
        let out = diff(&old, &new);
        assert!(out.matches("@@").count() >= 2);
        assert_eq!(apply_unified(&old, &out), new);
    }

    /// Minimal unified-diff interpreter for the round-trip property.
    fn apply_unified(old: &str, diff_text: &str) -> String {
        if diff_text.is_empty() {
            return old.to_string();
        }
        let old_lines: Vec<&str> = old.split_inclusive('\n').collect();
        let mut result = String::new();
        let mut cursor = 0usize; // index into old_lines

        for line in diff_text.lines() {
            if line.starts_with("--- ") || line.starts_with("+++ ") {
                continue;
            }
            if let Some(rest) = line.strip_prefix("@@ -") {
                let old_part = rest.split(',').next().unwrap();
                let old_start: usize = old_part.parse().unwrap();
                let hunk_old_index = old_start.saturating_sub(1);
                while cursor < hunk_old_index {
                    result.push_str(old_lines[cursor]);
                    cursor += 1;
                }
            } else if let Some(ctx) = line.strip_prefix(' ') {
                assert_eq!(old_lines[cursor].trim_end_matches('\n'), ctx);
                result.push_str(old_lines[cursor]);
                cursor += 1;
            } else if line.starts_with('-') {
                cursor += 1;
            } else if let Some(added) = line.strip_prefix('+') {
                result.push_str(added);
                result.push('\n');
            }
        }
        while cursor < old_lines.len() {
            result.push_str(old_lines[cursor]);
            cursor += 1;
        }
        result
    }
}
