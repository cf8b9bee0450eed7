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

//! Three-way line merge.
//!
//! Both sides are diffed against the base; the merge walks the base line
//! by line, taking whichever side changed. Contiguous lines where the
//! sides diverge incompatibly become one conflict region. Policies decide
//! what a conflict turns into: refusal (`Auto`), one side (`Ours`,
//! `Theirs`), or marker-annotated text (`Manual`).

use chronolog_core::{content, FallbackEncoding};
use similar::{capture_diff_slices, Algorithm, DiffOp};
use std::collections::BTreeMap;

/// Conflict marker lines, also understood by [`resolve_markers`].
pub const MARKER_OURS: &str = "<<<<<<< ours";
pub const MARKER_SEP: &str = "=======";
pub const MARKER_THEIRS: &str = ">>>>>>> theirs";

/// How conflicts are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Succeed only when there are no conflicts.
    Auto,
    /// Take our lines in every conflict.
    Ours,
    /// Take their lines in every conflict.
    Theirs,
    /// Return annotated text with conflict markers.
    Manual,
}

/// Which side survives when stripping markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveSide {
    Ours,
    Theirs,
    Both,
}

/// A contiguous run of base lines where the sides diverged incompatibly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRegion {
    /// First base line of the region (0-indexed).
    pub start_line: usize,
    /// One past the last base line of the region.
    pub end_line: usize,
    pub base_lines: Vec<String>,
    pub our_lines: Vec<String>,
    pub their_lines: Vec<String>,
}

/// Outcome of a three-way merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    pub success: bool,
    /// Merged content, conflict-markered text (`Manual`), or empty for an
    /// unresolvable binary conflict.
    pub content: Vec<u8>,
    pub conflicts: Vec<ConflictRegion>,
    /// True when the inputs were handled as binary.
    pub binary: bool,
}

/// One side's edits, decomposed against the base.
#[derive(Debug, Default)]
struct EditScript {
    /// Base indices this side removed (including replaced lines).
    removed: Vec<bool>,
    /// Lines this side inserted, anchored before the given base index.
    inserted: BTreeMap<usize, Vec<String>>,
}

impl EditScript {
    fn against(base: &[String], side: &[String]) -> Self {
        let mut script = EditScript {
            removed: vec![false; base.len()],
            inserted: BTreeMap::new(),
        };
        for op in capture_diff_slices(Algorithm::Myers, base, side) {
            match op {
                DiffOp::Equal { .. } => {}
                DiffOp::Delete {
                    old_index, old_len, ..
                } => {
                    for i in old_index..old_index + old_len {
                        script.removed[i] = true;
                    }
                }
                DiffOp::Insert {
                    old_index,
                    new_index,
                    new_len,
                } => {
                    script
                        .inserted
                        .entry(old_index)
                        .or_default()
                        .extend(side[new_index..new_index + new_len].iter().cloned());
                }
                DiffOp::Replace {
                    old_index,
                    old_len,
                    new_index,
                    new_len,
                } => {
                    for i in old_index..old_index + old_len {
                        script.removed[i] = true;
                    }
                    script
                        .inserted
                        .entry(old_index)
                        .or_default()
                        .extend(side[new_index..new_index + new_len].iter().cloned());
                }
            }
        }
        script
    }

    /// Whether this side touches base position `i` (edits the line or
    /// inserts before it).
    fn touches(&self, i: usize) -> bool {
        self.removed.get(i).copied().unwrap_or(false) || self.inserted.contains_key(&i)
    }

    /// The lines this side produces at base position `i`: anchored
    /// insertions, then the base line if kept.
    fn output_at(&self, base: &[String], i: usize) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(ins) = self.inserted.get(&i) {
            out.extend(ins.iter().cloned());
        }
        if i < base.len() && !self.removed[i] {
            out.push(base[i].clone());
        }
        out
    }
}

/// Merge `ours` and `theirs` against their common ancestor `base`.
pub fn three_way_merge(
    base: &[u8],
    ours: &[u8],
    theirs: &[u8],
    policy: MergePolicy,
    scan_limit: usize,
) -> MergeResult {
    if content::is_binary(base, scan_limit)
        || content::is_binary(ours, scan_limit)
        || content::is_binary(theirs, scan_limit)
    {
        return merge_binary(base, ours, theirs, policy);
    }

    let fallback = FallbackEncoding::Utf8Lossy;
    let base_text = content::decode_text(base, fallback);
    let ours_text = content::decode_text(ours, fallback);
    let theirs_text = content::decode_text(theirs, fallback);

    let base_lines = split_lines(&base_text);
    let our_lines = split_lines(&ours_text);
    let their_lines = split_lines(&theirs_text);

    let ours_edits = EditScript::against(&base_lines, &our_lines);
    let theirs_edits = EditScript::against(&base_lines, &their_lines);

    let mut merged: Vec<String> = Vec::new();
    let mut conflicts: Vec<ConflictRegion> = Vec::new();
    let mut pending: Option<ConflictRegion> = None;

    // Positions 0..=len: index len carries trailing insertions only.
    for i in 0..=base_lines.len() {
        let ours_touches = ours_edits.touches(i);
        let theirs_touches = theirs_edits.touches(i);
        let ours_out = ours_edits.output_at(&base_lines, i);
        let theirs_out = theirs_edits.output_at(&base_lines, i);

        let divergent = ours_touches && theirs_touches && ours_out != theirs_out;
        if divergent {
            let region = pending.get_or_insert_with(|| ConflictRegion {
                start_line: i,
                end_line: i,
                base_lines: Vec::new(),
                our_lines: Vec::new(),
                their_lines: Vec::new(),
            });
            region.end_line = (i + 1).min(base_lines.len());
            if i < base_lines.len() {
                region.base_lines.push(base_lines[i].clone());
            }
            region.our_lines.extend(ours_out);
            region.their_lines.extend(theirs_out);
            continue;
        }

        if let Some(region) = pending.take() {
            emit_conflict(&mut merged, &mut conflicts, region, policy);
        }

        if ours_touches {
            merged.extend(ours_out);
        } else if theirs_touches {
            merged.extend(theirs_out);
        } else if i < base_lines.len() {
            merged.push(base_lines[i].clone());
        }
    }
    if let Some(region) = pending.take() {
        emit_conflict(&mut merged, &mut conflicts, region, policy);
    }

    let trailing_newline = ours_text.ends_with('\n')
        || theirs_text.ends_with('\n')
        || (ours_text.is_empty() && theirs_text.is_empty() && base_text.ends_with('\n'));
    let mut text = merged.join("\n");
    if trailing_newline && !merged.is_empty() {
        text.push('\n');
    }

    let success = match policy {
        MergePolicy::Auto | MergePolicy::Manual => conflicts.is_empty(),
        MergePolicy::Ours | MergePolicy::Theirs => true,
    };

    MergeResult {
        success,
        content: text.into_bytes(),
        conflicts,
        binary: false,
    }
}

fn emit_conflict(
    merged: &mut Vec<String>,
    conflicts: &mut Vec<ConflictRegion>,
    region: ConflictRegion,
    policy: MergePolicy,
) {
    match policy {
        MergePolicy::Ours => merged.extend(region.our_lines.iter().cloned()),
        MergePolicy::Theirs => merged.extend(region.their_lines.iter().cloned()),
        MergePolicy::Auto | MergePolicy::Manual => {
            merged.push(MARKER_OURS.to_string());
            merged.extend(region.our_lines.iter().cloned());
            merged.push(MARKER_SEP.to_string());
            merged.extend(region.their_lines.iter().cloned());
            merged.push(MARKER_THEIRS.to_string());
        }
    }
    conflicts.push(region);
}

/// Binary content cannot be line-merged; only trivial resolutions apply.
fn merge_binary(base: &[u8], ours: &[u8], theirs: &[u8], policy: MergePolicy) -> MergeResult {
    let resolved: Option<&[u8]> = if ours == theirs {
        Some(ours)
    } else if ours == base {
        Some(theirs)
    } else if theirs == base {
        Some(ours)
    } else {
        match policy {
            MergePolicy::Ours => Some(ours),
            MergePolicy::Theirs => Some(theirs),
            MergePolicy::Auto | MergePolicy::Manual => None,
        }
    };

    match resolved {
        Some(content) => MergeResult {
            success: true,
            content: content.to_vec(),
            conflicts: Vec::new(),
            binary: true,
        },
        None => MergeResult {
            success: false,
            content: Vec::new(),
            conflicts: Vec::new(),
            binary: true,
        },
    }
}

/// True when `text` still contains conflict markers.
pub fn has_conflicts(text: &str) -> bool {
    text.lines()
        .any(|l| l == MARKER_OURS || l == MARKER_SEP || l == MARKER_THEIRS)
}

/// Strip conflict markers, keeping the chosen side.
pub fn resolve_markers(text: &str, side: ResolveSide) -> String {
    #[derive(PartialEq)]
    enum State {
        Outside,
        InOurs,
        InTheirs,
    }

    let mut state = State::Outside;
    let mut ours: Vec<&str> = Vec::new();
    let mut theirs: Vec<&str> = Vec::new();
    let mut out: Vec<&str> = Vec::new();

    for line in text.lines() {
        match state {
            State::Outside if line == MARKER_OURS => state = State::InOurs,
            State::Outside => out.push(line),
            State::InOurs if line == MARKER_SEP => state = State::InTheirs,
            State::InOurs => ours.push(line),
            State::InTheirs if line == MARKER_THEIRS => {
                match side {
                    ResolveSide::Ours => out.append(&mut ours),
                    ResolveSide::Theirs => out.append(&mut theirs),
                    ResolveSide::Both => {
                        out.append(&mut ours);
                        out.append(&mut theirs);
                    }
                }
                ours.clear();
                theirs.clear();
                state = State::Outside;
            }
            State::InTheirs => theirs.push(line),
        }
    }

    let mut resolved = out.join("\n");
    if text.ends_with('\n') && !resolved.is_empty() {
        resolved.push('\n');
    }
    resolved
}

fn split_lines(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    text.strip_suffix('\n')
        .unwrap_or(text)
        .split('\n')
        .map(str::to_string)
        .collect()
}
