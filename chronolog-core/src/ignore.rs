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

//! Ignore pattern matching with gitignore semantics.
//!
//! Patterns come from a fixed default set (editor temp files, OS metadata,
//! the repository's own metadata directory) followed by the user's
//! `.chronologignore`. Rules are evaluated in order with last-match-wins:
//! `#` comments, blank lines skipped, leading `!` re-includes, trailing `/`
//! matches directories only, leading `/` anchors to the repository root,
//! `**` crosses path segments, `*`/`?`/`[...]` are standard glob.

use crate::error::{ChronologError, Result};
use globset::{GlobBuilder, GlobMatcher};
use std::path::Path;

/// Patterns always active regardless of the user file.
pub const DEFAULT_PATTERNS: &[&str] = &[
    ".chronolog/",
    ".git/",
    ".DS_Store",
    "Thumbs.db",
    "*.swp",
    "*.swo",
    "*~",
    ".#*",
    "#*#",
];

/// Name of the user pattern file at the working-tree root.
pub const IGNORE_FILE_NAME: &str = ".chronologignore";

/// One compiled rule.
#[derive(Debug, Clone)]
struct IgnoreRule {
    /// The original pattern text, for diagnostics and listing.
    pattern: String,
    negated: bool,
    dir_only: bool,
    matcher: GlobMatcher,
}

impl IgnoreRule {
    fn compile(raw: &str) -> Result<Self> {
        let pattern = raw.to_string();
        let mut body = raw;

        let negated = body.starts_with('!');
        if negated {
            body = &body[1..];
        }

        let dir_only = body.ends_with('/');
        if dir_only {
            body = &body[..body.len() - 1];
        }

        // A slash anywhere but the end anchors the pattern to the root;
        // otherwise it matches at any depth.
        let anchored = body.starts_with('/') || body.contains('/');
        let body = body.strip_prefix('/').unwrap_or(body);
        let glob = if anchored {
            body.to_string()
        } else {
            format!("**/{body}")
        };

        let matcher = GlobBuilder::new(&glob)
            .literal_separator(true)
            .build()
            .map_err(|source| ChronologError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?
            .compile_matcher();

        Ok(Self {
            pattern,
            negated,
            dir_only,
            matcher,
        })
    }

    /// Whether this rule matches `rel` (a repo-relative path) or any of its
    /// ancestor directories. A directory-only rule matching an ancestor
    /// still covers the leaf: excluding a directory excludes its contents.
    fn matches(&self, rel: &Path, is_dir: bool) -> bool {
        if self.matcher.is_match(rel) && (is_dir || !self.dir_only) {
            return true;
        }
        rel.ancestors()
            .skip(1)
            .filter(|a| !a.as_os_str().is_empty())
            .any(|ancestor| self.matcher.is_match(ancestor))
    }
}

/// An ordered, compiled set of ignore rules.
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    rules: Vec<IgnoreRule>,
}

impl IgnoreFilter {
    /// Compile the default rules plus the contents of a user pattern file.
    pub fn from_user_patterns(user_file_content: &str) -> Result<Self> {
        let mut rules = Vec::new();
        for pattern in DEFAULT_PATTERNS {
            rules.push(IgnoreRule::compile(pattern)?);
        }
        for line in user_file_content.lines() {
            let line = line.trim_end_matches('\r').trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            rules.push(IgnoreRule::compile(line)?);
        }
        Ok(Self { rules })
    }

    /// Compile defaults only.
    pub fn defaults() -> Self {
        // The default set is static and known-good.
        Self::from_user_patterns("").unwrap_or(Self { rules: Vec::new() })
    }

    /// Load from `.chronologignore` under `root`, tolerating a missing file.
    pub fn load(root: &Path) -> Result<Self> {
        let file = root.join(IGNORE_FILE_NAME);
        if file.exists() {
            Self::from_user_patterns(&std::fs::read_to_string(&file)?)
        } else {
            Ok(Self::defaults())
        }
    }

    /// Decide whether a repo-relative path is ignored.
    ///
    /// Later rules override earlier ones; a negated rule re-includes.
    pub fn is_ignored(&self, rel: &Path, is_dir: bool) -> bool {
        let mut verdict = false;
        for rule in &self.rules {
            if rule.matches(rel, is_dir) {
                verdict = !rule.negated;
            }
        }
        verdict
    }

    /// The original pattern texts, defaults first.
    pub fn patterns(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.pattern.as_str()).collect()
    }
}

/// Starter `.chronologignore` content offered on request.
pub const DEFAULT_IGNORE_FILE: &str = "\
# ChronoLog ignore patterns (gitignore semantics)

# Build outputs
target/
dist/
build/
out/
*.o
*.so
*.dll

# Dependency trees
node_modules/
venv/
.venv/

# Logs and scratch
*.log
logs/
*.tmp
.tmp/

# Archives
*.zip
*.tar.gz
*.7z

# Add your own patterns below
";

/// Create a starter `.chronologignore` if none exists. Returns whether a
/// file was written.
pub fn write_default_ignore_file(root: &Path) -> Result<bool> {
    let file = root.join(IGNORE_FILE_NAME);
    if file.exists() {
        return Ok(false);
    }
    std::fs::write(&file, DEFAULT_IGNORE_FILE)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn filter(user: &str) -> IgnoreFilter {
        IgnoreFilter::from_user_patterns(user).unwrap()
    }

    #[test]
    fn defaults_cover_metadata_and_editor_droppings() {
        let f = IgnoreFilter::defaults();
        assert!(f.is_ignored(Path::new(".chronolog/history.db"), false));
        assert!(f.is_ignored(Path::new(".git/config"), false));
        assert!(f.is_ignored(Path::new("notes/.DS_Store"), false));
        assert!(f.is_ignored(Path::new("draft.txt.swp"), false));
        assert!(!f.is_ignored(Path::new("draft.txt"), false));
    }

    #[test]
    fn trailing_slash_is_directory_only() {
        let f = filter("build/\n");
        assert!(f.is_ignored(Path::new("build"), true));
        assert!(f.is_ignored(Path::new("build/main.rs"), false));
        // A plain file named "build" is not a directory match.
        assert!(!f.is_ignored(Path::new("build"), false));
    }

    #[test]
    fn negation_reincludes() {
        let f = filter("*.log\n!keep.log\n");
        assert!(f.is_ignored(Path::new("debug.log"), false));
        assert!(!f.is_ignored(Path::new("keep.log"), false));
    }

    #[test]
    fn later_rules_override_earlier() {
        let f = filter("!special.tmp\n*.tmp\n");
        // The blanket rule comes later, so it wins.
        assert!(f.is_ignored(Path::new("special.tmp"), false));
    }

    #[test]
    fn leading_slash_anchors_to_root() {
        let f = filter("/top.txt\n");
        assert!(f.is_ignored(Path::new("top.txt"), false));
        assert!(!f.is_ignored(Path::new("nested/top.txt"), false));
    }

    #[test]
    fn unanchored_matches_any_depth() {
        let f = filter("scratch.txt\n");
        assert!(f.is_ignored(Path::new("scratch.txt"), false));
        assert!(f.is_ignored(Path::new("a/b/scratch.txt"), false));
    }

    #[test]
    fn double_star_crosses_segments() {
        let f = filter("docs/**/draft.md\n");
        assert!(f.is_ignored(Path::new("docs/2024/01/draft.md"), false));
        assert!(!f.is_ignored(Path::new("src/draft.md"), false));
    }

    #[test]
    fn single_star_stays_within_a_segment() {
        let f = filter("/logs/*.log\n");
        assert!(f.is_ignored(Path::new("logs/app.log"), false));
        assert!(!f.is_ignored(Path::new("logs/old/app.log"), false));
    }

    #[test]
    fn comments_and_blanks_are_skipped() {
        let f = filter("# a comment\n\n*.bak\n");
        assert!(f.is_ignored(Path::new("file.bak"), false));
        assert!(!f.is_ignored(Path::new("# a comment"), false));
    }

    #[test]
    fn excluded_directory_covers_contents() {
        let f = filter("vendor/\n");
        assert!(f.is_ignored(Path::new("vendor/lib/util.js"), false));
    }

    #[test]
    fn invalid_pattern_reports_the_pattern() {
        let err = IgnoreFilter::from_user_patterns("a[\n").unwrap_err();
        match err {
            ChronologError::InvalidPattern { pattern, .. } => assert_eq!(pattern, "a["),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn starter_file_written_once() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_default_ignore_file(dir.path()).unwrap());
        assert!(!write_default_ignore_file(dir.path()).unwrap());
    }
}
