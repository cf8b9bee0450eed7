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

//! Repository configuration.
//!
//! Persisted as `.chronolog/config.json`. A missing file yields
//! [`RepositoryConfig::default`]; unknown fields are rejected so stale
//! configs from a newer binary fail loudly instead of silently dropping
//! settings.

use crate::error::{ChronologError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Debounce window before a save is ingested.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Bound on the watcher-to-worker queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Null-byte scan window for binary classification.
pub const DEFAULT_BINARY_SCAN_LIMIT: usize = 8192;

/// Grace period for draining the ingest queue on daemon stop.
pub const DEFAULT_STOP_GRACE_MS: u64 = 5000;

/// What ingest does with files classified as binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryPolicy {
    /// Record a skip and do not version the file.
    #[default]
    Skip,
    /// Store the file whole; diff against it is refused.
    Store,
}

/// Per-blob compression algorithm for the object store.
///
/// The discriminants are the on-disk header bytes and must never be
/// renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CompressionAlgo {
    Raw = 0,
    #[default]
    Zlib = 1,
    Lzma = 2,
    Bz2 = 3,
}

impl CompressionAlgo {
    /// Header byte written in front of the payload.
    pub fn header_byte(self) -> u8 {
        self as u8
    }

    /// Reverse of [`CompressionAlgo::header_byte`].
    pub fn from_header_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(Self::Raw),
            1 => Ok(Self::Zlib),
            2 => Ok(Self::Lzma),
            3 => Ok(Self::Bz2),
            other => Err(ChronologError::UnknownCompression(other)),
        }
    }
}

/// Fallback decoding for blobs that are not valid UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackEncoding {
    /// Map each byte to the equivalent Unicode scalar (never fails).
    #[default]
    Latin1,
    /// Replace invalid sequences with U+FFFD.
    Utf8Lossy,
}

/// Settings governing ingest, storage, and the watcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RepositoryConfig {
    /// Trailing-edge debounce window in milliseconds.
    pub debounce_ms: u64,
    /// Bound on the in-memory save-event queue.
    pub queue_capacity: usize,
    /// Binary-file handling policy.
    pub binary_policy: BinaryPolicy,
    /// How many leading bytes are scanned for a null byte.
    pub binary_scan_limit: usize,
    /// Compression applied to newly written blobs.
    pub compression: CompressionAlgo,
    /// Decoding fallback for diff/merge over non-UTF-8 text.
    pub fallback_encoding: FallbackEncoding,
    /// Daemon-stop drain grace period in milliseconds.
    pub stop_grace_ms: u64,
    /// Bounded retries when a file changes size mid-read.
    pub read_retry_limit: u32,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            binary_policy: BinaryPolicy::default(),
            binary_scan_limit: DEFAULT_BINARY_SCAN_LIMIT,
            compression: CompressionAlgo::default(),
            fallback_encoding: FallbackEncoding::default(),
            stop_grace_ms: DEFAULT_STOP_GRACE_MS,
            read_retry_limit: 3,
        }
    }
}

impl RepositoryConfig {
    /// Load from `config.json`, falling back to defaults if absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Persist as pretty-printed JSON.
    pub fn store(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.debounce_ms == 0 {
            return Err(ChronologError::InvalidConfig(
                "debounce_ms must be positive".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ChronologError::InvalidConfig(
                "queue_capacity must be positive".into(),
            ));
        }
        if self.binary_scan_limit == 0 {
            return Err(ChronologError::InvalidConfig(
                "binary_scan_limit must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_trips_through_json() {
        let config = RepositoryConfig::default();
        let raw = serde_json::to_string(&config).unwrap();
        let back: RepositoryConfig = serde_json::from_str(&raw).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RepositoryConfig::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, RepositoryConfig::default());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let raw = r#"{"debounce_ms": 100, "frobnicate": true}"#;
        assert!(serde_json::from_str::<RepositoryConfig>(raw).is_err());
    }

    #[test]
    fn zero_debounce_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"debounce_ms": 0}"#).unwrap();
        assert!(RepositoryConfig::load(&path).is_err());
    }

    #[test]
    fn compression_header_bytes_are_stable() {
        assert_eq!(CompressionAlgo::Raw.header_byte(), 0);
        assert_eq!(CompressionAlgo::Zlib.header_byte(), 1);
        assert_eq!(CompressionAlgo::Lzma.header_byte(), 2);
        assert_eq!(CompressionAlgo::Bz2.header_byte(), 3);
        assert!(CompressionAlgo::from_header_byte(9).is_err());
    }
}
