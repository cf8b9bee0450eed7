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

//! Content identity.
//!
//! Both blob hashes (over raw content) and version hashes (over the
//! canonical version line) are SHA-256, rendered as 64 lowercase hex
//! characters. Any unambiguous prefix of at least [`MIN_PREFIX_LEN`]
//! characters is accepted where a hash is expected.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// Minimum accepted length for an abbreviated hash.
pub const MIN_PREFIX_LEN: usize = 4;

/// Length of the short form used in log output.
pub const SHORT_LEN: usize = 8;

/// A SHA-256 content identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash raw content.
    pub fn of(content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        Self(hasher.finalize().into())
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Full 64-character lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Abbreviated form for display (first [`SHORT_LEN`] hex chars).
    pub fn short(&self) -> String {
        hex::encode(&self.0[..SHORT_LEN / 2])
    }

    /// Parse a full 64-hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 64 {
            return None;
        }
        let bytes = hex::decode(s).ok()?;
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&bytes);
        Some(Self(digest))
    }

    /// True when this hash's hex form starts with `prefix`.
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        self.to_hex().starts_with(prefix)
    }

    /// Fan-out storage path components: directory (first two hex chars)
    /// and file name (remaining 62).
    pub fn fan_out(&self) -> (String, String) {
        let hex = self.to_hex();
        (hex[..2].to_string(), hex[2..].to_string())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short())
    }
}

/// Validate a candidate hash prefix: hex only, at least [`MIN_PREFIX_LEN`]
/// characters, at most a full hash.
pub fn is_valid_prefix(prefix: &str) -> bool {
    prefix.len() >= MIN_PREFIX_LEN
        && prefix.len() <= 64
        && prefix.chars().all(|c| c.is_ascii_hexdigit())
        && prefix.chars().all(|c| !c.is_ascii_uppercase())
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_hex(&raw)
            .ok_or_else(|| serde::de::Error::custom("expected 64 lowercase hex characters"))
    }
}
