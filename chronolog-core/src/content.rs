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

//! Content classification and text decoding shared by diff, merge, search,
//! and the ingest pipeline.

use crate::config::FallbackEncoding;

/// Binary heuristic: a null byte within the leading `scan_limit` bytes.
pub fn is_binary(content: &[u8], scan_limit: usize) -> bool {
    let window = &content[..content.len().min(scan_limit)];
    window.contains(&0)
}

/// Decode blob bytes as text, using the configured fallback for content
/// that is not valid UTF-8. Never fails.
pub fn decode_text(content: &[u8], fallback: FallbackEncoding) -> String {
    match std::str::from_utf8(content) {
        Ok(text) => text.to_string(),
        Err(_) => match fallback {
            FallbackEncoding::Latin1 => content.iter().map(|&b| b as char).collect(),
            FallbackEncoding::Utf8Lossy => String::from_utf8_lossy(content).into_owned(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_byte_within_window_is_binary() {
        assert!(is_binary(b"ab\0cd", 8192));
        assert!(!is_binary(b"plain text", 8192));
    }

    #[test]
    fn null_byte_past_window_is_not_scanned() {
        let mut content = vec![b'a'; 100];
        content.push(0);
        assert!(!is_binary(&content, 100));
        assert!(is_binary(&content, 101));
    }

    #[test]
    fn empty_content_is_text() {
        assert!(!is_binary(b"", 8192));
    }

    #[test]
    fn utf8_decodes_as_is() {
        assert_eq!(decode_text("héllo".as_bytes(), FallbackEncoding::Latin1), "héllo");
    }

    #[test]
    fn latin1_fallback_maps_bytes() {
        // 0xE9 alone is invalid UTF-8 but is 'é' in Latin-1.
        assert_eq!(decode_text(&[0x61, 0xE9], FallbackEncoding::Latin1), "aé");
    }

    #[test]
    fn lossy_fallback_replaces_invalid() {
        assert_eq!(
            decode_text(&[0x61, 0xE9], FallbackEncoding::Utf8Lossy),
            "a\u{FFFD}"
        );
    }
}
