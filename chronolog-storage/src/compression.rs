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

//! Per-blob compression codec.
//!
//! On-disk blob files carry a one-byte algorithm header followed by the
//! payload; readers select the decoder from the header alone. Writers use
//! the configured algorithm but fall back to raw storage when compression
//! does not shrink the payload.

use chronolog_core::{ChronologError, CompressionAlgo, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

/// Encode `content` for disk: header byte plus (possibly compressed)
/// payload. The chosen header may be `Raw` even when another algorithm was
/// requested, if compressing would grow the blob.
pub fn encode(content: &[u8], algo: CompressionAlgo) -> Result<Vec<u8>> {
    let compressed = match algo {
        CompressionAlgo::Raw => None,
        CompressionAlgo::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(content)?;
            Some(encoder.finish()?)
        }
        CompressionAlgo::Lzma => {
            let mut encoder = XzEncoder::new(Vec::new(), 6);
            encoder.write_all(content)?;
            Some(encoder.finish()?)
        }
        CompressionAlgo::Bz2 => {
            let mut encoder =
                bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
            encoder.write_all(content)?;
            Some(encoder.finish()?)
        }
    };

    let (header, payload) = match compressed {
        Some(c) if c.len() < content.len() => (algo, c),
        _ => (CompressionAlgo::Raw, content.to_vec()),
    };

    let mut out = Vec::with_capacity(payload.len() + 1);
    out.push(header.header_byte());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode a blob file back to its raw content.
pub fn decode(encoded: &[u8]) -> Result<Vec<u8>> {
    let (&header, payload) = encoded
        .split_first()
        .ok_or_else(|| ChronologError::UnknownCompression(0xff))?;
    match CompressionAlgo::from_header_byte(header)? {
        CompressionAlgo::Raw => Ok(payload.to_vec()),
        CompressionAlgo::Zlib => {
            let mut out = Vec::new();
            ZlibDecoder::new(payload).read_to_end(&mut out)?;
            Ok(out)
        }
        CompressionAlgo::Lzma => {
            let mut out = Vec::new();
            XzDecoder::new(payload).read_to_end(&mut out)?;
            Ok(out)
        }
        CompressionAlgo::Bz2 => {
            let mut out = Vec::new();
            bzip2::read::BzDecoder::new(payload).read_to_end(&mut out)?;
            Ok(out)
        }
    }
}
