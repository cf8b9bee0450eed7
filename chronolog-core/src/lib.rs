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

//! ChronoLog Core
//!
//! Shared domain types for the ChronoLog engine: content identity,
//! repository configuration, the ignore filter, commit events, and the
//! error taxonomy every crate in the workspace speaks.

pub mod config;
pub mod content;
pub mod error;
pub mod event;
pub mod hash;
pub mod ignore;

pub use config::{
    BinaryPolicy, CompressionAlgo, FallbackEncoding, RepositoryConfig, DEFAULT_BINARY_SCAN_LIMIT,
    DEFAULT_DEBOUNCE_MS, DEFAULT_QUEUE_CAPACITY, DEFAULT_STOP_GRACE_MS,
};
pub use content::{decode_text, is_binary};
pub use error::{ChronologError, Result};
pub use event::CommitEvent;
pub use hash::{is_valid_prefix, ContentHash, MIN_PREFIX_LEN, SHORT_LEN};
pub use ignore::{
    write_default_ignore_file, IgnoreFilter, DEFAULT_IGNORE_FILE, DEFAULT_PATTERNS,
    IGNORE_FILE_NAME,
};
