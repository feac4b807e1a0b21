// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Cache Entry entity — a content-addressed record of a
//! successful conversion output, keyed by `(output_path, fingerprint)`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub output_path: String,
    pub fingerprint: String,
    pub payload: Vec<u8>,
    pub metadata: serde_json::Value,
    pub hit_count: u64,
    pub last_accessed_ms: u64,
}
