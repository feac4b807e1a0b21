// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parsing for the CLI's `--params` flag — a raw JSON object tagged by
//! `kind` (e.g. `{"kind":"notebook","template":"dark","extract_code":true}`),
//! matching [`oj_core::JobParams`]'s own `#[serde(tag = "kind")]` wire shape
//! one for one so callers never need a different syntax for the same thing.

use anyhow::{Context, Result};
use oj_core::JobParams;

pub fn parse_params(raw: &str) -> Result<JobParams> {
    serde_json::from_str(raw).context("--params must be a JSON object matching JobParams, e.g. \
        '{\"kind\":\"notebook\",\"template\":\"default\",\"extract_code\":false}'")
}
