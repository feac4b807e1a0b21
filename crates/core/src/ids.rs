// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integer identity for Jobs and Workers, and the opaque correlation token
//! clients attach to a submission.

crate::define_int_id! {
    /// Identifies one Job row. Assigned by the Durable Store at insert time;
    /// stable and never reused for the lifetime of the store.
    pub struct JobId;
}

crate::define_int_id! {
    /// Identifies one Worker row. Assigned at registration time; stable for
    /// the worker's lifetime (one OS process or one container).
    pub struct WorkerId;
}

/// Caller-supplied opaque string grouping Jobs that arose from one client
/// request. Preserved verbatim from `submit` through to the outcome the
/// Processing Backend reports back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Correlation(pub String);

impl Correlation {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Correlation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Correlation {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Correlation {
    fn from(s: String) -> Self {
        Self(s)
    }
}
