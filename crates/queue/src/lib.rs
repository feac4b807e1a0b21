// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! oj-queue: the Queue Service — a typed async API over
//! `oj-storage`'s Durable Store, giving `oj-worker`/`oj-pool`/`oj-backend`
//! a handle they receive explicitly rather than reaching for ambient
//! global state.

mod error;
mod service;

pub use error::{QueueError, Result};
pub use service::QueueService;

#[cfg(test)]
mod tests;
