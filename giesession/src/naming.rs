// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Generated names for subgraph output handles
//!
//! Names are `<YYYYMMDDHHMMSS>_<n>` with `n` drawn uniformly from
//! `[0, 10_000_000)`. Two calls in the same second can draw the same suffix;
//! the extractor detects that instead of relying on the odds.

use chrono::Local;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;

/// Exclusive upper bound of the random suffix
pub const NAME_RANDOM_BOUND: u32 = 10_000_000;

static GENERATED_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{14}_[0-9]{1,7}$").expect("valid name regex"));

/// Source of output graph names
pub trait NameSource: Send + Sync {
    fn next_name(&self) -> String;
}

/// Wall-clock timestamp plus a random suffix
pub struct TimestampNames {
    rng: Mutex<fastrand::Rng>,
}

impl TimestampNames {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(fastrand::Rng::new()),
        }
    }

    /// Deterministic suffixes, for reproducing collisions
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(fastrand::Rng::with_seed(seed)),
        }
    }
}

impl Default for TimestampNames {
    fn default() -> Self {
        Self::new()
    }
}

impl NameSource for TimestampNames {
    fn next_name(&self) -> String {
        let now = Local::now().format("%Y%m%d%H%M%S");
        let suffix = self.rng.lock().u32(0..NAME_RANDOM_BOUND);
        format!("{}_{}", now, suffix)
    }
}

pub fn is_generated_name(name: &str) -> bool {
    GENERATED_NAME.is_match(name)
}

pub fn vertex_stream_name(graph_name: &str) -> String {
    format!("__{}_vertex_stream", graph_name)
}

pub fn edge_stream_name(graph_name: &str) -> String {
    format!("__{}_edge_stream", graph_name)
}
