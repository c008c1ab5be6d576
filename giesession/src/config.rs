// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Session configuration and engine sizing defaults

use crate::cluster::OidType;
use crate::error::{SessionError, SessionResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Kubernetes-style memory quantity, e.g. `512Mi` or `1Gi`
static MEMORY_QUANTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[1-9][0-9]*(Ki|Mi|Gi|Ti)?$").expect("valid memory regex"));

/// Resources requested for each interactive engine frontend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSizing {
    /// CPU cores for the gremlin server
    pub cpu: f64,
    /// Memory quantity for the gremlin server
    pub mem: String,
}

impl Default for EngineSizing {
    fn default() -> Self {
        Self {
            cpu: 0.2,
            mem: "1Gi".to_string(),
        }
    }
}

/// Configuration injected into a session at construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sizing passed along with every engine provisioning request
    pub engine: EngineSizing,

    /// Worker threads available for background subgraph loads
    pub loader_threads: usize,

    /// Upper bound on any single remote call; `None` blocks indefinitely
    pub remote_timeout: Option<Duration>,

    /// Threads running remote calls that have a deadline
    pub remote_threads: usize,

    /// Vertex id type used for graphs loaded by this session
    pub oid_type: OidType,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            engine: EngineSizing::default(),
            loader_threads: 4,
            remote_timeout: None,
            remote_threads: 4,
            oid_type: OidType::Int64,
        }
    }
}

impl SessionConfig {
    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = Some(timeout);
        self
    }

    pub fn with_loader_threads(mut self, threads: usize) -> Self {
        self.loader_threads = threads;
        self
    }

    pub fn with_remote_threads(mut self, threads: usize) -> Self {
        self.remote_threads = threads;
        self
    }

    pub fn with_engine_sizing(mut self, cpu: f64, mem: impl Into<String>) -> Self {
        self.engine = EngineSizing {
            cpu,
            mem: mem.into(),
        };
        self
    }

    /// Check the configuration before a session is built from it
    pub fn validate(&self) -> SessionResult<()> {
        if !(self.engine.cpu.is_finite() && self.engine.cpu > 0.0) {
            return Err(SessionError::Config(format!(
                "engine cpu must be a positive number, got {}",
                self.engine.cpu
            )));
        }
        if !MEMORY_QUANTITY.is_match(&self.engine.mem) {
            return Err(SessionError::Config(format!(
                "engine mem '{}' is not a memory quantity such as 512Mi or 1Gi",
                self.engine.mem
            )));
        }
        if self.loader_threads == 0 {
            return Err(SessionError::Config(
                "loader_threads must be at least 1".to_string(),
            ));
        }
        if self.remote_threads == 0 {
            return Err(SessionError::Config(
                "remote_threads must be at least 1".to_string(),
            ));
        }
        if self.remote_timeout == Some(Duration::ZERO) {
            return Err(SessionError::Config(
                "remote_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Whether a memory quantity string is well formed
pub fn is_memory_quantity(mem: &str) -> bool {
    MEMORY_QUANTITY.is_match(mem)
}
