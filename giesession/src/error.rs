// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Error types for session evaluation and graph loading

use crate::cluster::RemoteError;
use crate::dag::OpId;
use crate::exec::EngineStatus;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by session operations
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Op {op} references input {missing} which is not in the op graph")]
    Cycle { op: OpId, missing: OpId },

    #[error("Unknown op: {0}")]
    UnknownOp(OpId),

    #[error("Interactive query on graph '{graph}' is unavailable with {status} status")]
    EngineUnavailable { graph: String, status: EngineStatus },

    #[error("No interactive query has been created for graph '{0}'")]
    NoSuchEngine(String),

    #[error("An interactive query is already running on graph '{0}'")]
    DuplicateEngine(String),

    #[error("Remote execution failed: {0}")]
    RemoteExecution(String),

    #[error("Remote call '{call}' timed out after {timeout:?}")]
    Timeout { call: String, timeout: Duration },

    #[error("Generated graph name is already in use: {0}")]
    NameCollision(String),

    #[error("Background load of subgraph '{name}' failed: {source}")]
    BackgroundLoad {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("Subgraph '{name}' failed: {source}")]
    Subgraph {
        name: String,
        #[source]
        source: Box<SessionError>,
    },

    #[error("Op {op} cannot run because op {dependency} did not succeed")]
    DependencyFailed { op: OpId, dependency: OpId },

    #[error("Op {op} already failed: {message}")]
    OpFailed { op: OpId, message: String },

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session {0} is closed")]
    SessionClosed(String),
}

impl SessionError {
    /// The underlying error with any subgraph context stripped
    pub fn root(&self) -> &SessionError {
        match self {
            SessionError::Subgraph { source, .. } => source.root(),
            other => other,
        }
    }

    pub(crate) fn invalid_param(name: &str, reason: impl Into<String>) -> Self {
        SessionError::InvalidParam {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<RemoteError> for SessionError {
    fn from(error: RemoteError) -> Self {
        SessionError::RemoteExecution(error.to_string())
    }
}

/// Errors raised by the object store and the graph-load entry point
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Stream '{name}' was aborted: {reason}")]
    StreamAborted { name: String, reason: String },

    #[error("Timed out after {waited:?} waiting for stream '{name}'")]
    StreamTimeout { name: String, waited: Duration },

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid graph data: {0}")]
    InvalidData(String),

    #[error("Load task for '{0}' exited without reporting a result")]
    TaskDropped(String),
}

pub type SessionResult<T> = Result<T, SessionError>;
