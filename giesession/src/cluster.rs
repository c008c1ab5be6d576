// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cluster boundary consumed by the session executor
//!
//! The executor never speaks a wire protocol itself. Engine provisioning,
//! gremlin submission and graph loading go through the [`Cluster`] and
//! [`GremlinClient`] traits; [`crate::local::LocalCluster`] is the in-process
//! implementation.

use crate::error::StoreError;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Gremlin request options, e.g. `{"engine": "gae"}`
pub type RequestOptions = BTreeMap<String, String>;

/// Free-form engine properties forwarded at provisioning time
pub type EngineParams = BTreeMap<String, String>;

/// Errors reported by the remote side of a call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    #[error("{0}")]
    Failed(String),

    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Identifier of an object held by the shared-memory store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "o{:016x}", self.0)
    }
}

/// Vertex original-id type of a stored graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OidType {
    #[serde(rename = "int64_t")]
    Int64,
    #[serde(rename = "std::string")]
    String,
}

impl OidType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OidType::Int64 => "int64_t",
            OidType::String => "std::string",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "int64_t" => Some(OidType::Int64),
            "std::string" => Some(OidType::String),
            _ => None,
        }
    }
}

/// Metadata of a graph held by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMeta {
    pub key: String,
    pub object_id: ObjectId,
    pub oid_type: OidType,
    pub vertex_count: usize,
    pub edge_count: usize,
}

/// Named stream in the shared-memory store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamRef(pub String);

impl StreamRef {
    pub fn new(name: impl Into<String>) -> Self {
        StreamRef(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Everything the cluster needs to start an engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub engine_params: EngineParams,
    pub cpu: f64,
    pub mem: String,
}

/// Arguments of the graph-load entry point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadRequest {
    pub vertices: Vec<StreamRef>,
    pub edges: Vec<StreamRef>,
    pub generate_eid: bool,
    pub oid_type: OidType,
}

/// Query-submission client bound to one engine endpoint
pub trait GremlinClient: Send + Sync {
    /// Submit a script and wait for the complete result set
    fn submit(&self, script: &str, options: &RequestOptions) -> Result<Vec<Value>, RemoteError>;
}

/// Remote side of a session
pub trait Cluster: Send + Sync {
    /// Start an interactive engine over `graph`, returning its frontend endpoint
    fn create_interactive_query(
        &self,
        graph: &GraphMeta,
        request: &ProvisionRequest,
    ) -> Result<String, RemoteError>;

    /// Stop the engine behind `endpoint`
    fn close_interactive_query(&self, endpoint: &str) -> Result<(), RemoteError>;

    /// Open a query client against a running engine
    fn gremlin_client(&self, endpoint: &str) -> Result<Arc<dyn GremlinClient>, RemoteError>;

    /// Metadata of a stored graph by key
    fn graph(&self, key: &str) -> Result<GraphMeta, RemoteError>;

    /// Materialize a new graph from vertex and edge streams
    fn load_from(&self, request: &LoadRequest) -> Result<GraphMeta, StoreError>;
}

/// Websocket URL of an engine frontend
pub fn graph_url(endpoint: &str) -> String {
    format!("ws://{}/gremlin", endpoint)
}

/// Connection descriptor for a standard traversal driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConnection {
    pub url: String,
    pub traversal_source: String,
}

impl RemoteConnection {
    pub fn new(endpoint: &str) -> Self {
        Self {
            url: graph_url(endpoint),
            traversal_source: "g".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_url_format() {
        assert_eq!(graph_url("10.0.0.2:8182"), "ws://10.0.0.2:8182/gremlin");
        let conn = RemoteConnection::new("localhost:8182");
        assert_eq!(conn.traversal_source, "g");
        assert_eq!(conn.url, "ws://localhost:8182/gremlin");
    }

    #[test]
    fn test_oid_type_names() {
        assert_eq!(OidType::parse(OidType::Int64.as_str()), Some(OidType::Int64));
        assert_eq!(OidType::parse("std::string"), Some(OidType::String));
        assert_eq!(OidType::parse("uint32"), None);
    }
}
