// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Op evaluation against a cluster
//!
//! The [`SessionExecutor`] walks a plan from the op graph and dispatches each
//! op: engine lifecycle ops to the [`InteractiveEngineManager`], subgraph ops
//! to the [`SubgraphExtractor`], and query ops straight to the engine's
//! gremlin client. Outputs are registered in the [`ObjectManager`].

pub mod engine_manager;
pub mod executor;
pub mod object_manager;
pub(crate) mod remote;
pub mod subgraph;

pub use engine_manager::{EngineHandle, EngineStatus, InteractiveEngineManager};
pub use executor::{EvalState, SessionExecutor};
pub use object_manager::ObjectManager;
pub use subgraph::{JobState, SubgraphExtractor, SubgraphJob};

use crate::cluster::{GraphMeta, ObjectId};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A running engine as seen by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineInfo {
    pub graph_key: String,
    /// Which provisioning of the graph this engine came from
    pub generation: u64,
    pub object_id: ObjectId,
    pub frontend_endpoint: String,
    pub graph_url: String,
}

/// Complete result of one submitted script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GremlinResultSet {
    pub key: String,
    pub values: Vec<Value>,
}

impl GremlinResultSet {
    /// First result, or null for an empty set
    pub fn one(&self) -> Value {
        self.values.first().cloned().unwrap_or(Value::Null)
    }

    pub fn all(&self) -> Value {
        Value::List(self.values.clone())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Output registered for a successfully evaluated op
#[derive(Debug, Clone, PartialEq)]
pub enum OpOutput {
    Engine(EngineInfo),
    ResultSet(Arc<GremlinResultSet>),
    Value(Value),
    Graph(GraphMeta),
    /// Key of the graph whose engine was released
    Closed(String),
}

impl OpOutput {
    pub fn kind_name(&self) -> &'static str {
        match self {
            OpOutput::Engine(_) => "engine",
            OpOutput::ResultSet(_) => "result_set",
            OpOutput::Value(_) => "value",
            OpOutput::Graph(_) => "graph",
            OpOutput::Closed(_) => "closed_engine",
        }
    }
}
