// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Draft builders for the remote session protocol
//!
//! One builder per protocol call. Each captures every parameter the executor
//! will need; nothing here talks to the cluster.

use crate::cluster::{EngineParams, GraphMeta, OidType, RequestOptions};
use crate::config::EngineSizing;
use crate::dag::op::{OpDraft, OpId, OpKind};
use crate::error::{SessionError, SessionResult};
use std::fmt;

/// Parameter names shared by the builders and the executor
pub(crate) mod params {
    pub const GRAPH: &str = "graph";
    pub const GRAPH_FROM_INPUT: &str = "graph_from_input";
    pub const ENGINE_PARAMS: &str = "engine_params";
    pub const CPU: &str = "cpu";
    pub const MEM: &str = "mem";
    pub const QUERY: &str = "query";
    pub const REQUEST_OPTIONS: &str = "request_options";
    pub const FETCH_MODE: &str = "fetch_mode";
    pub const GREMLIN_SCRIPT: &str = "gremlin_script";
    pub const OID_TYPE: &str = "oid_type";
}

/// Graph an interactive engine is created over
#[derive(Debug, Clone, PartialEq)]
pub enum GraphSource {
    /// A graph already held by the store
    Stored(GraphMeta),
    /// The output of a subgraph op that has not necessarily run yet
    Derived {
        session_id: String,
        op: OpId,
        oid_type: OidType,
    },
}

impl GraphSource {
    pub fn oid_type(&self) -> OidType {
        match self {
            GraphSource::Stored(meta) => meta.oid_type,
            GraphSource::Derived { oid_type, .. } => *oid_type,
        }
    }
}

impl From<GraphMeta> for GraphSource {
    fn from(meta: GraphMeta) -> Self {
        GraphSource::Stored(meta)
    }
}

impl From<&GraphMeta> for GraphSource {
    fn from(meta: &GraphMeta) -> Self {
        GraphSource::Stored(meta.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    One,
    All,
}

impl FetchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchMode::One => "one",
            FetchMode::All => "all",
        }
    }

    pub fn parse(mode: &str) -> SessionResult<Self> {
        match mode {
            "one" => Ok(FetchMode::One),
            "all" => Ok(FetchMode::All),
            other => Err(SessionError::invalid_param(
                params::FETCH_MODE,
                format!("expected 'one' or 'all', got '{}'", other),
            )),
        }
    }
}

impl fmt::Display for FetchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn create_interactive_query(
    graph: &GraphSource,
    engine_params: &EngineParams,
    sizing: &EngineSizing,
) -> SessionResult<OpDraft> {
    let draft = OpDraft::new(OpKind::CreateEngine)
        .param(params::CPU, sizing.cpu)
        .param(params::MEM, sizing.mem.as_str())
        .json_param(params::ENGINE_PARAMS, engine_params)?;

    match graph {
        GraphSource::Stored(meta) => draft.json_param(params::GRAPH, meta),
        GraphSource::Derived { op, .. } => {
            Ok(draft.input(*op).param(params::GRAPH_FROM_INPUT, true))
        }
    }
}

pub fn close_interactive_query(engine: OpId) -> OpDraft {
    OpDraft::new(OpKind::CloseEngine).input(engine)
}

pub fn gremlin_query(
    engine: OpId,
    query: &str,
    options: &RequestOptions,
) -> SessionResult<OpDraft> {
    OpDraft::new(OpKind::RunQuery)
        .input(engine)
        .param(params::QUERY, query)
        .json_param(params::REQUEST_OPTIONS, options)
}

/// Fetch from a result set; the engine input lets the executor check the
/// engine status before reading
pub fn fetch_gremlin_result(result_set: OpId, engine: OpId, mode: FetchMode) -> OpDraft {
    OpDraft::new(OpKind::FetchResult)
        .input(result_set)
        .input(engine)
        .param(params::FETCH_MODE, mode.as_str())
}

pub fn gremlin_to_subgraph(
    engine: OpId,
    gremlin_script: &str,
    options: &RequestOptions,
    oid_type: OidType,
) -> SessionResult<OpDraft> {
    OpDraft::new(OpKind::BuildSubgraph)
        .input(engine)
        .param(params::GREMLIN_SCRIPT, gremlin_script)
        .param(params::OID_TYPE, oid_type.as_str())
        .json_param(params::REQUEST_OPTIONS, options)
}
