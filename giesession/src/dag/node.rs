// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Client-facing lazy handles
//!
//! Every handle wraps exactly one committed op and a clone of its session.
//! Constructors commit their op immediately; nothing runs until the handle
//! is passed to [`Session::run`].

use crate::cluster::{EngineParams, GraphMeta, OidType, RequestOptions};
use crate::dag::op::{Op, OpId};
use crate::dag::ops::{self, FetchMode, GraphSource};
use crate::error::{SessionError, SessionResult};
use crate::exec::{EngineInfo, EvalState, GremlinResultSet, OpOutput};
use crate::session::Session;
use crate::value::Value;
use std::sync::Arc;

/// Common behavior of lazy handles
pub trait DagNode {
    /// What [`Session::run`] hands back for this node
    type Output;

    fn session(&self) -> &Session;

    fn op(&self) -> &Arc<Op>;

    fn extract(op: OpId, output: OpOutput) -> SessionResult<Self::Output>;

    /// Whether the op has been dispatched at least once
    fn evaluated(&self) -> bool {
        self.session().eval_state(self.op().id()) != EvalState::Pending
    }
}

fn unexpected_output(op: OpId, output: &OpOutput) -> SessionError {
    SessionError::invalid_param(
        "output",
        format!("op {} produced unexpected {}", op, output.kind_name()),
    )
}

/// Lazy interactive engine over one graph
#[derive(Clone)]
pub struct EngineNode {
    session: Session,
    op: Arc<Op>,
    oid_type: OidType,
}

impl EngineNode {
    pub(crate) fn new(
        session: Session,
        graph: &GraphSource,
        engine_params: &EngineParams,
    ) -> SessionResult<Self> {
        let draft =
            ops::create_interactive_query(graph, engine_params, &session.config().engine)?;
        let op = session.add_op(draft)?;
        Ok(Self {
            session,
            op,
            oid_type: graph.oid_type(),
        })
    }

    /// Vertex id type of the engine's graph
    pub fn oid_type(&self) -> OidType {
        self.oid_type
    }

    /// Queue a gremlin script against this engine
    pub fn execute(&self, query: &str) -> SessionResult<ResultSetNode> {
        self.execute_with_options(query, &RequestOptions::new())
    }

    pub fn execute_with_options(
        &self,
        query: &str,
        options: &RequestOptions,
    ) -> SessionResult<ResultSetNode> {
        let op = self
            .session
            .add_op(ops::gremlin_query(self.op.id(), query, options)?)?;
        Ok(ResultSetNode {
            session: self.session.clone(),
            op,
            engine: self.op.id(),
        })
    }

    /// Queue extraction of the edges produced by `gremlin_script` into a
    /// new, independently stored graph
    pub fn subgraph(&self, gremlin_script: &str) -> SessionResult<SubgraphNode> {
        self.subgraph_with_options(gremlin_script, &RequestOptions::new())
    }

    pub fn subgraph_with_options(
        &self,
        gremlin_script: &str,
        options: &RequestOptions,
    ) -> SessionResult<SubgraphNode> {
        let draft =
            ops::gremlin_to_subgraph(self.op.id(), gremlin_script, options, self.oid_type)?;
        let op = self.session.add_op(draft)?;
        Ok(SubgraphNode {
            session: self.session.clone(),
            op,
            oid_type: self.oid_type,
        })
    }

    /// Queue teardown of this engine
    pub fn close(&self) -> SessionResult<ClosedEngineNode> {
        let op = self
            .session
            .add_op(ops::close_interactive_query(self.op.id()))?;
        Ok(ClosedEngineNode {
            session: self.session.clone(),
            op,
        })
    }
}

impl DagNode for EngineNode {
    type Output = EngineInfo;

    fn session(&self) -> &Session {
        &self.session
    }

    fn op(&self) -> &Arc<Op> {
        &self.op
    }

    fn extract(op: OpId, output: OpOutput) -> SessionResult<EngineInfo> {
        match output {
            OpOutput::Engine(info) => Ok(info),
            other => Err(unexpected_output(op, &other)),
        }
    }
}

/// Lazy result set of one submitted script
#[derive(Clone)]
pub struct ResultSetNode {
    session: Session,
    op: Arc<Op>,
    engine: OpId,
}

impl ResultSetNode {
    /// First result of the set
    pub fn one(&self) -> SessionResult<ResultNode> {
        self.fetch(FetchMode::One)
    }

    /// Every result of the set, as a list
    pub fn all(&self) -> SessionResult<ResultNode> {
        self.fetch(FetchMode::All)
    }

    fn fetch(&self, mode: FetchMode) -> SessionResult<ResultNode> {
        let op = self.session.add_op(ops::fetch_gremlin_result(
            self.op.id(),
            self.engine,
            mode,
        ))?;
        Ok(ResultNode {
            session: self.session.clone(),
            op,
        })
    }
}

impl DagNode for ResultSetNode {
    type Output = Arc<GremlinResultSet>;

    fn session(&self) -> &Session {
        &self.session
    }

    fn op(&self) -> &Arc<Op> {
        &self.op
    }

    fn extract(op: OpId, output: OpOutput) -> SessionResult<Arc<GremlinResultSet>> {
        match output {
            OpOutput::ResultSet(result_set) => Ok(result_set),
            other => Err(unexpected_output(op, &other)),
        }
    }
}

/// Lazy fetched result
#[derive(Clone)]
pub struct ResultNode {
    session: Session,
    op: Arc<Op>,
}

impl DagNode for ResultNode {
    type Output = Value;

    fn session(&self) -> &Session {
        &self.session
    }

    fn op(&self) -> &Arc<Op> {
        &self.op
    }

    fn extract(op: OpId, output: OpOutput) -> SessionResult<Value> {
        match output {
            OpOutput::Value(value) => Ok(value),
            other => Err(unexpected_output(op, &other)),
        }
    }
}

/// Lazy graph produced by subgraph extraction
#[derive(Clone)]
pub struct SubgraphNode {
    session: Session,
    op: Arc<Op>,
    oid_type: OidType,
}

impl SubgraphNode {
    pub fn oid_type(&self) -> OidType {
        self.oid_type
    }
}

impl DagNode for SubgraphNode {
    type Output = GraphMeta;

    fn session(&self) -> &Session {
        &self.session
    }

    fn op(&self) -> &Arc<Op> {
        &self.op
    }

    fn extract(op: OpId, output: OpOutput) -> SessionResult<GraphMeta> {
        match output {
            OpOutput::Graph(meta) => Ok(meta),
            other => Err(unexpected_output(op, &other)),
        }
    }
}

impl From<&SubgraphNode> for GraphSource {
    fn from(node: &SubgraphNode) -> Self {
        GraphSource::Derived {
            session_id: node.session.id().to_string(),
            op: node.op.id(),
            oid_type: node.oid_type,
        }
    }
}

/// Lazy engine teardown; evaluates to the key of the released graph
#[derive(Clone)]
pub struct ClosedEngineNode {
    session: Session,
    op: Arc<Op>,
}

impl DagNode for ClosedEngineNode {
    type Output = String;

    fn session(&self) -> &Session {
        &self.session
    }

    fn op(&self) -> &Arc<Op> {
        &self.op
    }

    fn extract(op: OpId, output: OpOutput) -> SessionResult<String> {
        match output {
            OpOutput::Closed(graph_key) => Ok(graph_key),
            other => Err(unexpected_output(op, &other)),
        }
    }
}
