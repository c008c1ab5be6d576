// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Eager interactive query and result set
//!
//! [`InteractiveQuery`] evaluates its engine node once and then talks to the
//! running engine directly; scripts submitted through it do not enter the op
//! graph. Status checks are the same as for lazy evaluation.

use crate::cluster::{GraphMeta, ObjectId, RemoteConnection, RequestOptions};
use crate::dag::{DagNode, EngineNode, ResultSetNode};
use crate::error::{SessionError, SessionResult};
use crate::exec::{EngineInfo, EngineStatus, GremlinResultSet};
use crate::session::Session;
use crate::value::Value;
use log::debug;
use std::sync::Arc;

/// A running interactive engine
pub struct InteractiveQuery {
    session: Session,
    node: EngineNode,
    info: EngineInfo,
}

impl InteractiveQuery {
    /// Evaluate `node` and wrap the engine it starts
    pub fn launch(node: EngineNode) -> SessionResult<Self> {
        let session = node.session().clone();
        let info = session.run(&node)?;
        debug!(
            "Interactive query on graph '{}' ready at {}",
            info.graph_key, info.graph_url
        );
        Ok(Self {
            session,
            node,
            info,
        })
    }

    pub fn node(&self) -> &EngineNode {
        &self.node
    }

    pub fn info(&self) -> &EngineInfo {
        &self.info
    }

    pub fn graph_url(&self) -> &str {
        &self.info.graph_url
    }

    pub fn frontend_endpoint(&self) -> &str {
        &self.info.frontend_endpoint
    }

    pub fn object_id(&self) -> ObjectId {
        self.info.object_id
    }

    pub fn status(&self) -> EngineStatus {
        self.session.executor().engine_status(&self.info)
    }

    pub fn error_msg(&self) -> Option<String> {
        self.session
            .executor()
            .engine_handle(&self.info)
            .and_then(|handle| handle.error_msg)
    }

    pub fn closed(&self) -> bool {
        self.status() == EngineStatus::Closed
    }

    /// Submit a script and wait for its complete result set
    pub fn execute(&self, query: &str) -> SessionResult<ResultSet> {
        self.execute_with_options(query, &RequestOptions::new())
    }

    pub fn execute_with_options(
        &self,
        query: &str,
        options: &RequestOptions,
    ) -> SessionResult<ResultSet> {
        let result = self.session.executor().submit(&self.info, query, options)?;
        Ok(ResultSet::from_result(self.session.clone(), result))
    }

    /// Extract the edges produced by `gremlin_script` into a new graph
    pub fn subgraph(&self, gremlin_script: &str) -> SessionResult<GraphMeta> {
        self.subgraph_with_options(gremlin_script, &RequestOptions::new())
    }

    pub fn subgraph_with_options(
        &self,
        gremlin_script: &str,
        options: &RequestOptions,
    ) -> SessionResult<GraphMeta> {
        self.session.executor().extract_subgraph(
            &self.info,
            gremlin_script,
            options,
            self.node.oid_type(),
        )
    }

    /// Connection descriptor for a standard traversal driver
    pub fn traversal_source(&self) -> SessionResult<RemoteConnection> {
        match self.status() {
            EngineStatus::Running => Ok(RemoteConnection::new(&self.info.frontend_endpoint)),
            status => Err(SessionError::EngineUnavailable {
                graph: self.info.graph_key.clone(),
                status,
            }),
        }
    }

    /// Tear down the engine; closing twice is a no-op
    pub fn close(&self) -> SessionResult<()> {
        self.session.executor().close_engine(&self.info)
    }
}

/// An evaluated result set
///
/// A set returned by [`InteractiveQuery::execute`] is registered in the
/// session's object registry until it is dropped.
pub struct ResultSet {
    node: Option<ResultSetNode>,
    /// Set for eager results, which are unregistered on drop
    owner: Option<Session>,
    result: Arc<GremlinResultSet>,
}

impl ResultSet {
    /// Evaluate `node`; later fetches go through the op graph
    pub fn new(node: ResultSetNode) -> SessionResult<Self> {
        let result = node.session().run(&node)?;
        Ok(Self {
            node: Some(node),
            owner: None,
            result,
        })
    }

    pub(crate) fn from_result(session: Session, result: Arc<GremlinResultSet>) -> Self {
        Self {
            node: None,
            owner: Some(session),
            result,
        }
    }

    /// First result; null when the set is empty
    pub fn one(&self) -> SessionResult<Value> {
        match &self.node {
            Some(node) => node.session().run(&node.one()?),
            None => Ok(self.result.one()),
        }
    }

    /// Every result as a list
    pub fn all(&self) -> SessionResult<Value> {
        match &self.node {
            Some(node) => node.session().run(&node.all()?),
            None => Ok(self.result.all()),
        }
    }

    pub fn key(&self) -> &str {
        &self.result.key
    }

    pub fn len(&self) -> usize {
        self.result.len()
    }

    pub fn is_empty(&self) -> bool {
        self.result.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.result.values
    }
}

impl Drop for ResultSet {
    fn drop(&mut self) {
        if let Some(session) = &self.owner {
            if session.objects().pop(&self.result.key).is_some() {
                debug!("Released eager result set {}", self.result.key);
            }
        }
    }
}
