// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Client session
//!
//! A [`Session`] is a cheap, cloneable handle to one op graph, one executor
//! and the engines it provisioned. Engines still running when the session is
//! closed, or when its last handle is dropped, are torn down.
//!
//! Op creation is serialized by the session lock, but the relative order of
//! ops added from different threads is up to the callers.

use crate::cluster::{Cluster, EngineParams, GraphMeta, LoadRequest, StreamRef};
use crate::config::SessionConfig;
use crate::dag::{DagNode, EngineNode, GraphSource, Op, OpDraft, OpGraph, OpId};
use crate::error::{SessionError, SessionResult};
use crate::exec::{EngineHandle, EvalState, ObjectManager, OpOutput, SessionExecutor};
use crate::naming::{NameSource, TimestampNames};
use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

struct SessionInner {
    id: String,
    created_at: DateTime<Utc>,
    graph: Mutex<OpGraph>,
    executor: SessionExecutor,
    closed: AtomicBool,
}

impl SessionInner {
    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Closing session {}", self.id);
        self.executor.shutdown();
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(config: SessionConfig, cluster: Arc<dyn Cluster>) -> SessionResult<Self> {
        Self::with_name_source(config, cluster, Arc::new(TimestampNames::new()))
    }

    /// Session drawing subgraph names from `names`
    pub fn with_name_source(
        config: SessionConfig,
        cluster: Arc<dyn Cluster>,
        names: Arc<dyn NameSource>,
    ) -> SessionResult<Self> {
        let uuid = Uuid::new_v4();
        let id = uuid.to_string();
        let executor = SessionExecutor::new(id.clone(), config, cluster, names)?;
        let key_prefix = format!("s{}", uuid.simple());

        info!("Created session {}", id);
        Ok(Self {
            inner: Arc::new(SessionInner {
                id,
                created_at: Utc::now(),
                graph: Mutex::new(OpGraph::new(key_prefix)),
                executor,
                closed: AtomicBool::new(false),
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    pub fn config(&self) -> &SessionConfig {
        self.inner.executor.config()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> SessionResult<()> {
        if self.is_closed() {
            return Err(SessionError::SessionClosed(self.inner.id.clone()));
        }
        Ok(())
    }

    /// Metadata of a graph already held by the cluster
    pub fn g(&self, key: &str) -> SessionResult<GraphMeta> {
        self.ensure_open()?;
        let cluster = self.inner.executor.cluster().clone();
        let target = key.to_string();
        self.inner
            .executor
            .remote()
            .call_flat("graph", move || cluster.graph(&target))
    }

    /// Lazy interactive engine over `graph`
    pub fn gremlin(
        &self,
        graph: impl Into<GraphSource>,
        engine_params: Option<EngineParams>,
    ) -> SessionResult<EngineNode> {
        self.ensure_open()?;
        let graph = graph.into();
        if let GraphSource::Derived { session_id, op, .. } = &graph {
            if session_id != &self.inner.id {
                return Err(SessionError::invalid_param(
                    "graph",
                    format!("op {} belongs to session {}", op, session_id),
                ));
            }
        }
        EngineNode::new(self.clone(), &graph, &engine_params.unwrap_or_default())
    }

    /// Evaluate `node` and return its output
    pub fn run<N: DagNode>(&self, node: &N) -> SessionResult<N::Output> {
        self.ensure_open()?;
        if node.session().id() != self.id() {
            return Err(SessionError::invalid_param(
                "node",
                format!(
                    "op {} belongs to session {}",
                    node.op().id(),
                    node.session().id()
                ),
            ));
        }

        let target = node.op().id();
        let output = self.inner.executor.evaluate(&self.inner.graph, target)?;
        N::extract(target, output)
    }

    pub fn eval_state(&self, op: OpId) -> EvalState {
        self.inner.executor.eval_state(op)
    }

    /// Message recorded for a failed op
    pub fn failure(&self, op: OpId) -> Option<String> {
        self.inner.executor.failure(op)
    }

    pub(crate) fn add_op(&self, draft: OpDraft) -> SessionResult<Arc<Op>> {
        self.ensure_open()?;
        self.inner.graph.lock().add(draft)
    }

    pub fn op(&self, id: OpId) -> SessionResult<Arc<Op>> {
        self.inner.graph.lock().resolve(id)
    }

    /// Snapshot of every committed op in insertion order
    pub fn ops(&self) -> Vec<Arc<Op>> {
        self.inner.graph.lock().ops().cloned().collect()
    }

    pub fn op_count(&self) -> usize {
        self.inner.graph.lock().len()
    }

    /// Load a graph from vertex and edge streams
    pub fn load_from(
        &self,
        vertices: Vec<StreamRef>,
        edges: Vec<StreamRef>,
        generate_eid: bool,
    ) -> SessionResult<GraphMeta> {
        self.ensure_open()?;
        let request = LoadRequest {
            vertices,
            edges,
            generate_eid,
            oid_type: self.config().oid_type,
        };
        let meta = self.inner.executor.cluster().load_from(&request)?;
        debug!("Session {} loaded graph {}", self.inner.id, meta.key);
        self.inner
            .executor
            .objects()
            .put(meta.key.clone(), OpOutput::Graph(meta.clone()));
        Ok(meta)
    }

    /// Handle of the engine currently registered for `graph_key`
    pub fn engine_handle(&self, graph_key: &str) -> Option<EngineHandle> {
        self.inner.executor.engines().handle(graph_key)
    }

    pub fn engine_handles(&self) -> Vec<EngineHandle> {
        self.inner.executor.engines().handles()
    }

    pub fn objects(&self) -> &ObjectManager {
        self.inner.executor.objects()
    }

    pub(crate) fn executor(&self) -> &SessionExecutor {
        &self.inner.executor
    }

    /// Close every active engine and reject further work
    ///
    /// Teardown failures are logged, not returned. Closing twice is a no-op.
    pub fn close(&self) {
        self.inner.shutdown();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("created_at", &self.inner.created_at)
            .field("closed", &self.is_closed())
            .finish()
    }
}
