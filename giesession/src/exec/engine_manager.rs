// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Per-session registry of interactive query engines
//!
//! Each graph has at most one active engine per session. A handle moves
//! from Initializing to Running or Failed, and from Running to Closed or
//! Failed. Failed and Closed are terminal; a terminal handle is replaced
//! only when the graph is provisioned again.
//!
//! Every provisioning of a graph gets the next generation number. Callers
//! holding an older generation are talking about an engine that has since
//! been replaced, even if the cluster handed out the same endpoint again.

use crate::cluster::{
    graph_url, Cluster, GraphMeta, GremlinClient, ObjectId, ProvisionRequest, RemoteError,
    RequestOptions,
};
use crate::error::{SessionError, SessionResult};
use crate::exec::remote::RemoteCaller;
use crate::exec::EngineInfo;
use crate::value::Value;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineStatus {
    Initializing,
    Running,
    Failed,
    Closed,
}

impl EngineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineStatus::Initializing => "initializing",
            EngineStatus::Running => "running",
            EngineStatus::Failed => "failed",
            EngineStatus::Closed => "closed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineStatus::Failed | EngineStatus::Closed)
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bookkeeping for one engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineHandle {
    pub graph_key: String,
    /// Provisioning count for this graph within the session, from 1
    pub generation: u64,
    pub object_id: ObjectId,
    pub frontend_endpoint: Option<String>,
    pub status: EngineStatus,
    pub error_msg: Option<String>,
}

impl EngineHandle {
    fn initializing(graph: &GraphMeta, generation: u64) -> Self {
        Self {
            graph_key: graph.key.clone(),
            generation,
            object_id: graph.object_id,
            frontend_endpoint: None,
            status: EngineStatus::Initializing,
            error_msg: None,
        }
    }

    pub fn graph_url(&self) -> Option<String> {
        self.frontend_endpoint.as_deref().map(graph_url)
    }

    fn info(&self, endpoint: &str) -> EngineInfo {
        EngineInfo {
            graph_key: self.graph_key.clone(),
            generation: self.generation,
            object_id: self.object_id,
            frontend_endpoint: endpoint.to_string(),
            graph_url: graph_url(endpoint),
        }
    }
}

pub struct InteractiveEngineManager {
    cluster: Arc<dyn Cluster>,
    remote: Arc<RemoteCaller>,
    handles: Mutex<HashMap<String, EngineHandle>>,
    /// Query clients of Running engines, keyed by graph
    clients: Mutex<HashMap<String, Arc<dyn GremlinClient>>>,
}

impl InteractiveEngineManager {
    pub(crate) fn new(cluster: Arc<dyn Cluster>, remote: Arc<RemoteCaller>) -> Self {
        Self {
            cluster,
            remote,
            handles: Mutex::new(HashMap::new()),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Start an engine over `graph`
    ///
    /// Fails with [`SessionError::DuplicateEngine`] when the graph already
    /// has an Initializing or Running engine. Provisioning is attempted once.
    pub fn provision(
        &self,
        graph: &GraphMeta,
        request: ProvisionRequest,
    ) -> SessionResult<EngineInfo> {
        let generation = {
            let mut handles = self.handles.lock();
            let generation = match handles.get(&graph.key) {
                Some(existing) if !existing.status.is_terminal() => {
                    return Err(SessionError::DuplicateEngine(graph.key.clone()));
                }
                Some(existing) => {
                    debug!(
                        "Replacing {} engine handle for graph '{}' (generation {})",
                        existing.status, graph.key, existing.generation
                    );
                    existing.generation + 1
                }
                None => 1,
            };
            handles.insert(
                graph.key.clone(),
                EngineHandle::initializing(graph, generation),
            );
            generation
        };
        self.clients.lock().remove(&graph.key);

        info!(
            "Provisioning interactive query on graph '{}' (cpu={}, mem={})",
            graph.key, request.cpu, request.mem
        );
        let cluster = self.cluster.clone();
        let meta = graph.clone();
        let reply = self.remote.call("create_interactive_query", move || {
            cluster.create_interactive_query(&meta, &request)
        });

        let endpoint = match reply {
            Ok(Ok(endpoint)) => endpoint,
            Ok(Err(remote_error)) => {
                let error = SessionError::from(remote_error);
                self.fail(&graph.key, &error);
                return Err(error);
            }
            Err(error) => {
                self.fail(&graph.key, &error);
                return Err(error);
            }
        };

        let mut handles = self.handles.lock();
        match handles.get_mut(&graph.key) {
            Some(handle)
                if handle.generation == generation
                    && handle.status == EngineStatus::Initializing =>
            {
                handle.status = EngineStatus::Running;
                handle.frontend_endpoint = Some(endpoint.clone());
                info!(
                    "Interactive query on graph '{}' is running at {}",
                    graph.key, endpoint
                );
                Ok(handle.info(&endpoint))
            }
            other => {
                // Closed while provisioning was in flight
                let status = other
                    .filter(|h| h.generation == generation)
                    .map(|h| h.status)
                    .unwrap_or(EngineStatus::Closed);
                drop(handles);
                warn!(
                    "Graph '{}' engine became {} during provisioning, releasing {}",
                    graph.key, status, endpoint
                );
                if let Err(e) = self.cluster.close_interactive_query(&endpoint) {
                    warn!("Failed to release engine at {}: {}", endpoint, e);
                }
                Err(SessionError::EngineUnavailable {
                    graph: graph.key.clone(),
                    status,
                })
            }
        }
    }

    /// Snapshot of a Running handle
    pub fn require_running(&self, graph_key: &str) -> SessionResult<EngineHandle> {
        let handles = self.handles.lock();
        match handles.get(graph_key) {
            None => Err(SessionError::NoSuchEngine(graph_key.to_string())),
            Some(handle) if handle.status == EngineStatus::Running => Ok(handle.clone()),
            Some(handle) => Err(SessionError::EngineUnavailable {
                graph: graph_key.to_string(),
                status: handle.status,
            }),
        }
    }

    /// Like [`Self::require_running`], but also checks that the Running
    /// engine is the given generation
    ///
    /// An engine that was replaced by a later provisioning of the same graph
    /// reports Closed, or Failed if it never came up.
    pub fn require_bound(
        &self,
        graph_key: &str,
        generation: u64,
        came_up: bool,
    ) -> SessionResult<EngineHandle> {
        let handles = self.handles.lock();
        match handles.get(graph_key) {
            None => Err(SessionError::NoSuchEngine(graph_key.to_string())),
            Some(handle) if handle.generation != generation => {
                Err(SessionError::EngineUnavailable {
                    graph: graph_key.to_string(),
                    status: if came_up {
                        EngineStatus::Closed
                    } else {
                        EngineStatus::Failed
                    },
                })
            }
            Some(handle) if handle.status == EngineStatus::Running => Ok(handle.clone()),
            Some(handle) => Err(SessionError::EngineUnavailable {
                graph: graph_key.to_string(),
                status: handle.status,
            }),
        }
    }

    /// Generation of the graph's current handle
    pub fn generation(&self, graph_key: &str) -> Option<u64> {
        self.handles.lock().get(graph_key).map(|h| h.generation)
    }

    fn client(&self, graph_key: &str) -> SessionResult<Arc<dyn GremlinClient>> {
        let handle = self.require_running(graph_key)?;
        if let Some(client) = self.clients.lock().get(graph_key) {
            return Ok(client.clone());
        }

        let endpoint = handle.frontend_endpoint.unwrap_or_default();
        let client = match self.cluster.gremlin_client(&endpoint) {
            Ok(client) => client,
            Err(remote_error) => {
                let error = SessionError::from(remote_error);
                self.fail(graph_key, &error);
                return Err(error);
            }
        };
        self.clients
            .lock()
            .insert(graph_key.to_string(), client.clone());
        Ok(client)
    }

    /// Submit a script to the graph's Running engine without touching the
    /// handle status on failure
    ///
    /// The outer result carries local failures, the inner one the remote
    /// reply, so callers can decide which remote errors are fatal.
    pub(crate) fn try_submit(
        &self,
        graph_key: &str,
        script: &str,
        options: &RequestOptions,
    ) -> SessionResult<Result<Vec<Value>, RemoteError>> {
        let client = self.client(graph_key)?;
        let script = script.to_string();
        let options = options.clone();
        debug!("Submitting to graph '{}': {}", graph_key, script);
        self.remote.call("gremlin_query", move || {
            client.submit(&script, &options)
        })
    }

    /// Submit a script; any failure marks the engine Failed
    pub fn submit(
        &self,
        graph_key: &str,
        script: &str,
        options: &RequestOptions,
    ) -> SessionResult<Vec<Value>> {
        // Status errors come from `client` before anything is sent
        self.require_running(graph_key)?;
        match self.try_submit(graph_key, script, options) {
            Ok(Ok(values)) => Ok(values),
            Ok(Err(remote_error)) => {
                let error = SessionError::from(remote_error);
                self.fail(graph_key, &error);
                Err(error)
            }
            Err(error) => {
                if !matches!(error, SessionError::EngineUnavailable { .. }) {
                    self.fail(graph_key, &error);
                }
                Err(error)
            }
        }
    }

    /// Record a failure against the graph's engine
    ///
    /// Closed handles are left alone.
    pub fn fail(&self, graph_key: &str, error: &SessionError) {
        let mut handles = self.handles.lock();
        if let Some(handle) = handles.get_mut(graph_key) {
            if handle.status == EngineStatus::Closed {
                return;
            }
            if handle.status != EngineStatus::Failed {
                warn!(
                    "Interactive query on graph '{}' {} -> failed: {}",
                    graph_key, handle.status, error
                );
            }
            handle.status = EngineStatus::Failed;
            handle.error_msg = Some(error.to_string());
        }
        drop(handles);
        self.clients.lock().remove(graph_key);
    }

    /// Tear down the graph's engine
    ///
    /// Closing a Closed handle is a no-op. A Failed handle gets a best-effort
    /// teardown and stays Failed. Otherwise the handle always ends Closed; a
    /// remote teardown failure is still reported.
    pub fn close(&self, graph_key: &str) -> SessionResult<()> {
        let (previous, endpoint) = {
            let mut handles = self.handles.lock();
            let handle = handles
                .get_mut(graph_key)
                .ok_or_else(|| SessionError::NoSuchEngine(graph_key.to_string()))?;
            let previous = handle.status;
            if previous == EngineStatus::Closed {
                debug!("Interactive query on graph '{}' already closed", graph_key);
                return Ok(());
            }
            if previous != EngineStatus::Failed {
                handle.status = EngineStatus::Closed;
            }
            (previous, handle.frontend_endpoint.clone())
        };
        self.clients.lock().remove(graph_key);

        let endpoint = match endpoint {
            Some(endpoint) => endpoint,
            None => {
                info!(
                    "Interactive query on graph '{}' {} -> {} without an endpoint",
                    graph_key,
                    previous,
                    self.status(graph_key).unwrap_or(EngineStatus::Closed)
                );
                return Ok(());
            }
        };

        let cluster = self.cluster.clone();
        let target = endpoint.clone();
        let reply = self.remote.call_flat("close_interactive_query", move || {
            cluster.close_interactive_query(&target)
        });

        match reply {
            Ok(()) => {
                info!(
                    "Interactive query on graph '{}' at {} {} -> {}",
                    graph_key,
                    endpoint,
                    previous,
                    self.status(graph_key).unwrap_or(EngineStatus::Closed)
                );
                Ok(())
            }
            Err(error) if previous == EngineStatus::Failed => {
                warn!(
                    "Best-effort teardown of failed engine at {} did not succeed: {}",
                    endpoint, error
                );
                Ok(())
            }
            Err(error) => {
                warn!(
                    "Teardown of engine at {} failed, graph '{}' marked closed: {}",
                    endpoint, graph_key, error
                );
                if let Some(handle) = self.handles.lock().get_mut(graph_key) {
                    handle.error_msg = Some(error.to_string());
                }
                Err(error)
            }
        }
    }

    pub fn status(&self, graph_key: &str) -> Option<EngineStatus> {
        self.handles.lock().get(graph_key).map(|h| h.status)
    }

    pub fn handle(&self, graph_key: &str) -> Option<EngineHandle> {
        self.handles.lock().get(graph_key).cloned()
    }

    /// All handles ordered by graph key
    pub fn handles(&self) -> Vec<EngineHandle> {
        let mut handles: Vec<EngineHandle> = self.handles.lock().values().cloned().collect();
        handles.sort_by(|a, b| a.graph_key.cmp(&b.graph_key));
        handles
    }

    /// Close every engine that is not in a terminal state
    ///
    /// Failures are logged and do not stop the sweep. Returns the number of
    /// handles that were closed.
    pub fn shutdown(&self) -> usize {
        let active: Vec<String> = self
            .handles
            .lock()
            .values()
            .filter(|h| !h.status.is_terminal())
            .map(|h| h.graph_key.clone())
            .collect();

        let closed = active.len();
        for graph_key in active {
            // the handle ends Closed even when teardown fails
            if let Err(e) = self.close(&graph_key) {
                warn!("Closing engine on graph '{}' failed: {}", graph_key, e);
            }
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{LoadRequest, OidType};
    use crate::error::StoreError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoClient;

    impl GremlinClient for EchoClient {
        fn submit(&self, script: &str, _: &RequestOptions) -> Result<Vec<Value>, RemoteError> {
            if script.contains("fail") {
                Err(RemoteError::Failed(format!("cannot run {}", script)))
            } else {
                Ok(vec![Value::from(script)])
            }
        }
    }

    #[derive(Default)]
    struct StubCluster {
        fail_provision: bool,
        fail_close: bool,
        provisioned: AtomicUsize,
        closed: AtomicUsize,
    }

    impl Cluster for StubCluster {
        fn create_interactive_query(
            &self,
            graph: &GraphMeta,
            _: &ProvisionRequest,
        ) -> Result<String, RemoteError> {
            if self.fail_provision {
                return Err(RemoteError::Failed("no resources".into()));
            }
            let n = self.provisioned.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{}:{}", graph.key, 8000 + n))
        }

        fn close_interactive_query(&self, _: &str) -> Result<(), RemoteError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                Err(RemoteError::Failed("pod stuck".into()))
            } else {
                Ok(())
            }
        }

        fn gremlin_client(&self, _: &str) -> Result<Arc<dyn GremlinClient>, RemoteError> {
            Ok(Arc::new(EchoClient))
        }

        fn graph(&self, key: &str) -> Result<GraphMeta, RemoteError> {
            Err(RemoteError::NotFound(key.to_string()))
        }

        fn load_from(&self, _: &LoadRequest) -> Result<GraphMeta, StoreError> {
            Err(StoreError::InvalidData("unsupported".into()))
        }
    }

    fn graph() -> GraphMeta {
        GraphMeta {
            key: "g1".into(),
            object_id: ObjectId(1),
            oid_type: OidType::Int64,
            vertex_count: 0,
            edge_count: 0,
        }
    }

    fn request() -> ProvisionRequest {
        ProvisionRequest {
            engine_params: Default::default(),
            cpu: 0.2,
            mem: "1Gi".into(),
        }
    }

    fn manager(cluster: StubCluster) -> (Arc<StubCluster>, InteractiveEngineManager) {
        let cluster = Arc::new(cluster);
        let remote = Arc::new(RemoteCaller::new(None, 1).unwrap());
        let manager = InteractiveEngineManager::new(cluster.clone(), remote);
        (cluster, manager)
    }

    #[test]
    fn test_provision_and_duplicate() {
        let (_, manager) = manager(StubCluster::default());
        let info = manager.provision(&graph(), request()).unwrap();
        assert_eq!(info.graph_url, "ws://g1:8000/gremlin");
        assert_eq!(manager.status("g1"), Some(EngineStatus::Running));

        let again = manager.provision(&graph(), request());
        assert!(matches!(again, Err(SessionError::DuplicateEngine(_))));
        assert_eq!(manager.status("g1"), Some(EngineStatus::Running));
    }

    #[test]
    fn test_provision_failure_is_terminal() {
        let (_, manager) = manager(StubCluster {
            fail_provision: true,
            ..Default::default()
        });
        let result = manager.provision(&graph(), request());
        assert!(matches!(result, Err(SessionError::RemoteExecution(_))));

        let handle = manager.handle("g1").unwrap();
        assert_eq!(handle.status, EngineStatus::Failed);
        assert!(handle.error_msg.unwrap().contains("no resources"));
        assert!(matches!(
            manager.submit("g1", "g.V()", &RequestOptions::new()),
            Err(SessionError::EngineUnavailable {
                status: EngineStatus::Failed,
                ..
            })
        ));
    }

    #[test]
    fn test_submit_failure_marks_failed() {
        let (_, manager) = manager(StubCluster::default());
        manager.provision(&graph(), request()).unwrap();

        let ok = manager.submit("g1", "g.V()", &RequestOptions::new()).unwrap();
        assert_eq!(ok, vec![Value::from("g.V()")]);

        let err = manager.submit("g1", "fail()", &RequestOptions::new());
        assert!(matches!(err, Err(SessionError::RemoteExecution(_))));
        assert_eq!(manager.status("g1"), Some(EngineStatus::Failed));
    }

    #[test]
    fn test_close_is_idempotent() {
        let (cluster, manager) = manager(StubCluster::default());
        manager.provision(&graph(), request()).unwrap();

        manager.close("g1").unwrap();
        manager.close("g1").unwrap();
        assert_eq!(manager.status("g1"), Some(EngineStatus::Closed));
        assert_eq!(cluster.closed.load(Ordering::SeqCst), 1);

        // terminal handles may be provisioned again
        let info = manager.provision(&graph(), request()).unwrap();
        assert_eq!(manager.status("g1"), Some(EngineStatus::Running));
        assert_eq!(info.generation, 2);
        assert!(manager.require_bound("g1", 2, true).is_ok());
        assert!(matches!(
            manager.require_bound("g1", 1, true),
            Err(SessionError::EngineUnavailable {
                status: EngineStatus::Closed,
                ..
            })
        ));
    }

    #[test]
    fn test_close_remote_failure_still_closes() {
        let (_, manager) = manager(StubCluster {
            fail_close: true,
            ..Default::default()
        });
        manager.provision(&graph(), request()).unwrap();

        assert!(matches!(
            manager.close("g1"),
            Err(SessionError::RemoteExecution(_))
        ));
        assert_eq!(manager.status("g1"), Some(EngineStatus::Closed));
        assert!(manager.close("g1").is_ok());
    }

    #[test]
    fn test_close_unknown_and_failed() {
        let (_, manager) = manager(StubCluster::default());
        assert!(matches!(
            manager.close("nope"),
            Err(SessionError::NoSuchEngine(_))
        ));

        manager.provision(&graph(), request()).unwrap();
        manager.fail("g1", &SessionError::RemoteExecution("lost".into()));
        assert!(manager.close("g1").is_ok());
        assert_eq!(manager.status("g1"), Some(EngineStatus::Failed));
    }

    #[test]
    fn test_shutdown_closes_running_only() {
        let (cluster, manager) = manager(StubCluster::default());
        manager.provision(&graph(), request()).unwrap();
        let mut other = graph();
        other.key = "g2".into();
        manager.provision(&other, request()).unwrap();
        manager.close("g2").unwrap();

        assert_eq!(manager.shutdown(), 1);
        assert_eq!(cluster.closed.load(Ordering::SeqCst), 2);
        assert!(manager
            .handles()
            .iter()
            .all(|h| h.status == EngineStatus::Closed));
    }
}
