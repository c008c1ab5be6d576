// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-process cluster
//!
//! Engines are entries in a shared table keyed by endpoint; each is bound to
//! one stored graph and answers gremlin scripts from the local subset.
//! Subgraph output goes through the store's streams exactly as a remote
//! engine would write them, so the session's background load is exercised
//! for real.

use crate::cluster::{
    Cluster, GraphMeta, GremlinClient, LoadRequest, OidType, ProvisionRequest, RemoteError,
    RequestOptions,
};
use crate::config::is_memory_quantity;
use crate::error::StoreError;
use crate::local::graph::PropertyGraph;
use crate::local::gremlin::{compile, evaluate, Script, SubgraphOutput};
use crate::local::store::{ObjectStore, StoredGraph, StreamChunk, StreamState};
use crate::naming::{edge_stream_name, vertex_stream_name};
use crate::value::Value;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// First port handed out by [`LocalCluster::new`]
pub const DEFAULT_BASE_PORT: u32 = 8182;

static OUTPUT_TARGET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"outputVineyard\(\s*['"]([^'"]+)['"]\s*\)"#).expect("valid output regex")
});

/// Output graphs a script writes to
fn declared_outputs(script: &str) -> Vec<String> {
    OUTPUT_TARGET
        .captures_iter(script)
        .map(|c| c[1].to_string())
        .collect()
}

struct EngineSlot {
    graph: Arc<StoredGraph>,
}

type EngineTable = Arc<RwLock<HashMap<String, EngineSlot>>>;

pub struct LocalCluster {
    store: Arc<ObjectStore>,
    host: String,
    next_port: AtomicU32,
    engines: EngineTable,
}

impl LocalCluster {
    pub fn new(store: Arc<ObjectStore>) -> Self {
        Self::with_host_and_port(store, "localhost", DEFAULT_BASE_PORT)
    }

    pub fn with_host_and_port(store: Arc<ObjectStore>, host: &str, base_port: u32) -> Self {
        Self {
            store,
            host: host.to_string(),
            next_port: AtomicU32::new(base_port),
            engines: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Arc<ObjectStore> {
        &self.store
    }

    /// Store `graph` under `key`, checking ids against `oid_type`
    pub fn load_graph(
        &self,
        key: &str,
        graph: PropertyGraph,
        oid_type: OidType,
    ) -> Result<GraphMeta, StoreError> {
        for vertex in graph.vertices() {
            check_oid(&vertex.id, oid_type)?;
        }
        self.store.put_graph(Some(key), graph, oid_type)
    }

    /// Number of engines currently running
    pub fn engine_count(&self) -> usize {
        self.engines.read().len()
    }

    pub fn endpoints(&self) -> Vec<String> {
        let mut endpoints: Vec<String> = self.engines.read().keys().cloned().collect();
        endpoints.sort();
        endpoints
    }
}

fn check_oid(id: &str, oid_type: OidType) -> Result<(), StoreError> {
    if oid_type == OidType::Int64 && id.parse::<i64>().is_err() {
        return Err(StoreError::InvalidData(format!(
            "vertex id '{}' is not a valid {}",
            id,
            oid_type.as_str()
        )));
    }
    Ok(())
}

impl Cluster for LocalCluster {
    fn create_interactive_query(
        &self,
        graph: &GraphMeta,
        request: &ProvisionRequest,
    ) -> Result<String, RemoteError> {
        if request.cpu.is_nan() || request.cpu <= 0.0 || !is_memory_quantity(&request.mem) {
            return Err(RemoteError::Failed(format!(
                "invalid engine sizing cpu={} mem={}",
                request.cpu, request.mem
            )));
        }
        let stored = self
            .store
            .graph_by_id(graph.object_id)
            .map_err(|e| RemoteError::NotFound(e.to_string()))?;

        let port = self.next_port.fetch_add(1, Ordering::SeqCst);
        let endpoint = format!("{}:{}", self.host, port);
        self.engines
            .write()
            .insert(endpoint.clone(), EngineSlot { graph: stored });
        info!(
            "Started local engine for graph {} at {} ({} engine params)",
            graph.key,
            endpoint,
            request.engine_params.len()
        );
        Ok(endpoint)
    }

    fn close_interactive_query(&self, endpoint: &str) -> Result<(), RemoteError> {
        match self.engines.write().remove(endpoint) {
            Some(_) => {
                info!("Stopped local engine at {}", endpoint);
                Ok(())
            }
            None => Err(RemoteError::NotFound(format!("no engine at {}", endpoint))),
        }
    }

    fn gremlin_client(&self, endpoint: &str) -> Result<Arc<dyn GremlinClient>, RemoteError> {
        if !self.engines.read().contains_key(endpoint) {
            return Err(RemoteError::NotFound(format!("no engine at {}", endpoint)));
        }
        Ok(Arc::new(LocalGremlinClient {
            endpoint: endpoint.to_string(),
            store: self.store.clone(),
            engines: self.engines.clone(),
        }))
    }

    fn graph(&self, key: &str) -> Result<GraphMeta, RemoteError> {
        self.store
            .graph(key)
            .map(|stored| stored.meta.clone())
            .map_err(|e| RemoteError::NotFound(e.to_string()))
    }

    fn load_from(&self, request: &LoadRequest) -> Result<GraphMeta, StoreError> {
        let mut graph = PropertyGraph::new();

        for stream in &request.vertices {
            for chunk in self.store.read_all(stream.name())? {
                match chunk {
                    StreamChunk::Vertex(vertex) => {
                        check_oid(&vertex.id, request.oid_type)?;
                        if !graph.contains_vertex(&vertex.id) {
                            graph
                                .add_vertex(vertex)
                                .map_err(|e| StoreError::InvalidData(e.to_string()))?;
                        }
                    }
                    StreamChunk::Edge(edge) => {
                        return Err(StoreError::InvalidData(format!(
                            "edge {} in vertex stream '{}'",
                            edge.id,
                            stream.name()
                        )))
                    }
                }
            }
        }

        let mut next_eid = 0u64;
        for stream in &request.edges {
            for chunk in self.store.read_all(stream.name())? {
                match chunk {
                    StreamChunk::Edge(mut edge) => {
                        if request.generate_eid {
                            edge.id = next_eid.to_string();
                            next_eid += 1;
                        }
                        graph
                            .add_edge(edge)
                            .map_err(|e| StoreError::InvalidData(e.to_string()))?;
                    }
                    StreamChunk::Vertex(vertex) => {
                        return Err(StoreError::InvalidData(format!(
                            "vertex {} in edge stream '{}'",
                            vertex.id,
                            stream.name()
                        )))
                    }
                }
            }
        }

        self.store.put_graph(None, graph, request.oid_type)
    }
}

/// Query client for one local engine
pub struct LocalGremlinClient {
    endpoint: String,
    store: Arc<ObjectStore>,
    engines: EngineTable,
}

impl LocalGremlinClient {
    fn create_graph(&self, name: &str) -> Result<Vec<Value>, RemoteError> {
        for stream in [vertex_stream_name(name), edge_stream_name(name)] {
            self.store.create_stream(&stream).map_err(|e| match e {
                StoreError::AlreadyExists(_) => RemoteError::AlreadyExists(name.to_string()),
                other => RemoteError::Failed(other.to_string()),
            })?;
        }
        debug!("Created output graph {} on {}", name, self.endpoint);
        Ok(Vec::new())
    }

    fn write_output(&self, name: &str, output: SubgraphOutput) -> Result<(), StoreError> {
        let vertex_stream = vertex_stream_name(name);
        let edge_stream = edge_stream_name(name);
        for vertex in output.vertices {
            self.store
                .write(&vertex_stream, StreamChunk::Vertex(vertex))?;
        }
        for edge in output.edges {
            self.store.write(&edge_stream, StreamChunk::Edge(edge))?;
        }
        self.store.seal(&vertex_stream)?;
        self.store.seal(&edge_stream)
    }

    /// Abort the still-open streams of every named output graph
    fn abort_outputs(&self, names: &[String], reason: &str) {
        for name in names {
            for stream in [vertex_stream_name(name), edge_stream_name(name)] {
                if self.store.stream_state(&stream) != Some(StreamState::Open) {
                    continue;
                }
                if let Err(e) = self.store.abort(&stream, reason) {
                    debug!("Could not abort stream {}: {}", stream, e);
                }
            }
        }
    }

    fn run_script(&self, graph: &StoredGraph, script: &str) -> Result<Vec<Value>, RemoteError> {
        let steps = match compile(script).map_err(|e| RemoteError::Failed(e.to_string()))? {
            Script::CreateGraph { name, .. } => return self.create_graph(&name),
            Script::Traversal(steps) => steps,
        };

        let evaluation =
            evaluate(&graph.graph, &steps).map_err(|e| RemoteError::Failed(e.to_string()))?;
        for (name, output) in evaluation.outputs {
            self.write_output(&name, output).map_err(|e| {
                RemoteError::Failed(format!("cannot write output graph '{}': {}", name, e))
            })?;
        }
        Ok(evaluation.values)
    }
}

impl GremlinClient for LocalGremlinClient {
    fn submit(&self, script: &str, options: &RequestOptions) -> Result<Vec<Value>, RemoteError> {
        let graph = match self.engines.read().get(&self.endpoint) {
            Some(slot) => slot.graph.clone(),
            None => {
                return Err(RemoteError::NotFound(format!(
                    "engine at {} is closed",
                    self.endpoint
                )))
            }
        };
        if !options.is_empty() {
            debug!("Request options for {}: {:?}", self.endpoint, options);
        }

        // scanned from the raw text so outputs are released even when the
        // script does not parse
        let outputs = declared_outputs(script);
        self.run_script(&graph, script).map_err(|error| {
            warn!("Script failed on {}: {}", self.endpoint, error);
            self.abort_outputs(&outputs, &error.to_string());
            error
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::StreamRef;
    use crate::local::graph::{Edge, Vertex};
    use crate::local::store::StoreConfig;
    use std::time::Duration;

    fn cluster() -> (LocalCluster, GraphMeta) {
        let store = Arc::new(ObjectStore::new(StoreConfig {
            stream_wait: Duration::from_secs(2),
        }));
        let cluster = LocalCluster::new(store);
        let mut graph = PropertyGraph::new();
        graph.add_vertex(Vertex::new("1", "person")).unwrap();
        graph.add_vertex(Vertex::new("2", "person")).unwrap();
        graph.add_edge(Edge::new("e", "knows", "1", "2")).unwrap();
        let meta = cluster.load_graph("people", graph, OidType::Int64).unwrap();
        (cluster, meta)
    }

    fn sizing() -> ProvisionRequest {
        ProvisionRequest {
            engine_params: Default::default(),
            cpu: 0.2,
            mem: "1Gi".into(),
        }
    }

    #[test]
    fn test_engine_lifecycle() {
        let (cluster, meta) = cluster();
        let endpoint = cluster.create_interactive_query(&meta, &sizing()).unwrap();
        assert_eq!(endpoint, "localhost:8182");
        assert_eq!(cluster.engine_count(), 1);

        let client = cluster.gremlin_client(&endpoint).unwrap();
        let count = client.submit("g.V().count()", &RequestOptions::new()).unwrap();
        assert_eq!(count, vec![Value::Integer(2)]);

        cluster.close_interactive_query(&endpoint).unwrap();
        assert!(matches!(
            client.submit("g.V().count()", &RequestOptions::new()),
            Err(RemoteError::NotFound(_))
        ));
        assert!(cluster.close_interactive_query(&endpoint).is_err());
        assert!(cluster.gremlin_client(&endpoint).is_err());
    }

    #[test]
    fn test_rejects_bad_sizing_and_ids() {
        let (cluster, meta) = cluster();
        let mut request = sizing();
        request.mem = "lots".into();
        assert!(cluster.create_interactive_query(&meta, &request).is_err());

        let mut graph = PropertyGraph::new();
        graph.add_vertex(Vertex::new("alice", "person")).unwrap();
        assert!(matches!(
            cluster.load_graph("bad", graph.clone(), OidType::Int64),
            Err(StoreError::InvalidData(_))
        ));
        assert!(cluster.load_graph("ok", graph, OidType::String).is_ok());
    }

    #[test]
    fn test_subgraph_through_streams() {
        let (cluster, meta) = cluster();
        let endpoint = cluster.create_interactive_query(&meta, &sizing()).unwrap();
        let client = cluster.gremlin_client(&endpoint).unwrap();
        let options = RequestOptions::new();

        client
            .submit("g.createGraph('out').with('graphType', 'vineyard')", &options)
            .unwrap();
        assert!(matches!(
            client.submit("g.createGraph('out')", &options),
            Err(RemoteError::AlreadyExists(_))
        ));
        client
            .submit("g.E().subgraph('out').outputVineyard('out')", &options)
            .unwrap();

        let loaded = cluster
            .load_from(&LoadRequest {
                vertices: vec![StreamRef::new(vertex_stream_name("out"))],
                edges: vec![StreamRef::new(edge_stream_name("out"))],
                generate_eid: false,
                oid_type: OidType::Int64,
            })
            .unwrap();
        assert_eq!(loaded.vertex_count, 2);
        assert_eq!(loaded.edge_count, 1);
        assert_ne!(loaded.object_id, meta.object_id);
    }

    #[test]
    fn test_failed_script_aborts_output() {
        let (cluster, meta) = cluster();
        let endpoint = cluster.create_interactive_query(&meta, &sizing()).unwrap();
        let client = cluster.gremlin_client(&endpoint).unwrap();
        let options = RequestOptions::new();

        client.submit("g.createGraph('bad')", &options).unwrap();
        assert!(client
            .submit("g.V().subgraph('bad').outputVineyard('bad')", &options)
            .is_err());

        let result = cluster.load_from(&LoadRequest {
            vertices: vec![StreamRef::new(vertex_stream_name("bad"))],
            edges: vec![StreamRef::new(edge_stream_name("bad"))],
            generate_eid: false,
            oid_type: OidType::Int64,
        });
        assert!(matches!(result, Err(StoreError::StreamAborted { .. })));
    }

    #[test]
    fn test_unparsable_script_aborts_output() {
        let (cluster, meta) = cluster();
        let endpoint = cluster.create_interactive_query(&meta, &sizing()).unwrap();
        let client = cluster.gremlin_client(&endpoint).unwrap();
        let options = RequestOptions::new();

        client.submit("g.createGraph('broken')", &options).unwrap();
        assert!(client
            .submit("g.V(.outE().subgraph('broken').outputVineyard('broken')", &options)
            .is_err());

        let store = cluster.store();
        for stream in [vertex_stream_name("broken"), edge_stream_name("broken")] {
            assert_eq!(store.stream_state(&stream), Some(StreamState::Aborted));
        }
    }

    #[test]
    fn test_declared_outputs() {
        assert_eq!(
            declared_outputs("g.E().subgraph('a').outputVineyard('a')"),
            vec!["a".to_string()]
        );
        assert_eq!(
            declared_outputs("g.V(.outputVineyard( \"b\" )"),
            vec!["b".to_string()]
        );
        assert!(declared_outputs("g.V().count()").is_empty());
    }
}
