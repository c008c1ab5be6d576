// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-process object store
//!
//! Holds stored graphs by object id and named element streams. A stream is
//! written while Open and becomes readable once Sealed; readers block until
//! then, until it is Aborted, or until `stream_wait` runs out. Stream names
//! stay reserved after sealing.

use crate::cluster::{GraphMeta, ObjectId, OidType};
use crate::error::StoreError;
use crate::local::graph::{Edge, PropertyGraph, Vertex};
use log::debug;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Longest a reader waits for a stream to be sealed
    pub stream_wait: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            stream_wait: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Vertex(Vertex),
    Edge(Edge),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Open,
    Sealed,
    Aborted,
}

#[derive(Debug)]
struct Stream {
    chunks: Vec<StreamChunk>,
    state: StreamState,
    reason: Option<String>,
}

/// A graph held by the store
#[derive(Debug)]
pub struct StoredGraph {
    pub meta: GraphMeta,
    pub graph: PropertyGraph,
}

#[derive(Default)]
struct StoreState {
    graphs: HashMap<ObjectId, Arc<StoredGraph>>,
    keys: HashMap<String, ObjectId>,
    streams: HashMap<String, Stream>,
}

pub struct ObjectStore {
    config: StoreConfig,
    state: Mutex<StoreState>,
    /// Signalled on every stream state change
    changed: Condvar,
    next_id: AtomicU64,
}

impl ObjectStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            state: Mutex::new(StoreState::default()),
            changed: Condvar::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Store a graph, keyed by `key` or by its object id
    pub fn put_graph(
        &self,
        key: Option<&str>,
        graph: PropertyGraph,
        oid_type: OidType,
    ) -> Result<GraphMeta, StoreError> {
        let object_id = ObjectId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let key = key
            .map(str::to_string)
            .unwrap_or_else(|| format!("graph_{}", object_id));

        let mut state = self.state.lock();
        if state.keys.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key));
        }

        let meta = GraphMeta {
            key: key.clone(),
            object_id,
            oid_type,
            vertex_count: graph.vertex_count(),
            edge_count: graph.edge_count(),
        };
        state.keys.insert(key, object_id);
        state.graphs.insert(
            object_id,
            Arc::new(StoredGraph {
                meta: meta.clone(),
                graph,
            }),
        );
        debug!(
            "Stored graph {} as {} ({} vertices, {} edges)",
            meta.key, object_id, meta.vertex_count, meta.edge_count
        );
        Ok(meta)
    }

    pub fn graph(&self, key: &str) -> Result<Arc<StoredGraph>, StoreError> {
        let state = self.state.lock();
        state
            .keys
            .get(key)
            .and_then(|id| state.graphs.get(id))
            .cloned()
            .ok_or_else(|| StoreError::ObjectNotFound(key.to_string()))
    }

    pub fn graph_by_id(&self, object_id: ObjectId) -> Result<Arc<StoredGraph>, StoreError> {
        self.state
            .lock()
            .graphs
            .get(&object_id)
            .cloned()
            .ok_or_else(|| StoreError::ObjectNotFound(object_id.to_string()))
    }

    pub fn drop_graph(&self, key: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let object_id = state
            .keys
            .remove(key)
            .ok_or_else(|| StoreError::ObjectNotFound(key.to_string()))?;
        state.graphs.remove(&object_id);
        Ok(())
    }

    pub fn graph_count(&self) -> usize {
        self.state.lock().graphs.len()
    }

    pub fn create_stream(&self, name: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if state.streams.contains_key(name) {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        state.streams.insert(
            name.to_string(),
            Stream {
                chunks: Vec::new(),
                state: StreamState::Open,
                reason: None,
            },
        );
        self.changed.notify_all();
        Ok(())
    }

    pub fn write(&self, name: &str, chunk: StreamChunk) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let stream = state
            .streams
            .get_mut(name)
            .ok_or_else(|| StoreError::ObjectNotFound(name.to_string()))?;
        match stream.state {
            StreamState::Open => {
                stream.chunks.push(chunk);
                Ok(())
            }
            StreamState::Aborted => Err(StoreError::StreamAborted {
                name: name.to_string(),
                reason: stream.reason.clone().unwrap_or_default(),
            }),
            StreamState::Sealed => Err(StoreError::InvalidData(format!(
                "stream '{}' is sealed",
                name
            ))),
        }
    }

    pub fn seal(&self, name: &str) -> Result<(), StoreError> {
        self.finish(name, StreamState::Sealed, None)
    }

    pub fn abort(&self, name: &str, reason: &str) -> Result<(), StoreError> {
        self.finish(name, StreamState::Aborted, Some(reason.to_string()))
    }

    fn finish(
        &self,
        name: &str,
        target: StreamState,
        reason: Option<String>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let stream = state
            .streams
            .get_mut(name)
            .ok_or_else(|| StoreError::ObjectNotFound(name.to_string()))?;
        if stream.state != StreamState::Open {
            return Err(StoreError::InvalidData(format!(
                "stream '{}' is already {:?}",
                name, stream.state
            )));
        }
        debug!("Stream {} -> {:?}", name, target);
        stream.state = target;
        stream.reason = reason;
        self.changed.notify_all();
        Ok(())
    }

    pub fn stream_state(&self, name: &str) -> Option<StreamState> {
        self.state.lock().streams.get(name).map(|s| s.state)
    }

    /// Wait until the stream is sealed and return its contents
    ///
    /// A stream that does not exist yet is waited for as well.
    pub fn read_all(&self, name: &str) -> Result<Vec<StreamChunk>, StoreError> {
        let deadline = Instant::now() + self.config.stream_wait;
        let mut state = self.state.lock();
        loop {
            if let Some(stream) = state.streams.get(name) {
                match stream.state {
                    StreamState::Sealed => return Ok(stream.chunks.clone()),
                    StreamState::Aborted => {
                        return Err(StoreError::StreamAborted {
                            name: name.to_string(),
                            reason: stream.reason.clone().unwrap_or_default(),
                        })
                    }
                    StreamState::Open => {}
                }
            }
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return Err(StoreError::StreamTimeout {
                    name: name.to_string(),
                    waited: self.config.stream_wait,
                });
            }
        }
    }
}
