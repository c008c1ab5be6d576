// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Subgraph extraction
//!
//! Extraction runs two branches side by side: the source engine executes the
//! user's script and writes the resulting edges into a pair of named streams,
//! while a loader on the session's worker pool drains those streams into a
//! new stored graph. The loader blocks on the streams, so the two branches
//! may start in either order.

use crate::cluster::{
    Cluster, GraphMeta, LoadRequest, OidType, RemoteError, RequestOptions, StreamRef,
};
use crate::error::{SessionError, SessionResult, StoreError};
use crate::exec::engine_manager::InteractiveEngineManager;
use crate::naming::{edge_stream_name, vertex_stream_name, NameSource};
use log::{debug, info, warn};
use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::HashSet;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Created,
    Loading,
    Loaded,
    Failed,
}

/// One extraction, alive for the duration of a single call
#[derive(Debug, Clone)]
pub struct SubgraphJob {
    pub name: String,
    pub source_script: String,
    pub vertex_stream: StreamRef,
    pub edge_stream: StreamRef,
    pub state: JobState,
}

impl SubgraphJob {
    pub fn new(name: impl Into<String>, source_script: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            vertex_stream: StreamRef::new(vertex_stream_name(&name)),
            edge_stream: StreamRef::new(edge_stream_name(&name)),
            source_script: source_script.into(),
            state: JobState::Created,
            name,
        }
    }

    /// Script creating the named output graph on the engine
    pub fn create_script(&self) -> String {
        format!(
            "g.createGraph('{}').with('graphType', 'vineyard')",
            self.name
        )
    }

    /// The user's script redirected into the output graph
    pub fn output_script(&self) -> String {
        format!(
            "{}.subgraph('{}').outputVineyard('{}')",
            self.source_script.trim_end(),
            self.name,
            self.name
        )
    }

    pub fn load_request(&self, oid_type: OidType) -> LoadRequest {
        LoadRequest {
            vertices: vec![self.vertex_stream.clone()],
            edges: vec![self.edge_stream.clone()],
            generate_eid: false,
            oid_type,
        }
    }

    fn transition(&mut self, state: JobState) {
        debug!("Subgraph job '{}' {:?} -> {:?}", self.name, self.state, state);
        self.state = state;
    }
}

pub struct SubgraphExtractor {
    cluster: Arc<dyn Cluster>,
    engines: Arc<InteractiveEngineManager>,
    names: Arc<dyn NameSource>,
    /// Names handed out by this session; never released, since a sealed
    /// output stream keeps its name in the store for good
    reserved: Mutex<HashSet<String>>,
    pool: ThreadPool,
    remote_timeout: Option<Duration>,
}

impl SubgraphExtractor {
    pub fn new(
        cluster: Arc<dyn Cluster>,
        engines: Arc<InteractiveEngineManager>,
        names: Arc<dyn NameSource>,
        loader_threads: usize,
        remote_timeout: Option<Duration>,
    ) -> SessionResult<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(loader_threads)
            .thread_name(|i| format!("giesession-loader-{}", i))
            .build()
            .map_err(|e| SessionError::Config(format!("cannot build loader pool: {}", e)))?;

        Ok(Self {
            cluster,
            engines,
            names,
            reserved: Mutex::new(HashSet::new()),
            pool,
            remote_timeout,
        })
    }

    /// Extract the edges produced by `script` on the graph's engine into a
    /// new stored graph
    ///
    /// Errors raised after the output graph has been created name it, either
    /// as [`SessionError::Subgraph`] or [`SessionError::BackgroundLoad`].
    pub fn extract(
        &self,
        graph_key: &str,
        script: &str,
        options: &RequestOptions,
        oid_type: OidType,
    ) -> SessionResult<GraphMeta> {
        self.engines.require_running(graph_key)?;

        let mut job = SubgraphJob::new(self.reserve_name()?, script);
        info!(
            "Extracting subgraph '{}' from graph '{}'",
            job.name, graph_key
        );

        match self.engines.try_submit(graph_key, &job.create_script(), options) {
            Ok(Ok(_)) => {}
            Ok(Err(RemoteError::AlreadyExists(_))) => {
                job.transition(JobState::Failed);
                return Err(SessionError::NameCollision(job.name));
            }
            Ok(Err(remote_error)) => {
                return Err(self.fail_remote(graph_key, &mut job, remote_error.into()))
            }
            Err(error) => return Err(self.fail_remote(graph_key, &mut job, error)),
        }

        let (tx, rx) = mpsc::channel();
        let cluster = self.cluster.clone();
        let request = job.load_request(oid_type);
        let load_name = job.name.clone();
        self.pool.spawn(move || {
            let result = cluster.load_from(&request);
            match &result {
                Ok(meta) => debug!("Background load of '{}' produced {}", load_name, meta.key),
                Err(e) => debug!("Background load of '{}' failed: {}", load_name, e),
            }
            let _ = tx.send(result);
        });
        job.transition(JobState::Loading);

        match self.engines.try_submit(graph_key, &job.output_script(), options) {
            Ok(Ok(_)) => {}
            Ok(Err(remote_error)) => {
                return Err(self.fail_remote(graph_key, &mut job, remote_error.into()))
            }
            Err(error) => return Err(self.fail_remote(graph_key, &mut job, error)),
        }

        let joined = match self.remote_timeout {
            Some(limit) => rx.recv_timeout(limit).map_err(|e| match e {
                RecvTimeoutError::Timeout => SessionError::Timeout {
                    call: format!("load_from({})", job.name),
                    timeout: limit,
                },
                RecvTimeoutError::Disconnected => SessionError::BackgroundLoad {
                    name: job.name.clone(),
                    source: StoreError::TaskDropped(job.name.clone()),
                },
            }),
            None => rx.recv().map_err(|_| SessionError::BackgroundLoad {
                name: job.name.clone(),
                source: StoreError::TaskDropped(job.name.clone()),
            }),
        };

        match joined {
            Ok(Ok(meta)) => {
                job.transition(JobState::Loaded);
                info!(
                    "Subgraph '{}' loaded as {} ({} vertices, {} edges)",
                    job.name, meta.key, meta.vertex_count, meta.edge_count
                );
                Ok(meta)
            }
            Ok(Err(source)) => {
                job.transition(JobState::Failed);
                warn!("Subgraph '{}' background load failed: {}", job.name, source);
                Err(SessionError::BackgroundLoad {
                    name: job.name,
                    source,
                })
            }
            Err(error @ SessionError::BackgroundLoad { .. }) => {
                job.transition(JobState::Failed);
                Err(error)
            }
            Err(error) => {
                job.transition(JobState::Failed);
                Err(SessionError::Subgraph {
                    name: job.name,
                    source: Box::new(error),
                })
            }
        }
    }

    /// Draw a name and reserve it for this session
    fn reserve_name(&self) -> SessionResult<String> {
        let name = self.names.next_name();
        if !self.reserved.lock().insert(name.clone()) {
            warn!("Generated subgraph name '{}' is already reserved", name);
            return Err(SessionError::NameCollision(name));
        }
        Ok(name)
    }

    fn fail_remote(
        &self,
        graph_key: &str,
        job: &mut SubgraphJob,
        error: SessionError,
    ) -> SessionError {
        job.transition(JobState::Failed);
        if !matches!(
            error,
            SessionError::EngineUnavailable { .. } | SessionError::NoSuchEngine(_)
        ) {
            self.engines.fail(graph_key, &error);
        }
        warn!(
            "Subgraph '{}' on graph '{}' failed in state {:?}: {}",
            job.name, graph_key, job.state, error
        );
        SessionError::Subgraph {
            name: job.name.clone(),
            source: Box::new(error),
        }
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.lock().contains(name)
    }

    pub fn loader_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}
