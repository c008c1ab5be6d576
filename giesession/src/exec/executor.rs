// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Session executor
//!
//! Evaluates a target op by walking its plan in topological order. Every op
//! is dispatched at most once: a settled op keeps its output (registered in
//! the [`ObjectManager`] under the op key) or its failure for the rest of
//! the session.

use crate::cluster::{Cluster, GraphMeta, OidType, ProvisionRequest, RequestOptions};
use crate::config::SessionConfig;
use crate::dag::ops::params;
use crate::dag::{FetchMode, Op, OpGraph, OpId, OpKind};
use crate::error::{SessionError, SessionResult};
use crate::exec::engine_manager::{EngineHandle, EngineStatus, InteractiveEngineManager};
use crate::exec::object_manager::ObjectManager;
use crate::exec::remote::RemoteCaller;
use crate::exec::subgraph::SubgraphExtractor;
use crate::exec::{EngineInfo, GremlinResultSet, OpOutput};
use crate::naming::NameSource;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Evaluation state of one op
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvalState {
    Pending,
    Dispatched,
    Succeeded,
    Failed,
}

impl EvalState {
    pub fn is_settled(&self) -> bool {
        matches!(self, EvalState::Succeeded | EvalState::Failed)
    }
}

/// Engine generation an engine-creation op was bound to
#[derive(Debug, Clone, PartialEq)]
struct EngineBinding {
    graph_key: String,
    generation: u64,
    /// `false` when provisioning never produced an endpoint
    came_up: bool,
}

impl From<&EngineInfo> for EngineBinding {
    fn from(info: &EngineInfo) -> Self {
        Self {
            graph_key: info.graph_key.clone(),
            generation: info.generation,
            came_up: true,
        }
    }
}

pub struct SessionExecutor {
    session_id: String,
    config: SessionConfig,
    cluster: Arc<dyn Cluster>,
    remote: Arc<RemoteCaller>,
    engines: Arc<InteractiveEngineManager>,
    extractor: SubgraphExtractor,
    objects: ObjectManager,
    states: Mutex<HashMap<OpId, EvalState>>,
    failures: Mutex<HashMap<OpId, String>>,
    bindings: Mutex<HashMap<OpId, EngineBinding>>,
    /// Serializes evaluations within the session
    run_lock: Mutex<()>,
    eager_seq: AtomicU64,
}

impl SessionExecutor {
    pub fn new(
        session_id: impl Into<String>,
        config: SessionConfig,
        cluster: Arc<dyn Cluster>,
        names: Arc<dyn NameSource>,
    ) -> SessionResult<Self> {
        config.validate()?;
        let remote = Arc::new(RemoteCaller::new(
            config.remote_timeout,
            config.remote_threads,
        )?);
        let engines = Arc::new(InteractiveEngineManager::new(
            cluster.clone(),
            remote.clone(),
        ));
        let extractor = SubgraphExtractor::new(
            cluster.clone(),
            engines.clone(),
            names,
            config.loader_threads,
            config.remote_timeout,
        )?;

        Ok(Self {
            session_id: session_id.into(),
            config,
            cluster,
            remote,
            engines,
            extractor,
            objects: ObjectManager::new(),
            states: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            bindings: Mutex::new(HashMap::new()),
            run_lock: Mutex::new(()),
            eager_seq: AtomicU64::new(0),
        })
    }

    /// Evaluate `target` and everything it depends on
    ///
    /// Ops settled by earlier runs are not dispatched again; a failure from
    /// an earlier run only resurfaces when it is the target itself. The run
    /// stops at the first op that fails now.
    pub fn evaluate(&self, graph: &Mutex<OpGraph>, target: OpId) -> SessionResult<OpOutput> {
        let _run = self.run_lock.lock();
        let plan = graph.lock().plan(target)?;
        let ops: HashMap<OpId, Arc<Op>> = plan.iter().map(|op| (op.id(), op.clone())).collect();

        for op in &plan {
            match self.eval_state(op.id()) {
                EvalState::Succeeded => continue,
                EvalState::Failed if op.id() == target => {
                    return Err(SessionError::OpFailed {
                        op: target,
                        message: self.failure(target).unwrap_or_default(),
                    });
                }
                EvalState::Failed => {
                    debug!("Skipping {} op {}, failed earlier", op.kind(), op.id());
                    continue;
                }
                EvalState::Dispatched => {
                    // Only reachable if a previous dispatch unwound
                    let message = "dispatch was interrupted".to_string();
                    self.settle_failure(op, &message);
                    return Err(SessionError::OpFailed {
                        op: op.id(),
                        message,
                    });
                }
                EvalState::Pending => {}
            }

            self.set_state(op.id(), EvalState::Dispatched);
            debug!("Dispatching {} op {} ({})", op.kind(), op.id(), op.key());
            match self.dispatch(op, &ops) {
                Ok(output) => {
                    self.objects.put(op.key(), output);
                    self.set_state(op.id(), EvalState::Succeeded);
                    debug!("{} op {} succeeded", op.kind(), op.id());
                }
                Err(error) => {
                    self.settle_failure(op, &error.to_string());
                    warn!("{} op {} failed: {}", op.kind(), op.id(), error);
                    return Err(error);
                }
            }
        }

        let key = ops
            .get(&target)
            .map(|op| op.key().to_string())
            .ok_or(SessionError::UnknownOp(target))?;
        self.objects.get(&key).ok_or_else(|| SessionError::OpFailed {
            op: target,
            message: format!("output '{}' is no longer registered", key),
        })
    }

    fn dispatch(&self, op: &Op, ops: &HashMap<OpId, Arc<Op>>) -> SessionResult<OpOutput> {
        match op.kind() {
            OpKind::CreateEngine => self.create_engine(op, ops),
            OpKind::RunQuery => {
                let binding = self.binding(op, 0)?;
                let query = op.str_param(params::QUERY)?;
                let options: RequestOptions = op.json_param(params::REQUEST_OPTIONS)?;
                let engine = self.bound_handle(&binding)?;
                let values = self.engines.submit(&engine.graph_key, query, &options)?;
                Ok(OpOutput::ResultSet(Arc::new(GremlinResultSet {
                    key: op.key().to_string(),
                    values,
                })))
            }
            OpKind::FetchResult => {
                let binding = self.binding(op, 1)?;
                self.bound_handle(&binding)?;
                let source = op.input(0)?;
                let result_set = match self.output_of(source, ops) {
                    Some(OpOutput::ResultSet(result_set)) => result_set,
                    _ => {
                        return Err(SessionError::DependencyFailed {
                            op: op.id(),
                            dependency: source,
                        })
                    }
                };
                let value = match FetchMode::parse(op.str_param(params::FETCH_MODE)?)? {
                    FetchMode::One => result_set.one(),
                    FetchMode::All => result_set.all(),
                };
                Ok(OpOutput::Value(value))
            }
            OpKind::BuildSubgraph => {
                let binding = self.binding(op, 0)?;
                let script = op.str_param(params::GREMLIN_SCRIPT)?;
                let options: RequestOptions = op.json_param(params::REQUEST_OPTIONS)?;
                let oid_type = parse_oid_type(op.str_param(params::OID_TYPE)?)?;
                let engine = self.bound_handle(&binding)?;
                let meta = self
                    .extractor
                    .extract(&engine.graph_key, script, &options, oid_type)?;
                self.objects.put(meta.key.clone(), OpOutput::Graph(meta.clone()));
                Ok(OpOutput::Graph(meta))
            }
            OpKind::CloseEngine => {
                let binding = self.binding(op, 0)?;
                self.close_binding(&binding)?;
                Ok(OpOutput::Closed(binding.graph_key))
            }
        }
    }

    fn create_engine(&self, op: &Op, ops: &HashMap<OpId, Arc<Op>>) -> SessionResult<OpOutput> {
        let graph: GraphMeta = if op.flag(params::GRAPH_FROM_INPUT) {
            let source = op.input(0)?;
            match self.output_of(source, ops) {
                Some(OpOutput::Graph(meta)) => meta,
                _ => {
                    return Err(SessionError::DependencyFailed {
                        op: op.id(),
                        dependency: source,
                    })
                }
            }
        } else {
            op.json_param(params::GRAPH)?
        };

        let request = ProvisionRequest {
            engine_params: op.json_param(params::ENGINE_PARAMS)?,
            cpu: op.float_param(params::CPU)?,
            mem: op.str_param(params::MEM)?.to_string(),
        };

        match self.engines.provision(&graph, request) {
            Ok(info) => {
                self.bindings.lock().insert(op.id(), EngineBinding::from(&info));
                Ok(OpOutput::Engine(info))
            }
            Err(error @ SessionError::DuplicateEngine(_)) => Err(error),
            Err(error) => {
                // The handle exists and is Failed; later ops report that status
                if let Some(generation) = self.engines.generation(&graph.key) {
                    self.bindings.lock().insert(
                        op.id(),
                        EngineBinding {
                            graph_key: graph.key,
                            generation,
                            came_up: false,
                        },
                    );
                }
                Err(error)
            }
        }
    }

    fn binding(&self, op: &Op, position: usize) -> SessionResult<EngineBinding> {
        let engine = op.input(position)?;
        self.bindings
            .lock()
            .get(&engine)
            .cloned()
            .ok_or(SessionError::DependencyFailed {
                op: op.id(),
                dependency: engine,
            })
    }

    fn bound_handle(&self, binding: &EngineBinding) -> SessionResult<EngineHandle> {
        self.engines
            .require_bound(&binding.graph_key, binding.generation, binding.came_up)
    }

    fn close_binding(&self, binding: &EngineBinding) -> SessionResult<()> {
        let current = self
            .engines
            .handle(&binding.graph_key)
            .ok_or_else(|| SessionError::NoSuchEngine(binding.graph_key.clone()))?;
        if current.generation != binding.generation {
            debug!(
                "Engine generation {} on graph '{}' was already replaced, nothing to close",
                binding.generation, binding.graph_key
            );
            return Ok(());
        }
        self.engines.close(&binding.graph_key)
    }

    fn output_of(&self, id: OpId, ops: &HashMap<OpId, Arc<Op>>) -> Option<OpOutput> {
        if self.eval_state(id) != EvalState::Succeeded {
            return None;
        }
        ops.get(&id).and_then(|op| self.objects.get(op.key()))
    }

    fn set_state(&self, id: OpId, state: EvalState) {
        self.states.lock().insert(id, state);
    }

    fn settle_failure(&self, op: &Op, message: &str) {
        self.failures.lock().insert(op.id(), message.to_string());
        self.set_state(op.id(), EvalState::Failed);
    }

    pub fn eval_state(&self, id: OpId) -> EvalState {
        self.states
            .lock()
            .get(&id)
            .copied()
            .unwrap_or(EvalState::Pending)
    }

    /// Message recorded for a failed op
    pub fn failure(&self, id: OpId) -> Option<String> {
        self.failures.lock().get(&id).cloned()
    }

    /// Submit a script to an engine outside the op graph
    pub fn submit(
        &self,
        engine: &EngineInfo,
        script: &str,
        options: &RequestOptions,
    ) -> SessionResult<Arc<GremlinResultSet>> {
        let handle = self.bound_handle(&EngineBinding::from(engine))?;
        let values = self.engines.submit(&handle.graph_key, script, options)?;
        let key = format!(
            "{}_eager_{}",
            self.session_id,
            self.eager_seq.fetch_add(1, Ordering::Relaxed)
        );
        let result_set = Arc::new(GremlinResultSet { key, values });
        self.objects
            .put(result_set.key.clone(), OpOutput::ResultSet(result_set.clone()));
        Ok(result_set)
    }

    /// Extract a subgraph outside the op graph
    pub fn extract_subgraph(
        &self,
        engine: &EngineInfo,
        script: &str,
        options: &RequestOptions,
        oid_type: OidType,
    ) -> SessionResult<GraphMeta> {
        let handle = self.bound_handle(&EngineBinding::from(engine))?;
        let meta = self
            .extractor
            .extract(&handle.graph_key, script, options, oid_type)?;
        self.objects.put(meta.key.clone(), OpOutput::Graph(meta.clone()));
        Ok(meta)
    }

    /// Close an engine outside the op graph
    pub fn close_engine(&self, engine: &EngineInfo) -> SessionResult<()> {
        self.close_binding(&EngineBinding::from(engine))
    }

    pub fn engine_status(&self, engine: &EngineInfo) -> EngineStatus {
        // a replaced engine counts as closed
        self.engine_handle(engine)
            .map(|handle| handle.status)
            .unwrap_or(EngineStatus::Closed)
    }

    pub fn engine_handle(&self, engine: &EngineInfo) -> Option<EngineHandle> {
        self.engines
            .handle(&engine.graph_key)
            .filter(|h| h.generation == engine.generation)
    }

    pub fn engines(&self) -> &InteractiveEngineManager {
        &self.engines
    }

    pub fn objects(&self) -> &ObjectManager {
        &self.objects
    }

    pub fn cluster(&self) -> &Arc<dyn Cluster> {
        &self.cluster
    }

    pub(crate) fn remote(&self) -> &RemoteCaller {
        &self.remote
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn extractor(&self) -> &SubgraphExtractor {
        &self.extractor
    }

    /// Close every active engine; the executor stays usable for lookups
    pub fn shutdown(&self) {
        let closed = self.engines.shutdown();
        if closed > 0 {
            info!(
                "Session {} closed {} interactive quer{}",
                self.session_id,
                closed,
                if closed == 1 { "y" } else { "ies" }
            );
        }
    }
}

fn parse_oid_type(value: &str) -> SessionResult<OidType> {
    OidType::parse(value).ok_or_else(|| {
        SessionError::invalid_param(params::OID_TYPE, format!("unknown oid type '{}'", value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_state_settled() {
        assert!(!EvalState::Pending.is_settled());
        assert!(!EvalState::Dispatched.is_settled());
        assert!(EvalState::Succeeded.is_settled());
        assert!(EvalState::Failed.is_settled());
    }

    #[test]
    fn test_parse_oid_type() {
        assert_eq!(parse_oid_type("int64_t").unwrap(), OidType::Int64);
        assert!(matches!(
            parse_oid_type("float"),
            Err(SessionError::InvalidParam { .. })
        ));
    }
}
