// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Append-only op graph
//!
//! Ops are stored in a petgraph `DiGraph` whose node index equals the op id,
//! with an edge from every input to its consumer. Because an op may only name
//! inputs that were added before it, insertion order is always a valid
//! topological order and the graph can never contain a cycle.

use crate::dag::op::{Op, OpDraft, OpId};
use crate::error::{SessionError, SessionResult};
use log::debug;
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use std::sync::Arc;

pub struct OpGraph {
    /// Prefix making op keys unique across sessions
    key_prefix: String,
    graph: DiGraph<Arc<Op>, ()>,
}

impl OpGraph {
    pub fn new(key_prefix: impl Into<String>) -> Self {
        Self {
            key_prefix: key_prefix.into(),
            graph: DiGraph::new(),
        }
    }

    /// Commit a draft, returning the frozen op
    ///
    /// Fails with [`SessionError::Cycle`] when the draft names an input that
    /// is not already in the graph.
    pub fn add(&mut self, draft: OpDraft) -> SessionResult<Arc<Op>> {
        let id = OpId::from_index(self.graph.node_count());
        if let Some(missing) = draft
            .inputs()
            .iter()
            .find(|input| input.index() >= self.graph.node_count())
        {
            return Err(SessionError::Cycle {
                op: id,
                missing: *missing,
            });
        }

        let key = format!("{}_{}_{}", self.key_prefix, draft.kind(), id.index());
        let op = Arc::new(draft.commit(id, key));
        let node = self.graph.add_node(op.clone());
        for input in op.inputs() {
            self.graph.add_edge(NodeIndex::new(input.index()), node, ());
        }

        debug!("Committed {} op {} ({})", op.kind(), op.id(), op.key());
        Ok(op)
    }

    pub fn resolve(&self, id: OpId) -> SessionResult<Arc<Op>> {
        self.graph
            .node_weight(NodeIndex::new(id.index()))
            .cloned()
            .ok_or(SessionError::UnknownOp(id))
    }

    /// The target and everything it transitively depends on, in
    /// topological order with ties broken by insertion order
    pub fn plan(&self, target: OpId) -> SessionResult<Vec<Arc<Op>>> {
        let start = NodeIndex::new(target.index());
        if self.graph.node_weight(start).is_none() {
            return Err(SessionError::UnknownOp(target));
        }

        let reversed = Reversed(&self.graph);
        let mut dfs = Dfs::new(reversed, start);
        let mut reachable = Vec::new();
        while let Some(node) = dfs.next(reversed) {
            reachable.push(node);
        }
        reachable.sort_unstable();

        Ok(reachable
            .into_iter()
            .map(|node| self.graph[node].clone())
            .collect())
    }

    /// All ops in insertion order
    pub fn ops(&self) -> impl Iterator<Item = &Arc<Op>> {
        self.graph.node_weights()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn is_acyclic(&self) -> bool {
        !is_cyclic_directed(&self.graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::op::OpKind;

    fn ids(ops: &[Arc<Op>]) -> Vec<usize> {
        ops.iter().map(|op| op.id().index()).collect()
    }

    #[test]
    fn test_add_assigns_sequential_ids() {
        let mut graph = OpGraph::new("s");
        let a = graph.add(OpDraft::new(OpKind::CreateEngine)).unwrap();
        let b = graph
            .add(OpDraft::new(OpKind::RunQuery).input(a.id()))
            .unwrap();

        assert_eq!(a.id().index(), 0);
        assert_eq!(b.id().index(), 1);
        assert_eq!(b.key(), "s_gremlin_query_1");
        assert_eq!(graph.len(), 2);
        assert!(graph.is_acyclic());
    }

    #[test]
    fn test_forward_reference_rejected() {
        let mut graph = OpGraph::new("s");
        graph.add(OpDraft::new(OpKind::CreateEngine)).unwrap();

        let result = graph.add(OpDraft::new(OpKind::RunQuery).input(OpId::from_index(1)));
        assert!(matches!(result, Err(SessionError::Cycle { .. })));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_plan_contains_only_ancestors_in_insertion_order() {
        let mut graph = OpGraph::new("s");
        let engine = graph.add(OpDraft::new(OpKind::CreateEngine)).unwrap();
        let other = graph.add(OpDraft::new(OpKind::CreateEngine)).unwrap();
        let query = graph
            .add(OpDraft::new(OpKind::RunQuery).input(engine.id()))
            .unwrap();
        let _unrelated = graph
            .add(OpDraft::new(OpKind::RunQuery).input(other.id()))
            .unwrap();
        let fetch = graph
            .add(
                OpDraft::new(OpKind::FetchResult)
                    .input(query.id())
                    .input(engine.id()),
            )
            .unwrap();

        let plan = graph.plan(fetch.id()).unwrap();
        assert_eq!(ids(&plan), vec![0, 2, 4]);
    }

    #[test]
    fn test_resolve_unknown() {
        let graph = OpGraph::new("s");
        assert!(matches!(
            graph.resolve(OpId::from_index(3)),
            Err(SessionError::UnknownOp(_))
        ));
        assert!(graph.plan(OpId::from_index(0)).is_err());
    }
}
