// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory property graph
//!
//! Vertices and edges are kept in insertion order, so traversals over the
//! same graph always produce results in the same order. Adjacency lists hold
//! edge positions for out and in traversal.

use crate::value::{EdgeRef, Value, VertexRef};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Vertex not found: {0}")]
    VertexNotFound(String),

    #[error("Edge not found: {0}")]
    EdgeNotFound(String),

    #[error("Vertex already exists: {0}")]
    VertexAlreadyExists(String),

    #[error("Edge already exists: {0}")]
    EdgeAlreadyExists(String),

    #[error("Invalid edge: from vertex {src} to vertex {dst} - one or both vertices don't exist")]
    InvalidEdge { src: String, dst: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: String,
    pub label: String,
    pub properties: BTreeMap<String, Value>,
}

impl Vertex {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn to_ref(&self) -> VertexRef {
        VertexRef {
            id: self.id.clone(),
            label: self.label.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub label: String,
    pub src: String,
    pub dst: String,
    pub properties: BTreeMap<String, Value>,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        src: impl Into<String>,
        dst: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            src: src.into(),
            dst: dst.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn to_ref(&self) -> EdgeRef {
        EdgeRef {
            id: self.id.clone(),
            label: self.label.clone(),
            src: self.src.clone(),
            dst: self.dst.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PropertyGraph {
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,

    /// Vertex id -> position in `vertices`
    vertex_index: HashMap<String, usize>,

    /// Edge id -> position in `edges`
    edge_index: HashMap<String, usize>,

    /// Vertex id -> positions of outgoing edges
    adjacency_out: HashMap<String, Vec<usize>>,

    /// Vertex id -> positions of incoming edges
    adjacency_in: HashMap<String, Vec<usize>>,
}

impl PropertyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vertex(&mut self, vertex: Vertex) -> Result<(), GraphError> {
        if self.vertex_index.contains_key(&vertex.id) {
            return Err(GraphError::VertexAlreadyExists(vertex.id));
        }

        self.adjacency_out.insert(vertex.id.clone(), Vec::new());
        self.adjacency_in.insert(vertex.id.clone(), Vec::new());
        self.vertex_index
            .insert(vertex.id.clone(), self.vertices.len());
        self.vertices.push(vertex);
        Ok(())
    }

    /// Add an edge between two existing vertices
    pub fn add_edge(&mut self, edge: Edge) -> Result<(), GraphError> {
        if self.edge_index.contains_key(&edge.id) {
            return Err(GraphError::EdgeAlreadyExists(edge.id));
        }
        if !self.vertex_index.contains_key(&edge.src) || !self.vertex_index.contains_key(&edge.dst)
        {
            return Err(GraphError::InvalidEdge {
                src: edge.src,
                dst: edge.dst,
            });
        }

        let position = self.edges.len();
        if let Some(out) = self.adjacency_out.get_mut(&edge.src) {
            out.push(position);
        }
        if let Some(incoming) = self.adjacency_in.get_mut(&edge.dst) {
            incoming.push(position);
        }
        self.edge_index.insert(edge.id.clone(), position);
        self.edges.push(edge);
        Ok(())
    }

    pub fn vertex(&self, id: &str) -> Option<&Vertex> {
        self.vertex_index.get(id).map(|&i| &self.vertices[i])
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edge_index.get(id).map(|&i| &self.edges[i])
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn out_edges(&self, vertex_id: &str) -> Vec<&Edge> {
        self.adjacent(&self.adjacency_out, vertex_id)
    }

    pub fn in_edges(&self, vertex_id: &str) -> Vec<&Edge> {
        self.adjacent(&self.adjacency_in, vertex_id)
    }

    fn adjacent(&self, adjacency: &HashMap<String, Vec<usize>>, vertex_id: &str) -> Vec<&Edge> {
        adjacency
            .get(vertex_id)
            .map(|positions| positions.iter().map(|&i| &self.edges[i]).collect())
            .unwrap_or_default()
    }

    pub fn contains_vertex(&self, id: &str) -> bool {
        self.vertex_index.contains_key(id)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> PropertyGraph {
        let mut graph = PropertyGraph::new();
        for id in ["a", "b", "c"] {
            graph
                .add_vertex(Vertex::new(id, "person").with_property("name", id))
                .unwrap();
        }
        graph.add_edge(Edge::new("e1", "knows", "a", "b")).unwrap();
        graph.add_edge(Edge::new("e2", "knows", "b", "c")).unwrap();
        graph.add_edge(Edge::new("e3", "likes", "c", "a")).unwrap();
        graph
    }

    #[test]
    fn test_adjacency() {
        let graph = triangle();
        assert_eq!(graph.vertex_count(), 3);
        assert_eq!(graph.edge_count(), 3);

        let out: Vec<&str> = graph.out_edges("b").iter().map(|e| e.id.as_str()).collect();
        assert_eq!(out, vec!["e2"]);
        let incoming: Vec<&str> = graph.in_edges("a").iter().map(|e| e.id.as_str()).collect();
        assert_eq!(incoming, vec!["e3"]);
        assert!(graph.out_edges("missing").is_empty());
    }

    #[test]
    fn test_insertion_order_is_kept() {
        let graph = triangle();
        let ids: Vec<&str> = graph.vertices().iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(graph.edge("e3").unwrap().label, "likes");
    }

    #[test]
    fn test_rejects_duplicates_and_dangling_edges() {
        let mut graph = triangle();
        assert_eq!(
            graph.add_vertex(Vertex::new("a", "person")),
            Err(GraphError::VertexAlreadyExists("a".into()))
        );
        assert_eq!(
            graph.add_edge(Edge::new("e1", "knows", "a", "c")),
            Err(GraphError::EdgeAlreadyExists("e1".into()))
        );
        assert!(matches!(
            graph.add_edge(Edge::new("e4", "knows", "a", "z")),
            Err(GraphError::InvalidEdge { .. })
        ));
        assert_eq!(graph.edge_count(), 3);
    }
}
