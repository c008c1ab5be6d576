// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Embedded backend: object store, property graphs and a gremlin subset
//! engine behind the [`crate::cluster::Cluster`] trait

pub mod cluster;
pub mod graph;
pub mod gremlin;
pub mod store;

pub use cluster::{LocalCluster, LocalGremlinClient, DEFAULT_BASE_PORT};
pub use graph::{Edge, GraphError, PropertyGraph, Vertex};
pub use store::{ObjectStore, StoreConfig, StoredGraph, StreamChunk, StreamState};
