// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! GIE Session - DAG execution and engine lifecycle coordination for
//! interactive graph queries
//!
//! A [`Session`] owns an append-only operation graph. Client handles
//! ([`EngineNode`], [`ResultSetNode`], [`ResultNode`], [`SubgraphNode`],
//! [`ClosedEngineNode`]) only describe work; nothing touches the cluster
//! until [`Session::run`] evaluates a node and its inputs.
//!
//! # Features
//!
//! - **Lazy op graph**: ops are drafted, committed once and never mutated
//! - **Engine lifecycle**: one interactive engine per graph per session with
//!   explicit status transitions (Initializing, Running, Failed, Closed)
//! - **Subgraph extraction**: remote gremlin extraction joined with a
//!   background load on a bounded worker pool
//! - **Embedded backend**: an in-process object store and gremlin subset
//!   engine in [`local`]
//!
//! # Usage
//!
//! ```no_run
//! use giesession::local::{LocalCluster, ObjectStore, PropertyGraph, StoreConfig};
//! use giesession::{OidType, Session, SessionConfig};
//! use std::sync::Arc;
//!
//! let store = Arc::new(ObjectStore::new(StoreConfig::default()));
//! let cluster = Arc::new(LocalCluster::new(store));
//! let graph = cluster
//!     .load_graph("people", PropertyGraph::new(), OidType::Int64)
//!     .unwrap();
//! let session = Session::new(SessionConfig::default(), cluster).unwrap();
//!
//! let engine = session.gremlin(&graph, None).unwrap();
//! let count = engine.execute("g.V().count()").unwrap().one().unwrap();
//! println!("{:?}", session.run(&count).unwrap());
//! ```

pub mod cluster;
pub mod config;
pub mod dag;
pub mod error;
pub mod exec;
pub mod interactive;
pub mod local;
pub mod naming;
pub mod session;
pub mod value;

pub use cluster::{
    graph_url, Cluster, EngineParams, GraphMeta, GremlinClient, LoadRequest, ObjectId, OidType,
    ProvisionRequest, RemoteConnection, RemoteError, RequestOptions, StreamRef,
};
pub use config::{EngineSizing, SessionConfig};
pub use dag::{
    ClosedEngineNode, DagNode, EngineNode, FetchMode, GraphSource, Op, OpDraft, OpGraph, OpId,
    OpKind, ResultNode, ResultSetNode, SubgraphNode,
};
pub use error::{SessionError, SessionResult, StoreError};
pub use exec::{
    EngineInfo, EngineStatus, EvalState, GremlinResultSet, JobState, ObjectManager, OpOutput,
};
pub use interactive::{InteractiveQuery, ResultSet};
pub use naming::{NameSource, TimestampNames};
pub use session::Session;
pub use value::{EdgeRef, Value, VertexRef};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
