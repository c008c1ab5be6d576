// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Deferred operation graph
//!
//! This module provides:
//! - Draft and committed ops ([`OpDraft`], [`Op`])
//! - The append-only [`OpGraph`] owned by each session
//! - Draft builders for each remote protocol call ([`ops`])
//! - Lazy client handles over committed ops ([`DagNode`] and its variants)

pub mod graph;
pub mod node;
pub mod op;
pub mod ops;

pub use graph::OpGraph;
pub use node::{ClosedEngineNode, DagNode, EngineNode, ResultNode, ResultSetNode, SubgraphNode};
pub use op::{AttrValue, Op, OpDraft, OpId, OpKind};
pub use ops::{FetchMode, GraphSource};
