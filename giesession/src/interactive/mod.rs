// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Eager wrappers over evaluated nodes

pub mod query;

pub use query::{InteractiveQuery, ResultSet};
