//! Test utilities for giesession integration tests
//!
//! - fixture: citation graph, shared store and a cluster with injectable faults

pub mod fixture;
