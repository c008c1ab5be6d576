// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Ops: the deferred units of work in a session's op graph
//!
//! An op starts life as an [`OpDraft`], which is freely editable. Adding the
//! draft to an [`crate::dag::OpGraph`] commits it into an immutable [`Op`]
//! with an id and key; committed ops are shared behind `Arc` and never
//! change again.

use crate::error::{SessionError, SessionResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a committed op, equal to its insertion position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpId(u64);

impl OpId {
    pub fn from_index(index: usize) -> Self {
        OpId(index as u64)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    CreateEngine,
    CloseEngine,
    RunQuery,
    FetchResult,
    BuildSubgraph,
}

impl OpKind {
    /// Name of the remote protocol call this op stands for
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::CreateEngine => "create_interactive_query",
            OpKind::CloseEngine => "close_interactive_query",
            OpKind::RunQuery => "gremlin_query",
            OpKind::FetchResult => "fetch_gremlin_result",
            OpKind::BuildSubgraph => "gremlin_to_subgraph",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar or blob op parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Blob(Vec<u8>),
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Int(i)
    }
}

impl From<f64> for AttrValue {
    fn from(f: f64) -> Self {
        AttrValue::Float(f)
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

impl From<Vec<u8>> for AttrValue {
    fn from(bytes: Vec<u8>) -> Self {
        AttrValue::Blob(bytes)
    }
}

/// Mutable builder for an op that has not been committed yet
#[derive(Debug, Clone, PartialEq)]
pub struct OpDraft {
    kind: OpKind,
    inputs: Vec<OpId>,
    params: BTreeMap<String, AttrValue>,
}

impl OpDraft {
    pub fn new(kind: OpKind) -> Self {
        Self {
            kind,
            inputs: Vec::new(),
            params: BTreeMap::new(),
        }
    }

    pub fn input(mut self, op: OpId) -> Self {
        self.inputs.push(op);
        self
    }

    pub fn param(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Serialize `value` as a JSON blob parameter
    pub fn json_param<T: Serialize>(self, key: &str, value: &T) -> SessionResult<Self> {
        let bytes = serde_json::to_vec(value)?;
        Ok(self.param(key, bytes))
    }

    pub fn kind(&self) -> OpKind {
        self.kind
    }

    pub fn inputs(&self) -> &[OpId] {
        &self.inputs
    }

    pub(crate) fn commit(self, id: OpId, key: String) -> Op {
        Op {
            id,
            key,
            kind: self.kind,
            inputs: self.inputs,
            params: self.params,
        }
    }
}

/// Committed, immutable op
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Op {
    id: OpId,
    key: String,
    kind: OpKind,
    inputs: Vec<OpId>,
    params: BTreeMap<String, AttrValue>,
}

impl Op {
    pub fn id(&self) -> OpId {
        self.id
    }

    /// Session-unique key under which the op's output is registered
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> OpKind {
        self.kind
    }

    pub fn inputs(&self) -> &[OpId] {
        &self.inputs
    }

    pub fn params(&self) -> &BTreeMap<String, AttrValue> {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&AttrValue> {
        self.params.get(name)
    }

    pub fn input(&self, position: usize) -> SessionResult<OpId> {
        self.inputs.get(position).copied().ok_or_else(|| {
            SessionError::invalid_param(
                "inputs",
                format!("{} op {} has no input at {}", self.kind, self.id, position),
            )
        })
    }

    pub fn str_param(&self, name: &str) -> SessionResult<&str> {
        match self.params.get(name) {
            Some(AttrValue::Str(s)) => Ok(s),
            Some(other) => Err(SessionError::invalid_param(
                name,
                format!("expected string, got {:?}", other),
            )),
            None => Err(SessionError::invalid_param(name, "missing")),
        }
    }

    pub fn float_param(&self, name: &str) -> SessionResult<f64> {
        match self.params.get(name) {
            Some(AttrValue::Float(f)) => Ok(*f),
            Some(AttrValue::Int(i)) => Ok(*i as f64),
            Some(other) => Err(SessionError::invalid_param(
                name,
                format!("expected number, got {:?}", other),
            )),
            None => Err(SessionError::invalid_param(name, "missing")),
        }
    }

    /// Boolean parameter, `false` when absent
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.params.get(name), Some(AttrValue::Bool(true)))
    }

    /// Decode a JSON blob parameter
    pub fn json_param<T: DeserializeOwned>(&self, name: &str) -> SessionResult<T> {
        match self.params.get(name) {
            Some(AttrValue::Blob(bytes)) => Ok(serde_json::from_slice(bytes)?),
            Some(other) => Err(SessionError::invalid_param(
                name,
                format!("expected blob, got {:?}", other),
            )),
            None => Err(SessionError::invalid_param(name, "missing")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_draft_commit_keeps_params() {
        let mut options = BTreeMap::new();
        options.insert("engine".to_string(), "gae".to_string());

        let op = OpDraft::new(OpKind::RunQuery)
            .input(OpId::from_index(0))
            .param("query", "g.V().count()")
            .json_param("request_options", &options)
            .unwrap()
            .commit(OpId::from_index(1), "gremlin_query_1".to_string());

        assert_eq!(op.kind(), OpKind::RunQuery);
        assert_eq!(op.inputs(), &[OpId::from_index(0)]);
        assert_eq!(op.str_param("query").unwrap(), "g.V().count()");
        let decoded: BTreeMap<String, String> = op.json_param("request_options").unwrap();
        assert_eq!(decoded, options);
    }

    #[test]
    fn test_param_type_errors() {
        let op = OpDraft::new(OpKind::CreateEngine)
            .param("cpu", 0.5)
            .param("mem", "1Gi")
            .commit(OpId::from_index(0), "k".to_string());

        assert_eq!(op.float_param("cpu").unwrap(), 0.5);
        assert!(matches!(
            op.str_param("cpu"),
            Err(SessionError::InvalidParam { .. })
        ));
        assert!(matches!(
            op.str_param("absent"),
            Err(SessionError::InvalidParam { .. })
        ));
        assert!(!op.flag("graph_from_input"));
        assert!(op.input(0).is_err());
    }
}
