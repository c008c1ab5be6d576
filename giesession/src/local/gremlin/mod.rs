// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Gremlin subset understood by the local engine
//!
//! Scripts are parsed into a generic call chain ([`parser`]), compiled into
//! typed steps ([`Script`]) and run against a
//! [`crate::local::graph::PropertyGraph`] by [`eval`].
//! Supported:
//! - Sources: `g.V(ids...)`, `g.E()`, `g.createGraph(name).with(k, v)`
//! - Filters: `has`, `hasLabel`, `limit`, `dedup`
//! - Navigation: `out/in/both`, `outE/inE/bothE`, `outV/inV/bothV`
//! - Projection: `values`, `id`, `label`, `count`
//! - Output: `subgraph(name)`, `outputVineyard(name)`

pub mod eval;
pub mod parser;

pub use eval::{evaluate, Evaluation, SubgraphOutput};

use crate::value::Value;
use parser::{parse_chain, Arg, Call};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GremlinError {
    #[error("Syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("Unsupported step: {0}")]
    UnsupportedStep(String),

    #[error("Invalid arguments for {step}: {reason}")]
    InvalidArguments { step: String, reason: String },

    #[error("Step {step} cannot be applied to {found}")]
    TypeMismatch { step: String, found: String },

    #[error("Subgraph '{0}' was never declared with subgraph()")]
    UnknownSubgraph(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(Value),
    Neq(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    /// Exclusive on both ends
    Inside(Value, Value),
    Outside(Value, Value),
    /// Inclusive lower, exclusive upper
    Between(Value, Value),
    Within(Vec<Value>),
    Without(Vec<Value>),
}

impl Predicate {
    pub fn test(&self, value: &Value) -> bool {
        use std::cmp::Ordering::*;
        let cmp = |other: &Value| value.compare(other);
        match self {
            Predicate::Eq(v) => value.loosely_equals(v),
            Predicate::Neq(v) => !value.loosely_equals(v),
            Predicate::Gt(v) => cmp(v) == Some(Greater),
            Predicate::Gte(v) => matches!(cmp(v), Some(Greater | Equal)),
            Predicate::Lt(v) => cmp(v) == Some(Less),
            Predicate::Lte(v) => matches!(cmp(v), Some(Less | Equal)),
            Predicate::Inside(lo, hi) => cmp(lo) == Some(Greater) && cmp(hi) == Some(Less),
            Predicate::Outside(lo, hi) => cmp(lo) == Some(Less) || cmp(hi) == Some(Greater),
            Predicate::Between(lo, hi) => {
                matches!(cmp(lo), Some(Greater | Equal)) && cmp(hi) == Some(Less)
            }
            Predicate::Within(values) => values.iter().any(|v| value.loosely_equals(v)),
            Predicate::Without(values) => !values.iter().any(|v| value.loosely_equals(v)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
    Both,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    V(Vec<Value>),
    E(Vec<Value>),
    Has {
        key: String,
        predicate: Option<Predicate>,
    },
    HasLabel(Vec<String>),
    /// Adjacent vertices
    Vertices {
        direction: Direction,
        labels: Vec<String>,
    },
    /// Incident edges
    Edges {
        direction: Direction,
        labels: Vec<String>,
    },
    /// Endpoints of an edge
    EdgeVertex(Direction),
    Values(Vec<String>),
    Id,
    Label,
    Limit(usize),
    Dedup,
    Count,
    Subgraph(String),
    OutputVineyard(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Script {
    Traversal(Vec<Step>),
    CreateGraph {
        name: String,
        options: Vec<(String, String)>,
    },
}

/// Parse and compile a script
pub fn compile(script: &str) -> Result<Script, GremlinError> {
    let chain = parse_chain(script)?;
    if chain.source != "g" {
        return Err(GremlinError::UnsupportedStep(format!(
            "traversal source '{}'",
            chain.source
        )));
    }

    let mut calls = chain.calls.into_iter();
    let first = calls
        .next()
        .ok_or_else(|| GremlinError::UnsupportedStep("empty traversal".to_string()))?;

    if first.name == "createGraph" {
        let name = single_string(&first)?;
        let mut options = Vec::new();
        for call in calls {
            if call.name != "with" {
                return Err(GremlinError::UnsupportedStep(format!(
                    "{} after createGraph",
                    call.name
                )));
            }
            let args = strings(&call)?;
            match args.as_slice() {
                [key, value] => options.push((key.clone(), value.clone())),
                _ => return Err(invalid(&call, "expected (key, value)")),
            }
        }
        return Ok(Script::CreateGraph { name, options });
    }

    let mut steps = Vec::new();
    match first.name.as_str() {
        "V" => steps.push(Step::V(literals(&first)?)),
        "E" => steps.push(Step::E(literals(&first)?)),
        other => {
            return Err(GremlinError::UnsupportedStep(format!(
                "{} as a start step",
                other
            )))
        }
    }
    for call in calls {
        steps.push(compile_step(&call)?);
    }
    Ok(Script::Traversal(steps))
}

fn compile_step(call: &Call) -> Result<Step, GremlinError> {
    let step = match call.name.as_str() {
        "has" => match call.args.as_slice() {
            [Arg::Str(key)] => Step::Has {
                key: key.clone(),
                predicate: None,
            },
            [Arg::Str(key), arg] => Step::Has {
                key: key.clone(),
                predicate: Some(predicate(call, arg)?),
            },
            _ => return Err(invalid(call, "expected (key) or (key, value)")),
        },
        "hasLabel" => Step::HasLabel(non_empty(call, strings(call)?)?),
        "out" => vertices(Direction::Out, call)?,
        "in" => vertices(Direction::In, call)?,
        "both" => vertices(Direction::Both, call)?,
        "outE" => edges(Direction::Out, call)?,
        "inE" => edges(Direction::In, call)?,
        "bothE" => edges(Direction::Both, call)?,
        "outV" => endpoint(Direction::Out, call)?,
        "inV" => endpoint(Direction::In, call)?,
        "bothV" => endpoint(Direction::Both, call)?,
        "values" => Step::Values(strings(call)?),
        "id" => no_args(call, Step::Id)?,
        "label" => no_args(call, Step::Label)?,
        "dedup" => no_args(call, Step::Dedup)?,
        "count" => no_args(call, Step::Count)?,
        "limit" => match call.args.as_slice() {
            [Arg::Int(n)] if *n >= 0 => Step::Limit(*n as usize),
            _ => return Err(invalid(call, "expected a non-negative integer")),
        },
        "subgraph" => Step::Subgraph(single_string(call)?),
        "outputVineyard" => Step::OutputVineyard(single_string(call)?),
        other => return Err(GremlinError::UnsupportedStep(other.to_string())),
    };
    Ok(step)
}

fn vertices(direction: Direction, call: &Call) -> Result<Step, GremlinError> {
    Ok(Step::Vertices {
        direction,
        labels: strings(call)?,
    })
}

fn edges(direction: Direction, call: &Call) -> Result<Step, GremlinError> {
    Ok(Step::Edges {
        direction,
        labels: strings(call)?,
    })
}

fn endpoint(direction: Direction, call: &Call) -> Result<Step, GremlinError> {
    no_args(call, Step::EdgeVertex(direction))
}

fn no_args(call: &Call, step: Step) -> Result<Step, GremlinError> {
    if call.args.is_empty() {
        Ok(step)
    } else {
        Err(invalid(call, "takes no arguments"))
    }
}

fn predicate(call: &Call, arg: &Arg) -> Result<Predicate, GremlinError> {
    let pred = match arg {
        Arg::Call(pred) => pred,
        literal => return Ok(Predicate::Eq(literal_value(call, literal)?)),
    };
    let values = literals(pred)?;
    let p = match (pred.name.as_str(), values.as_slice()) {
        ("eq", [v]) => Predicate::Eq(v.clone()),
        ("neq", [v]) => Predicate::Neq(v.clone()),
        ("gt", [v]) => Predicate::Gt(v.clone()),
        ("gte", [v]) => Predicate::Gte(v.clone()),
        ("lt", [v]) => Predicate::Lt(v.clone()),
        ("lte", [v]) => Predicate::Lte(v.clone()),
        ("inside", [lo, hi]) => Predicate::Inside(lo.clone(), hi.clone()),
        ("outside", [lo, hi]) => Predicate::Outside(lo.clone(), hi.clone()),
        ("between", [lo, hi]) => Predicate::Between(lo.clone(), hi.clone()),
        ("within", _) => Predicate::Within(values.clone()),
        ("without", _) => Predicate::Without(values.clone()),
        (name, _) => {
            return Err(invalid(
                call,
                &format!("unsupported predicate {}/{}", name, values.len()),
            ))
        }
    };
    Ok(p)
}

fn literal_value(call: &Call, arg: &Arg) -> Result<Value, GremlinError> {
    match arg {
        Arg::Str(s) => Ok(Value::String(s.clone())),
        Arg::Int(i) => Ok(Value::Integer(*i)),
        Arg::Float(f) => Ok(Value::Float(*f)),
        Arg::Bool(b) => Ok(Value::Boolean(*b)),
        Arg::Call(inner) => Err(invalid(
            call,
            &format!("unexpected nested call {}", inner.name),
        )),
    }
}

fn literals(call: &Call) -> Result<Vec<Value>, GremlinError> {
    call.args.iter().map(|arg| literal_value(call, arg)).collect()
}

fn strings(call: &Call) -> Result<Vec<String>, GremlinError> {
    call.args
        .iter()
        .map(|arg| match arg {
            Arg::Str(s) => Ok(s.clone()),
            _ => Err(invalid(call, "expected string arguments")),
        })
        .collect()
}

fn single_string(call: &Call) -> Result<String, GremlinError> {
    let mut args = strings(call)?;
    if args.len() != 1 {
        return Err(invalid(call, "expected a single name"));
    }
    Ok(args.remove(0))
}

fn non_empty(call: &Call, args: Vec<String>) -> Result<Vec<String>, GremlinError> {
    if args.is_empty() {
        return Err(invalid(call, "expected at least one label"));
    }
    Ok(args)
}

fn invalid(call: &Call, reason: &str) -> GremlinError {
    GremlinError::InvalidArguments {
        step: call.name.clone(),
        reason: reason.to_string(),
    }
}
