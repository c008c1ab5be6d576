// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Step evaluation over a property graph

use crate::local::graph::{Edge, PropertyGraph, Vertex};
use crate::local::gremlin::{Direction, GremlinError, Step};
use crate::value::Value;
use std::collections::{BTreeMap, HashSet};

/// Edges collected by `subgraph(name)` plus the vertices they touch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubgraphOutput {
    pub vertices: Vec<Vertex>,
    pub edges: Vec<Edge>,
}

#[derive(Default)]
struct Collector {
    output: SubgraphOutput,
    vertex_ids: HashSet<String>,
    edge_ids: HashSet<String>,
}

impl Collector {
    fn add_edge(&mut self, graph: &PropertyGraph, edge: &Edge) {
        if !self.edge_ids.insert(edge.id.clone()) {
            return;
        }
        for id in [&edge.src, &edge.dst] {
            if self.vertex_ids.insert(id.clone()) {
                if let Some(vertex) = graph.vertex(id) {
                    self.output.vertices.push(vertex.clone());
                }
            }
        }
        self.output.edges.push(edge.clone());
    }
}

/// Result of running a traversal
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub values: Vec<Value>,
    /// Subgraphs requested with `outputVineyard`, in request order
    pub outputs: Vec<(String, SubgraphOutput)>,
}

#[derive(Debug, Clone)]
enum Item<'g> {
    Vertex(&'g Vertex),
    Edge(&'g Edge),
    Value(Value),
}

impl<'g> Item<'g> {
    fn kind(&self) -> &'static str {
        match self {
            Item::Vertex(_) => "vertex",
            Item::Edge(_) => "edge",
            Item::Value(_) => "value",
        }
    }

    fn identity(&self) -> String {
        match self {
            Item::Vertex(v) => format!("v:{}", v.id),
            Item::Edge(e) => format!("e:{}", e.id),
            Item::Value(value) => format!("x:{}", value.to_json()),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Item::Vertex(v) => Value::Vertex(v.to_ref()),
            Item::Edge(e) => Value::Edge(e.to_ref()),
            Item::Value(value) => value,
        }
    }
}

/// Element fields shared by vertices and edges
struct Element<'g> {
    id: &'g str,
    label: &'g str,
    properties: &'g BTreeMap<String, Value>,
}

fn element<'g>(step: &str, item: &Item<'g>) -> Result<Element<'g>, GremlinError> {
    match *item {
        Item::Vertex(v) => Ok(Element {
            id: &v.id,
            label: &v.label,
            properties: &v.properties,
        }),
        Item::Edge(e) => Ok(Element {
            id: &e.id,
            label: &e.label,
            properties: &e.properties,
        }),
        Item::Value(_) => Err(mismatch(step, item)),
    }
}

fn mismatch(step: &str, item: &Item<'_>) -> GremlinError {
    GremlinError::TypeMismatch {
        step: step.to_string(),
        found: item.kind().to_string(),
    }
}

fn id_key(value: &Value) -> Result<String, GremlinError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Integer(i) => Ok(i.to_string()),
        other => Err(GremlinError::InvalidArguments {
            step: "V".to_string(),
            reason: format!("{} is not an element id", other),
        }),
    }
}

fn label_matches(labels: &[String], label: &str) -> bool {
    labels.is_empty() || labels.iter().any(|l| l == label)
}

/// Run compiled steps against `graph`
pub fn evaluate(graph: &PropertyGraph, steps: &[Step]) -> Result<Evaluation, GremlinError> {
    let mut items: Vec<Item<'_>> = Vec::new();
    let mut subgraphs: BTreeMap<String, Collector> = BTreeMap::new();
    let mut outputs = Vec::new();

    for step in steps {
        items = match step {
            Step::V(ids) if ids.is_empty() => graph.vertices().iter().map(Item::Vertex).collect(),
            Step::V(ids) => {
                let mut found = Vec::new();
                for id in ids {
                    if let Some(v) = graph.vertex(&id_key(id)?) {
                        found.push(Item::Vertex(v));
                    }
                }
                found
            }
            Step::E(ids) if ids.is_empty() => graph.edges().iter().map(Item::Edge).collect(),
            Step::E(ids) => {
                let mut found = Vec::new();
                for id in ids {
                    if let Some(e) = graph.edge(&id_key(id)?) {
                        found.push(Item::Edge(e));
                    }
                }
                found
            }
            Step::Has { key, predicate } => {
                let mut kept = Vec::with_capacity(items.len());
                for item in items {
                    let el = element("has", &item)?;
                    let keep = match (el.properties.get(key), predicate) {
                        (Some(_), None) => true,
                        (Some(value), Some(p)) => p.test(value),
                        (None, _) => false,
                    };
                    if keep {
                        kept.push(item);
                    }
                }
                kept
            }
            Step::HasLabel(labels) => {
                let mut kept = Vec::with_capacity(items.len());
                for item in items {
                    if label_matches(labels, element("hasLabel", &item)?.label) {
                        kept.push(item);
                    }
                }
                kept
            }
            Step::Vertices { direction, labels } => {
                let mut next = Vec::new();
                for item in &items {
                    let vertex = match item {
                        Item::Vertex(v) => v,
                        other => return Err(mismatch("out/in/both", other)),
                    };
                    if matches!(direction, Direction::Out | Direction::Both) {
                        for e in graph.out_edges(&vertex.id) {
                            if label_matches(labels, &e.label) {
                                next.extend(graph.vertex(&e.dst).map(Item::Vertex));
                            }
                        }
                    }
                    if matches!(direction, Direction::In | Direction::Both) {
                        for e in graph.in_edges(&vertex.id) {
                            if label_matches(labels, &e.label) {
                                next.extend(graph.vertex(&e.src).map(Item::Vertex));
                            }
                        }
                    }
                }
                next
            }
            Step::Edges { direction, labels } => {
                let mut next = Vec::new();
                for item in &items {
                    let vertex = match item {
                        Item::Vertex(v) => v,
                        other => return Err(mismatch("outE/inE/bothE", other)),
                    };
                    let mut incident = Vec::new();
                    if matches!(direction, Direction::Out | Direction::Both) {
                        incident.extend(graph.out_edges(&vertex.id));
                    }
                    if matches!(direction, Direction::In | Direction::Both) {
                        incident.extend(graph.in_edges(&vertex.id));
                    }
                    next.extend(
                        incident
                            .into_iter()
                            .filter(|e| label_matches(labels, &e.label))
                            .map(Item::Edge),
                    );
                }
                next
            }
            Step::EdgeVertex(direction) => {
                let mut next = Vec::new();
                for item in &items {
                    let edge = match item {
                        Item::Edge(e) => e,
                        other => return Err(mismatch("outV/inV/bothV", other)),
                    };
                    if matches!(direction, Direction::Out | Direction::Both) {
                        next.extend(graph.vertex(&edge.src).map(Item::Vertex));
                    }
                    if matches!(direction, Direction::In | Direction::Both) {
                        next.extend(graph.vertex(&edge.dst).map(Item::Vertex));
                    }
                }
                next
            }
            Step::Values(keys) => {
                let mut next = Vec::new();
                for item in &items {
                    let el = element("values", item)?;
                    if keys.is_empty() {
                        next.extend(el.properties.values().cloned().map(Item::Value));
                    } else {
                        next.extend(
                            keys.iter()
                                .filter_map(|k| el.properties.get(k))
                                .cloned()
                                .map(Item::Value),
                        );
                    }
                }
                next
            }
            Step::Id => items
                .iter()
                .map(|item| Ok(Item::Value(Value::from(element("id", item)?.id))))
                .collect::<Result<_, GremlinError>>()?,
            Step::Label => items
                .iter()
                .map(|item| Ok(Item::Value(Value::from(element("label", item)?.label))))
                .collect::<Result<_, GremlinError>>()?,
            Step::Limit(n) => {
                items.truncate(*n);
                items
            }
            Step::Dedup => {
                let mut seen = HashSet::new();
                items
                    .into_iter()
                    .filter(|item| seen.insert(item.identity()))
                    .collect()
            }
            Step::Count => vec![Item::Value(Value::Integer(items.len() as i64))],
            Step::Subgraph(name) => {
                let collector = subgraphs.entry(name.clone()).or_default();
                for item in &items {
                    match item {
                        Item::Edge(e) => collector.add_edge(graph, e),
                        other => return Err(mismatch("subgraph", other)),
                    }
                }
                items
            }
            Step::OutputVineyard(name) => {
                let collector = subgraphs
                    .get(name)
                    .ok_or_else(|| GremlinError::UnknownSubgraph(name.clone()))?;
                outputs.push((name.clone(), collector.output.clone()));
                Vec::new()
            }
        };
    }

    Ok(Evaluation {
        values: items.into_iter().map(Item::into_value).collect(),
        outputs,
    })
}
