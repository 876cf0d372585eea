//! Bidirectional converter between the legacy params-bag graph layout
//! and the typed-inputs layout written as `schemaVersion: 2`.
//!
//! The typed layout names every input a node consumes and tags each one
//! with its source, so a file reader can see data flow without knowing
//! the engine's resolution rules. Conversion is lossy only for inputs
//! that could never win resolution: when a variable binding and a
//! literal both exist for the same role, the typed form keeps the
//! variable because the literal would have been shadowed anyway.

use cardcore::graph::param;
use cardcore::{
    ApduPreset, CipherAlgorithm, CipherConfig, Edge, Graph, GraphError, Node, NodeData, NodeId,
    NodeKind, PipeConfig, PipeSegment, Position, VariableSave, VariableUse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SCHEMA_VERSION: u64 = 2;

/// Input role names of the typed layout.
mod input {
    pub const CLA: &str = "cla";
    pub const INS: &str = "ins";
    pub const P1: &str = "p1";
    pub const P2: &str = "p2";
    pub const DATA: &str = "data";
    pub const LE: &str = "le";
    pub const KEY: &str = "key";
    pub const IV: &str = "iv";
    pub const A: &str = "a";
    pub const B: &str = "b";
}

/// One named input with an explicit source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "camelCase")]
pub enum TypedInput {
    Literal {
        value: String,
    },
    Variable {
        name: String,
    },
    #[serde(rename_all = "camelCase")]
    Pipe {
        node: NodeId,
        #[serde(default)]
        offset: usize,
        #[serde(default = "full_length")]
        length: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        segments: Option<Vec<PipeSegment>>,
    },
}

fn full_length() -> i64 {
    -1
}

impl TypedInput {
    fn literal(value: impl Into<String>) -> Self {
        Self::Literal {
            value: value.into(),
        }
    }

    fn variable(name: impl Into<String>) -> Self {
        Self::Variable { name: name.into() }
    }

    fn pipe(config: &PipeConfig) -> Self {
        Self::Pipe {
            node: config.source,
            offset: config.offset,
            length: config.length,
            segments: config.segments.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedNode {
    pub id: NodeId,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, TypedInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<CipherAlgorithm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<ApduPreset>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub saves: Vec<VariableSave>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedGraph {
    pub schema_version: u64,
    pub nodes: Vec<TypedNode>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Convert a working graph to the typed layout.
///
/// Each input role records only the source that would win resolution
/// at run time: a bound variable first, then a pipe, then the literal
/// parameter. Empty literals are dropped entirely.
pub fn to_typed(graph: &Graph) -> TypedGraph {
    let mut ids: Vec<NodeId> = graph.nodes.keys().copied().collect();
    ids.sort();

    let nodes = ids
        .iter()
        .filter_map(|id| graph.nodes.get(id))
        .map(typed_node)
        .collect();

    TypedGraph {
        schema_version: SCHEMA_VERSION,
        nodes,
        edges: graph.edges.clone(),
        updated_at: graph.updated_at,
    }
}

fn typed_node(node: &Node) -> TypedNode {
    let data = &node.data;
    let vars = data.variables.clone().unwrap_or_default();
    let mut inputs = BTreeMap::new();

    let mut literal = |name: &str, key: &str| {
        if let Some(value) = data.params.get(key).filter(|v| !v.is_empty()) {
            inputs.insert(name.to_string(), TypedInput::literal(value.as_str()));
        }
    };

    match node.kind {
        NodeKind::Apdu => {
            literal(input::CLA, param::CLA);
            literal(input::INS, param::INS);
            literal(input::P1, param::P1);
            literal(input::P2, param::P2);
            literal(input::LE, param::LE);
            if let Some(resolved) = resolve_role(&vars.data, data.pipes.first(), || {
                data.params.get(param::DATA)
            }) {
                inputs.insert(input::DATA.to_string(), resolved);
            }
        }
        NodeKind::CryptoEncrypt | NodeKind::CryptoDecrypt => {
            if let Some(resolved) = resolve_role(&vars.data, data.pipes.first(), || {
                data.params.get(param::DATA)
            }) {
                inputs.insert(input::DATA.to_string(), resolved);
            }
            if let Some(config) = &data.cipher {
                if let Some(resolved) =
                    resolve_role(&vars.key, None, || Some(&config.key))
                {
                    inputs.insert(input::KEY.to_string(), resolved);
                }
                if let Some(resolved) = resolve_role(&vars.iv, None, || Some(&config.iv)) {
                    inputs.insert(input::IV.to_string(), resolved);
                }
            } else {
                if let Some(name) = &vars.key {
                    inputs.insert(input::KEY.to_string(), TypedInput::variable(name.clone()));
                }
                if let Some(name) = &vars.iv {
                    inputs.insert(input::IV.to_string(), TypedInput::variable(name.clone()));
                }
            }
        }
        NodeKind::Concat => {
            if let Some(resolved) = resolve_role(&vars.data, data.pipes.first(), || {
                data.params.get(param::A_DATA)
            }) {
                inputs.insert(input::A.to_string(), resolved);
            }
            if let Some(resolved) = resolve_role(&vars.data_b, data.pipes.get(1), || {
                data.params.get(param::B_DATA)
            }) {
                inputs.insert(input::B.to_string(), resolved);
            }
        }
    }

    TypedNode {
        id: node.id,
        kind: node.kind,
        position: node.position,
        label: node.label.clone(),
        inputs,
        algorithm: data.cipher.as_ref().map(|c| c.algorithm),
        preset: data.preset,
        saves: data.variable_saves.clone(),
    }
}

fn resolve_role<'a>(
    variable: &Option<String>,
    pipe: Option<&PipeConfig>,
    literal: impl FnOnce() -> Option<&'a String>,
) -> Option<TypedInput> {
    if let Some(name) = variable {
        return Some(TypedInput::variable(name.clone()));
    }
    if let Some(config) = pipe {
        return Some(TypedInput::pipe(config));
    }
    literal()
        .filter(|v| !v.is_empty())
        .map(|v| TypedInput::literal(v.as_str()))
}

/// Convert a typed graph back to the working layout.
///
/// Byte-field roles (cla, ins, p1, p2, le) only accept literals; the
/// cipher algorithm is mandatory on cipher nodes; a piped `b` input on
/// a concat node requires a piped `a`, because pipe order carries the
/// A/B distinction in the working layout.
pub fn to_working(typed: &TypedGraph) -> Result<Graph, GraphError> {
    if typed.schema_version != SCHEMA_VERSION {
        return Err(GraphError::UnsupportedSchemaVersion(typed.schema_version));
    }

    let mut graph = Graph::new();
    for node in &typed.nodes {
        graph.nodes.insert(node.id, working_node(node)?);
    }
    for edge in &typed.edges {
        if !graph.nodes.contains_key(&edge.source) {
            return Err(GraphError::DanglingEdge(edge.source));
        }
        if !graph.nodes.contains_key(&edge.target) {
            return Err(GraphError::DanglingEdge(edge.target));
        }
    }
    graph.edges = typed.edges.clone();
    graph.updated_at = typed.updated_at;
    Ok(graph)
}

fn working_node(node: &TypedNode) -> Result<Node, GraphError> {
    let mut data = NodeData::default();
    let mut vars = VariableUse::default();

    let invalid = |reason: String| GraphError::InvalidInput {
        node: node.id,
        reason,
    };

    let byte_literal = |role: &str| -> Result<Option<String>, GraphError> {
        match node.inputs.get(role) {
            None => Ok(None),
            Some(TypedInput::Literal { value }) => Ok(Some(value.clone())),
            Some(_) => Err(invalid(format!("{role} must be a literal"))),
        }
    };

    match node.kind {
        NodeKind::Apdu => {
            for (role, key) in [
                (input::CLA, param::CLA),
                (input::INS, param::INS),
                (input::P1, param::P1),
                (input::P2, param::P2),
                (input::LE, param::LE),
            ] {
                if let Some(value) = byte_literal(role)? {
                    data.params.insert(key.to_string(), value);
                }
            }
            apply_data_role(
                node.inputs.get(input::DATA),
                param::DATA,
                &mut data,
                &mut vars.data,
            );
        }
        NodeKind::CryptoEncrypt | NodeKind::CryptoDecrypt => {
            let algorithm = node
                .algorithm
                .ok_or_else(|| invalid("cipher node without algorithm".to_string()))?;
            apply_data_role(
                node.inputs.get(input::DATA),
                param::DATA,
                &mut data,
                &mut vars.data,
            );
            let mut config = CipherConfig::new(algorithm, "", "");
            match node.inputs.get(input::KEY) {
                Some(TypedInput::Literal { value }) => config.key = value.clone(),
                Some(TypedInput::Variable { name }) => vars.key = Some(name.clone()),
                Some(TypedInput::Pipe { .. }) => {
                    return Err(invalid("key cannot be piped".to_string()))
                }
                None => {}
            }
            match node.inputs.get(input::IV) {
                Some(TypedInput::Literal { value }) => config.iv = value.clone(),
                Some(TypedInput::Variable { name }) => vars.iv = Some(name.clone()),
                Some(TypedInput::Pipe { .. }) => {
                    return Err(invalid("iv cannot be piped".to_string()))
                }
                None => {}
            }
            data.cipher = Some(config);
        }
        NodeKind::Concat => {
            apply_data_role(
                node.inputs.get(input::A),
                param::A_DATA,
                &mut data,
                &mut vars.data,
            );
            let a_piped = data.pipes.len() == 1;
            match node.inputs.get(input::B) {
                Some(TypedInput::Literal { value }) => {
                    data.params
                        .insert(param::B_DATA.to_string(), value.clone());
                }
                Some(TypedInput::Variable { name }) => vars.data_b = Some(name.clone()),
                Some(input @ TypedInput::Pipe { .. }) => {
                    if !a_piped {
                        return Err(invalid(
                            "piped b input requires a piped a input".to_string(),
                        ));
                    }
                    data.pipes.push(pipe_config(input));
                }
                None => {}
            }
        }
    }

    if !vars.is_empty() {
        data.variables = Some(vars);
    }
    data.preset = node.preset;
    data.variable_saves = node.saves.clone();

    Ok(Node {
        id: node.id,
        kind: node.kind,
        position: node.position,
        label: node.label.clone(),
        data,
    })
}

/// Map a data-role input onto the working layout: literals become the
/// named parameter, variables bind the role, pipes append in order.
fn apply_data_role(
    input: Option<&TypedInput>,
    literal_key: &str,
    data: &mut NodeData,
    variable_slot: &mut Option<String>,
) {
    match input {
        Some(TypedInput::Literal { value }) => {
            data.params.insert(literal_key.to_string(), value.clone());
        }
        Some(TypedInput::Variable { name }) => *variable_slot = Some(name.clone()),
        Some(input @ TypedInput::Pipe { .. }) => data.pipes.push(pipe_config(input)),
        None => {}
    }
}

fn pipe_config(input: &TypedInput) -> PipeConfig {
    match input {
        TypedInput::Pipe {
            node,
            offset,
            length,
            segments,
        } => PipeConfig {
            source: *node,
            offset: *offset,
            length: *length,
            segments: segments.clone(),
        },
        _ => unreachable!("caller matched a pipe input"),
    }
}
