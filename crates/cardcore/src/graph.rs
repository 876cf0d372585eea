//! The node/edge graph an operator assembles in the editor.
//!
//! The graph is pure configuration: node parameters, pipe and variable
//! declarations, cipher settings. Run-time outputs (responses,
//! processed data) live in the engine's execution context, never here,
//! so a persisted graph is always free of scratch state.

use crate::cipher::CipherConfig;
use crate::error::GraphError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type NodeId = Uuid;
pub type EdgeId = Uuid;

/// Well-known parameter names used by the node kinds.
pub mod param {
    pub const CLA: &str = "CLA";
    pub const INS: &str = "INS";
    pub const P1: &str = "P1";
    pub const P2: &str = "P2";
    pub const DATA: &str = "Data";
    pub const LE: &str = "Le";
    pub const A_DATA: &str = "AData";
    pub const B_DATA: &str = "BData";
}

/// Closed set of node kinds. There is exactly one discriminant; no
/// secondary duck-typed type field exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    Apdu,
    CryptoEncrypt,
    CryptoDecrypt,
    Concat,
}

impl NodeKind {
    pub fn is_cipher(&self) -> bool {
        matches!(self, Self::CryptoEncrypt | Self::CryptoDecrypt)
    }
}

/// Node position in the visual editor; advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// APDU command presets that carry extra execution rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApduPreset {
    /// SELECT by AID; the resolved data field must be non-empty.
    SelectApplication,
}

/// A declared data dependency: consume a byte-range slice of an earlier
/// node's output. `length == -1` means "to the end"; an explicit
/// segment list extracts and concatenates several slices instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipeConfig {
    pub source: NodeId,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "full_length")]
    pub length: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<PipeSegment>>,
}

impl PipeConfig {
    /// Pipe the full output of `source`.
    pub fn all_of(source: NodeId) -> Self {
        Self {
            source,
            offset: 0,
            length: -1,
            segments: None,
        }
    }

    pub fn slice(source: NodeId, offset: usize, length: i64) -> Self {
        Self {
            source,
            offset,
            length,
            segments: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipeSegment {
    pub offset: usize,
    #[serde(default = "full_length")]
    pub length: i64,
}

fn full_length() -> i64 {
    -1
}

/// Which named variable feeds each input role of a node. Unbound roles
/// fall back to pipes and then to literal parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariableUse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_b: Option<String>,
}

impl VariableUse {
    pub fn is_empty(&self) -> bool {
        self.data.is_none() && self.key.is_none() && self.iv.is_none() && self.data_b.is_none()
    }
}

/// Which slice of a node's output gets bound to which variable name
/// after the node executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableSave {
    pub name: String,
    pub source: SaveSource,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "full_length")]
    pub length: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SaveSource {
    Response,
    ProcessedData,
}

/// Per-node configuration payload. Legacy files also carry run-time
/// fields (`response`, `executed`, `error`, `processedData`) here; they
/// are ignored on load and never written back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeData {
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub params: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cipher: Option<CipherConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pipes: Vec<PipeConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<VariableUse>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub variable_saves: Vec<VariableSave>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<ApduPreset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub data: NodeData,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            position: None,
            label: String::new(),
            data: NodeData::default(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = Some(Position { x, y });
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.params.insert(name.into(), value.into());
        self
    }

    pub fn with_pipe(mut self, pipe: PipeConfig) -> Self {
        self.data.pipes.push(pipe);
        self
    }

    pub fn with_cipher(mut self, cipher: CipherConfig) -> Self {
        self.data.cipher = Some(cipher);
        self
    }

    pub fn with_variables(mut self, variables: VariableUse) -> Self {
        self.data.variables = Some(variables);
        self
    }

    pub fn with_save(mut self, save: VariableSave) -> Self {
        self.data.variable_saves.push(save);
        self
    }

    pub fn with_preset(mut self, preset: ApduPreset) -> Self {
        self.data.preset = Some(preset);
        self
    }
}

/// Ordering dependency between two nodes. Edges carry no payload; data
/// travels through pipe configurations referencing node ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
}

/// The working graph representation, owned by the execution engine for
/// the lifetime of one editing/execution session. Every mutation bumps
/// `updated_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Graph {
    #[serde(default)]
    pub nodes: HashMap<NodeId, Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Graph {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id;
        self.nodes.insert(id, node);
        self.touch();
        id
    }

    pub fn update_node(&mut self, node: Node) -> Result<(), GraphError> {
        if !self.nodes.contains_key(&node.id) {
            return Err(GraphError::NodeNotFound(node.id));
        }
        self.nodes.insert(node.id, node);
        self.touch();
        Ok(())
    }

    /// Remove a node together with every edge touching it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node, GraphError> {
        let node = self.nodes.remove(&id).ok_or(GraphError::NodeNotFound(id))?;
        self.edges.retain(|e| e.source != id && e.target != id);
        self.touch();
        Ok(node)
    }

    pub fn add_edge(&mut self, source: NodeId, target: NodeId) -> Result<EdgeId, GraphError> {
        if !self.nodes.contains_key(&source) {
            return Err(GraphError::NodeNotFound(source));
        }
        if !self.nodes.contains_key(&target) {
            return Err(GraphError::NodeNotFound(target));
        }
        let id = Uuid::new_v4();
        self.edges.push(Edge { id, source, target });
        self.touch();
        Ok(id)
    }

    pub fn remove_edge(&mut self, id: EdgeId) -> Result<(), GraphError> {
        let before = self.edges.len();
        self.edges.retain(|e| e.id != id);
        if self.edges.len() == before {
            return Err(GraphError::EdgeNotFound(id));
        }
        self.touch();
        Ok(())
    }

    /// Edges arriving at `target`, in declaration order.
    pub fn incoming(&self, target: NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.target == target)
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
