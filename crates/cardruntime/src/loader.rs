//! Versioned graph persistence.
//!
//! Files without a `schemaVersion` field are the legacy params-bag
//! layout and deserialize straight into [`Graph`]; version 2 files use
//! the typed-inputs layout and go through the converter. Any other
//! version is rejected.

use crate::convert::{self, TypedGraph, SCHEMA_VERSION};
use cardcore::{CardError, Graph, GraphError};
use std::path::Path;

/// Parse a graph from JSON text, dispatching on `schemaVersion`.
pub fn parse_graph(json: &str) -> Result<Graph, CardError> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    match value.get("schemaVersion").and_then(|v| v.as_u64()) {
        None => {
            let graph: Graph = serde_json::from_value(value)?;
            Ok(graph)
        }
        Some(SCHEMA_VERSION) => {
            let typed: TypedGraph = serde_json::from_value(value)?;
            Ok(convert::to_working(&typed)?)
        }
        Some(other) => Err(GraphError::UnsupportedSchemaVersion(other).into()),
    }
}

pub fn load_graph(path: impl AsRef<Path>) -> Result<Graph, CardError> {
    let json = std::fs::read_to_string(path)?;
    parse_graph(&json)
}

/// Serialize in the legacy layout, pretty-printed.
pub fn to_json_legacy(graph: &Graph) -> Result<String, CardError> {
    Ok(serde_json::to_string_pretty(graph)?)
}

/// Serialize in the typed version-2 layout, pretty-printed.
pub fn to_json_typed(graph: &Graph) -> Result<String, CardError> {
    let typed = convert::to_typed(graph);
    Ok(serde_json::to_string_pretty(&typed)?)
}
