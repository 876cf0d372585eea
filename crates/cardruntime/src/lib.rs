//! Graph execution engine
//!
//! Orders and runs graph nodes: topological scheduling over the edge
//! list, per-kind execution for APDU, cipher and concat nodes, data
//! flow between steps through pipes and run-scoped variables. Also home
//! to the two-schema persistence converter, the versioned graph loader
//! and the default block-cipher provider.

mod cipher;
mod context;
pub mod convert;
mod executor;
pub mod loader;

pub use cipher::BlockCipherProvider;
pub use context::{ExecutionContext, NodeOutcome};
pub use convert::{to_typed, to_working, TypedGraph, TypedInput, TypedNode, SCHEMA_VERSION};
pub use executor::{
    ExecutionEvent, GraphExecutor, NodeResult, RunOptions, RunReport, RunStatus,
};
