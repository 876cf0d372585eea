//! Core types for the card operation graph runner
//!
//! This crate provides the fundamental types every other component
//! depends on: the APDU codec, the driver wire protocol, the node/edge
//! graph model, the cipher validation table and the error enums. It
//! performs no I/O.

pub mod apdu;
pub mod catalog;
pub mod cipher;
mod error;
pub mod graph;
pub mod hex;
pub mod protocol;

pub use apdu::{status_message, ApduCommand, ApduResponse, SW_SUCCESS};
pub use cipher::{CipherAlgorithm, CipherConfig, CipherProvider};
pub use error::{
    ApduError, CardError, CipherError, EngineError, GraphError, NodeError, SessionError,
    TransportError,
};
pub use graph::{
    ApduPreset, Edge, EdgeId, Graph, Node, NodeData, NodeId, NodeKind, PipeConfig, PipeSegment,
    Position, SaveSource, VariableSave, VariableUse,
};
pub use protocol::{DriverCommand, ProtocolMessage, Sender, RESULT_OK, RESULT_UNSET};

/// Result type for card operations
pub type Result<T> = std::result::Result<T, CardError>;
