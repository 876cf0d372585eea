use crate::apdu::ApduResponse;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CardError {
    #[error("APDU error: {0}")]
    Apdu(#[from] ApduError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApduError {
    #[error("invalid {field}: expected exactly 2 hex digits, got '{value}'")]
    InvalidByteField { field: &'static str, value: String },

    #[error("invalid data field: expected even-length hex string, got '{0}'")]
    InvalidData(String),

    #[error("command too short: need at least 4 header bytes")]
    CommandTooShort,

    #[error("command is not a hex string")]
    CommandNotHex,

    #[error("response too short: need at least 2 bytes, got {0} hex chars")]
    ResponseTooShort(usize),

    #[error("response is not an even-length hex string")]
    ResponseNotHex,
}

#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("transport unavailable")]
    Unavailable,

    #[error("{command} timed out after {timeout_ms}ms")]
    Timeout { command: &'static str, timeout_ms: u64 },

    #[error("{command} failed with driver result {result}")]
    Driver { command: &'static str, result: u16 },

    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("failed to send message: {0}")]
    Send(String),

    #[error("transport channel closed")]
    Closed,
}

#[derive(Error, Debug, Clone)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Apdu(#[from] ApduError),

    #[error("driver returned no data for {0}")]
    EmptyResponse(&'static str),

    #[error("no card reader available")]
    NoReader,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("{role} is not a valid hex string")]
    NotHex { role: &'static str },

    #[error("invalid {role} length for {algorithm}: got {got} bytes, expected {expected}")]
    InvalidLength {
        role: &'static str,
        algorithm: &'static str,
        got: usize,
        expected: &'static str,
    },

    #[error("data length {0} is not a multiple of the {1}-byte cipher block")]
    NotBlockAligned(usize, usize),

    #[error("invalid padding in decrypted data")]
    Unpad,

    #[error("cipher backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug, Clone)]
pub enum GraphError {
    #[error("node not found: {0}")]
    NodeNotFound(Uuid),

    #[error("edge not found: {0}")]
    EdgeNotFound(Uuid),

    #[error("edge references missing node: {0}")]
    DanglingEdge(Uuid),

    #[error("unsupported schema version: {0}")]
    UnsupportedSchemaVersion(u64),

    #[error("invalid input on node {node}: {reason}")]
    InvalidInput { node: Uuid, reason: String },
}

/// Failures scoped to a single node execution. These are captured into
/// the node's result record; whether they abort the run is decided by
/// the `stop_on_error` run option.
#[derive(Error, Debug, Clone)]
pub enum NodeError {
    #[error("missing required parameter: {0}")]
    MissingParam(&'static str),

    #[error("select application requires non-empty data")]
    EmptySelectData,

    #[error("missing cipher configuration")]
    MissingCipherConfig,

    #[error("no data available from node {0}")]
    NoPipeData(Uuid),

    /// The card answered, but with a non-success status word. The
    /// decoded response rides along for per-step inspection.
    #[error("SW={sw} ({message})")]
    Status {
        sw: String,
        message: &'static str,
        response: ApduResponse,
    },

    #[error(transparent)]
    Apdu(#[from] ApduError),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Failures that abort a whole run before or between nodes.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("card connection failed: {0}")]
    Connection(#[source] SessionError),
}
