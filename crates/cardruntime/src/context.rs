use cardcore::hex;
use cardcore::{ApduResponse, NodeError, NodeId, PipeConfig, SaveSource, VariableSave};
use std::collections::HashMap;

/// What one node produced, retained for later pipe reads.
#[derive(Debug, Clone, Default)]
pub struct NodeOutcome {
    /// Decoded response for APDU nodes, synthesized 9000 response for
    /// cipher and concat nodes.
    pub response: Option<ApduResponse>,
    /// Cipher/concat output.
    pub processed_data: Option<String>,
    /// Raw command hex an APDU node actually sent.
    pub command: Option<String>,
}

impl NodeOutcome {
    /// The data this node exposes to consumers: processed data when
    /// present, otherwise the response payload.
    pub fn output_data(&self) -> Option<&str> {
        self.processed_data
            .as_deref()
            .or_else(|| self.response.as_ref().map(|r| r.data.as_str()))
    }
}

/// Scratch state for one run: node outcomes plus the shared variable
/// store. Created fresh per run and threaded by reference through the
/// whole execution, so a write from node N is visible to node N+1. The
/// persisted graph is never mutated.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    variables: HashMap<String, String>,
    outcomes: HashMap<NodeId, NodeOutcome>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn variables(&self) -> &HashMap<String, String> {
        &self.variables
    }

    pub fn outcome(&self, id: NodeId) -> Option<&NodeOutcome> {
        self.outcomes.get(&id)
    }

    pub fn record(&mut self, id: NodeId, outcome: NodeOutcome) {
        self.outcomes.insert(id, outcome);
    }

    /// Extract the slice a pipe declares from its source node's output.
    ///
    /// A segment list extracts and concatenates each slice; otherwise
    /// the single offset/length pair applies, length -1 reaching to the
    /// end. Fails when the source node has produced no data yet.
    pub fn extract_pipe(&self, pipe: &PipeConfig) -> Result<String, NodeError> {
        let data = self
            .outcomes
            .get(&pipe.source)
            .and_then(NodeOutcome::output_data)
            .ok_or(NodeError::NoPipeData(pipe.source))?;

        match pipe.segments.as_deref().filter(|s| !s.is_empty()) {
            Some(segments) => {
                let mut out = String::new();
                for segment in segments {
                    out.push_str(hex::slice_bytes(data, segment.offset, segment.length));
                }
                Ok(out)
            }
            None => Ok(hex::slice_bytes(data, pipe.offset, pipe.length).to_string()),
        }
    }

    /// Bind the configured slices of a node's output into the variable
    /// store, overwriting any prior binding of the same name.
    pub fn apply_saves(&mut self, saves: &[VariableSave], outcome: &NodeOutcome) {
        for save in saves {
            let source = match save.source {
                SaveSource::Response => outcome
                    .response
                    .as_ref()
                    .map(|r| r.data.as_str())
                    .unwrap_or_default(),
                SaveSource::ProcessedData => outcome.processed_data.as_deref().unwrap_or_default(),
            };
            let value = hex::slice_bytes(source, save.offset, save.length).to_string();
            tracing::debug!(name = %save.name, bytes = value.len() / 2, "variable saved");
            self.variables.insert(save.name.clone(), value);
        }
    }
}
