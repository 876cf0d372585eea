use crate::context::{ExecutionContext, NodeOutcome};
use cardcore::graph::param;
use cardcore::{
    cipher, ApduCommand, ApduPreset, ApduResponse, CipherProvider, EngineError, Graph, Node,
    NodeError, NodeId, NodeKind, PipeConfig,
};
use cardsession::ApduCardSession;
use chrono::{DateTime, Utc};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Where a run currently stands. `Paused` never appears here; pausing
/// is a gate checked before each node starts, not a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Idle,
    Running,
    Completed,
    Error,
    Stopped,
}

/// Per-run knobs. `stop_on_error` aborts the run at the first failed
/// node; `node_delay_ms` inserts a fixed pause between nodes.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub stop_on_error: bool,
    pub node_delay_ms: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            stop_on_error: true,
            node_delay_ms: 0,
        }
    }
}

/// Record of one executed node.
#[derive(Debug, Clone)]
pub struct NodeResult {
    pub node_id: NodeId,
    pub label: String,
    pub success: bool,
    pub error: Option<String>,
    pub response: Option<ApduResponse>,
    pub execution_time_ms: u64,
    pub variables: HashMap<String, String>,
    pub output_data: Option<String>,
}

/// Outcome of a whole run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    pub results: Vec<NodeResult>,
    pub duration_ms: u64,
}

/// Events emitted while a run progresses.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        node_count: usize,
        timestamp: DateTime<Utc>,
    },
    NodeStarted {
        node_id: NodeId,
        kind: NodeKind,
        label: String,
        timestamp: DateTime<Utc>,
    },
    NodeCompleted {
        node_id: NodeId,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    NodeFailed {
        node_id: NodeId,
        error: String,
        timestamp: DateTime<Utc>,
    },
    RunCompleted {
        status: RunStatus,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

enum CipherDirection {
    Encrypt,
    Decrypt,
}

/// Runs a graph against the card session, one node at a time in
/// topological order.
///
/// Exactly one logical run executes per instance; nodes are awaited
/// strictly in sequence, so the only shared mutable state is the
/// transport client's pending-request map. `request_stop` is
/// best-effort: it takes effect before the next node starts and never
/// cancels an in-flight driver call.
pub struct GraphExecutor {
    session: Arc<ApduCardSession>,
    cipher: Arc<dyn CipherProvider>,
    events: broadcast::Sender<ExecutionEvent>,
    status: Mutex<RunStatus>,
    paused: AtomicBool,
    stop_requested: AtomicBool,
}

impl GraphExecutor {
    pub fn new(session: Arc<ApduCardSession>, cipher: Arc<dyn CipherProvider>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            session,
            cipher,
            events,
            status: Mutex::new(RunStatus::Idle),
            paused: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> RunStatus {
        *self.status.lock().unwrap()
    }

    fn set_status(&self, status: RunStatus) {
        *self.status.lock().unwrap() = status;
    }

    /// Halt before the next node starts; an in-flight node always runs
    /// to completion.
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    /// Abandon the run at the next loop iteration.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Execution order by Kahn's algorithm over the edge list.
    ///
    /// Nodes are seeded in sorted-id order so the result is
    /// deterministic. Nodes that never reach in-degree zero (cycle
    /// participants) are excluded from the order without an error;
    /// callers that want to reject cycles must compare lengths.
    pub fn execution_order(graph: &Graph) -> Vec<NodeId> {
        let mut dag: DiGraph<NodeId, ()> = DiGraph::new();
        let mut index: HashMap<NodeId, NodeIndex> = HashMap::new();

        let mut ids: Vec<NodeId> = graph.nodes.keys().copied().collect();
        ids.sort();
        for id in ids {
            index.insert(id, dag.add_node(id));
        }
        for edge in &graph.edges {
            if let (Some(&s), Some(&t)) = (index.get(&edge.source), index.get(&edge.target)) {
                dag.add_edge(s, t, ());
            }
        }

        let mut in_degree: HashMap<NodeIndex, usize> = dag
            .node_indices()
            .map(|idx| {
                (
                    idx,
                    dag.neighbors_directed(idx, petgraph::Direction::Incoming)
                        .count(),
                )
            })
            .collect();

        let mut queue: VecDeque<NodeIndex> = dag
            .node_indices()
            .filter(|idx| in_degree[idx] == 0)
            .collect();
        let mut order = Vec::with_capacity(dag.node_count());

        while let Some(idx) = queue.pop_front() {
            order.push(dag[idx]);
            for succ in dag.neighbors_directed(idx, petgraph::Direction::Outgoing) {
                let deg = in_degree.get_mut(&succ).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(succ);
                }
            }
        }

        if order.len() < dag.node_count() {
            tracing::warn!(
                excluded = dag.node_count() - order.len(),
                "cycle participants excluded from execution order"
            );
        }
        order
    }

    /// Execute the whole graph.
    ///
    /// The card session is connected up front; if that fails the run
    /// aborts with a connection error before any node executes. Node
    /// failures are folded into their result record and abort the run
    /// only when `stop_on_error` is set.
    pub async fn run(&self, graph: &Graph, options: &RunOptions) -> Result<RunReport, EngineError> {
        let started = Instant::now();
        self.stop_requested.store(false, Ordering::SeqCst);
        self.set_status(RunStatus::Running);

        let order = Self::execution_order(graph);
        let _ = self.events.send(ExecutionEvent::RunStarted {
            node_count: order.len(),
            timestamp: Utc::now(),
        });
        tracing::info!(nodes = order.len(), "run started");

        if let Err(e) = self.session.ensure_connected().await {
            self.set_status(RunStatus::Error);
            let _ = self.events.send(ExecutionEvent::RunCompleted {
                status: RunStatus::Error,
                duration_ms: started.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
            });
            return Err(EngineError::Connection(e));
        }

        let mut ctx = ExecutionContext::new();
        let mut results = Vec::with_capacity(order.len());
        let mut status = RunStatus::Completed;

        for node_id in order {
            while self.paused.load(Ordering::SeqCst) && !self.stop_requested.load(Ordering::SeqCst)
            {
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            if self.stop_requested.load(Ordering::SeqCst) {
                tracing::info!("run stopped on request");
                status = RunStatus::Stopped;
                break;
            }

            // The order only contains ids taken from the graph.
            let Some(node) = graph.node(node_id) else {
                continue;
            };
            let pipes = Self::effective_pipes(node, graph);

            let _ = self.events.send(ExecutionEvent::NodeStarted {
                node_id,
                kind: node.kind,
                label: node.label.clone(),
                timestamp: Utc::now(),
            });

            let node_started = Instant::now();
            let executed = self.execute_node(node, &pipes, &ctx).await;
            let elapsed = node_started.elapsed().as_millis() as u64;

            match executed {
                Ok(outcome) => {
                    ctx.apply_saves(&node.data.variable_saves, &outcome);
                    results.push(NodeResult {
                        node_id,
                        label: node.label.clone(),
                        success: true,
                        error: None,
                        response: outcome.response.clone(),
                        execution_time_ms: elapsed,
                        variables: ctx.variables().clone(),
                        output_data: outcome.output_data().map(str::to_string),
                    });
                    ctx.record(node_id, outcome);
                    let _ = self.events.send(ExecutionEvent::NodeCompleted {
                        node_id,
                        duration_ms: elapsed,
                        timestamp: Utc::now(),
                    });
                }
                Err(e) => {
                    tracing::error!(%node_id, error = %e, "node failed");
                    // A status-word rejection still produced a decoded
                    // response; keep it on the failure record.
                    let response = match &e {
                        NodeError::Status { response, .. } => Some(response.clone()),
                        _ => None,
                    };
                    results.push(NodeResult {
                        node_id,
                        label: node.label.clone(),
                        success: false,
                        error: Some(e.to_string()),
                        response,
                        execution_time_ms: elapsed,
                        variables: ctx.variables().clone(),
                        output_data: None,
                    });
                    let _ = self.events.send(ExecutionEvent::NodeFailed {
                        node_id,
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    if options.stop_on_error {
                        status = RunStatus::Error;
                        break;
                    }
                }
            }

            if options.node_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(options.node_delay_ms)).await;
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        self.set_status(status);
        let _ = self.events.send(ExecutionEvent::RunCompleted {
            status,
            duration_ms,
            timestamp: Utc::now(),
        });
        tracing::info!(?status, duration_ms, "run finished");

        Ok(RunReport {
            status,
            results,
            duration_ms,
        })
    }

    /// Pipes a node executes with. A cipher node with no explicit pipe
    /// but exactly one incoming edge gets the edge's origin piped in
    /// full, a per-run convenience that is never persisted.
    fn effective_pipes(node: &Node, graph: &Graph) -> Vec<PipeConfig> {
        let mut pipes = node.data.pipes.clone();
        if pipes.is_empty() && node.kind.is_cipher() {
            let mut incoming = graph.incoming(node.id);
            if let (Some(edge), None) = (incoming.next(), incoming.next()) {
                pipes.push(PipeConfig::all_of(edge.source));
            }
        }
        pipes
    }

    async fn execute_node(
        &self,
        node: &Node,
        pipes: &[PipeConfig],
        ctx: &ExecutionContext,
    ) -> Result<NodeOutcome, NodeError> {
        match node.kind {
            NodeKind::Apdu => self.execute_apdu(node, pipes, ctx).await,
            NodeKind::CryptoEncrypt => self.execute_cipher(node, pipes, ctx, CipherDirection::Encrypt),
            NodeKind::CryptoDecrypt => self.execute_cipher(node, pipes, ctx, CipherDirection::Decrypt),
            NodeKind::Concat => Self::execute_concat(node, pipes, ctx),
        }
    }

    /// Resolve a node's primary data input: bound variable first, then
    /// the first pipe, then the literal parameter.
    fn resolve_data(
        node: &Node,
        pipes: &[PipeConfig],
        ctx: &ExecutionContext,
        literal_param: &str,
    ) -> Result<String, NodeError> {
        if let Some(name) = node.data.variables.as_ref().and_then(|v| v.data.as_deref()) {
            if let Some(value) = ctx.variable(name) {
                return Ok(value.to_string());
            }
        }
        if let Some(pipe) = pipes.first() {
            return ctx.extract_pipe(pipe);
        }
        Ok(node
            .data
            .params
            .get(literal_param)
            .cloned()
            .unwrap_or_default())
    }

    async fn execute_apdu(
        &self,
        node: &Node,
        pipes: &[PipeConfig],
        ctx: &ExecutionContext,
    ) -> Result<NodeOutcome, NodeError> {
        let params = &node.data.params;
        let cla = params
            .get(param::CLA)
            .ok_or(NodeError::MissingParam(param::CLA))?;
        let ins = params
            .get(param::INS)
            .ok_or(NodeError::MissingParam(param::INS))?;
        let p1 = params
            .get(param::P1)
            .ok_or(NodeError::MissingParam(param::P1))?;
        let p2 = params
            .get(param::P2)
            .ok_or(NodeError::MissingParam(param::P2))?;

        let data = Self::resolve_data(node, pipes, ctx, param::DATA)?;
        if node.data.preset == Some(ApduPreset::SelectApplication) && data.is_empty() {
            return Err(NodeError::EmptySelectData);
        }

        let mut command = ApduCommand::new(cla, ins, p1, p2);
        if !data.is_empty() {
            command.data = Some(data);
        }
        if let Some(le) = params.get(param::LE).filter(|le| !le.is_empty()) {
            command.le = Some(le.clone());
        }

        let hex = command.to_hex()?;
        tracing::debug!(%node.id, command = %hex, "transmitting APDU");
        let response = self.session.transmit_hex(&hex).await?;

        if !response.is_success() {
            // The transport call succeeded; the card said no.
            return Err(NodeError::Status {
                sw: response.status_word(),
                message: response.status_message(),
                response,
            });
        }

        Ok(NodeOutcome {
            response: Some(response),
            processed_data: None,
            command: Some(hex),
        })
    }

    fn execute_cipher(
        &self,
        node: &Node,
        pipes: &[PipeConfig],
        ctx: &ExecutionContext,
        direction: CipherDirection,
    ) -> Result<NodeOutcome, NodeError> {
        let data_hex = Self::resolve_data(node, pipes, ctx, param::DATA)?;
        let config = node
            .data
            .cipher
            .as_ref()
            .ok_or(NodeError::MissingCipherConfig)?;

        // Variable bindings override the configured key and IV.
        let mut key_hex = config.key.clone();
        let mut iv_hex = config.iv.clone();
        if let Some(vars) = &node.data.variables {
            if let Some(value) = vars.key.as_deref().and_then(|n| ctx.variable(n)) {
                key_hex = value.to_string();
            }
            if let Some(value) = vars.iv.as_deref().and_then(|n| ctx.variable(n)) {
                iv_hex = value.to_string();
            }
        }

        cipher::validate_lengths(config.algorithm, &key_hex, &iv_hex)?;

        let decode = |role: &'static str, s: &str| {
            hex::decode(s).map_err(|_| NodeError::Cipher(cardcore::CipherError::NotHex { role }))
        };
        let key = decode("key", &key_hex)?;
        let iv = decode("iv", &iv_hex)?;
        let data = decode("data", &data_hex)?;

        let processed = match direction {
            CipherDirection::Encrypt => self.cipher.encrypt(config.algorithm, &key, &iv, &data)?,
            CipherDirection::Decrypt => self.cipher.decrypt(config.algorithm, &key, &iv, &data)?,
        };
        let processed = hex::encode_upper(processed);

        Ok(NodeOutcome {
            response: Some(ApduResponse::synthetic_success(processed.clone())),
            processed_data: Some(processed),
            command: None,
        })
    }

    /// Concatenate the A and B sources. A resolves like any primary
    /// input; B has its own variable role, reads the second pipe when
    /// present and falls back to the BData parameter.
    fn execute_concat(
        node: &Node,
        pipes: &[PipeConfig],
        ctx: &ExecutionContext,
    ) -> Result<NodeOutcome, NodeError> {
        let a = Self::resolve_data(node, pipes, ctx, param::A_DATA)?;

        let b = {
            let bound = node
                .data
                .variables
                .as_ref()
                .and_then(|v| v.data_b.as_deref())
                .and_then(|n| ctx.variable(n));
            match bound {
                Some(value) => value.to_string(),
                None => match pipes.get(1) {
                    Some(pipe) => ctx.extract_pipe(pipe)?,
                    None => node
                        .data
                        .params
                        .get(param::B_DATA)
                        .cloned()
                        .unwrap_or_default(),
                },
            }
        };

        let processed = format!("{a}{b}");
        Ok(NodeOutcome {
            response: Some(ApduResponse::synthetic_success(processed.clone())),
            processed_data: Some(processed),
            command: None,
        })
    }
}
