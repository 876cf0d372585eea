use crate::transport::DriverTransport;
use cardcore::{DriverCommand, ProtocolMessage, Sender, TransportError, RESULT_UNSET};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

/// Protocol-level connection state, driven by the session facades.
/// `context_ready` is an independent sub-state reached after the reader
/// context has been established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Correlates outbound requests with asynchronously delivered responses.
///
/// Every inbound message fans out to broadcast subscribers regardless of
/// correlation, so unsolicited driver messages stay observable. At most
/// one pending handler fires per correlation id; duplicate or late
/// responses are dropped silently.
pub struct DriverClient {
    transport: Arc<dyn DriverTransport>,
    pending: Mutex<HashMap<Uuid, oneshot::Sender<ProtocolMessage>>>,
    events: broadcast::Sender<ProtocolMessage>,
    state: Mutex<ConnectionState>,
    context_ready: AtomicBool,
    msg_cnt: AtomicU32,
}

impl DriverClient {
    /// Wire a client to its transport and the transport's inbound
    /// message stream. Spawns the dispatch task.
    pub fn new(
        transport: Arc<dyn DriverTransport>,
        mut inbound: mpsc::Receiver<ProtocolMessage>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let client = Arc::new(Self {
            transport,
            pending: Mutex::new(HashMap::new()),
            events,
            state: Mutex::new(ConnectionState::Disconnected),
            context_ready: AtomicBool::new(false),
            msg_cnt: AtomicU32::new(0),
        });

        let dispatcher = Arc::clone(&client);
        tokio::spawn(async move {
            while let Some(msg) = inbound.recv().await {
                dispatcher.dispatch(msg);
            }
            tracing::debug!("driver inbound stream closed");
        });

        client
    }

    fn dispatch(&self, msg: ProtocolMessage) {
        // Fan out before correlation so listeners also see solicited
        // responses.
        let _ = self.events.send(msg.clone());

        let handler = self.pending.lock().unwrap().remove(&msg.uuid);
        match handler {
            Some(tx) => {
                let _ = tx.send(msg);
            }
            None => {
                tracing::debug!(uuid = %msg.uuid, cmd = ?msg.cmd, "dropping uncorrelated message");
            }
        }
    }

    /// Observe every inbound driver message, solicited or not.
    pub fn subscribe(&self) -> broadcast::Receiver<ProtocolMessage> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    pub fn set_state(&self, state: ConnectionState) {
        tracing::debug!(?state, "driver connection state");
        *self.state.lock().unwrap() = state;
        if state != ConnectionState::Connected {
            self.context_ready.store(false, Ordering::SeqCst);
        }
    }

    pub fn context_ready(&self) -> bool {
        self.context_ready.load(Ordering::SeqCst)
    }

    pub fn set_context_ready(&self, ready: bool) {
        self.context_ready.store(ready, Ordering::SeqCst);
    }

    /// Number of requests currently awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Send one command and await its correlated response.
    ///
    /// Registers a handler under a fresh uuid, sends, and waits up to
    /// `timeout`. On expiry the registration is removed and the error
    /// names the command. A response with a non-zero `result` rejects
    /// with the driver's failure code. If the transport is unavailable
    /// the call rejects immediately and nothing is registered.
    pub async fn send_command(
        &self,
        cmd: DriverCommand,
        data: Vec<String>,
        timeout: Duration,
    ) -> Result<ProtocolMessage, TransportError> {
        if !self.transport.is_available() {
            return Err(TransportError::Unavailable);
        }

        let msg = ProtocolMessage {
            cmd,
            sender: Sender::Request,
            msg_cnt: self.msg_cnt.fetch_add(1, Ordering::Relaxed),
            uuid: Uuid::new_v4(),
            result: RESULT_UNSET,
            data_length: data.len() as u32,
            data,
        };
        let uuid = msg.uuid;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(uuid, tx);

        if let Err(e) = self.transport.send(&msg).await {
            self.pending.lock().unwrap().remove(&uuid);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => {
                if response.is_success() {
                    Ok(response)
                } else {
                    Err(TransportError::Driver {
                        command: cmd.name(),
                        result: response.result,
                    })
                }
            }
            Ok(Err(_)) => {
                self.pending.lock().unwrap().remove(&uuid);
                Err(TransportError::Closed)
            }
            Err(_) => {
                self.pending.lock().unwrap().remove(&uuid);
                tracing::warn!(command = cmd.name(), timeout_ms = timeout.as_millis() as u64, "driver call timed out");
                Err(TransportError::Timeout {
                    command: cmd.name(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}
