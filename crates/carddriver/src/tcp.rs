use crate::transport::DriverTransport;
use async_trait::async_trait;
use cardcore::{ProtocolMessage, TransportError};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec};

/// Newline-delimited JSON over a TCP socket to the driver process.
///
/// Splits the stream into a writer task draining an outbound channel
/// and a reader task decoding lines into the inbound channel the
/// [`crate::DriverClient`] consumes.
pub struct TcpDriverTransport {
    outbound: mpsc::Sender<String>,
    available: Arc<AtomicBool>,
}

impl TcpDriverTransport {
    /// Connect to the driver and return the transport together with its
    /// inbound message stream.
    pub async fn connect(
        addr: &str,
    ) -> Result<(Self, mpsc::Receiver<ProtocolMessage>), TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        tracing::info!(%addr, "connected to reader driver");

        let (mut sink, mut lines) = Framed::new(stream, LinesCodec::new()).split();
        let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
        let (in_tx, in_rx) = mpsc::channel::<ProtocolMessage>(64);
        let available = Arc::new(AtomicBool::new(true));

        let write_available = Arc::clone(&available);
        tokio::spawn(async move {
            while let Some(line) = out_rx.recv().await {
                if let Err(e) = sink.send(line).await {
                    tracing::error!(error = %e, "driver socket write failed");
                    break;
                }
            }
            write_available.store(false, Ordering::SeqCst);
        });

        let read_available = Arc::clone(&available);
        tokio::spawn(async move {
            while let Some(line) = lines.next().await {
                match line {
                    Ok(line) => match serde_json::from_str::<ProtocolMessage>(&line) {
                        Ok(msg) => {
                            if in_tx.send(msg).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "discarding undecodable driver message");
                        }
                    },
                    Err(e) => {
                        tracing::error!(error = %e, "driver socket read failed");
                        break;
                    }
                }
            }
            read_available.store(false, Ordering::SeqCst);
            tracing::info!("driver socket closed");
        });

        Ok((
            Self {
                outbound: out_tx,
                available,
            },
            in_rx,
        ))
    }
}

#[async_trait]
impl DriverTransport for TcpDriverTransport {
    async fn send(&self, msg: &ProtocolMessage) -> Result<(), TransportError> {
        let line = serde_json::to_string(msg).map_err(|e| TransportError::Send(e.to_string()))?;
        self.outbound
            .send(line)
            .await
            .map_err(|_| TransportError::Unavailable)
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}
