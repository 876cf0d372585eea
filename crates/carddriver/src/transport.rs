use async_trait::async_trait;
use cardcore::{ProtocolMessage, TransportError};

/// One-way link to the reader driver process.
///
/// Implementations deliver outbound messages and feed inbound messages
/// into the channel handed to [`crate::DriverClient::new`]; they never
/// correlate requests with responses themselves.
#[async_trait]
pub trait DriverTransport: Send + Sync {
    /// Deliver one message to the driver. Fire-and-forget: a successful
    /// return only means the message left this process.
    async fn send(&self, msg: &ProtocolMessage) -> Result<(), TransportError>;

    /// Whether the underlying link is usable right now. When this is
    /// false the client rejects commands without registering anything.
    fn is_available(&self) -> bool;
}
