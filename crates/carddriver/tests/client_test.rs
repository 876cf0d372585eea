use async_trait::async_trait;
use carddriver::{DriverClient, DriverTransport};
use cardcore::{DriverCommand, ProtocolMessage, TransportError, RESULT_OK};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

type Responder = Box<dyn Fn(&ProtocolMessage) -> Option<ProtocolMessage> + Send + Sync>;

/// Transport fake: every sent request is answered by a responder
/// closure, whose output (if any) is pushed onto the inbound channel.
struct MockTransport {
    inbound: mpsc::Sender<ProtocolMessage>,
    responder: Responder,
    available: AtomicBool,
}

impl MockTransport {
    fn client(responder: Responder) -> Arc<DriverClient> {
        let (in_tx, in_rx) = mpsc::channel(16);
        let transport = Arc::new(MockTransport {
            inbound: in_tx,
            responder,
            available: AtomicBool::new(true),
        });
        DriverClient::new(transport, in_rx)
    }
}

#[async_trait]
impl DriverTransport for MockTransport {
    async fn send(&self, msg: &ProtocolMessage) -> Result<(), TransportError> {
        if let Some(response) = (self.responder)(msg) {
            let _ = self.inbound.send(response).await;
        }
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

const TIMEOUT: Duration = Duration::from_millis(500);

#[tokio::test]
async fn test_response_correlates_by_uuid() {
    let client = MockTransport::client(Box::new(|req| {
        Some(req.response_to(RESULT_OK, vec!["3B8F8001".to_string()]))
    }));

    let response = client
        .send_command(DriverCommand::GetAtr, vec![], TIMEOUT)
        .await
        .unwrap();

    assert_eq!(response.first_data(), Some("3B8F8001"));
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn test_driver_failure_result_rejects() {
    let client =
        MockTransport::client(Box::new(|req| Some(req.response_to(5, vec![]))));

    let err = client
        .send_command(DriverCommand::ConnectCard, vec!["Reader 0".to_string()], TIMEOUT)
        .await
        .unwrap_err();

    match err {
        TransportError::Driver { command, result } => {
            assert_eq!(command, "CONNECT_CARD");
            assert_eq!(result, 5);
        }
        other => panic!("expected driver error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_timeout_names_command_and_cleans_pending() {
    // Responder swallows every request
    let client = MockTransport::client(Box::new(|_| None));

    let err = client
        .send_command(DriverCommand::TransmitApdu, vec![], Duration::from_millis(50))
        .await
        .unwrap_err();

    match err {
        TransportError::Timeout { command, timeout_ms } => {
            assert_eq!(command, "TRANSMIT_APDU");
            assert_eq!(timeout_ms, 50);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn test_unavailable_transport_rejects_immediately() {
    let (in_tx, in_rx) = mpsc::channel(1);
    let transport = Arc::new(MockTransport {
        inbound: in_tx,
        responder: Box::new(|_| None),
        available: AtomicBool::new(false),
    });
    let client = DriverClient::new(transport, in_rx);

    let err = client
        .send_command(DriverCommand::GetUid, vec![], TIMEOUT)
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::Unavailable));
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn test_broadcast_sees_solicited_responses() {
    let client = MockTransport::client(Box::new(|req| {
        Some(req.response_to(RESULT_OK, vec!["04AABBCC".to_string()]))
    }));

    let mut events = client.subscribe();
    client
        .send_command(DriverCommand::GetUid, vec![], TIMEOUT)
        .await
        .unwrap();

    let seen = events.recv().await.unwrap();
    assert_eq!(seen.cmd, DriverCommand::GetUid);
    assert_eq!(seen.first_data(), Some("04AABBCC"));
}

#[tokio::test]
async fn test_uncorrelated_message_is_dropped() {
    let client = MockTransport::client(Box::new(|req| {
        // Respond under a different uuid; the caller must time out
        let mut response = req.response_to(RESULT_OK, vec![]);
        response.uuid = uuid::Uuid::new_v4();
        Some(response)
    }));

    let mut events = client.subscribe();
    let err = client
        .send_command(DriverCommand::GetSak, vec![], Duration::from_millis(50))
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::Timeout { .. }));
    // The stray message still reached broadcast subscribers
    let seen = events.recv().await.unwrap();
    assert_eq!(seen.cmd, DriverCommand::GetSak);
}

#[tokio::test]
async fn test_message_counter_increments_per_request() {
    let client = MockTransport::client(Box::new(|req| {
        Some(req.response_to(RESULT_OK, vec![req.msg_cnt.to_string()]))
    }));

    let first = client
        .send_command(DriverCommand::GetAtr, vec![], TIMEOUT)
        .await
        .unwrap();
    let second = client
        .send_command(DriverCommand::GetAtr, vec![], TIMEOUT)
        .await
        .unwrap();

    assert_eq!(first.first_data(), Some("0"));
    assert_eq!(second.first_data(), Some("1"));
}
