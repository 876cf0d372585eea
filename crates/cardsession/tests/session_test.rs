use async_trait::async_trait;
use carddriver::{ConnectionState, DriverClient, DriverTransport};
use cardcore::{DriverCommand, ProtocolMessage, TransportError, RESULT_OK};
use cardsession::{
    ApduCardSession, CardType, MemoryCardSession, ERROR_MARKER, MAX_LOG_ENTRIES,
};
use std::sync::Arc;
use tokio::sync::mpsc;

type Responder = Box<dyn Fn(&ProtocolMessage) -> Option<ProtocolMessage> + Send + Sync>;

/// Transport fake scripted by a closure keyed on the driver command.
struct ScriptedTransport {
    inbound: mpsc::Sender<ProtocolMessage>,
    responder: Responder,
}

impl ScriptedTransport {
    fn client(responder: Responder) -> Arc<DriverClient> {
        let (in_tx, in_rx) = mpsc::channel(64);
        let transport = Arc::new(ScriptedTransport {
            inbound: in_tx,
            responder,
        });
        DriverClient::new(transport, in_rx)
    }
}

#[async_trait]
impl DriverTransport for ScriptedTransport {
    async fn send(&self, msg: &ProtocolMessage) -> Result<(), TransportError> {
        if let Some(response) = (self.responder)(msg) {
            let _ = self.inbound.send(response).await;
        }
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }
}

fn ok(req: &ProtocolMessage, data: &[&str]) -> Option<ProtocolMessage> {
    Some(req.response_to(RESULT_OK, data.iter().map(|s| s.to_string()).collect()))
}

/// Responder for a healthy contact card behind one reader.
fn contact_card(req: &ProtocolMessage) -> Option<ProtocolMessage> {
    match req.cmd {
        DriverCommand::ListReaders => ok(req, &["ACS ACR122U 00"]),
        DriverCommand::GetAtr => ok(req, &["3B8F8001804F0CA000000306"]),
        DriverCommand::GetUid => ok(req, &["N/A"]),
        DriverCommand::TransmitApdu => ok(req, &["6F108408A000000003000000A5049000"]),
        _ => ok(req, &[]),
    }
}

#[tokio::test]
async fn test_connect_sequence_collects_card_info() {
    let client = ScriptedTransport::client(Box::new(contact_card));
    let session = ApduCardSession::new(Arc::clone(&client));

    let info = session.connect().await.unwrap();

    assert_eq!(info.atr.as_deref(), Some("3B8F8001804F0CA000000306"));
    // N/A means the reader has no UID for a contact card
    assert_eq!(info.uid, None);
    assert_eq!(client.state(), ConnectionState::Connected);
    assert!(client.context_ready());
}

#[tokio::test]
async fn test_connect_fails_without_reader() {
    let client = ScriptedTransport::client(Box::new(|req| match req.cmd {
        DriverCommand::ListReaders => ok(req, &[]),
        _ => ok(req, &[]),
    }));
    let session = ApduCardSession::new(Arc::clone(&client));

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, cardcore::SessionError::NoReader));
    assert_eq!(client.state(), ConnectionState::Error);
}

#[tokio::test]
async fn test_transmit_logs_transaction() {
    let client = ScriptedTransport::client(Box::new(contact_card));
    let session = ApduCardSession::new(client);

    let response = session.transmit_hex("00A4040008A000000003000000").await.unwrap();
    assert!(response.is_success());
    assert_eq!(response.data, "6F108408A000000003000000A504");

    let log = session.transactions();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].command, "00A4040008A000000003000000");
    assert!(log[0].parsed_command.is_some());
}

#[tokio::test]
async fn test_transaction_log_evicts_oldest_past_cap() {
    let client = ScriptedTransport::client(Box::new(contact_card));
    let session = ApduCardSession::new(client);

    for i in 0..MAX_LOG_ENTRIES + 5 {
        let command = format!("00B000{:02X}00", i % 256);
        session.transmit_hex(&command).await.unwrap();
    }

    let log = session.transactions();
    assert_eq!(log.len(), MAX_LOG_ENTRIES);
    // The 5 oldest entries fell off the front
    assert_eq!(log[0].command, "00B0000500");
}

#[test]
fn test_command_builders() {
    assert_eq!(
        ApduCardSession::select("A000000003").to_hex().unwrap(),
        "00A4040005A000000003"
    );
    assert_eq!(
        ApduCardSession::get_challenge(8).to_hex().unwrap(),
        "0084000008"
    );
    assert_eq!(
        ApduCardSession::read_binary(0x1234, 16).to_hex().unwrap(),
        "00B0123410"
    );
    assert_eq!(
        ApduCardSession::read_record(1, 2).to_hex().unwrap(),
        "00B2011400"
    );
}

#[tokio::test]
async fn test_detect_classifies_by_sak() {
    let client = ScriptedTransport::client(Box::new(|req| match req.cmd {
        DriverCommand::GetAtr => ok(req, &["3B8F8001"]),
        DriverCommand::GetUid => ok(req, &["04AABBCC"]),
        DriverCommand::GetSak => ok(req, &["08"]),
        DriverCommand::GetAts => Some(req.response_to(1, vec![])),
        _ => ok(req, &[]),
    }));
    let session = MemoryCardSession::new(client);

    let info = session.detect().await.unwrap();
    assert_eq!(info.card_type, CardType::Classic1k);
    assert_eq!(info.sak, Some(0x08));
    assert_eq!(info.uid.as_deref(), Some("04AABBCC"));
}

#[tokio::test]
async fn test_detect_without_sak_falls_back_to_ats_then_uid() {
    let client = ScriptedTransport::client(Box::new(|req| match req.cmd {
        DriverCommand::GetAtr => ok(req, &["3B8F8001"]),
        DriverCommand::GetUid => ok(req, &["04AABBCC"]),
        DriverCommand::GetSak => Some(req.response_to(1, vec![])),
        DriverCommand::GetAts => ok(req, &["0578807002"]),
        _ => ok(req, &[]),
    }));
    let session = MemoryCardSession::new(client);

    let info = session.detect().await.unwrap();
    assert_eq!(info.card_type, CardType::GenericApdu);

    let client = ScriptedTransport::client(Box::new(|req| match req.cmd {
        DriverCommand::GetAtr => ok(req, &["3B8F8001"]),
        DriverCommand::GetUid => ok(req, &["04AABBCC"]),
        DriverCommand::GetSak | DriverCommand::GetAts => Some(req.response_to(1, vec![])),
        _ => ok(req, &[]),
    }));
    let session = MemoryCardSession::new(client);

    let info = session.detect().await.unwrap();
    assert_eq!(info.card_type, CardType::Classic1k);
}

#[tokio::test]
async fn test_read_sectors_marks_failed_sector() {
    // Sector 1 refuses authentication, everything else reads fine
    let client = ScriptedTransport::client(Box::new(|req| match req.cmd {
        DriverCommand::Authenticate => {
            if req.first_data() == Some("01") {
                Some(req.response_to(3, vec![]))
            } else {
                ok(req, &[])
            }
        }
        DriverCommand::ReadBlock => ok(req, &["00112233445566778899AABBCCDDEEFF9000"]),
        _ => ok(req, &[]),
    }));
    let session = MemoryCardSession::new(client);

    let mut progress = Vec::new();
    session
        .read_sectors(&[0, 1, 2], "FFFFFFFFFFFF", |sector, ok| {
            progress.push((sector, ok));
        })
        .await
        .unwrap();

    assert_eq!(progress, vec![(0, true), (1, false), (2, true)]);

    let sectors = session.sectors();
    assert!(sectors[0].authenticated);
    assert_eq!(sectors[0].blocks[0], "00112233445566778899AABBCCDDEEFF");
    assert!(!sectors[1].authenticated);
    assert!(sectors[1].blocks.iter().all(|b| b == ERROR_MARKER));
    assert!(sectors[2].authenticated);
}

#[tokio::test]
async fn test_read_sector_aborts_on_bad_status_word() {
    let client = ScriptedTransport::client(Box::new(|req| match req.cmd {
        DriverCommand::ReadBlock => ok(req, &["6300"]),
        _ => ok(req, &[]),
    }));
    let session = MemoryCardSession::new(client);

    let mut progress = Vec::new();
    session
        .read_sectors(&[0], "FFFFFFFFFFFF", |sector, ok| progress.push((sector, ok)))
        .await
        .unwrap();

    assert_eq!(progress, vec![(0, false)]);
    assert!(session.sectors()[0].blocks.iter().all(|b| b == ERROR_MARKER));
}

#[tokio::test]
async fn test_disconnect_blanks_sector_model() {
    let client = ScriptedTransport::client(Box::new(|req| match req.cmd {
        DriverCommand::ReadBlock => ok(req, &["AA9000"]),
        _ => ok(req, &[]),
    }));
    let session = MemoryCardSession::new(client);

    session
        .read_sectors(&[0], "FFFFFFFFFFFF", |_, _| {})
        .await
        .unwrap();
    assert!(session.sectors()[0].authenticated);

    session.disconnect().await.unwrap();
    assert!(session.sectors().iter().all(|s| !s.authenticated));
    assert!(session.sectors()[0].blocks.iter().all(|b| b.is_empty()));
}
