use crate::memory_card::CardType;
use carddriver::{ConnectionState, DriverClient};
use cardcore::{ApduCommand, ApduResponse, DriverCommand, SessionError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Transaction log cap; the oldest entry is evicted past this.
pub const MAX_LOG_ENTRIES: usize = 100;

/// Default per-call driver timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// One transmitted APDU with both raw and decoded forms retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub response: String,
    pub parsed_command: Option<ApduCommand>,
    pub parsed_response: Option<ApduResponse>,
}

/// Identification bytes gathered while connecting.
#[derive(Debug, Clone, Default)]
pub struct CardInfo {
    pub atr: Option<String>,
    pub uid: Option<String>,
    pub sak: Option<u8>,
    pub ats: Option<String>,
    pub card_type: CardType,
}

/// Facade for a generic APDU card: connect sequencing, single-APDU
/// transmit with a capped transaction log, and builders for the common
/// instruction conventions.
pub struct ApduCardSession {
    client: Arc<DriverClient>,
    timeout: Duration,
    log: Mutex<VecDeque<Transaction>>,
    info: Mutex<CardInfo>,
}

impl ApduCardSession {
    pub fn new(client: Arc<DriverClient>) -> Self {
        Self {
            client,
            timeout: DEFAULT_TIMEOUT,
            log: Mutex::new(VecDeque::new()),
            info: Mutex::new(CardInfo::default()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn client(&self) -> &Arc<DriverClient> {
        &self.client
    }

    /// Run the full connect sequence: socket, reader context, reader
    /// enumeration, card connect, ATR, best-effort UID.
    pub async fn connect(&self) -> Result<CardInfo, SessionError> {
        self.client.set_state(ConnectionState::Connecting);
        let result = self.connect_inner().await;
        match &result {
            Ok(_) => self.client.set_state(ConnectionState::Connected),
            Err(e) => {
                tracing::error!(error = %e, "card connect failed");
                self.client.set_state(ConnectionState::Error);
            }
        }
        result
    }

    async fn connect_inner(&self) -> Result<CardInfo, SessionError> {
        self.client
            .send_command(DriverCommand::SocketConnect, vec![], self.timeout)
            .await?;
        self.client
            .send_command(DriverCommand::EstablishContext, vec![], self.timeout)
            .await?;
        self.client.set_context_ready(true);

        let readers = self
            .client
            .send_command(DriverCommand::ListReaders, vec![], self.timeout)
            .await?;
        let reader = readers
            .first_data()
            .filter(|r| !r.is_empty())
            .ok_or(SessionError::NoReader)?
            .to_string();
        tracing::info!(%reader, "using card reader");

        self.client
            .send_command(DriverCommand::ConnectCard, vec![reader], self.timeout)
            .await?;

        let atr = self
            .client
            .send_command(DriverCommand::GetAtr, vec![], self.timeout)
            .await?
            .first_data()
            .ok_or(SessionError::EmptyResponse("GET_ATR"))?
            .to_string();

        // UID is best-effort; contact cards report N/A here.
        let uid = match self
            .client
            .send_command(DriverCommand::GetUid, vec![], self.timeout)
            .await
        {
            Ok(msg) => msg
                .first_data()
                .filter(|u| !u.is_empty() && *u != "N/A")
                .map(str::to_string),
            Err(e) => {
                tracing::debug!(error = %e, "UID not available");
                None
            }
        };

        let info = CardInfo {
            atr: Some(atr),
            uid,
            sak: None,
            ats: None,
            card_type: CardType::GenericApdu,
        };
        *self.info.lock().unwrap() = info.clone();
        Ok(info)
    }

    /// Connect only if the client is not already connected.
    pub async fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.client.state() != ConnectionState::Connected {
            self.connect().await?;
        }
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.client
            .send_command(DriverCommand::DisconnectCard, vec![], self.timeout)
            .await?;
        self.client
            .send_command(DriverCommand::ReleaseContext, vec![], self.timeout)
            .await?;
        self.client.set_context_ready(false);
        self.client
            .send_command(DriverCommand::SocketDisconnect, vec![], self.timeout)
            .await?;
        self.client.set_state(ConnectionState::Disconnected);
        Ok(())
    }

    /// Transmit a raw hex command, decode the response and append a
    /// transaction record.
    pub async fn transmit_hex(&self, command: &str) -> Result<ApduResponse, SessionError> {
        let msg = self
            .client
            .send_command(
                DriverCommand::TransmitApdu,
                vec![command.to_string()],
                self.timeout,
            )
            .await?;
        let raw = msg
            .first_data()
            .ok_or(SessionError::EmptyResponse("TRANSMIT_APDU"))?
            .to_string();
        let response = ApduResponse::parse(&raw)?;
        self.push_transaction(command, &raw, &response);
        Ok(response)
    }

    pub async fn transmit(&self, command: &ApduCommand) -> Result<ApduResponse, SessionError> {
        let hex = command.to_hex()?;
        self.transmit_hex(&hex).await
    }

    fn push_transaction(&self, command: &str, raw_response: &str, response: &ApduResponse) {
        let mut log = self.log.lock().unwrap();
        log.push_back(Transaction {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            command: command.to_string(),
            response: raw_response.to_string(),
            parsed_command: ApduCommand::parse(command).ok(),
            parsed_response: Some(response.clone()),
        });
        while log.len() > MAX_LOG_ENTRIES {
            log.pop_front();
        }
    }

    /// Snapshot of the transaction log, oldest first.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.log.lock().unwrap().iter().cloned().collect()
    }

    pub fn card_info(&self) -> CardInfo {
        self.info.lock().unwrap().clone()
    }

    // Convenience builders using the fixed instruction conventions.

    /// SELECT by AID (INS A4, P1 04).
    pub fn select(aid: impl Into<String>) -> ApduCommand {
        ApduCommand::new("00", "A4", "04", "00").with_data(aid)
    }

    /// GET CHALLENGE (INS 84).
    pub fn get_challenge(length: u8) -> ApduCommand {
        ApduCommand::new("00", "84", "00", "00").with_le(format!("{length:02X}"))
    }

    /// READ BINARY (INS B0) at a 15-bit offset.
    pub fn read_binary(offset: u16, length: u8) -> ApduCommand {
        ApduCommand::new(
            "00",
            "B0",
            format!("{:02X}", (offset >> 8) & 0x7F),
            format!("{:02X}", offset & 0xFF),
        )
        .with_le(format!("{length:02X}"))
    }

    /// READ RECORD (INS B2), record number addressed via P2 = (SFI<<3)|4.
    pub fn read_record(record: u8, sfi: u8) -> ApduCommand {
        ApduCommand::new(
            "00",
            "B2",
            format!("{record:02X}"),
            format!("{:02X}", (sfi << 3) | 0x04),
        )
        .with_le("00")
    }
}
