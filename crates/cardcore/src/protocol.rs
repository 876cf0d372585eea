//! Wire protocol spoken with the external reader driver process.
//!
//! The driver is a fire-and-forget peer: requests and responses are
//! independent messages correlated only by `uuid`. Everything is plain
//! JSON so the driver side stays language-agnostic.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `result` value of a successful response.
pub const RESULT_OK: u16 = 0;
/// Reserved "default/unset" failure value carried by requests.
pub const RESULT_UNSET: u16 = 0xFFFF;

/// Command codes understood by the reader driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum DriverCommand {
    SocketConnect = 1,
    SocketDisconnect = 2,
    EstablishContext = 10,
    ReleaseContext = 11,
    ListReaders = 12,
    ConnectCard = 20,
    DisconnectCard = 21,
    TransmitApdu = 22,
    GetAtr = 23,
    GetSak = 24,
    GetAts = 25,
    // Contactless memory card family
    GetUid = 30,
    LoadKey = 31,
    Authenticate = 32,
    ReadBlock = 33,
    WriteBlock = 34,
    Decrement = 35,
    Increment = 36,
    Restore = 37,
    Halt = 38,
}

impl DriverCommand {
    /// Name used in timeout and failure messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SocketConnect => "SOCKET_CONNECT",
            Self::SocketDisconnect => "SOCKET_DISCONNECT",
            Self::EstablishContext => "ESTABLISH_CONTEXT",
            Self::ReleaseContext => "RELEASE_CONTEXT",
            Self::ListReaders => "LIST_READERS",
            Self::ConnectCard => "CONNECT_CARD",
            Self::DisconnectCard => "DISCONNECT_CARD",
            Self::TransmitApdu => "TRANSMIT_APDU",
            Self::GetAtr => "GET_ATR",
            Self::GetSak => "GET_SAK",
            Self::GetAts => "GET_ATS",
            Self::GetUid => "GET_UID",
            Self::LoadKey => "LOAD_KEY",
            Self::Authenticate => "AUTHENTICATE",
            Self::ReadBlock => "READ_BLOCK",
            Self::WriteBlock => "WRITE_BLOCK",
            Self::Decrement => "DECREMENT",
            Self::Increment => "INCREMENT",
            Self::Restore => "RESTORE",
            Self::Halt => "HALT",
        }
    }
}

impl From<DriverCommand> for u16 {
    fn from(cmd: DriverCommand) -> Self {
        cmd as u16
    }
}

impl TryFrom<u16> for DriverCommand {
    type Error = String;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Ok(match code {
            1 => Self::SocketConnect,
            2 => Self::SocketDisconnect,
            10 => Self::EstablishContext,
            11 => Self::ReleaseContext,
            12 => Self::ListReaders,
            20 => Self::ConnectCard,
            21 => Self::DisconnectCard,
            22 => Self::TransmitApdu,
            23 => Self::GetAtr,
            24 => Self::GetSak,
            25 => Self::GetAts,
            30 => Self::GetUid,
            31 => Self::LoadKey,
            32 => Self::Authenticate,
            33 => Self::ReadBlock,
            34 => Self::WriteBlock,
            35 => Self::Decrement,
            36 => Self::Increment,
            37 => Self::Restore,
            38 => Self::Halt,
            other => return Err(format!("unknown driver command code: {other}")),
        })
    }
}

/// Message direction marker on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Sender {
    Request = 10,
    Response = 20,
}

impl From<Sender> for u8 {
    fn from(sender: Sender) -> Self {
        sender as u8
    }
}

impl TryFrom<u8> for Sender {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            10 => Ok(Self::Request),
            20 => Ok(Self::Response),
            other => Err(format!("unknown sender code: {other}")),
        }
    }
}

/// One message on the driver socket, either direction. A response must
/// echo the `uuid` of the request it answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolMessage {
    pub cmd: DriverCommand,
    pub sender: Sender,
    pub msg_cnt: u32,
    pub uuid: Uuid,
    pub result: u16,
    pub data_length: u32,
    #[serde(default)]
    pub data: Vec<String>,
}

impl ProtocolMessage {
    /// Build an outbound request with a fresh correlation id.
    pub fn request(cmd: DriverCommand, msg_cnt: u32, data: Vec<String>) -> Self {
        Self {
            cmd,
            sender: Sender::Request,
            msg_cnt,
            uuid: Uuid::new_v4(),
            result: RESULT_UNSET,
            data_length: data.len() as u32,
            data,
        }
    }

    /// Build the response answering this request, echoing its uuid.
    /// Used by tests and driver fakes.
    pub fn response_to(&self, result: u16, data: Vec<String>) -> Self {
        Self {
            cmd: self.cmd,
            sender: Sender::Response,
            msg_cnt: self.msg_cnt,
            uuid: self.uuid,
            result,
            data_length: data.len() as u32,
            data,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == RESULT_OK
    }

    /// First data entry, the usual single-payload convention.
    pub fn first_data(&self) -> Option<&str> {
        self.data.first().map(String::as_str)
    }
}
