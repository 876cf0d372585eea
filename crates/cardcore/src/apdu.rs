//! APDU command/response codec.
//!
//! Commands and responses are modeled as the hex strings the operator
//! edits and the driver transports; validation happens on encode, not
//! on construction, so half-filled commands can live in the graph.

use crate::error::ApduError;
use crate::hex;
use serde::{Deserialize, Serialize};

/// Status word reported by the card on success.
pub const SW_SUCCESS: &str = "9000";

/// An ISO 7816 command APDU. Single-byte fields are stored as 2-digit
/// hex strings; `data` is an even-length hex string of any byte count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApduCommand {
    pub cla: String,
    pub ins: String,
    pub p1: String,
    pub p2: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub le: Option<String>,
}

impl ApduCommand {
    pub fn new(
        cla: impl Into<String>,
        ins: impl Into<String>,
        p1: impl Into<String>,
        p2: impl Into<String>,
    ) -> Self {
        Self {
            cla: cla.into(),
            ins: ins.into(),
            p1: p1.into(),
            p2: p2.into(),
            data: None,
            le: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_le(mut self, le: impl Into<String>) -> Self {
        self.le = Some(le.into());
        self
    }

    /// Check every field against the wire rules without encoding.
    pub fn validate(&self) -> Result<(), ApduError> {
        for (field, value) in [
            ("CLA", &self.cla),
            ("INS", &self.ins),
            ("P1", &self.p1),
            ("P2", &self.p2),
        ] {
            if !hex::is_byte(value) {
                return Err(ApduError::InvalidByteField {
                    field,
                    value: value.clone(),
                });
            }
        }
        if let Some(data) = &self.data {
            if !hex::is_even_hex(data) {
                return Err(ApduError::InvalidData(data.clone()));
            }
        }
        if let Some(le) = &self.le {
            if !le.is_empty() && !hex::is_byte(le) {
                return Err(ApduError::InvalidByteField {
                    field: "LE",
                    value: le.clone(),
                });
            }
        }
        Ok(())
    }

    /// Encode to the wire form `CLA‖INS‖P1‖P2‖[LC‖Data]‖[LE]`.
    ///
    /// LC is derived from the data byte count and omitted together with
    /// the data field when the data is absent or empty.
    pub fn to_hex(&self) -> Result<String, ApduError> {
        self.validate()?;
        let mut out = String::with_capacity(16);
        out.push_str(&hex::normalize(&self.cla));
        out.push_str(&hex::normalize(&self.ins));
        out.push_str(&hex::normalize(&self.p1));
        out.push_str(&hex::normalize(&self.p2));
        if let Some(data) = self.data.as_deref().filter(|d| !d.is_empty()) {
            let data = hex::normalize(data);
            out.push_str(&format!("{:02X}", hex::byte_len(&data)));
            out.push_str(&data);
        }
        if let Some(le) = self.le.as_deref().filter(|l| !l.is_empty()) {
            out.push_str(&hex::normalize(le));
        }
        Ok(out)
    }

    /// Reverse-engineer CLA/INS/P1/P2/LC/Data/LE from a flat hex string.
    ///
    /// The trailing bytes after the 4-byte header are disambiguated by
    /// length pattern: exactly one trailing byte is read as LE; two or
    /// more mean the first is LC, `LC` bytes of data follow (clamped to
    /// what is actually there) and any remainder is LE. A 4-byte command
    /// followed by a single byte can therefore never be read as a
    /// data-less LC; persisted graphs depend on this exact rule, so do
    /// not tighten it.
    pub fn parse(input: &str) -> Result<Self, ApduError> {
        let norm = hex::normalize(input);
        if !hex::is_even_hex(&norm) || norm.is_empty() {
            return Err(ApduError::CommandNotHex);
        }
        if norm.len() < 8 {
            return Err(ApduError::CommandTooShort);
        }
        let mut cmd = Self::new(&norm[0..2], &norm[2..4], &norm[4..6], &norm[6..8]);
        let rest = &norm[8..];
        match rest.len() {
            0 => {}
            2 => cmd.le = Some(rest.to_string()),
            _ => {
                let lc = usize::from_str_radix(&rest[0..2], 16)
                    .map_err(|_| ApduError::CommandNotHex)?;
                let data_end = (2 + lc * 2).min(rest.len());
                cmd.data = Some(rest[2..data_end].to_string());
                let tail = &rest[data_end..];
                if !tail.is_empty() {
                    cmd.le = Some(tail.to_string());
                }
            }
        }
        Ok(cmd)
    }
}

/// A decoded response APDU: payload plus the trailing status word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApduResponse {
    pub data: String,
    pub sw1: String,
    pub sw2: String,
}

impl ApduResponse {
    /// Decode a raw response hex string. Needs at least the 2 status
    /// word bytes; everything before them is payload.
    pub fn parse(input: &str) -> Result<Self, ApduError> {
        let norm = hex::normalize(input);
        if norm.len() < 4 {
            return Err(ApduError::ResponseTooShort(norm.len()));
        }
        if !hex::is_even_hex(&norm) {
            return Err(ApduError::ResponseNotHex);
        }
        let split = norm.len() - 4;
        Ok(Self {
            data: norm[..split].to_string(),
            sw1: norm[split..split + 2].to_string(),
            sw2: norm[split + 2..].to_string(),
        })
    }

    /// Synthesize the response shape cipher and concat nodes produce:
    /// the processed data with a success status word appended.
    pub fn synthetic_success(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            sw1: "90".to_string(),
            sw2: "00".to_string(),
        }
    }

    pub fn status_word(&self) -> String {
        format!("{}{}", self.sw1, self.sw2)
    }

    pub fn is_success(&self) -> bool {
        self.status_word() == SW_SUCCESS
    }

    pub fn status_message(&self) -> &'static str {
        status_message(&self.status_word())
    }

    /// Re-encode to the raw wire form.
    pub fn to_hex(&self) -> String {
        format!("{}{}{}", self.data, self.sw1, self.sw2)
    }
}

/// Human-readable text for a 2-byte status word. The `61xx` and `6Cxx`
/// families match on their first byte.
pub fn status_message(sw: &str) -> &'static str {
    match sw {
        "9000" => "Success",
        "6283" => "Selected file deactivated",
        "6300" => "Authentication failed",
        "6700" => "Wrong length",
        "6881" => "Logical channel not supported",
        "6882" => "Secure messaging not supported",
        "6982" => "Security status not satisfied",
        "6983" => "Authentication method blocked",
        "6984" => "Referenced data invalidated",
        "6985" => "Conditions of use not satisfied",
        "6986" => "Command not allowed",
        "6A80" => "Incorrect parameters in data field",
        "6A81" => "Function not supported",
        "6A82" => "File not found",
        "6A83" => "Record not found",
        "6A84" => "Not enough memory space",
        "6A86" => "Incorrect parameters P1-P2",
        "6A88" => "Referenced data not found",
        "6B00" => "Wrong parameters P1-P2",
        "6D00" => "Instruction not supported",
        "6E00" => "Class not supported",
        "6F00" => "No precise diagnosis",
        _ if sw.starts_with("61") => "More data available",
        _ if sw.starts_with("6C") => "Wrong Le field",
        _ => "Unknown status word",
    }
}
