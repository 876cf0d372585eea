//! Cipher configuration and the key/IV validation table.
//!
//! The block-cipher math itself lives behind [`CipherProvider`]; this
//! module only knows which key and IV sizes each algorithm accepts.

use crate::error::CipherError;
use crate::hex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CipherAlgorithm {
    #[default]
    #[serde(rename = "NONE")]
    None,
    #[serde(rename = "DES")]
    Des,
    #[serde(rename = "3DES")]
    TripleDes,
    #[serde(rename = "AES")]
    Aes,
}

impl CipherAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Des => "DES",
            Self::TripleDes => "3DES",
            Self::Aes => "AES",
        }
    }

    /// Accepted key sizes in bytes; empty means any key is accepted.
    pub fn key_lengths(&self) -> &'static [usize] {
        match self {
            Self::None => &[],
            Self::Des => &[8],
            Self::TripleDes => &[16, 24],
            Self::Aes => &[16, 24, 32],
        }
    }

    /// Required IV size in bytes, `None` when no IV is used.
    pub fn iv_length(&self) -> Option<usize> {
        match self {
            Self::None => None,
            Self::Des | Self::TripleDes => Some(8),
            Self::Aes => Some(16),
        }
    }

    /// Cipher block size in bytes, 0 for the pass-through algorithm.
    pub fn block_size(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Des | Self::TripleDes => 8,
            Self::Aes => 16,
        }
    }
}

impl std::fmt::Display for CipherAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-node cipher settings. Key and IV are hex strings; either may be
/// overridden at run time by a variable binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherConfig {
    pub algorithm: CipherAlgorithm,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub iv: String,
}

impl CipherConfig {
    pub fn new(algorithm: CipherAlgorithm, key: impl Into<String>, iv: impl Into<String>) -> Self {
        Self {
            algorithm,
            key: key.into(),
            iv: iv.into(),
        }
    }
}

fn expected_text(algorithm: CipherAlgorithm, role: &'static str) -> &'static str {
    match (algorithm, role) {
        (CipherAlgorithm::Des, "key") => "8",
        (CipherAlgorithm::TripleDes, "key") => "16 or 24",
        (CipherAlgorithm::Aes, "key") => "16, 24 or 32",
        (CipherAlgorithm::Des | CipherAlgorithm::TripleDes, "iv") => "8",
        (CipherAlgorithm::Aes, "iv") => "16",
        _ => "any",
    }
}

/// Validate a key/IV pair against the algorithm's size table. The
/// pass-through algorithm accepts anything, including non-hex keys.
pub fn validate_lengths(
    algorithm: CipherAlgorithm,
    key: &str,
    iv: &str,
) -> Result<(), CipherError> {
    if algorithm == CipherAlgorithm::None {
        return Ok(());
    }
    if !hex::is_even_hex(key) || key.is_empty() {
        return Err(CipherError::NotHex { role: "key" });
    }
    let key_len = hex::byte_len(key);
    if !algorithm.key_lengths().contains(&key_len) {
        return Err(CipherError::InvalidLength {
            role: "key",
            algorithm: algorithm.name(),
            got: key_len,
            expected: expected_text(algorithm, "key"),
        });
    }
    if let Some(required) = algorithm.iv_length() {
        if !hex::is_even_hex(iv) || iv.is_empty() {
            return Err(CipherError::NotHex { role: "iv" });
        }
        let iv_len = hex::byte_len(iv);
        if iv_len != required {
            return Err(CipherError::InvalidLength {
                role: "iv",
                algorithm: algorithm.name(),
                got: iv_len,
                expected: expected_text(algorithm, "iv"),
            });
        }
    }
    Ok(())
}

/// The symmetric-cipher capability the engine calls into. Inputs are
/// raw bytes; length validation has already happened against the table
/// above by the time a provider is invoked.
pub trait CipherProvider: Send + Sync {
    fn encrypt(
        &self,
        algorithm: CipherAlgorithm,
        key: &[u8],
        iv: &[u8],
        data: &[u8],
    ) -> Result<Vec<u8>, CipherError>;

    fn decrypt(
        &self,
        algorithm: CipherAlgorithm,
        key: &[u8],
        iv: &[u8],
        data: &[u8],
    ) -> Result<Vec<u8>, CipherError>;
}
