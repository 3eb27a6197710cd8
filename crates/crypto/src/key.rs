//! Pre-shared key handling

use std::fmt;
use std::path::Path;

use rand::RngCore;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Key size for ChaCha20-Poly1305
pub const KEY_SIZE: usize = 32;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Invalid key encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("Invalid key length: expected {KEY_SIZE} bytes, got {0}")]
    InvalidLength(usize),

    #[error("Failed to read key file: {0}")]
    Io(#[from] std::io::Error),
}

/// 256-bit secret shared by every node and the base station.
///
/// Zeroized on drop; `Debug` never prints key material.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedKey([u8; KEY_SIZE]);

impl SharedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character hex string (surrounding whitespace ignored).
    pub fn from_hex(text: &str) -> Result<Self, KeyError> {
        let mut decoded = hex::decode(text.trim())?;
        let key = Self::from_slice(&decoded);
        decoded.zeroize();
        key
    }

    /// Read a key file containing exactly 32 raw bytes.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, KeyError> {
        let mut raw = std::fs::read(path)?;
        let key = Self::from_slice(&raw);
        raw.zeroize();
        key
    }

    /// Fresh random key, for provisioning and tests.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let array: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidLength(bytes.len()))?;
        Ok(Self(array))
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(..)")
    }
}
