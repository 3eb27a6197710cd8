//! AEAD envelope: `nonce (12) || ciphertext || tag (16)`, no associated data.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce as ChaCha20Nonce,
};
use thiserror::Error;

use crate::counter::{CounterError, NonceCounter};
use crate::key::SharedKey;
use crate::nonce::{NonceBuilder, NONCE_SIZE};

/// Tag size for ChaCha20-Poly1305
pub const TAG_SIZE: usize = 16;

/// Bytes an envelope adds on top of the plaintext.
pub const ENVELOPE_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// Shortest envelope that can carry a nonce and a tag.
pub const MIN_ENVELOPE_LEN: usize = ENVELOPE_OVERHEAD;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Envelope too short: expected at least {MIN_ENVELOPE_LEN} bytes, got {0}")]
    TooShort(usize),

    /// Tag mismatch. Wrong key and tampered ciphertext are not distinguished.
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// The nonce counter could not be advanced durably; nothing was encrypted.
    #[error("Nonce counter unavailable: {0}")]
    Counter(#[from] CounterError),

    #[error("Encryption failed")]
    Encryption,
}

pub type EnvelopeResult<T> = Result<T, EnvelopeError>;

/// Seals and opens envelopes with the pre-shared key.
pub struct AeadEnvelope {
    cipher: ChaCha20Poly1305,
}

impl AeadEnvelope {
    pub fn new(key: &SharedKey) -> Self {
        let key = chacha20poly1305::Key::from_slice(key.as_bytes());
        Self {
            cipher: ChaCha20Poly1305::new(key),
        }
    }

    /// Encrypt `plaintext` under a fresh nonce from `nonces`.
    ///
    /// Fails without producing output if the counter cannot be persisted.
    pub fn encode<C: NonceCounter>(
        &self,
        nonces: &NonceBuilder<C>,
        plaintext: &[u8],
    ) -> EnvelopeResult<Vec<u8>> {
        let nonce = nonces.build()?;

        let sealed = self
            .cipher
            .encrypt(ChaCha20Nonce::from_slice(nonce.as_bytes()), plaintext)
            .map_err(|_| EnvelopeError::Encryption)?;

        let mut envelope = Vec::with_capacity(NONCE_SIZE + sealed.len());
        envelope.extend_from_slice(nonce.as_bytes());
        envelope.extend_from_slice(&sealed);
        Ok(envelope)
    }

    /// Authenticate and decrypt an envelope.
    pub fn decode(&self, envelope: &[u8]) -> EnvelopeResult<Vec<u8>> {
        if envelope.len() < MIN_ENVELOPE_LEN {
            return Err(EnvelopeError::TooShort(envelope.len()));
        }

        let (nonce, sealed) = envelope.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(ChaCha20Nonce::from_slice(nonce), sealed)
            .map_err(|_| EnvelopeError::AuthenticationFailed)
    }
}
