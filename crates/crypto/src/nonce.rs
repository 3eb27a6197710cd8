//! Nonce construction: `be32(unix_seconds) || be64(counter)`.
//!
//! Uniqueness comes from the counter alone. The timestamp half is the low
//! 32 bits of epoch seconds and wraps silently.

use resiliot_core::unix_seconds;

use crate::counter::{CounterResult, NonceCounter};

/// Nonce size for ChaCha20-Poly1305 (96 bits / 12 bytes).
pub const NONCE_SIZE: usize = 12;

/// A 12-byte AEAD nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    /// Timestamp half (low 32 bits of epoch seconds at build time).
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// Counter half.
    pub fn counter(&self) -> u64 {
        let mut counter = [0u8; 8];
        counter.copy_from_slice(&self.0[4..]);
        u64::from_be_bytes(counter)
    }
}

/// Builds nonces from the system clock and a durable counter.
#[derive(Debug)]
pub struct NonceBuilder<C> {
    counter: C,
}

impl<C: NonceCounter> NonceBuilder<C> {
    pub fn new(counter: C) -> Self {
        Self { counter }
    }

    /// Build a nonce for the current time.
    pub fn build(&self) -> CounterResult<Nonce> {
        self.build_at(unix_seconds())
    }

    /// Build a nonce for an explicit epoch-seconds value.
    pub fn build_at(&self, unix_seconds: u64) -> CounterResult<Nonce> {
        let counter = self.counter.take_next()?;

        let mut bytes = [0u8; NONCE_SIZE];
        bytes[..4].copy_from_slice(&(unix_seconds as u32).to_be_bytes());
        bytes[4..].copy_from_slice(&counter.to_be_bytes());
        Ok(Nonce(bytes))
    }

    pub fn counter(&self) -> &C {
        &self.counter
    }
}
