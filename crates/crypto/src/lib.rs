//! Cryptographic primitives for the ResilIoT telemetry link.
//!
//! All nodes and the base station share a single 32-byte secret. Every
//! message travels in an envelope:
//!
//! ```text
//! nonce (12 bytes) || ciphertext (N bytes) || Poly1305 tag (16 bytes)
//! ```
//!
//! # Nonce uniqueness
//!
//! ChaCha20-Poly1305 breaks down completely if a nonce is reused under the
//! same key, so the sender never draws nonces at random. Each nonce carries
//! a durable 64-bit counter that survives restarts:
//!
//! - [`PersistentCounter`] stores the counter on disk and only hands out a
//!   value after its successor has been fsynced and renamed into place
//! - [`NonceBuilder`] prefixes the counter with the low 32 bits of the wall
//!   clock
//! - [`AeadEnvelope`] seals and opens envelopes with the shared key
//!
//! The counter file must never be copied between devices or rolled back,
//! and two live processes must never share one counter file.

pub mod counter;
pub mod envelope;
pub mod key;
pub mod nonce;

pub use counter::{CounterError, CounterResult, MemoryCounter, NonceCounter, PersistentCounter};
pub use envelope::{
    AeadEnvelope, EnvelopeError, EnvelopeResult, ENVELOPE_OVERHEAD, MIN_ENVELOPE_LEN, TAG_SIZE,
};
pub use key::{KeyError, SharedKey, KEY_SIZE};
pub use nonce::{Nonce, NonceBuilder, NONCE_SIZE};
