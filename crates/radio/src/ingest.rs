//! Receive path: envelope → validator → store
//!
//! Every frame is handled to completion before the next one. Nothing that
//! arrives over the air can stop the loop; bad frames are counted and
//! logged.

use chrono::{DateTime, Utc};
use resiliot_crypto::{AeadEnvelope, EnvelopeError};
use resiliot_telemetry::{InsertOutcome, PacketValidator, ReadingStore};
use serde::Serialize;
use tracing::{debug, error, warn};

/// Why a frame did not produce a stored reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DropReason {
    /// Too short or failed authentication
    Envelope,
    /// Authenticated but not a valid reading
    Packet,
    /// Valid reading that the store refused
    Store,
}

/// Result of handling one radio frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrameOutcome {
    Stored,
    Duplicate,
    /// Addressed to another node
    Discarded,
    Dropped(DropReason),
}

/// Consumer of raw radio frames.
pub trait FrameHandler {
    fn on_frame(&mut self, frame: &[u8]) -> FrameOutcome;
}

/// Running totals of frame outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub stored: u64,
    pub duplicate: u64,
    pub discarded: u64,
    pub dropped: u64,
}

impl IngestStats {
    pub fn record(&mut self, outcome: FrameOutcome) {
        match outcome {
            FrameOutcome::Stored => self.stored += 1,
            FrameOutcome::Duplicate => self.duplicate += 1,
            FrameOutcome::Discarded => self.discarded += 1,
            FrameOutcome::Dropped(_) => self.dropped += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.stored + self.duplicate + self.discarded + self.dropped
    }
}

/// Decrypts, validates and persists sensor frames.
pub struct Ingestor<S> {
    envelope: AeadEnvelope,
    validator: PacketValidator,
    store: S,
    stats: IngestStats,
}

impl<S: ReadingStore> Ingestor<S> {
    pub fn new(envelope: AeadEnvelope, validator: PacketValidator, store: S) -> Self {
        Self {
            envelope,
            validator,
            store,
            stats: IngestStats::default(),
        }
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Handle a frame received at `received_at`.
    pub fn on_frame_at(&mut self, frame: &[u8], received_at: DateTime<Utc>) -> FrameOutcome {
        let outcome = self.handle(frame, received_at);
        self.stats.record(outcome);
        outcome
    }

    fn handle(&mut self, frame: &[u8], received_at: DateTime<Utc>) -> FrameOutcome {
        debug!(len = frame.len(), frame = %hex::encode(frame), "Frame received");

        let plaintext = match self.envelope.decode(frame) {
            Ok(plaintext) => plaintext,
            Err(EnvelopeError::TooShort(len)) => {
                warn!(len, "Frame too short for envelope, dropped");
                return FrameOutcome::Dropped(DropReason::Envelope);
            }
            Err(e) => {
                warn!(len = frame.len(), reason = %e, "Frame failed authentication, dropped");
                return FrameOutcome::Dropped(DropReason::Envelope);
            }
        };

        let reading = match self.validator.parse_at(&plaintext, received_at) {
            Ok(reading) => reading,
            Err(e) if e.is_discard() => {
                debug!(reason = %e, "Frame for another node ignored");
                return FrameOutcome::Discarded;
            }
            Err(e) => {
                warn!(
                    src = plaintext.get(1).copied().unwrap_or_default(),
                    body = %String::from_utf8_lossy(plaintext.get(2..).unwrap_or_default()),
                    reason = %e,
                    "Invalid reading, dropped"
                );
                return FrameOutcome::Dropped(DropReason::Packet);
            }
        };

        match self.store.insert(&reading) {
            Ok(InsertOutcome::Stored) => FrameOutcome::Stored,
            Ok(InsertOutcome::Duplicate) => FrameOutcome::Duplicate,
            Err(e) => {
                error!(node = %reading.source(), error = %e, "Failed to store reading");
                FrameOutcome::Dropped(DropReason::Store)
            }
        }
    }
}

impl<S: ReadingStore> FrameHandler for Ingestor<S> {
    fn on_frame(&mut self, frame: &[u8]) -> FrameOutcome {
        self.on_frame_at(frame, Utc::now())
    }
}
