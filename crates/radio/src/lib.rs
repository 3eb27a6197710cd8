//! Radio side of the base station
//!
//! - [`Ingestor`]: authenticated frames in, validated readings stored
//! - [`UdpFrameSource`] and [`run_receive_loop`]: the blocking receive path
//! - [`BroadcastSender`]: encrypted alert level out over UDP broadcast

pub mod broadcast;
pub mod ingest;
pub mod source;

pub use broadcast::{BroadcastError, BroadcastOutcome, BroadcastSender, DatagramSink, UdpBroadcast};
pub use ingest::{DropReason, FrameHandler, FrameOutcome, IngestStats, Ingestor};
pub use source::{run_receive_loop, FrameSource, UdpFrameSource};
