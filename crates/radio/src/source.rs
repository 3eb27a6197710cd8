//! Radio frame sources
//!
//! The LoRa driver runs out of process and forwards each received payload
//! as one UDP datagram. [`UdpFrameSource`] is the receiving end of that hop.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{info, warn};

use crate::ingest::{FrameHandler, IngestStats};

/// How often a blocked receive wakes up to check for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Blocking supplier of raw radio frames.
pub trait FrameSource {
    /// Wait for the next frame. `Ok(None)` means nothing arrived before the
    /// source's poll interval elapsed.
    fn next_frame(&mut self) -> io::Result<Option<Vec<u8>>>;
}

/// Frames delivered as UDP datagrams by the radio daemon.
#[derive(Debug)]
pub struct UdpFrameSource {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl UdpFrameSource {
    /// Bind to `addr`. Datagrams longer than `max_frame_len` are truncated
    /// by the kernel and will then fail authentication.
    pub fn bind(addr: SocketAddr, max_frame_len: usize) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;
        info!(addr = %socket.local_addr()?, "Listening for radio frames");

        Ok(Self {
            socket,
            buf: vec![0u8; max_frame_len],
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl FrameSource for UdpFrameSource {
    fn next_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        match self.socket.recv_from(&mut self.buf) {
            Ok((len, _peer)) => Ok(Some(self.buf[..len].to_vec())),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Feed frames from `source` to `handler` until `shutdown` is set.
///
/// Receive errors are logged and the loop carries on.
pub fn run_receive_loop<F, H>(source: &mut F, handler: &mut H, shutdown: &AtomicBool) -> IngestStats
where
    F: FrameSource + ?Sized,
    H: FrameHandler + ?Sized,
{
    let mut stats = IngestStats::default();

    while !shutdown.load(Ordering::Relaxed) {
        match source.next_frame() {
            Ok(Some(frame)) => stats.record(handler.on_frame(&frame)),
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Radio receive failed");
                std::thread::sleep(POLL_INTERVAL);
            }
        }
    }

    info!(
        stored = stats.stored,
        duplicate = stats.duplicate,
        discarded = stats.discarded,
        dropped = stats.dropped,
        "Receive loop stopped"
    );
    stats
}
