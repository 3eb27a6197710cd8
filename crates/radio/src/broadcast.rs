//! Encrypted alert broadcast
//!
//! The alert level's text form is sealed in an envelope and sent as a
//! single UDP datagram to the local broadcast address. Delivery is best
//! effort: network errors are logged and reported, never raised. Only a
//! nonce counter failure is an error, since then nothing may be sent.

use std::io;
use std::net::{SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use resiliot_core::{AlertLevel, BroadcastConfig};
use resiliot_crypto::{AeadEnvelope, EnvelopeResult, NonceBuilder, NonceCounter};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("Failed to prepare broadcast socket: {0}")]
    Socket(#[source] io::Error),

    #[error("Failed to send to {target}: {source}")]
    Send {
        target: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Short send: {sent} of {expected} bytes")]
    ShortSend { sent: usize, expected: usize },
}

/// Transport for one outbound datagram.
pub trait DatagramSink {
    /// Send `payload` as a single datagram, returning the bytes written.
    fn send_datagram(&self, payload: &[u8]) -> Result<usize, BroadcastError>;
}

impl<T: DatagramSink + ?Sized> DatagramSink for &T {
    fn send_datagram(&self, payload: &[u8]) -> Result<usize, BroadcastError> {
        (**self).send_datagram(payload)
    }
}

/// UDP broadcast on the configured interface.
///
/// A fresh socket is opened per send so an interface that comes up after
/// start-up is picked without restarting.
#[derive(Debug, Clone)]
pub struct UdpBroadcast {
    target: SocketAddrV4,
    interface: Option<String>,
    timeout: Duration,
}

impl UdpBroadcast {
    pub fn new(target: SocketAddrV4, interface: Option<String>, timeout: Duration) -> Self {
        Self {
            target,
            interface: interface.filter(|name| !name.is_empty()),
            timeout,
        }
    }

    pub fn from_config(config: &BroadcastConfig) -> Self {
        Self::new(
            config.target(),
            config.interface.clone(),
            config.timeout(),
        )
    }

    pub fn target(&self) -> SocketAddrV4 {
        self.target
    }

    fn open_socket(&self) -> io::Result<UdpSocket> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_broadcast(true)?;
        socket.set_write_timeout(Some(self.timeout))?;

        if let Some(interface) = &self.interface {
            // Without the binding the routing table picks the interface
            if let Err(e) = bind_to_device(&socket, interface) {
                debug!(interface = %interface, error = %e, "SO_BINDTODEVICE unavailable, using default route");
            }
        }
        Ok(socket)
    }
}

impl DatagramSink for UdpBroadcast {
    fn send_datagram(&self, payload: &[u8]) -> Result<usize, BroadcastError> {
        let socket = self.open_socket().map_err(BroadcastError::Socket)?;
        let target = SocketAddr::V4(self.target);

        let sent = socket
            .send_to(payload, target)
            .map_err(|source| BroadcastError::Send { target, source })?;
        if sent != payload.len() {
            return Err(BroadcastError::ShortSend {
                sent,
                expected: payload.len(),
            });
        }
        Ok(sent)
    }
}

#[cfg(target_os = "linux")]
fn bind_to_device(socket: &UdpSocket, interface: &str) -> io::Result<()> {
    use std::ffi::CString;
    use std::os::fd::AsRawFd;

    let name = CString::new(interface)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let len = name.as_bytes_with_nul().len() as libc::socklen_t;

    // SAFETY: the fd belongs to `socket`, which is open for the whole call.
    // `name` is a valid null-terminated C string and `len` is its size
    // including the terminator.
    let result = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_BINDTODEVICE,
            name.as_ptr().cast(),
            len,
        )
    };

    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn bind_to_device(_socket: &UdpSocket, _interface: &str) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "SO_BINDTODEVICE is Linux only",
    ))
}

/// What happened to a broadcast attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BroadcastOutcome {
    Sent { bytes: usize },
    /// Network failure; already logged
    Failed,
}

/// Seals alert levels and hands them to a [`DatagramSink`].
pub struct BroadcastSender<S, C> {
    envelope: AeadEnvelope,
    nonces: NonceBuilder<C>,
    sink: S,
}

impl<S: DatagramSink, C: NonceCounter> BroadcastSender<S, C> {
    pub fn new(envelope: AeadEnvelope, nonces: NonceBuilder<C>, sink: S) -> Self {
        Self {
            envelope,
            nonces,
            sink,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Encrypt and broadcast `level`.
    ///
    /// Fails only if a nonce could not be reserved.
    pub fn send(&self, level: AlertLevel) -> EnvelopeResult<BroadcastOutcome> {
        let payload = self.envelope.encode(&self.nonces, level.as_str().as_bytes())?;

        match self.sink.send_datagram(&payload) {
            Ok(bytes) => {
                info!(level = %level, bytes, "Alert broadcast");
                Ok(BroadcastOutcome::Sent { bytes })
            }
            Err(e) => {
                warn!(level = %level, error = %e, "Alert broadcast failed");
                Ok(BroadcastOutcome::Failed)
            }
        }
    }
}
