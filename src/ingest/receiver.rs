use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, info, trace, warn};

use crate::config::MAX_PAYLOAD_BYTES;
use crate::error::{AppError, Result};
use crate::ingest::parse::parse_sample;
use crate::state::CollectorState;

/// Pause after an unexpected socket error so a persistent fault cannot spin the loop.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Build the inbound UDP socket: enlarged receive buffer, non-blocking,
/// registered with the tokio reactor. Any failure to bind is fatal for the
/// collector. SO_REUSEADDR is left off so a second collector on the same port
/// fails instead of silently splitting the stream.
pub fn bind_socket(addr: SocketAddr, recv_buffer_bytes: usize) -> Result<UdpSocket> {
    let bind_err = |source: std::io::Error| AppError::Bind { addr, source };

    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(bind_err)?;

    // The kernel may refuse or clamp the size; a smaller buffer only means
    // earlier drops under burst, so carry on.
    if let Err(e) = socket.set_recv_buffer_size(recv_buffer_bytes) {
        warn!("Could not set SO_RCVBUF to {recv_buffer_bytes} bytes: {e}");
    }
    match socket.recv_buffer_size() {
        Ok(effective) if effective < recv_buffer_bytes => warn!(
            requested = recv_buffer_bytes,
            effective,
            "UDP receive buffer clamped by the kernel ({effective} < {recv_buffer_bytes} bytes); bursts may be dropped"
        ),
        Ok(effective) => debug!(requested = recv_buffer_bytes, effective, "UDP receive buffer sized"),
        Err(e) => debug!("Could not read back SO_RCVBUF: {e}"),
    }

    socket.set_nonblocking(true).map_err(bind_err)?;
    socket.bind(&addr.into()).map_err(bind_err)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).map_err(bind_err)
}

/// Reads latency datagrams and appends accepted samples to the live window.
/// Never touches the sink or the console on the hot path.
pub struct Receiver {
    socket: UdpSocket,
    state: Arc<CollectorState>,
    recv_timeout: Duration,
}

impl Receiver {
    pub fn new(socket: UdpSocket, state: Arc<CollectorState>, recv_timeout: Duration) -> Self {
        Self {
            socket,
            state,
            recv_timeout,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Runs until the running flag clears. Each receive waits at most
    /// `recv_timeout`, which bounds how long shutdown waits for this loop.
    pub async fn run(self) {
        let mut buf = [0u8; MAX_PAYLOAD_BYTES];

        while self.state.is_running() {
            match tokio::time::timeout(self.recv_timeout, self.socket.recv_from(&mut buf)).await {
                // Timeout expiry is the normal path for re-checking the flag.
                Err(_) => continue,
                Ok(Ok((len, peer))) => match parse_sample(&buf[..len]) {
                    Some(sample_ms) => self.state.record(sample_ms),
                    None => trace!(%peer, len, "dropped malformed datagram"),
                },
                Ok(Err(e)) => {
                    if self.state.is_running() {
                        warn!("UDP receive error: {e}");
                        tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                    }
                }
            }
        }

        info!("Receiver stopped");
    }
}
