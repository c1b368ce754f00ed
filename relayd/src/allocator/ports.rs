use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};

use tokio::net::UdpSocket;

use super::AllocError;

/// Binds relay sockets on the relay interface.
///
/// ports come from the OS ephemeral range; no port prediction or
/// symmetric-NAT friendliness is attempted.
pub struct PortAllocator {
    interface: IpAddr,
}

impl PortAllocator {
    pub fn new(interface: IpAddr) -> Self {
        Self { interface }
    }

    /// bind a fresh relay socket and report its address.
    ///
    /// the bind is retried a bounded number of times when the OS hands
    /// back a port that races with another binder; the socket is released
    /// again by dropping it.
    pub async fn allocate(&self) -> Result<(SocketAddr, UdpSocket), AllocError> {
        for _ in 0..3 {
            match UdpSocket::bind((self.interface, 0)).await {
                Ok(socket) => {
                    let addr = socket.local_addr()?;
                    return Ok((addr, socket));
                }
                Err(e) if e.kind() == ErrorKind::AddrInUse => continue,
                Err(e) => return Err(AllocError::Transport(e)),
            }
        }

        Err(AllocError::Exhausted)
    }
}
