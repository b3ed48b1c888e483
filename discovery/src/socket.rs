// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Multicast socket setup.
//!
//! The discovery port is shared by every stack co-located on a host, so the
//! socket is opened with both address and port reuse before binding.  When
//! the kernel refuses `SO_REUSEPORT` the socket is kept and setup continues:
//! only a single stack per host is supported in that degraded mode.

use crate::hostip::{multicast_interfaces, McastInterface};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// The bound, group-joined UDP socket used by the discovery daemon.
#[derive(Debug)]
pub struct DiscoverySocket {
    socket: UdpSocket,
    group: SocketAddrV4,
}

impl DiscoverySocket {
    /// Open the discovery socket: bind `0.0.0.0:port` with address and port
    /// reuse, then join `group` on every interface that is UP and
    /// multicast-capable.
    ///
    /// # Errors
    ///
    /// Fails when the bind fails or when the group cannot be joined on any
    /// interface.  A join failure on one interface among several is logged
    /// and skipped.
    pub fn open(group: Ipv4Addr, port: u16) -> Result<DiscoverySocket, SocketError> {
        let raw = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        raw.set_reuse_address(true)?;
        if let Err(err) = raw.set_reuse_port(true) {
            warn!(%err, "SO_REUSEPORT unavailable; only one stack per host will work");
        }
        raw.set_nonblocking(true)?;
        let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        raw.bind(&bind_addr.into())?;

        let socket = UdpSocket::from_std(raw.into())?;
        socket.set_multicast_loop_v4(true)?;

        let mut joined = 0usize;
        for McastInterface { name, addr } in multicast_interfaces()? {
            match socket.join_multicast_v4(group, addr) {
                Ok(()) => {
                    debug!(interface = %name, %addr, %group, "joined multicast group");
                    joined += 1;
                }
                Err(err) => {
                    warn!(interface = %name, %addr, %err, "failed to join multicast group");
                }
            }
        }
        if joined == 0 {
            return Err(SocketError::NoMulticastInterfaces(group));
        }

        Ok(DiscoverySocket {
            socket,
            group: SocketAddrV4::new(group, port),
        })
    }

    /// The multicast destination announcements are sent to.
    #[must_use]
    pub fn group(&self) -> SocketAddrV4 {
        self.group
    }

    /// Multicast `payload` to the group.
    ///
    /// # Errors
    ///
    /// Propagates the send error.
    pub async fn send_to_group(&self, payload: &[u8]) -> io::Result<usize> {
        self.socket.send_to(payload, SocketAddr::V4(self.group)).await
    }

    /// Unicast `payload` to `target` (used for `QUERY` replies).
    ///
    /// # Errors
    ///
    /// Propagates the send error.
    pub async fn send_to(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(payload, target).await
    }

    /// Receive one datagram.
    ///
    /// # Errors
    ///
    /// Propagates the receive error.
    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }
}

/// Socket setup failures; all of them are fatal to the daemon.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("cannot list network interfaces: {0}")]
    Interfaces(#[from] nix::errno::Errno),
    #[error("no interface could join multicast group {0}")]
    NoMulticastInterfaces(Ipv4Addr),
}
