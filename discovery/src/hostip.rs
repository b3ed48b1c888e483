// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Local underlay address and interface detection.
//!
//! The kernel already knows which source address and device it would use to
//! reach a given destination; connecting a throwaway UDP socket surfaces that
//! choice without sending a single packet and without parsing `ip route get`
//! output.

use nix::ifaddrs::getifaddrs;
use nix::net::if_::InterfaceFlags;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

/// The well-known destination used to pick the default underlay address.
pub const DEFAULT_PROBE: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(8, 8, 8, 8), 80);

/// The source IPv4 address the kernel routes toward `probe`.
///
/// # Errors
///
/// Returns an I/O error when no route to `probe` exists or the chosen source
/// is not IPv4.
pub fn detect_host_ip(probe: SocketAddrV4) -> io::Result<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect(probe)?;
    match socket.local_addr()? {
        std::net::SocketAddr::V4(addr) => Ok(*addr.ip()),
        std::net::SocketAddr::V6(addr) => Err(io::Error::other(format!(
            "kernel picked a non-IPv4 source address {addr} for {probe}"
        ))),
    }
}

/// An interface eligible for multicast membership.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct McastInterface {
    pub name: String,
    pub addr: Ipv4Addr,
}

/// Every IPv4 address on an interface that is both UP and multicast-capable.
///
/// # Errors
///
/// Returns the underlying errno when the interface list cannot be read.
pub fn multicast_interfaces() -> Result<Vec<McastInterface>, nix::errno::Errno> {
    let mut out = Vec::new();
    for entry in getifaddrs()? {
        if !entry.flags.contains(InterfaceFlags::IFF_UP)
            || !entry.flags.contains(InterfaceFlags::IFF_MULTICAST)
        {
            continue;
        }
        let Some(addr) = entry.address.as_ref().and_then(|a| a.as_sockaddr_in()) else {
            continue;
        };
        out.push(McastInterface {
            name: entry.interface_name,
            addr: addr.ip(),
        });
    }
    Ok(out)
}

/// The name of the interface holding `ip`, if any.
///
/// Used to report the underlay device a detected host address lives on;
/// absence is harmless (the VXLAN device is bound by source address, not by
/// name).
#[must_use]
pub fn device_for_ip(ip: Ipv4Addr) -> Option<String> {
    let addrs = getifaddrs().ok()?;
    for entry in addrs {
        let Some(addr) = entry.address.as_ref().and_then(|a| a.as_sockaddr_in()) else {
            continue;
        };
        if addr.ip() == ip {
            return Some(entry.interface_name);
        }
    }
    None
}
