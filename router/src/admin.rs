// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The kernel-administration surface used by the reconcilers.
//!
//! Everything the router does to the kernel goes through the three traits
//! below, which exist so reconcilers can be exercised against recording
//! fakes.  Link, address and route programming speak netlink directly;
//! FDB entries go through the `bridge` tool because head-end replication
//! needs append semantics (many remote endpoints under the all-zeros MAC)
//! which the netlink neighbour API here does not express.

use futures::TryStreamExt;
use ipnet::Ipv4Net;
use net::{InterfaceName, Vni, VXLAN_PORT};
use rtnetlink::packet_route::address::AddressAttribute;
use rtnetlink::packet_route::link::{InfoData, InfoVxlan, LinkAttribute};
use rtnetlink::{Handle, LinkUnspec, LinkVxlan, RouteMessageBuilder};
use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use tokio::process::Command;

/// The all-zeros MAC under which head-end replication endpoints are listed.
pub const ZERO_MAC: &str = "00:00:00:00:00:00";

/// Kernel mutation and query failures.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error(transparent)]
    Netlink(#[from] rtnetlink::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("`{command}` failed: {detail}")]
    Command { command: String, detail: String },
    #[error("interface {0} does not exist")]
    MissingLink(InterfaceName),
}

/// Link and address operations needed by the VXLAN device reconciler.
pub trait LinkAdmin {
    /// The interface index of `name`, or `None` when no such link exists.
    fn link_index(
        &self,
        name: &InterfaceName,
    ) -> impl Future<Output = Result<Option<u32>, AdminError>> + Send;

    /// Create a VXLAN link bound to `local` with the standard VXLAN port.
    fn create_vtep(
        &self,
        name: &InterfaceName,
        vni: Vni,
        local: Ipv4Addr,
    ) -> impl Future<Output = Result<(), AdminError>> + Send;

    /// Assign `addr/prefix_len` to the link.
    fn add_address(
        &self,
        index: u32,
        addr: Ipv4Addr,
        prefix_len: u8,
    ) -> impl Future<Output = Result<(), AdminError>> + Send;

    /// The IPv4 addresses currently assigned to the link.
    fn addresses(
        &self,
        index: u32,
    ) -> impl Future<Output = Result<Vec<Ipv4Addr>, AdminError>> + Send;

    /// Set the link administratively UP.
    fn set_up(&self, index: u32) -> impl Future<Output = Result<(), AdminError>> + Send;

    /// Delete the link.
    fn delete_link(&self, index: u32) -> impl Future<Output = Result<(), AdminError>> + Send;
}

/// Route operations needed by the route reconciler.
pub trait RouteAdmin {
    /// `ip route add <dest> via <via> dev <dev>`.
    fn add_route(
        &self,
        dest: Ipv4Net,
        via: Ipv4Addr,
        dev: &InterfaceName,
    ) -> impl Future<Output = Result<(), AdminError>> + Send;

    /// `ip route del <dest> dev <dev>`.
    fn del_route(
        &self,
        dest: Ipv4Net,
        dev: &InterfaceName,
    ) -> impl Future<Output = Result<(), AdminError>> + Send;
}

/// FDB operations needed by the FDB reconciler.
pub trait FdbAdmin {
    /// Append a head-end replication entry for `dst` on `dev`.
    fn append_entry(
        &self,
        dev: &InterfaceName,
        dst: Ipv4Addr,
    ) -> impl Future<Output = Result<(), AdminError>> + Send;

    /// Delete the head-end replication entry for `dst` on `dev`.
    fn delete_entry(
        &self,
        dev: &InterfaceName,
        dst: Ipv4Addr,
    ) -> impl Future<Output = Result<(), AdminError>> + Send;
}

/// Allow packets arriving on the VXLAN device to be forwarded onward.
///
/// # Errors
///
/// Returns the underlying I/O error (typically missing privileges).
pub fn enable_ipv4_forwarding() -> io::Result<()> {
    std::fs::write("/proc/sys/net/ipv4/ip_forward", "1")
}

/// Production link/address/route administration over a netlink handle.
#[derive(Clone, Debug)]
pub struct Netlink {
    handle: Handle,
}

impl Netlink {
    /// Open a netlink connection; the I/O task is spawned onto the current
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns the socket error if the netlink connection cannot be opened.
    pub fn connect() -> io::Result<Netlink> {
        let (connection, handle, _) = rtnetlink::new_connection()?;
        tokio::spawn(connection);
        Ok(Netlink { handle })
    }

    async fn index_of(&self, name: &InterfaceName) -> Result<Option<u32>, AdminError> {
        let mut links = self.handle.link().get().execute();
        while let Some(link) = links.try_next().await? {
            let matches = link
                .attributes
                .iter()
                .any(|attr| matches!(attr, LinkAttribute::IfName(n) if n == name.as_ref()));
            if matches {
                return Ok(Some(link.header.index));
            }
        }
        Ok(None)
    }

    async fn require_index(&self, name: &InterfaceName) -> Result<u32, AdminError> {
        self.index_of(name)
            .await?
            .ok_or_else(|| AdminError::MissingLink(name.clone()))
    }
}

impl LinkAdmin for Netlink {
    async fn link_index(&self, name: &InterfaceName) -> Result<Option<u32>, AdminError> {
        self.index_of(name).await
    }

    async fn create_vtep(
        &self,
        name: &InterfaceName,
        vni: Vni,
        local: Ipv4Addr,
    ) -> Result<(), AdminError> {
        let message = LinkVxlan::new(name.as_ref(), vni.as_u32())
            .set_info_data(InfoData::Vxlan(vec![
                InfoVxlan::Id(vni.as_u32()),
                InfoVxlan::Port(VXLAN_PORT),
                InfoVxlan::Local(local),
            ]))
            .build();
        self.handle.link().add(message).execute().await?;
        Ok(())
    }

    async fn add_address(
        &self,
        index: u32,
        addr: Ipv4Addr,
        prefix_len: u8,
    ) -> Result<(), AdminError> {
        self.handle
            .address()
            .add(index, IpAddr::V4(addr), prefix_len)
            .execute()
            .await?;
        Ok(())
    }

    async fn addresses(&self, index: u32) -> Result<Vec<Ipv4Addr>, AdminError> {
        let mut out = Vec::new();
        let mut addresses = self
            .handle
            .address()
            .get()
            .set_link_index_filter(index)
            .execute();
        while let Some(message) = addresses.try_next().await? {
            for attr in &message.attributes {
                if let AddressAttribute::Address(IpAddr::V4(addr)) = attr {
                    out.push(*addr);
                }
            }
        }
        Ok(out)
    }

    async fn set_up(&self, index: u32) -> Result<(), AdminError> {
        self.handle
            .link()
            .set(LinkUnspec::new_with_index(index).up().build())
            .execute()
            .await?;
        Ok(())
    }

    async fn delete_link(&self, index: u32) -> Result<(), AdminError> {
        self.handle.link().del(index).execute().await?;
        Ok(())
    }
}

impl RouteAdmin for Netlink {
    async fn add_route(
        &self,
        dest: Ipv4Net,
        via: Ipv4Addr,
        dev: &InterfaceName,
    ) -> Result<(), AdminError> {
        let index = self.require_index(dev).await?;
        let route = RouteMessageBuilder::<Ipv4Addr>::new()
            .destination_prefix(dest.addr(), dest.prefix_len())
            .gateway(via)
            .output_interface(index)
            .build();
        self.handle.route().add(route).execute().await?;
        Ok(())
    }

    async fn del_route(&self, dest: Ipv4Net, dev: &InterfaceName) -> Result<(), AdminError> {
        let index = self.require_index(dev).await?;
        let route = RouteMessageBuilder::<Ipv4Addr>::new()
            .destination_prefix(dest.addr(), dest.prefix_len())
            .output_interface(index)
            .build();
        self.handle.route().del(route).execute().await?;
        Ok(())
    }
}

/// Production FDB administration through the `bridge` tool.
#[derive(Copy, Clone, Debug, Default)]
pub struct BridgeCli;

impl BridgeCli {
    async fn run(args: &[&str]) -> Result<(), AdminError> {
        let output = Command::new("bridge").args(args).output().await?;
        if output.status.success() {
            return Ok(());
        }
        let detail = String::from_utf8_lossy(&output.stderr).trim().to_string();
        // appending an entry that exists and deleting one that does not are
        // both no-ops as far as the reconciler is concerned
        if detail.contains("File exists") || detail.contains("No such") {
            return Ok(());
        }
        Err(AdminError::Command {
            command: format!("bridge {}", args.join(" ")),
            detail,
        })
    }
}

impl FdbAdmin for BridgeCli {
    async fn append_entry(&self, dev: &InterfaceName, dst: Ipv4Addr) -> Result<(), AdminError> {
        let dst = dst.to_string();
        Self::run(&["fdb", "append", ZERO_MAC, "dev", dev.as_ref(), "dst", dst.as_str()]).await
    }

    async fn delete_entry(&self, dev: &InterfaceName, dst: Ipv4Addr) -> Result<(), AdminError> {
        let dst = dst.to_string();
        Self::run(&["fdb", "del", ZERO_MAC, "dev", dev.as_ref(), "dst", dst.as_str()]).await
    }
}
