// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! VXLAN device reconciliation.

use crate::admin::{AdminError, LinkAdmin};
use net::{InterfaceName, Vni};
use std::net::Ipv4Addr;
use tracing::{info, warn};

/// Overlay addresses are assigned with a /24, matching the overlay subnet.
pub const OVERLAY_PREFIX_LEN: u8 = 24;

/// The intended state of the VXLAN device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VtepSpec {
    pub name: InterfaceName,
    pub vni: Vni,
    /// Underlay source address the tunnel is bound to.
    pub host_ip: Ipv4Addr,
    /// Overlay address assigned to the device (`/24`).
    pub overlay_ip: Ipv4Addr,
}

impl VtepSpec {
    /// A spec for `vni`, named `vxlan<VNI>` by convention.
    #[must_use]
    pub fn new(vni: Vni, host_ip: Ipv4Addr, overlay_ip: Ipv4Addr) -> VtepSpec {
        VtepSpec {
            name: InterfaceName::for_vni(vni),
            vni,
            host_ip,
            overlay_ip,
        }
    }
}

/// Creates, adjusts and tears down the VXLAN device.
#[derive(Debug)]
pub struct VtepManager<A> {
    admin: A,
    spec: VtepSpec,
}

impl<A: LinkAdmin> VtepManager<A> {
    pub fn new(admin: A, spec: VtepSpec) -> VtepManager<A> {
        VtepManager { admin, spec }
    }

    #[must_use]
    pub fn spec(&self) -> &VtepSpec {
        &self.spec
    }

    /// Drive the device to the intended state.
    ///
    /// A missing device is created, addressed, and brought UP; failures on
    /// that path are fatal.  An existing device is adjusted instead, and
    /// adjustment failures only warn: another instance may be managing it.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError`] when the device must be created and any
    /// creation step fails.
    pub async fn ensure(&self) -> Result<(), AdminError> {
        let VtepSpec {
            name,
            vni,
            host_ip,
            overlay_ip,
        } = &self.spec;

        match self.admin.link_index(name).await? {
            Some(index) => {
                match self.admin.addresses(index).await {
                    Ok(addrs) if addrs.contains(overlay_ip) => {}
                    Ok(_) => {
                        if let Err(err) = self
                            .admin
                            .add_address(index, *overlay_ip, OVERLAY_PREFIX_LEN)
                            .await
                        {
                            warn!(device = %name, %err, "could not assign overlay address");
                        }
                    }
                    Err(err) => warn!(device = %name, %err, "could not list addresses"),
                }
                if let Err(err) = self.admin.set_up(index).await {
                    warn!(device = %name, %err, "could not bring device up");
                }
                info!(device = %name, ip = %overlay_ip, "vxlan device already present");
            }
            None => {
                self.admin.create_vtep(name, *vni, *host_ip).await?;
                let index = self
                    .admin
                    .link_index(name)
                    .await?
                    .ok_or_else(|| AdminError::MissingLink(name.clone()))?;
                self.admin
                    .add_address(index, *overlay_ip, OVERLAY_PREFIX_LEN)
                    .await?;
                self.admin.set_up(index).await?;
                info!(device = %name, vni = %vni, ip = %overlay_ip, "vxlan device created");
            }
        }
        Ok(())
    }

    /// Delete the device if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError`] if the existence check or the delete fails.
    pub async fn teardown(&self) -> Result<(), AdminError> {
        if let Some(index) = self.admin.link_index(&self.spec.name).await? {
            self.admin.delete_link(index).await?;
            info!(device = %self.spec.name, "vxlan device deleted");
        }
        Ok(())
    }
}
