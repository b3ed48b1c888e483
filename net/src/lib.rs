// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Checked identifier types shared by the discovery and router daemons.

#![deny(
    unsafe_code,
    clippy::all,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

mod ifname;
mod stack;
mod vni;

pub use ifname::{InterfaceName, InvalidInterfaceName};
pub use stack::{InvalidStackId, StackId};
pub use vni::{InvalidVni, Vni};

/// The IANA-assigned UDP port for VXLAN encapsulation.
pub const VXLAN_PORT: u16 = 4789;
