// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::Vni;
use core::fmt::{Display, Formatter};
use std::str::FromStr;

/// A string which has been checked to be a legal Linux network interface name.
///
/// Linux limits interface names to 15 bytes (16 including the terminating
/// null) drawn from alphanumeric ASCII plus `.`, `-`, and `_`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InterfaceName(String);

impl InterfaceName {
    /// The longest legal interface name, in bytes (excluding the null).
    pub const MAX_LEN: usize = 15;

    /// The name of the VXLAN device serving `vni`: `vxlan<VNI>`.
    ///
    /// Always legal: `vxlan` plus at most 8 digits is 13 bytes.
    #[must_use]
    pub fn for_vni(vni: Vni) -> InterfaceName {
        InterfaceName(format!("vxlan{vni}"))
    }

    fn check(raw: &str) -> Result<(), InvalidInterfaceName> {
        if raw.is_empty() {
            return Err(InvalidInterfaceName::Empty);
        }
        if raw.len() > InterfaceName::MAX_LEN {
            return Err(InvalidInterfaceName::TooLong(raw.len()));
        }
        let legal = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_');
        match raw.chars().find(|c| !legal(*c)) {
            Some(c) => Err(InvalidInterfaceName::IllegalChar(c)),
            None => Ok(()),
        }
    }
}

impl AsRef<str> for InterfaceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for InterfaceName {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for InterfaceName {
    type Error = InvalidInterfaceName;

    fn try_from(raw: String) -> Result<InterfaceName, Self::Error> {
        InterfaceName::check(&raw)?;
        Ok(InterfaceName(raw))
    }
}

impl TryFrom<&str> for InterfaceName {
    type Error = InvalidInterfaceName;

    fn try_from(raw: &str) -> Result<InterfaceName, Self::Error> {
        InterfaceName::check(raw)?;
        Ok(InterfaceName(raw.to_string()))
    }
}

impl FromStr for InterfaceName {
    type Err = InvalidInterfaceName;

    fn from_str(raw: &str) -> Result<InterfaceName, Self::Err> {
        InterfaceName::try_from(raw)
    }
}

impl From<InterfaceName> for String {
    fn from(name: InterfaceName) -> String {
        name.0
    }
}

/// Rejection reasons for interface name validation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidInterfaceName {
    #[error("interface name must not be empty")]
    Empty,
    #[error("interface name is {0} bytes long (max {max})", max = InterfaceName::MAX_LEN)]
    TooLong(usize),
    #[error("interface name contains illegal character {0:?}")]
    IllegalChar(char),
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn typical_names_are_accepted() {
        for name in ["eth0", "vxlan100", "br-overlay", "veth_a.42"] {
            assert_eq!(InterfaceName::try_from(name).unwrap().as_ref(), name);
        }
    }

    #[test]
    fn empty_and_oversize_are_rejected() {
        assert_eq!(
            InterfaceName::try_from("").unwrap_err(),
            InvalidInterfaceName::Empty
        );
        assert_eq!(
            InterfaceName::try_from("abcdefghijklmnop").unwrap_err(),
            InvalidInterfaceName::TooLong(16)
        );
    }

    #[test]
    fn illegal_characters_are_rejected() {
        assert_eq!(
            InterfaceName::try_from("eth 0").unwrap_err(),
            InvalidInterfaceName::IllegalChar(' ')
        );
        assert_eq!(
            InterfaceName::try_from("eth/0").unwrap_err(),
            InvalidInterfaceName::IllegalChar('/')
        );
    }

    #[test]
    fn vni_names_are_always_legal() {
        bolero::check!().with_type().cloned().for_each(|vni: Vni| {
            let name = InterfaceName::for_vni(vni);
            assert!(InterfaceName::try_from(name.as_ref()).is_ok());
            assert_eq!(name.as_ref(), format!("vxlan{}", vni.as_u32()));
        });
    }
}
