// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use core::fmt::{Display, Formatter};
use std::str::FromStr;

/// The identity of an application stack participating in the overlay.
///
/// Stack ids are opaque strings chosen by the operator, globally unique among
/// participants, and used as the primary key of the peer table.  The bounds
/// checked here (non-empty, at most [`StackId::MAX_LEN`] bytes, ASCII graphic
/// characters only) keep every discovery datagram under the protocol's
/// 1024-byte cap.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StackId(String);

impl StackId {
    /// The longest accepted stack id, in bytes.
    pub const MAX_LEN: usize = 128;

    fn check(raw: &str) -> Result<(), InvalidStackId> {
        if raw.is_empty() {
            return Err(InvalidStackId::Empty);
        }
        if raw.len() > StackId::MAX_LEN {
            return Err(InvalidStackId::TooLong(raw.len()));
        }
        match raw.chars().find(|c| !c.is_ascii_graphic()) {
            Some(c) => Err(InvalidStackId::IllegalChar(c)),
            None => Ok(()),
        }
    }
}

impl AsRef<str> for StackId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for StackId {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StackId {
    type Error = InvalidStackId;

    fn try_from(raw: String) -> Result<StackId, Self::Error> {
        StackId::check(&raw)?;
        Ok(StackId(raw))
    }
}

impl TryFrom<&str> for StackId {
    type Error = InvalidStackId;

    fn try_from(raw: &str) -> Result<StackId, Self::Error> {
        StackId::check(raw)?;
        Ok(StackId(raw.to_string()))
    }
}

impl FromStr for StackId {
    type Err = InvalidStackId;

    fn from_str(raw: &str) -> Result<StackId, Self::Err> {
        StackId::try_from(raw)
    }
}

impl From<StackId> for String {
    fn from(id: StackId) -> String {
        id.0
    }
}

/// Rejection reasons for stack id validation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidStackId {
    #[error("stack id must not be empty")]
    Empty,
    #[error("stack id is {0} bytes long (max {max})", max = StackId::MAX_LEN)]
    TooLong(usize),
    #[error("stack id contains illegal character {0:?}")]
    IllegalChar(char),
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use super::StackId;
    use bolero::{Driver, TypeGenerator};

    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789-_.";

    impl TypeGenerator for StackId {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            let len = driver.produce::<usize>()? % 24 + 1;
            let mut raw = String::with_capacity(len);
            for _ in 0..len {
                let idx = driver.produce::<usize>()? % ALPHABET.len();
                raw.push(char::from(ALPHABET[idx]));
            }
            StackId::try_from(raw).ok()
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn empty_is_rejected() {
        assert_eq!(StackId::try_from("").unwrap_err(), InvalidStackId::Empty);
    }

    #[test]
    fn whitespace_and_controls_are_rejected() {
        assert_eq!(
            StackId::try_from("stack a").unwrap_err(),
            InvalidStackId::IllegalChar(' ')
        );
        assert_eq!(
            StackId::try_from("stack\na").unwrap_err(),
            InvalidStackId::IllegalChar('\n')
        );
    }

    #[test]
    fn oversize_is_rejected() {
        let raw = "x".repeat(StackId::MAX_LEN + 1);
        assert_eq!(
            StackId::try_from(raw).unwrap_err(),
            InvalidStackId::TooLong(StackId::MAX_LEN + 1)
        );
    }

    #[test]
    fn max_len_is_accepted() {
        let raw = "x".repeat(StackId::MAX_LEN);
        assert_eq!(StackId::try_from(raw.as_str()).unwrap().as_ref(), raw);
    }

    #[test]
    fn generated_ids_are_valid() {
        bolero::check!().with_type().for_each(|id: &StackId| {
            assert!(StackId::try_from(id.as_ref()).is_ok());
        });
    }
}
