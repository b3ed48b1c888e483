// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use core::fmt::{Display, Formatter};
use std::num::NonZero;

/// A VXLAN Network Identifier.
///
/// A `Vni` is the 24-bit tag which selects one overlay among many on the same
/// underlay.  Zero is reserved by most implementations and is rejected here,
/// so the type wraps a [`NonZero<u32>`] and can only be built through
/// [`Vni::new_checked`] (or the equivalent `TryFrom<u32>`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u32", into = "u32")]
#[repr(transparent)]
pub struct Vni(NonZero<u32>);

impl Vni {
    /// The smallest legal VNI (1).
    pub const MIN: u32 = 1;
    /// The largest legal VNI (2^24 - 1).
    pub const MAX: u32 = 0x00FF_FFFF;

    /// Validate `raw` as a VNI.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidVni`] if `raw` is zero or wider than 24 bits.
    pub fn new_checked(raw: u32) -> Result<Vni, InvalidVni> {
        match NonZero::<u32>::new(raw) {
            None => Err(InvalidVni::Zero),
            _ if raw > Vni::MAX => Err(InvalidVni::TooLarge(raw)),
            Some(vni) => Ok(Vni(vni)),
        }
    }

    /// The VNI as a plain `u32`.
    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0.get()
    }
}

impl Display for Vni {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0.get())
    }
}

impl TryFrom<u32> for Vni {
    type Error = InvalidVni;

    fn try_from(raw: u32) -> Result<Vni, Self::Error> {
        Vni::new_checked(raw)
    }
}

impl From<Vni> for u32 {
    fn from(vni: Vni) -> u32 {
        vni.as_u32()
    }
}

/// Rejection reasons for [`Vni::new_checked`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidVni {
    #[error("zero is a reserved VNI")]
    Zero,
    #[error("{0} does not fit in 24 bits (max {max})", max = Vni::MAX)]
    TooLarge(u32),
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use super::Vni;
    use bolero::{Driver, TypeGenerator};

    impl TypeGenerator for Vni {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            let raw = driver.produce::<u32>()? % Vni::MAX + 1;
            Vni::new_checked(raw).ok()
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn zero_is_rejected() {
        assert_eq!(Vni::new_checked(0).unwrap_err(), InvalidVni::Zero);
    }

    #[test]
    fn min_and_max_are_accepted() {
        assert_eq!(Vni::new_checked(Vni::MIN).unwrap().as_u32(), Vni::MIN);
        assert_eq!(Vni::new_checked(Vni::MAX).unwrap().as_u32(), Vni::MAX);
    }

    #[test]
    fn above_max_is_rejected() {
        assert_eq!(
            Vni::new_checked(Vni::MAX + 1).unwrap_err(),
            InvalidVni::TooLarge(Vni::MAX + 1)
        );
    }

    #[test]
    fn generated_values_stay_in_range() {
        bolero::check!().with_type().cloned().for_each(|vni: Vni| {
            assert!(vni.as_u32() >= Vni::MIN);
            assert!(vni.as_u32() <= Vni::MAX);
        });
    }

    #[test]
    fn try_from_round_trips_or_reports_the_offender() {
        bolero::check!()
            .with_type()
            .cloned()
            .for_each(|raw: u32| match Vni::try_from(raw) {
                Ok(vni) => assert_eq!(u32::from(vni), raw),
                Err(InvalidVni::Zero) => assert_eq!(raw, 0),
                Err(InvalidVni::TooLarge(reported)) => {
                    assert_eq!(reported, raw);
                    assert!(raw > Vni::MAX);
                }
            });
    }
}
