//! Time units

/// Hertz
///
/// Conversions from the larger units saturate at `u32::MAX` Hz.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Hertz(pub u32);

/// KiloHertz
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KiloHertz(pub u32);

/// MegaHertz
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MegaHertz(pub u32);

/// Extension trait that adds convenience methods to the `u32` type
pub trait U32Ext {
    /// Wrap in `Hertz`
    fn hz(self) -> Hertz;

    /// Wrap in `KiloHertz`
    fn khz(self) -> KiloHertz;

    /// Wrap in `MegaHertz`
    fn mhz(self) -> MegaHertz;
}

impl U32Ext for u32 {
    fn hz(self) -> Hertz {
        Hertz(self)
    }

    fn khz(self) -> KiloHertz {
        KiloHertz(self)
    }

    fn mhz(self) -> MegaHertz {
        MegaHertz(self)
    }
}

impl From<KiloHertz> for Hertz {
    fn from(khz: KiloHertz) -> Hertz {
        Hertz(khz.0.saturating_mul(1_000))
    }
}

impl From<MegaHertz> for Hertz {
    fn from(mhz: MegaHertz) -> Hertz {
        Hertz(mhz.0.saturating_mul(1_000_000))
    }
}

impl From<MegaHertz> for KiloHertz {
    fn from(mhz: MegaHertz) -> KiloHertz {
        KiloHertz(mhz.0.saturating_mul(1_000))
    }
}

impl Hertz {
    /// Length of half a bus period in nanoseconds, which is the time one
    /// line transition is held for.
    pub fn half_period_ns(self) -> u32 {
        if self.0 == 0 {
            return u32::MAX;
        }
        (1_000_000_000u64 / (2 * u64::from(self.0))) as u32
    }
}
