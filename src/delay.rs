//! Code for busy-waiting
//!
//! Every line transition on the bus is followed by one delay *unit*: half a
//! bus clock period. The engine only needs [`BusDelay`]; the types in this
//! module build one either from a raw tick counter ([`TickDelay`]) or from any
//! `embedded-hal` delay provider ([`NsDelay`]).

use crate::time::Hertz;
use cortex_m::peripheral::{syst::SystClkSource, SYST};
use embedded_hal::delay::DelayNs;

/// Ticks per unit when no bus frequency is given: a 1 MHz tick source gives
/// the 5 us half period of a 100 kHz bus.
pub const DEFAULT_UNIT_TICKS: u32 = 5;

/// Blocks the caller for one calibrated time unit
pub trait BusDelay {
    /// Spin for one unit
    fn wait_one_unit(&mut self);
}

/// A free-running counter that can be restarted
///
/// Successive `elapsed` calls after a `restart` must never go backwards.
pub trait TickSource {
    /// Start counting from zero
    fn restart(&mut self);

    /// Ticks since the last `restart`
    fn elapsed(&mut self) -> u32;
}

impl<T: TickSource + ?Sized> TickSource for &mut T {
    fn restart(&mut self) {
        (**self).restart()
    }

    fn elapsed(&mut self) -> u32 {
        (**self).elapsed()
    }
}

/// Unit delay that restarts a tick source and spins until it has counted
/// `threshold` ticks
pub struct TickDelay<T> {
    ticks: T,
    threshold: u32,
}

impl<T: TickSource> TickDelay<T> {
    /// Wraps a tick source with the default threshold
    pub fn new(ticks: T) -> Self {
        Self::with_threshold(ticks, DEFAULT_UNIT_TICKS)
    }

    /// Wraps a tick source; each unit lasts `threshold` ticks
    pub fn with_threshold(ticks: T, threshold: u32) -> Self {
        TickDelay { ticks, threshold }
    }

    /// Picks the threshold that gives half a period of `bus` when the tick
    /// source counts at `tick_rate`
    pub fn for_bus<F, B>(ticks: T, tick_rate: F, bus: B) -> Self
    where
        F: Into<Hertz>,
        B: Into<Hertz>,
    {
        Self::with_threshold(ticks, unit_ticks(tick_rate.into(), bus.into()))
    }

    /// Ticks per unit
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Releases the tick source
    pub fn free(self) -> T {
        self.ticks
    }
}

impl<T: TickSource> BusDelay for TickDelay<T> {
    fn wait_one_unit(&mut self) {
        self.ticks.restart();
        while self.ticks.elapsed() < self.threshold {}
    }
}

fn unit_ticks(tick_rate: Hertz, bus: Hertz) -> u32 {
    if bus.0 == 0 {
        return u32::MAX;
    }
    let ticks = u64::from(tick_rate.0) / (2 * u64::from(bus.0));
    cast::u32(ticks).unwrap_or(u32::MAX).max(1)
}

/// Unit delay on top of an `embedded-hal` delay provider
pub struct NsDelay<D> {
    delay: D,
    unit_ns: u32,
}

impl<D: DelayNs> NsDelay<D> {
    /// Each unit lasts `unit_ns` nanoseconds
    pub fn new(delay: D, unit_ns: u32) -> Self {
        NsDelay { delay, unit_ns }
    }

    /// Each unit lasts half a period of `bus`
    pub fn for_bus<B>(delay: D, bus: B) -> Self
    where
        B: Into<Hertz>,
    {
        Self::new(delay, bus.into().half_period_ns())
    }

    /// Nanoseconds per unit
    pub fn unit_ns(&self) -> u32 {
        self.unit_ns
    }

    /// Releases the delay provider
    pub fn free(self) -> D {
        self.delay
    }
}

impl<D: DelayNs> BusDelay for NsDelay<D> {
    fn wait_one_unit(&mut self) {
        self.delay.delay_ns(self.unit_ns);
    }
}

/// System timer (SysTick) as a free-running tick source
///
/// SysTick counts down through 24 bits at the core clock, so one unit must
/// stay well below 2^24 core cycles.
pub struct SysTickTicks {
    syst: SYST,
    start: u32,
}

const SYST_MASK: u32 = 0x00FF_FFFF;

impl SysTickTicks {
    /// Configures the system timer (SysTick) to run freely at the core clock
    pub fn new(mut syst: SYST) -> Self {
        syst.set_clock_source(SystClkSource::Core);
        syst.set_reload(SYST_MASK);
        syst.clear_current();
        syst.enable_counter();

        SysTickTicks { syst, start: 0 }
    }

    /// Stops the counter and releases the system timer (SysTick) resource
    pub fn free(mut self) -> SYST {
        self.syst.disable_counter();
        self.syst
    }
}

impl TickSource for SysTickTicks {
    fn restart(&mut self) {
        self.start = SYST::get_current();
    }

    fn elapsed(&mut self) -> u32 {
        // down counter
        self.start.wrapping_sub(SYST::get_current()) & SYST_MASK
    }
}
