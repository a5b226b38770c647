//! Line control for the two open-drain bus lines
//!
//! Driving a line [`Level::High`] releases it to the external pull-up; only
//! [`Level::Low`] actively sinks current. Reading a line returns the level on
//! the wire, which a slave may be holding low.

use embedded_hal::digital::{InputPin, OutputPin};

/// One of the two bus lines
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Line {
    /// SDA
    Data,
    /// SCL
    Clock,
}

/// Logic level of a line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    /// Pulled low
    Low,
    /// Released
    High,
}

impl Level {
    /// Returns `true` for `High`
    pub fn is_high(self) -> bool {
        self == Level::High
    }

    /// Returns `true` for `Low`
    pub fn is_low(self) -> bool {
        self == Level::Low
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Level {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Drives and samples the two bus lines
///
/// Backends that cannot fail use `core::convert::Infallible` as their error.
pub trait LinePair {
    /// GPIO error
    type Error: core::fmt::Debug;

    /// Drive `line` low, or release it high
    fn set_line(&mut self, line: Line, level: Level) -> Result<(), Self::Error>;

    /// Sample the level on the wire
    fn get_line(&mut self, line: Line) -> Result<Level, Self::Error>;
}

impl<T: LinePair + ?Sized> LinePair for &mut T {
    type Error = T::Error;

    fn set_line(&mut self, line: Line, level: Level) -> Result<(), Self::Error> {
        (**self).set_line(line, level)
    }

    fn get_line(&mut self, line: Line) -> Result<Level, Self::Error> {
        (**self).get_line(line)
    }
}

/// Two GPIO pins configured as open-drain outputs with input buffers enabled
pub struct OpenDrainPins<SDA, SCL> {
    /// Data line
    pub sda: SDA,
    /// Clock line
    pub scl: SCL,
}

impl<SDA, SCL> OpenDrainPins<SDA, SCL>
where
    SDA: InputPin + OutputPin,
    SCL: InputPin + OutputPin<Error = SDA::Error>,
{
    /// Pairs the data and clock pins
    pub fn new(sda: SDA, scl: SCL) -> Self {
        OpenDrainPins { sda, scl }
    }

    /// Releases the pins
    pub fn free(self) -> (SDA, SCL) {
        (self.sda, self.scl)
    }
}

impl<SDA, SCL> LinePair for OpenDrainPins<SDA, SCL>
where
    SDA: InputPin + OutputPin,
    SCL: InputPin + OutputPin<Error = SDA::Error>,
{
    type Error = SDA::Error;

    fn set_line(&mut self, line: Line, level: Level) -> Result<(), Self::Error> {
        match (line, level) {
            (Line::Data, Level::High) => self.sda.set_high(),
            (Line::Data, Level::Low) => self.sda.set_low(),
            (Line::Clock, Level::High) => self.scl.set_high(),
            (Line::Clock, Level::Low) => self.scl.set_low(),
        }
    }

    fn get_line(&mut self, line: Line) -> Result<Level, Self::Error> {
        let high = match line {
            Line::Data => self.sda.is_high()?,
            Line::Clock => self.scl.is_high()?,
        };
        Ok(Level::from(high))
    }
}
