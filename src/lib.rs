//! Software (bit-banged) I2C master
//!
//! Drives an I2C bus from two general purpose I/O lines and a busy-wait
//! delay, for pins that have no I2C controller behind them. All transfers are
//! blocking and run to completion on the calling context.
//!
//! - [`line`] describes the two open-drain lines ([`line::LinePair`]) and
//!   adapts `embedded-hal` pins to them.
//! - [`delay`] provides the per-transition wait ([`delay::BusDelay`]) from a
//!   tick counter or an `embedded-hal` delay.
//! - [`i2c`] is the bus engine, [`i2c::SoftI2c`], which also implements the
//!   `embedded-hal` 1.0 and 0.2 I2C traits.
//!
//! Enable the `log` or `defmt` feature to get protocol tracing.

#![no_std]
#![deny(missing_docs)]

#[macro_use]
mod fmt;

pub mod delay;
pub mod i2c;
pub mod line;
pub mod time;

pub use crate::i2c::{Config, Error, SoftI2c, StretchTimeout};
