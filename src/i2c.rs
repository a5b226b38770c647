//! Inter-Integrated Circuit (I2C) bus, driven in software
//!
//! [`SoftI2c`] is a blocking I2C master built on a [`LinePair`] and a
//! [`BusDelay`]. Every line transition is followed by one delay unit (half a
//! bus clock period). The engine is layered: the start/stop envelope, then
//! single-byte transmit and receive, then whole write and read transactions.
//!
//! Every transaction ends with a stop condition, also when it fails, so the
//! bus is idle (both lines high) whenever a call returns.

use crate::{
    delay::{BusDelay, NsDelay},
    line::{Level, Line, LinePair},
    time::{Hertz, U32Ext},
};

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{
    ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation, SevenBitAddress,
};

/// Clock reads allowed per bit while a slave stretches the clock
pub const DEFAULT_STRETCH_RETRIES: u16 = 1000;

/// Largest 7-bit address
pub const MAX_ADDRESS: SevenBitAddress = 0x7F;

/// What [`SoftI2c::read_byte`] does when a slave holds the clock low past the
/// retry budget
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StretchTimeout {
    /// Abandon the byte and return `0`. A timed out byte cannot be told apart
    /// from a real `0x00`.
    ZeroByte,
    /// Abandon the byte and fail the transaction with [`Error::Timeout`]
    Fail,
}

/// Bus configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Nominal SCL frequency, used to size the delay unit
    pub frequency: Hertz,
    /// Clock reads per bit before a stretched clock counts as stuck. SCL is
    /// always read at least once, so `0` behaves like `1`.
    pub stretch_retries: u16,
    /// Clock-stretch timeout policy
    pub stretch_timeout: StretchTimeout,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            frequency: 100.khz().into(),
            stretch_retries: DEFAULT_STRETCH_RETRIES,
            stretch_timeout: StretchTimeout::ZeroByte,
        }
    }
}

/// Transfer direction, carried in the low bit of the address byte
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Master to slave (R/W bit 0)
    Write = 0,
    /// Slave to master (R/W bit 1)
    Read = 1,
}

impl Direction {
    fn of(op: &Operation<'_>) -> Direction {
        match op {
            Operation::Write(_) => Direction::Write,
            Operation::Read(_) => Direction::Read,
        }
    }
}

/// The byte sent after a start condition: the address in the upper seven bits
/// and the direction in bit 0
pub fn address_byte(address: SevenBitAddress, direction: Direction) -> u8 {
    (address << 1) | direction as u8
}

/// I2C error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// A line could not be driven or sampled
    Bus(E),
    /// The slave did not acknowledge its address or a data byte
    NoAcknowledge(NoAcknowledgeSource),
    /// A slave held the clock low past the retry budget
    Timeout,
    /// The address does not fit in seven bits
    AddressOutOfRange(u8),
}

impl<E: core::fmt::Debug> embedded_hal::i2c::Error for Error<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::NoAcknowledge(source) => ErrorKind::NoAcknowledge(*source),
            Error::Bus(_) | Error::Timeout | Error::AddressOutOfRange(_) => ErrorKind::Other,
        }
    }
}

fn check_address<E>(address: SevenBitAddress) -> Result<(), Error<E>> {
    if address > MAX_ADDRESS {
        Err(Error::AddressOutOfRange(address))
    } else {
        Ok(())
    }
}

/// Bit-banged I2C master
///
/// Owns both lines for its whole lifetime. Wrap it in a mutex to share the
/// bus; locking has to cover whole transactions.
pub struct SoftI2c<LINES, DELAY> {
    /// Data and clock lines
    pub lines: LINES,
    /// Unit delay
    pub delay: DELAY,
    config: Config,
}

impl<LINES, DELAY> SoftI2c<LINES, DELAY>
where
    LINES: LinePair,
    DELAY: BusDelay,
{
    /// Takes ownership of the lines and releases both of them, leaving the bus
    /// idle
    pub fn new(lines: LINES, delay: DELAY, config: Config) -> Result<Self, Error<LINES::Error>> {
        let mut i2c = SoftI2c {
            lines,
            delay,
            config,
        };
        i2c.init()?;
        Ok(i2c)
    }

    /// Releases the lines and the delay
    pub fn free(self) -> (LINES, DELAY) {
        (self.lines, self.delay)
    }

    /// Current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Releases both lines (bus idle)
    pub fn init(&mut self) -> Result<(), Error<LINES::Error>> {
        self.drive(Line::Data, Level::High)?;
        self.drive(Line::Clock, Level::High)
    }

    /// Returns `true` if both lines read high
    pub fn is_idle(&mut self) -> Result<bool, Error<LINES::Error>> {
        Ok(self.sample(Line::Data)?.is_high() && self.sample(Line::Clock)?.is_high())
    }

    fn drive(&mut self, line: Line, level: Level) -> Result<(), Error<LINES::Error>> {
        self.lines.set_line(line, level).map_err(Error::Bus)
    }

    fn sample(&mut self, line: Line) -> Result<Level, Error<LINES::Error>> {
        self.lines.get_line(line).map_err(Error::Bus)
    }

    fn wait(&mut self) {
        self.delay.wait_one_unit();
    }

    /// Start condition: SDA falls while SCL is high. Leaves both lines low.
    pub fn start(&mut self) -> Result<(), Error<LINES::Error>> {
        self.drive(Line::Data, Level::Low)?;
        self.wait();
        self.drive(Line::Clock, Level::Low)?;
        self.wait();
        Ok(())
    }

    /// Start condition issued in the middle of a transaction, with SCL low
    pub fn repeated_start(&mut self) -> Result<(), Error<LINES::Error>> {
        self.drive(Line::Data, Level::High)?;
        self.wait();
        self.drive(Line::Clock, Level::High)?;
        self.wait();
        self.start()
    }

    /// Stop condition: SDA rises while SCL is high. Leaves the bus idle.
    pub fn stop(&mut self) -> Result<(), Error<LINES::Error>> {
        // SDA may still be released from the last ACK slot
        self.drive(Line::Data, Level::Low)?;
        self.wait();
        self.drive(Line::Clock, Level::High)?;
        self.wait();
        self.drive(Line::Data, Level::High)?;
        self.wait();
        Ok(())
    }

    /// Shifts out one byte, MSB first, and clocks the ACK slot
    ///
    /// Returns `true` if the receiver pulled SDA low during the ninth clock.
    pub fn send_byte(&mut self, byte: u8) -> Result<bool, Error<LINES::Error>> {
        for bit in (0..8).rev() {
            self.drive(Line::Data, Level::from(byte & (1 << bit) != 0))?;
            self.wait();
            self.drive(Line::Clock, Level::High)?;
            self.wait();
            self.drive(Line::Clock, Level::Low)?;
            self.wait();
        }

        // release SDA so the receiver can acknowledge
        self.drive(Line::Data, Level::High)?;
        self.wait();
        self.drive(Line::Clock, Level::High)?;
        self.wait();
        let ack = self.sample(Line::Data)?.is_low();
        self.drive(Line::Clock, Level::Low)?;
        self.wait();

        trace!("i2c: sent {:#x}, ack {}", byte, ack);
        Ok(ack)
    }

    /// Shifts in one byte, MSB first, then sends ACK (`send_ack`) or NACK
    ///
    /// A slave may stretch each bit's clock for up to
    /// [`Config::stretch_retries`] clock reads. Past that the byte is
    /// abandoned as [`Config::stretch_timeout`] says.
    pub fn read_byte(&mut self, send_ack: bool) -> Result<u8, Error<LINES::Error>> {
        let mut byte = 0u8;
        self.drive(Line::Data, Level::High)?;

        for _ in 0..8 {
            byte <<= 1;
            self.drive(Line::Clock, Level::High)?;
            if !self.wait_for_clock()? {
                warn!("i2c: clock held low past {} reads", self.config.stretch_retries);
                return match self.config.stretch_timeout {
                    StretchTimeout::ZeroByte => Ok(0),
                    StretchTimeout::Fail => Err(Error::Timeout),
                };
            }
            self.wait();
            if self.sample(Line::Data)?.is_high() {
                byte |= 0x01;
            }
            self.wait();
            self.drive(Line::Clock, Level::Low)?;
        }

        // ACK pulls SDA low, NACK leaves it released
        self.drive(Line::Data, Level::from(!send_ack))?;
        self.wait();
        self.drive(Line::Clock, Level::High)?;
        self.wait();
        self.drive(Line::Clock, Level::Low)?;
        self.drive(Line::Data, Level::High)?;
        self.wait();

        trace!("i2c: received {:#x}, ack {}", byte, send_ack);
        Ok(byte)
    }

    /// Polls SCL until it reads high. Returns `false` once the retry budget
    /// is spent.
    fn wait_for_clock(&mut self) -> Result<bool, Error<LINES::Error>> {
        let mut retries = self.config.stretch_retries;
        while self.sample(Line::Clock)?.is_low() {
            retries = retries.saturating_sub(1);
            if retries == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn send_address(
        &mut self,
        address: SevenBitAddress,
        direction: Direction,
    ) -> Result<(), Error<LINES::Error>> {
        if self.send_byte(address_byte(address, direction))? {
            Ok(())
        } else {
            debug!("i2c: address {:#x} not acknowledged", address);
            Err(Error::NoAcknowledge(NoAcknowledgeSource::Address))
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error<LINES::Error>> {
        for (i, byte) in bytes.iter().enumerate() {
            if !self.send_byte(*byte)? {
                debug!("i2c: data byte {} not acknowledged", i);
                return Err(Error::NoAcknowledge(NoAcknowledgeSource::Data));
            }
        }
        Ok(())
    }

    /// Fills `buffer`, acknowledging every byte. The last byte is NACKed
    /// instead when `nack_last` is set.
    fn read_bytes(&mut self, buffer: &mut [u8], nack_last: bool) -> Result<(), Error<LINES::Error>> {
        let last = buffer.len().saturating_sub(1);
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = self.read_byte(i != last || !nack_last)?;
        }
        Ok(())
    }

    /// Issues the stop condition and reports the transaction result; a
    /// transaction error wins over a stop error
    fn finish(
        &mut self,
        result: Result<(), Error<LINES::Error>>,
    ) -> Result<(), Error<LINES::Error>> {
        let stop = self.stop();
        match result {
            Ok(()) => stop,
            Err(e) => {
                debug!("i2c: transaction failed");
                Err(e)
            }
        }
    }

    /// Writes `bytes` to the slave at `address`
    ///
    /// Stops at the first byte that is not acknowledged; the remaining bytes
    /// are never sent. An empty `bytes` only checks the address.
    pub fn write(&mut self, address: SevenBitAddress, bytes: &[u8]) -> Result<(), Error<LINES::Error>> {
        check_address(address)?;
        let result = self
            .start()
            .and_then(|_| self.send_address(address, Direction::Write))
            .and_then(|_| self.write_bytes(bytes));
        self.finish(result)
    }

    /// Reads `buffer.len()` bytes from the slave at `address`
    ///
    /// Every byte is acknowledged except the last one, which is NACKed to
    /// tell the slave to stop sending. An empty `buffer` only checks the
    /// address, with a write: a slave that has been addressed for reading
    /// may hold SDA low and block the stop condition.
    pub fn read(&mut self, address: SevenBitAddress, buffer: &mut [u8]) -> Result<(), Error<LINES::Error>> {
        check_address(address)?;
        if buffer.is_empty() {
            return self.write(address, &[]);
        }
        let result = self
            .start()
            .and_then(|_| self.send_address(address, Direction::Read))
            .and_then(|_| self.read_bytes(buffer, true));
        self.finish(result)
    }

    /// Writes `bytes`, then reads into `buffer` after a repeated start,
    /// without releasing the bus in between
    ///
    /// With an empty `buffer` only the write phase runs.
    pub fn write_read(
        &mut self,
        address: SevenBitAddress,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), Error<LINES::Error>> {
        check_address(address)?;
        if buffer.is_empty() {
            return self.write(address, bytes);
        }
        let result = self
            .start()
            .and_then(|_| self.send_address(address, Direction::Write))
            .and_then(|_| self.write_bytes(bytes))
            .and_then(|_| self.repeated_start())
            .and_then(|_| self.send_address(address, Direction::Read))
            .and_then(|_| self.read_bytes(buffer, true));
        self.finish(result)
    }

    /// Returns `true` if a slave acknowledges `address`
    pub fn probe(&mut self, address: SevenBitAddress) -> Result<bool, Error<LINES::Error>> {
        match self.write(address, &[]) {
            Ok(()) => Ok(true),
            Err(Error::NoAcknowledge(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn run_operations(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Error<LINES::Error>> {
        // Iterate through operations, skipping any that have zero length
        let mut ops = operations
            .iter_mut()
            .filter(|op| match op {
                Operation::Read(buffer) => !buffer.is_empty(),
                Operation::Write(bytes) => !bytes.is_empty(),
            })
            .peekable();

        let mut current = None;
        while let Some(op) = ops.next() {
            let direction = Direction::of(op);
            if current != Some(direction) {
                if current.is_some() {
                    self.repeated_start()?;
                }
                self.send_address(address, direction)?;
                current = Some(direction);
            }

            match op {
                Operation::Write(bytes) => self.write_bytes(bytes)?,
                Operation::Read(buffer) => {
                    // consecutive reads are one ACK run; NACK where it ends
                    let nack_last = !matches!(ops.peek(), Some(Operation::Read(_)));
                    self.read_bytes(buffer, nack_last)?;
                }
            }
        }
        Ok(())
    }
}

impl<LINES, D> SoftI2c<LINES, NsDelay<D>>
where
    LINES: LinePair,
    D: DelayNs,
{
    /// Like [`SoftI2c::new`], with the delay unit set to half a period of
    /// `config.frequency`
    pub fn with_delay_ns(lines: LINES, delay: D, config: Config) -> Result<Self, Error<LINES::Error>> {
        let delay = NsDelay::for_bus(delay, config.frequency);
        SoftI2c::new(lines, delay, config)
    }
}

impl<LINES, DELAY> ErrorType for SoftI2c<LINES, DELAY>
where
    LINES: LinePair,
{
    type Error = Error<LINES::Error>;
}

impl<LINES, DELAY> I2c for SoftI2c<LINES, DELAY>
where
    LINES: LinePair,
    DELAY: BusDelay,
{
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        check_address(address)?;
        let empty = operations.iter().all(|op| match op {
            Operation::Read(buffer) => buffer.is_empty(),
            Operation::Write(bytes) => bytes.is_empty(),
        });
        if empty {
            return SoftI2c::write(self, address, &[]);
        }

        let result = self
            .start()
            .and_then(|_| self.run_operations(address, operations));
        self.finish(result)
    }
}

impl<LINES, DELAY> eh0::blocking::i2c::Write for SoftI2c<LINES, DELAY>
where
    LINES: LinePair,
    DELAY: BusDelay,
{
    type Error = Error<LINES::Error>;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        SoftI2c::write(self, address, bytes)
    }
}

impl<LINES, DELAY> eh0::blocking::i2c::Read for SoftI2c<LINES, DELAY>
where
    LINES: LinePair,
    DELAY: BusDelay,
{
    type Error = Error<LINES::Error>;

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        SoftI2c::read(self, address, buffer)
    }
}

impl<LINES, DELAY> eh0::blocking::i2c::WriteRead for SoftI2c<LINES, DELAY>
where
    LINES: LinePair,
    DELAY: BusDelay,
{
    type Error = Error<LINES::Error>;

    fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<(), Self::Error> {
        SoftI2c::write_read(self, address, bytes, buffer)
    }
}
