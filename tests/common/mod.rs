//! Simulated open-drain bus with one slave device on it
//!
//! Each line is the wired AND of what the master drives and what the slave
//! pulls. The slave only reacts to edges: a data edge while the clock is high
//! is a start or stop, a clock rising edge samples, a clock falling edge lets
//! it change the data line.

#![allow(dead_code)]

use core::convert::Infallible;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use soft_i2c::delay::{TickDelay, TickSource};
use soft_i2c::i2c::{Config, SoftI2c};
use soft_i2c::line::{Level, Line, LinePair};

/// Clock reads the slave holds SCL for when it is told to stretch forever
pub const FOREVER: u32 = u32::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Idle,
    Address,
    Receive,
    Transmit,
    Ignore,
}

pub struct Slave {
    /// 7-bit address the slave answers to
    pub address: u8,
    /// Index of the data byte (within one write) the slave refuses
    pub nack_data_at: Option<usize>,
    /// Bytes handed out on reads, in order
    pub tx: Vec<u8>,
    /// Clock reads SCL is held low for when a read phase begins
    pub stretch: u32,

    mode: Mode,
    bit: u8,
    shift: u8,
    read_request: bool,
    data_index: usize,
    tx_pos: usize,
    sda_low: bool,
    hold: u32,

    /// Every byte clocked in, address bytes included
    pub received: Vec<u8>,
    /// ACK (`true`) or NACK the master sent after each byte it read
    pub master_acks: Vec<bool>,
    pub starts: usize,
    pub stops: usize,
}

impl Slave {
    pub fn new(address: u8) -> Self {
        Slave {
            address,
            nack_data_at: None,
            tx: Vec::new(),
            stretch: 0,
            mode: Mode::Idle,
            bit: 0,
            shift: 0,
            read_request: false,
            data_index: 0,
            tx_pos: 0,
            sda_low: false,
            hold: 0,
            received: Vec::new(),
            master_acks: Vec::new(),
            starts: 0,
            stops: 0,
        }
    }

    pub fn transmitting(mut self, bytes: &[u8]) -> Self {
        self.tx = bytes.to_vec();
        self
    }

    pub fn nack_data_at(mut self, index: usize) -> Self {
        self.nack_data_at = Some(index);
        self
    }

    pub fn stretching(mut self, reads: u32) -> Self {
        self.stretch = reads;
        self
    }

    fn holds_clock(&self) -> bool {
        self.hold > 0
    }

    fn on_start(&mut self) {
        self.mode = Mode::Address;
        self.bit = 0;
        self.shift = 0;
        self.data_index = 0;
        self.sda_low = false;
        self.starts += 1;
    }

    fn on_stop(&mut self) {
        self.mode = Mode::Idle;
        self.sda_low = false;
        self.stops += 1;
    }

    fn on_rise(&mut self, sda: bool) {
        if matches!(self.mode, Mode::Idle | Mode::Ignore) {
            return;
        }
        self.bit += 1;
        match self.mode {
            Mode::Address | Mode::Receive if self.bit <= 8 => {
                self.shift = (self.shift << 1) | sda as u8;
            }
            Mode::Transmit if self.bit == 9 => self.master_acks.push(!sda),
            _ => {}
        }
    }

    fn on_fall(&mut self) {
        match (self.mode, self.bit) {
            (Mode::Address, 8) => {
                self.received.push(self.shift);
                if self.shift >> 1 == self.address {
                    self.sda_low = true;
                    self.read_request = self.shift & 1 == 1;
                } else {
                    self.mode = Mode::Ignore;
                }
            }
            (Mode::Address, 9) => {
                self.sda_low = false;
                self.bit = 0;
                self.shift = 0;
                if self.read_request {
                    self.mode = Mode::Transmit;
                    self.hold = self.stretch;
                    self.drive_tx_bit();
                } else {
                    self.mode = Mode::Receive;
                }
            }
            (Mode::Receive, 8) => {
                self.received.push(self.shift);
                self.sda_low = self.nack_data_at != Some(self.data_index);
                self.data_index += 1;
            }
            (Mode::Receive, 9) => {
                self.sda_low = false;
                self.bit = 0;
                self.shift = 0;
            }
            (Mode::Transmit, 1..=7) => self.drive_tx_bit(),
            (Mode::Transmit, 8) => self.sda_low = false,
            (Mode::Transmit, 9) => {
                self.tx_pos += 1;
                self.bit = 0;
                if self.master_acks.last() == Some(&true) {
                    self.drive_tx_bit();
                } else {
                    self.mode = Mode::Idle;
                }
            }
            _ => {}
        }
    }

    fn drive_tx_bit(&mut self) {
        let byte = self.tx.get(self.tx_pos).copied().unwrap_or(0xFF);
        self.sda_low = byte & (0x80 >> self.bit) == 0;
    }
}

pub struct Wire {
    pub master_sda: bool,
    pub master_scl: bool,
    pub slave: Slave,
    /// Every `set_line` the master made
    pub driven: Vec<(Line, Level)>,
    /// SDA sampled at every SCL rising edge
    pub data_at_rise: Vec<bool>,
    pub clock_reads: u32,
}

impl Wire {
    pub fn sda(&self) -> bool {
        self.master_sda && !self.slave.sda_low
    }

    pub fn scl(&self) -> bool {
        self.master_scl && !self.slave.holds_clock()
    }

    /// Both lines released by the master
    pub fn master_idle(&self) -> bool {
        self.master_sda && self.master_scl
    }

    fn settle(&mut self, sda0: bool, scl0: bool) {
        let (sda1, scl1) = (self.sda(), self.scl());
        if scl0 && scl1 && sda0 != sda1 {
            if sda1 {
                self.slave.on_stop();
            } else {
                self.slave.on_start();
            }
        } else if !scl0 && scl1 {
            self.data_at_rise.push(sda1);
            self.slave.on_rise(sda1);
        } else if scl0 && !scl1 {
            self.slave.on_fall();
        }
    }
}

/// The master's view of the wire
pub struct SimBus(pub Rc<RefCell<Wire>>);

impl LinePair for SimBus {
    type Error = Infallible;

    fn set_line(&mut self, line: Line, level: Level) -> Result<(), Infallible> {
        let mut wire = self.0.borrow_mut();
        let (sda0, scl0) = (wire.sda(), wire.scl());
        match line {
            Line::Data => wire.master_sda = level.is_high(),
            Line::Clock => wire.master_scl = level.is_high(),
        }
        wire.driven.push((line, level));
        wire.settle(sda0, scl0);
        Ok(())
    }

    fn get_line(&mut self, line: Line) -> Result<Level, Infallible> {
        let mut wire = self.0.borrow_mut();
        if line == Line::Clock {
            wire.clock_reads += 1;
            let (sda0, scl0) = (wire.sda(), wire.scl());
            if wire.slave.hold > 0 && wire.slave.hold != FOREVER {
                wire.slave.hold -= 1;
            }
            wire.settle(sda0, scl0);
        }
        let high = match line {
            Line::Data => wire.sda(),
            Line::Clock => wire.scl(),
        };
        Ok(Level::from(high))
    }
}

/// Tick source that advances one tick per read and counts restarts, so the
/// restart count is the number of delay units waited
pub struct Ticks {
    now: u32,
    pub units: Rc<Cell<u32>>,
}

impl TickSource for Ticks {
    fn restart(&mut self) {
        self.now = 0;
        self.units.set(self.units.get() + 1);
    }

    fn elapsed(&mut self) -> u32 {
        self.now += 1;
        self.now
    }
}

pub type Bus = SoftI2c<SimBus, TickDelay<Ticks>>;

pub struct Harness {
    pub i2c: Bus,
    pub wire: Rc<RefCell<Wire>>,
    pub units: Rc<Cell<u32>>,
}

impl Harness {
    pub fn new(slave: Slave) -> Self {
        Self::with_config(slave, Config::default())
    }

    pub fn with_config(slave: Slave, config: Config) -> Self {
        let wire = Rc::new(RefCell::new(Wire {
            master_sda: true,
            master_scl: true,
            slave,
            driven: Vec::new(),
            data_at_rise: Vec::new(),
            clock_reads: 0,
        }));
        let units = Rc::new(Cell::new(0));
        let ticks = Ticks {
            now: 0,
            units: units.clone(),
        };
        let i2c = SoftI2c::new(SimBus(wire.clone()), TickDelay::new(ticks), config)
            .expect("releasing the lines cannot fail");
        Harness { i2c, wire, units }
    }

    pub fn slave(&self) -> std::cell::Ref<'_, Slave> {
        std::cell::Ref::map(self.wire.borrow(), |wire| &wire.slave)
    }

    /// Forgets the line activity recorded so far
    pub fn clear(&self) {
        let mut wire = self.wire.borrow_mut();
        wire.driven.clear();
        wire.data_at_rise.clear();
        wire.clock_reads = 0;
        self.units.set(0);
    }
}
