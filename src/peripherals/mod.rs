//! RetroShield peripheral set
//!
//! The board carries two UARTs and an SD card on the I/O bus:
//! - MC6850-style ACIA at 0x80/0x81 (polling firmwares)
//! - Intel 8251-style USART at 0x00/0x01 (interrupt-driven firmwares)
//! - SD block device at 0x10..0x15
//!
//! Both UARTs share a single host-input queue and a single output sink.
//! Ports owned by nobody read 0xFF and drop writes. Touching either USART
//! port latches `uses_8251`, which switches the machine to the
//! interrupt-driven input model for the rest of the run.

pub mod acia;
pub mod sd;
pub mod usart;

pub use acia::Acia;
pub use sd::{DiskBackend, FileHandle, MemBackend, SdCard, StorageBackend, StorageError};
pub use usart::Usart;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Write;
use std::rc::Rc;

/// I/O port assignments
pub mod ports {
    /// USART data (read: input byte, write: emit byte)
    pub const USART_DATA: u8 = 0x00;
    /// USART status (read) / control (write, ignored)
    pub const USART_CTRL: u8 = 0x01;
    /// SD command
    pub const SD_CMD: u8 = 0x10;
    /// SD status
    pub const SD_STATUS: u8 = 0x11;
    /// SD data
    pub const SD_DATA: u8 = 0x12;
    /// SD filename latch
    pub const SD_FNAME: u8 = 0x13;
    /// SD seek position, low byte
    pub const SD_SEEK_LO: u8 = 0x14;
    /// SD seek position, high byte
    pub const SD_SEEK_HI: u8 = 0x15;
    /// ACIA control (write) / status (read)
    pub const ACIA_CTRL: u8 = 0x80;
    /// ACIA data (read: input byte, write: emit byte)
    pub const ACIA_DATA: u8 = 0x81;
}

/// Destination for serial output.
///
/// Each byte is delivered (and flushed) before the emitting `OUT` retires,
/// so host-visible order always matches CPU write order.
pub trait SerialSink {
    /// Deliver one byte
    fn put(&mut self, byte: u8);
}

/// Sink that writes to the host's stdout, flushing per byte
#[derive(Debug, Default)]
pub struct StdoutSink;

impl SerialSink for StdoutSink {
    fn put(&mut self, byte: u8) {
        let mut out = std::io::stdout();
        let _ = out.write_all(&[byte]);
        let _ = out.flush();
    }
}

/// Shareable in-memory sink for tests and capture
#[derive(Debug, Clone, Default)]
pub struct BufferSink {
    buf: Rc<RefCell<Vec<u8>>>,
}

impl BufferSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far
    pub fn contents(&self) -> Vec<u8> {
        self.buf.borrow().clone()
    }
}

impl SerialSink for BufferSink {
    fn put(&mut self, byte: u8) {
        self.buf.borrow_mut().push(byte);
    }
}

/// Peripheral subsystem: the UARTs and SD card plus their shared
/// input queue and output sink.
pub struct Peripherals {
    /// ACIA at 0x80/0x81
    pub acia: Acia,
    /// USART at 0x00/0x01
    pub usart: Usart,
    /// SD card at 0x10..0x15
    pub sd: SdCard,
    input: VecDeque<u8>,
    sink: Box<dyn SerialSink>,
    uses_8251: bool,
}

impl Peripherals {
    /// Create the peripheral set with an in-memory SD backend and a
    /// stdout serial sink
    pub fn new() -> Self {
        Self::with_parts(Box::new(MemBackend::new()), Box::new(StdoutSink))
    }

    /// Create the peripheral set with explicit SD backend and sink
    pub fn with_parts(storage: Box<dyn StorageBackend>, sink: Box<dyn SerialSink>) -> Self {
        Self {
            acia: Acia::new(),
            usart: Usart::new(),
            sd: SdCard::new(storage),
            input: VecDeque::new(),
            sink,
            uses_8251: false,
        }
    }

    /// Queue a host keystroke for the UARTs
    pub fn queue_input(&mut self, byte: u8) {
        self.input.push_back(byte);
    }

    /// True while a queued input byte is waiting
    pub fn input_pending(&self) -> bool {
        !self.input.is_empty()
    }

    /// True once the running firmware has touched a USART port
    pub fn uses_8251(&self) -> bool {
        self.uses_8251
    }

    /// Clear queues, latches and SD device state (cold reset).
    /// The SD backend and its directory survive.
    pub fn reset(&mut self) {
        self.acia = Acia::new();
        self.usart = Usart::new();
        self.sd.reset();
        self.input.clear();
        self.uses_8251 = false;
    }

    /// Read from an I/O port
    pub fn read(&mut self, port: u8) -> u8 {
        match port {
            ports::USART_DATA => {
                self.uses_8251 = true;
                self.usart.read_data(&mut self.input)
            }
            ports::USART_CTRL => {
                self.uses_8251 = true;
                self.usart.read_status(!self.input.is_empty())
            }
            ports::SD_STATUS => self.sd.read_status(),
            ports::SD_DATA => self.sd.read_data(),
            ports::ACIA_CTRL => self.acia.read_status(!self.input.is_empty()),
            ports::ACIA_DATA => self.acia.read_data(&mut self.input),
            _ => 0xFF,
        }
    }

    /// Write to an I/O port
    pub fn write(&mut self, port: u8, value: u8) {
        match port {
            ports::USART_DATA => {
                self.uses_8251 = true;
                self.usart.write_data(value, self.sink.as_mut());
            }
            ports::USART_CTRL => {
                self.uses_8251 = true;
                self.usart.write_control(value);
            }
            ports::SD_CMD => self.sd.command(value),
            ports::SD_DATA => self.sd.write_data(value),
            ports::SD_FNAME => self.sd.push_fname(value),
            ports::SD_SEEK_LO => self.sd.set_seek_lo(value),
            ports::SD_SEEK_HI => self.sd.set_seek_hi(value),
            ports::ACIA_CTRL => self.acia.write_control(value),
            ports::ACIA_DATA => self.acia.write_data(value, self.sink.as_mut()),
            _ => {}
        }
    }
}

impl Default for Peripherals {
    fn default() -> Self {
        Self::new()
    }
}
