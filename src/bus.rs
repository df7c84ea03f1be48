//! System bus for the RetroShield Z80
//!
//! The CPU drives four callbacks: memory read/write and port in/out. The
//! [`Bus`] trait is that seam; the CPU never learns which ports belong to
//! which peripheral. [`SystemBus`] is the board wiring: a flat 64 KiB memory
//! plus the ACIA/USART/SD peripheral set on the I/O bus.

use crate::memory::Memory;
use crate::peripherals::Peripherals;

/// Memory and I/O callbacks the CPU executes against.
///
/// Port decoding on the board uses the low 8 address bits only, so ports are
/// `u8` here even though the Z80 places a full 16-bit address on the bus.
pub trait Bus {
    /// Read a byte from memory
    fn read_byte(&mut self, addr: u16) -> u8;
    /// Write a byte to memory
    fn write_byte(&mut self, addr: u16, value: u8);
    /// Read a byte from an I/O port
    fn port_in(&mut self, port: u8) -> u8;
    /// Write a byte to an I/O port
    fn port_out(&mut self, port: u8, value: u8);
}

/// The RetroShield board: memory plus the peripheral set.
pub struct SystemBus {
    /// 64 KiB address space with ROM write-protection
    pub mem: Memory,
    /// ACIA, USART and SD card behind the I/O ports
    pub ports: Peripherals,
}

impl SystemBus {
    /// Wire up a bus around the given memory and peripherals
    pub fn new(mem: Memory, ports: Peripherals) -> Self {
        Self { mem, ports }
    }
}

impl Bus for SystemBus {
    #[inline]
    fn read_byte(&mut self, addr: u16) -> u8 {
        self.mem.read(addr)
    }

    #[inline]
    fn write_byte(&mut self, addr: u16, value: u8) {
        self.mem.write(addr, value)
    }

    fn port_in(&mut self, port: u8) -> u8 {
        self.ports.read(port)
    }

    fn port_out(&mut self, port: u8, value: u8) {
        self.ports.write(port, value)
    }
}
