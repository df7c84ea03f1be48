//! RetroShield Z80 Emulator Core
//!
//! Emulates a Z80-based RetroShield single-board computer on a modern host,
//! so firmware ROMs written for that hardware (monitors, BASIC, Forth,
//! Pascal, MINT) run, print and read keystrokes without the physical board.
//!
//! # Architecture
//!
//! - `cpu`: full Z80 interpreter (undocumented opcodes and flags included)
//! - `disasm`: one-instruction disassembler for the debugger view
//! - `memory`: flat 64 KiB with ROM write-protection below a ceiling
//! - `bus`: memory/port callback seam between CPU and board
//! - `peripherals`: 6850-style ACIA, 8251-style USART, SD block device
//! - `interrupt`: host-input to maskable-interrupt scheduler
//! - `emu`: the `Machine` orchestrator front ends drive
//!
//! # I/O Port Map
//!
//! | Port(s)     | Peripheral    |
//! |-------------|---------------|
//! | 0x00 - 0x01 | 8251 USART    |
//! | 0x10 - 0x15 | SD card       |
//! | 0x80 - 0x81 | 6850 ACIA     |
//!
//! The front end (headless passthrough or interactive debugger) owns the
//! outer loop: it calls [`Machine::step`], feeds keystrokes with
//! [`Machine::queue_input`], and receives serial output through a
//! [`peripherals::SerialSink`].

pub mod bus;
pub mod cpu;
pub mod disasm;
pub mod emu;
pub mod interrupt;
pub mod memory;
pub mod peripherals;

pub use bus::{Bus, SystemBus};
pub use cpu::{Cpu, InterruptMode};
pub use disasm::{disassemble, DisasmResult};
pub use emu::{Machine, MachineConfig, StopReason};
pub use interrupt::IrqScheduler;
pub use memory::{Memory, RomError};
pub use peripherals::{
    BufferSink, DiskBackend, MemBackend, Peripherals, SerialSink, StdoutSink, StorageBackend,
    StorageError,
};
