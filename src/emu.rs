//! Machine orchestrator
//!
//! Wires the CPU, bus and interrupt scheduler into the RetroShield board
//! the front ends drive: load a ROM, feed keystrokes in, call `step` (or
//! `run`) and read the serial sink.

use log::info;

use crate::bus::SystemBus;
use crate::cpu::Cpu;
use crate::disasm::{self, DisasmResult};
use crate::interrupt::IrqScheduler;
use crate::memory::{addr, Memory, RomError};
use crate::peripherals::{Peripherals, SerialSink, StorageBackend};

/// Reason `run` stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Completed the requested cycle budget
    CyclesComplete,
    /// CPU executed HALT with no interrupt source able to wake it here
    Halted,
}

/// Build-time machine configuration
#[derive(Debug, Clone, Copy)]
pub struct MachineConfig {
    /// First writable address; everything below is ROM after load
    pub rom_ceiling: u32,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            rom_ceiling: addr::DEFAULT_ROM_CEILING,
        }
    }
}

impl MachineConfig {
    /// Configuration for small-ROM firmwares (2 KiB ceiling)
    pub fn small_rom() -> Self {
        Self {
            rom_ceiling: addr::SMALL_ROM_CEILING,
        }
    }
}

/// The emulated board
pub struct Machine {
    /// Z80 CPU
    pub cpu: Cpu,
    /// Memory and peripherals
    pub bus: SystemBus,
    irq: IrqScheduler,
    rom_loaded: bool,
}

impl Machine {
    /// Create a machine with the default configuration (8 KiB ROM ceiling,
    /// in-memory SD backend, stdout serial sink)
    pub fn new(config: MachineConfig) -> Self {
        Self {
            cpu: Cpu::new(),
            bus: SystemBus::new(Memory::new(config.rom_ceiling), Peripherals::new()),
            irq: IrqScheduler::new(),
            rom_loaded: false,
        }
    }

    /// Create a machine with explicit SD storage and serial sink
    pub fn with_parts(
        config: MachineConfig,
        storage: Box<dyn StorageBackend>,
        sink: Box<dyn SerialSink>,
    ) -> Self {
        Self {
            cpu: Cpu::new(),
            bus: SystemBus::new(
                Memory::new(config.rom_ceiling),
                Peripherals::with_parts(storage, sink),
            ),
            irq: IrqScheduler::new(),
            rom_loaded: false,
        }
    }

    /// Load a ROM image at address 0 and reset the CPU
    pub fn load_rom(&mut self, image: &[u8]) -> Result<(), RomError> {
        self.bus.mem.load_rom(image)?;
        self.rom_loaded = true;
        info!(
            "loaded {} byte ROM, {:#06x} bytes protected",
            image.len(),
            self.bus.mem.rom_ceiling()
        );
        self.reset();
        Ok(())
    }

    /// Reset the CPU. Peripheral state (queued input, open SD handles,
    /// the `uses_8251` latch) survives, matching the board's reset line.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.irq.reset();
    }

    /// Reset the CPU and all peripheral state
    pub fn cold_reset(&mut self) {
        self.reset();
        self.bus.ports.reset();
    }

    /// Execute one instruction and run the interrupt scheduler.
    /// Returns the T-states consumed.
    pub fn step(&mut self) -> u32 {
        let t = self.cpu.step(&mut self.bus);
        self.irq.poll(&mut self.cpu, &self.bus.ports);
        t
    }

    /// Run until the cycle budget is spent or the CPU halts with nothing
    /// queued to wake it. Returns why it stopped.
    pub fn run(&mut self, max_cycles: u64) -> StopReason {
        if !self.rom_loaded {
            return StopReason::CyclesComplete;
        }
        let target = self.cpu.cyc + max_cycles;
        while self.cpu.cyc < target {
            self.step();
            if self.cpu.halted && !self.cpu.irq_pending && !self.cpu.nmi_pending {
                return StopReason::Halted;
            }
        }
        StopReason::CyclesComplete
    }

    /// Queue a host keystroke for the UARTs
    pub fn queue_input(&mut self, byte: u8) {
        self.bus.ports.queue_input(byte);
    }

    /// Disassemble the instruction at `addr` from current memory
    /// (debugger view; call only while execution is paused)
    pub fn disassemble_at(&self, addr: u16) -> DisasmResult {
        let mem = self.bus.mem.as_slice();
        let mut window = [0u8; 6];
        for (i, slot) in window.iter_mut().enumerate() {
            *slot = mem[addr.wrapping_add(i as u16) as usize];
        }
        disasm::disassemble(&window, addr)
    }

    /// Total T-states executed since reset
    pub fn cycles(&self) -> u64 {
        self.cpu.cyc
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new(MachineConfig::default())
    }
}
