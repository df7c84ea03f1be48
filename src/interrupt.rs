//! Host-input interrupt scheduler
//!
//! Interrupt-driven firmwares (the ones that drive the 8251 USART) sit in
//! HALT with IM 1 armed and expect a maskable interrupt per received
//! character. The scheduler runs between CPU steps: when the firmware has
//! touched a USART port, interrupts are enabled, the post-EI holdoff has
//! elapsed and a byte is queued, it raises one interrupt with 0xFF on the
//! data bus (RST 38h under IM 0/1).
//!
//! A pending latch suppresses duplicate raises. It clears whenever IFF1 is
//! observed low - acceptance itself drops IFF1, so the latch re-arms exactly
//! when the firmware takes the interrupt, and a fresh EI with bytes still
//! queued raises again immediately.
//!
//! Polling firmwares (ACIA only) never latch `uses_8251` and never see an
//! interrupt from here.

use log::trace;

use crate::cpu::Cpu;
use crate::peripherals::Peripherals;

/// Data-bus byte presented with each raised interrupt: RST 38h
pub const INT_VECTOR: u8 = 0xFF;

/// Lifts pending host input into maskable interrupts
#[derive(Debug, Default)]
pub struct IrqScheduler {
    pending: bool,
}

impl IrqScheduler {
    /// Create the scheduler with nothing pending
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the pending latch
    pub fn reset(&mut self) {
        self.pending = false;
    }

    /// Run one scheduling decision; call after every CPU step
    pub fn poll(&mut self, cpu: &mut Cpu, ports: &Peripherals) {
        if !ports.uses_8251() {
            return;
        }
        if !cpu.iff1 {
            self.pending = false;
            return;
        }
        if self.pending || !cpu.interrupts_enabled() {
            return;
        }
        if ports.input_pending() {
            trace!("irq: input pending, raising RST 38h");
            cpu.raise_int(INT_VECTOR);
            self.pending = true;
        }
    }
}
