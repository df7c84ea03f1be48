//! Z80 CPU tests
//!
//! Organized into:
//! - instructions.rs: individual instructions and flag behavior
//! - blocks.rs: block transfer/search/IO instructions
//! - interrupts.rs: NMI, IM 0/1/2, the EI holdoff and HALT

use std::collections::{HashMap, VecDeque};

use super::*;
use crate::bus::Bus;

mod blocks;
mod interrupts;

/// Bus with flat RAM, a port-output log and scripted port input
pub struct TestBus {
    pub mem: Vec<u8>,
    pub out_log: Vec<(u8, u8)>,
    pub in_data: HashMap<u8, VecDeque<u8>>,
}

impl TestBus {
    pub fn new() -> Self {
        Self {
            mem: vec![0u8; 0x10000],
            out_log: Vec::new(),
            in_data: HashMap::new(),
        }
    }

    /// Bus with `program` placed at address 0
    pub fn load(program: &[u8]) -> Self {
        let mut bus = Self::new();
        bus.mem[..program.len()].copy_from_slice(program);
        bus
    }

    /// Script bytes to be returned by IN on `port`
    pub fn feed(&mut self, port: u8, bytes: &[u8]) {
        self.in_data.entry(port).or_default().extend(bytes);
    }
}

impl Bus for TestBus {
    fn read_byte(&mut self, addr: u16) -> u8 {
        self.mem[addr as usize]
    }

    fn write_byte(&mut self, addr: u16, value: u8) {
        self.mem[addr as usize] = value;
    }

    fn port_in(&mut self, port: u8) -> u8 {
        self.in_data
            .get_mut(&port)
            .and_then(|q| q.pop_front())
            .unwrap_or(0xFF)
    }

    fn port_out(&mut self, port: u8, value: u8) {
        self.out_log.push((port, value));
    }
}

/// Run `steps` instructions of `program` from a fresh CPU
pub fn exec(program: &[u8], steps: usize) -> (Cpu, TestBus) {
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(program);
    for _ in 0..steps {
        cpu.step(&mut bus);
    }
    (cpu, bus)
}
