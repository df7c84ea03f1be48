//! Interrupt machinery tests: NMI, IM 0/1/2 acceptance, the one-instruction
//! EI holdoff, HALT wakeup and block-instruction interruptibility.

use super::*;

#[test]
fn test_di_blocks_interrupts() {
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0xF3, 0x00, 0x00]); // DI ; NOP ; NOP
    cpu.step(&mut bus);
    cpu.raise_int(0xFF);
    cpu.step(&mut bus);
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 3); // fell straight through
    assert!(cpu.irq_pending); // request stays latched, never accepted
}

#[test]
fn test_ei_enables_after_one_instruction() {
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0xFB, 0x00, 0x00]); // EI ; NOP ; NOP
    cpu.sp = 0x9000;
    cpu.im = InterruptMode::Mode1;
    cpu.raise_int(0xFF);

    cpu.step(&mut bus); // EI
    assert!(cpu.iff1);
    cpu.step(&mut bus); // NOP executes; acceptance still held off
    assert_eq!(cpu.pc, 2);
    cpu.step(&mut bus); // now the interrupt is taken
    assert_eq!(cpu.pc, 0x0038);
    assert!(!cpu.iff1);
    assert!(!cpu.iff2);
}

#[test]
fn test_ei_di_is_atomic() {
    // No acceptance window exists between EI and an immediately following DI
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0xFB, 0xF3, 0x00, 0x00]); // EI ; DI ; NOP ; NOP
    cpu.sp = 0x9000;
    cpu.im = InterruptMode::Mode1;
    cpu.raise_int(0xFF);

    for _ in 0..4 {
        cpu.step(&mut bus);
    }
    assert_eq!(cpu.pc, 4); // never vectored to 0x38
    assert!(!cpu.iff1);
}

#[test]
fn test_im1_acceptance() {
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0x00, 0x00]);
    cpu.sp = 0x9000;
    cpu.im = InterruptMode::Mode1;
    cpu.iff1 = true;
    cpu.iff2 = true;
    cpu.step(&mut bus); // NOP at 0
    cpu.raise_int(0xFF);
    let t = cpu.step(&mut bus);
    assert_eq!(t, 13);
    assert_eq!(cpu.pc, 0x0038);
    assert_eq!(cpu.sp, 0x8FFE);
    assert_eq!(bus.mem[0x8FFE], 0x01); // pushed return address
    assert_eq!(bus.mem[0x8FFF], 0x00);
    assert!(!cpu.irq_pending);
}

#[test]
fn test_im0_rst_vector() {
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0x00]);
    cpu.sp = 0x9000;
    cpu.im = InterruptMode::Mode0;
    cpu.iff1 = true;
    cpu.raise_int(0xD7); // RST $10
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0x0010);
}

#[test]
fn test_im0_non_rst_falls_back_to_38() {
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0x00]);
    cpu.sp = 0x9000;
    cpu.im = InterruptMode::Mode0;
    cpu.iff1 = true;
    cpu.raise_int(0x00);
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0x0038);
}

#[test]
fn test_im2_vector_table() {
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0x00]);
    cpu.sp = 0x9000;
    cpu.im = InterruptMode::Mode2;
    cpu.iff1 = true;
    cpu.i = 0x80;
    bus.mem[0x80FE] = 0x00;
    bus.mem[0x80FF] = 0x44;
    cpu.raise_int(0xFF); // pointer = $80FE (low bit masked)
    let t = cpu.step(&mut bus);
    assert_eq!(t, 19);
    assert_eq!(cpu.pc, 0x4400);
    assert_eq!(cpu.wz, 0x4400);
}

#[test]
fn test_nmi_preserves_iff2() {
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0x00]);
    cpu.sp = 0x9000;
    cpu.iff1 = true;
    cpu.iff2 = true;
    cpu.raise_nmi();
    let t = cpu.step(&mut bus);
    assert_eq!(t, 11);
    assert_eq!(cpu.pc, 0x0066);
    assert!(!cpu.iff1);
    assert!(cpu.iff2); // saved for RETN
}

#[test]
fn test_retn_restores_iff1() {
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0x00]);
    bus.mem[0x0066] = 0xED;
    bus.mem[0x0067] = 0x45; // RETN
    cpu.sp = 0x9000;
    cpu.iff1 = true;
    cpu.iff2 = true;
    cpu.raise_nmi();
    cpu.step(&mut bus); // NMI entry
    assert!(!cpu.iff1);
    cpu.step(&mut bus); // RETN
    assert!(cpu.iff1);
    assert_eq!(cpu.pc, 0x0000);
}

#[test]
fn test_nmi_beats_irq() {
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0x00]);
    cpu.sp = 0x9000;
    cpu.im = InterruptMode::Mode1;
    cpu.iff1 = true;
    cpu.raise_int(0xFF);
    cpu.raise_nmi();
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0x0066);
    assert!(cpu.irq_pending); // IRQ still waiting behind the NMI
}

#[test]
fn test_interrupt_wakes_halt() {
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0x76]); // HALT
    bus.mem[0x0038] = 0xC9; // RET
    cpu.sp = 0x9000;
    cpu.im = InterruptMode::Mode1;
    cpu.iff1 = true;
    cpu.step(&mut bus);
    assert!(cpu.halted);
    cpu.step(&mut bus); // still halted, burning cycles
    assert!(cpu.halted);

    cpu.raise_int(0xFF);
    cpu.step(&mut bus);
    assert!(!cpu.halted);
    assert_eq!(cpu.pc, 0x0038);
    cpu.step(&mut bus); // RET resumes past the HALT
    assert_eq!(cpu.pc, 0x0001);
}

#[test]
fn test_nmi_wakes_halt() {
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0x76]);
    cpu.sp = 0x9000;
    cpu.step(&mut bus);
    cpu.raise_nmi();
    cpu.step(&mut bus);
    assert!(!cpu.halted);
    assert_eq!(cpu.pc, 0x0066);
}

#[test]
fn test_raise_int_is_idempotent() {
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0x00, 0x00, 0x00]);
    cpu.sp = 0x9000;
    cpu.im = InterruptMode::Mode1;
    cpu.iff1 = true;
    cpu.raise_int(0xFF);
    cpu.raise_int(0xFF);
    cpu.step(&mut bus); // single acceptance
    assert_eq!(cpu.pc, 0x0038);
    assert!(!cpu.irq_pending);
    cpu.step(&mut bus); // and no second one
    assert_eq!(cpu.pc, 0x0039);
}

#[test]
fn test_interrupt_between_block_iterations() {
    // LDIR rewinds PC while repeating, so the pushed return address
    // re-enters the block instruction after the ISR returns.
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0xED, 0xB0]); // LDIR
    bus.mem[0x0038] = 0xC9; // RET
    cpu.sp = 0x9000;
    cpu.im = InterruptMode::Mode1;
    cpu.iff1 = true;
    cpu.hl = 0x2000;
    cpu.de = 0x3000;
    cpu.bc = 0x0003;
    bus.mem[0x2000..0x2003].copy_from_slice(&[9, 8, 7]);

    cpu.step(&mut bus); // one iteration, PC back at 0
    assert_eq!(cpu.pc, 0);
    cpu.raise_int(0xFF);
    cpu.step(&mut bus); // accepted; return address is the LDIR itself
    assert_eq!(cpu.pc, 0x0038);
    assert_eq!(bus.mem[0x8FFE], 0x00);
    cpu.iff1 = true; // as an EI ; RETI handler would leave it
    cpu.step(&mut bus); // RET
    while cpu.pc != 2 {
        cpu.step(&mut bus);
    }
    assert_eq!(&bus.mem[0x3000..0x3003], &[9, 8, 7]);
    assert_eq!(cpu.bc, 0);
}

#[test]
fn test_halted_steps_count_cycles() {
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0x76]);
    cpu.step(&mut bus);
    let before = cpu.cyc;
    for _ in 0..5 {
        cpu.step(&mut bus);
    }
    assert_eq!(cpu.cyc, before + 20);
}
