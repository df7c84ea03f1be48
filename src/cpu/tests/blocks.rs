//! Block instruction tests: LDIR/LDDR, CPIR/CPDR, INIR/OTIR and their
//! single-shot forms, including the PC-rewind repeat mechanism and the
//! per-iteration cycle accounting.

use super::*;

#[test]
fn test_ldi_single() {
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0xED, 0xA0]); // LDI
    cpu.hl = 0x2000;
    cpu.de = 0x3000;
    cpu.bc = 0x0002;
    bus.mem[0x2000] = 0x5A;
    cpu.step(&mut bus);
    assert_eq!(bus.mem[0x3000], 0x5A);
    assert_eq!(cpu.hl, 0x2001);
    assert_eq!(cpu.de, 0x3001);
    assert_eq!(cpu.bc, 0x0001);
    assert!(cpu.flag_pv()); // BC != 0
    assert_eq!(cpu.pc, 2); // no repeat
    assert_eq!(cpu.cyc, 16);
}

#[test]
fn test_ldi_xy_from_a_plus_data() {
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0xED, 0xA0]);
    cpu.a = 0x20;
    cpu.hl = 0x2000;
    cpu.de = 0x3000;
    cpu.bc = 0x0001;
    bus.mem[0x2000] = 0x08;
    cpu.step(&mut bus);
    // n = A + data = 0x28: X from bit 3, Y from bit 1 (clear here)
    assert_eq!(cpu.f & flags::XY, flags::X);
    assert!(!cpu.flag_pv()); // BC hit zero
}

#[test]
fn test_ldir_repeats_by_rewinding_pc() {
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0xED, 0xB0]); // LDIR
    cpu.hl = 0x2000;
    cpu.de = 0x3000;
    cpu.bc = 0x0003;
    let t = cpu.step(&mut bus);
    assert_eq!(t, 21);
    assert_eq!(cpu.pc, 0); // rewound onto the same instruction
    assert_eq!(cpu.wz, 1);
    let t = cpu.step(&mut bus);
    assert_eq!(t, 21);
    let t = cpu.step(&mut bus);
    assert_eq!(t, 16); // final iteration
    assert_eq!(cpu.pc, 2);
    assert_eq!(cpu.bc, 0);
}

#[test]
fn test_ldir_copies_1024_bytes() {
    let mut cpu = Cpu::new();
    let mut bus = TestBus::new();
    bus.mem[0x4000] = 0xED;
    bus.mem[0x4001] = 0xB0;
    for i in 0..1024usize {
        bus.mem[0x1000 + i] = (i & 0xFF) as u8;
    }
    cpu.pc = 0x4000;
    cpu.hl = 0x1000;
    cpu.de = 0x5000;
    cpu.bc = 1024;

    let start = cpu.cyc;
    while cpu.pc != 0x4002 {
        cpu.step(&mut bus);
    }
    for i in 0..1024usize {
        assert_eq!(bus.mem[0x5000 + i], (i & 0xFF) as u8);
    }
    assert_eq!(cpu.bc, 0);
    assert_eq!(cpu.hl, 0x1400);
    assert_eq!(cpu.de, 0x5400);
    assert_eq!(cpu.cyc - start, 21 * 1023 + 16);
}

#[test]
fn test_lddr_descends() {
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0xED, 0xB8]); // LDDR
    cpu.hl = 0x2002;
    cpu.de = 0x3002;
    cpu.bc = 0x0003;
    bus.mem[0x2000] = 1;
    bus.mem[0x2001] = 2;
    bus.mem[0x2002] = 3;
    while cpu.pc != 2 {
        cpu.step(&mut bus);
    }
    assert_eq!(&bus.mem[0x3000..0x3003], &[1, 2, 3]);
    assert_eq!(cpu.hl, 0x1FFF);
    assert_eq!(cpu.de, 0x2FFF);
}

#[test]
fn test_cpir_finds_match() {
    // The early-exit search: HL -> "ABC\0", BC=4, A='B'
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0xED, 0xB1]); // CPIR
    cpu.hl = 0x2000;
    cpu.bc = 0x0004;
    cpu.a = b'B';
    bus.mem[0x2000..0x2004].copy_from_slice(b"ABC\0");
    while cpu.pc != 2 {
        cpu.step(&mut bus);
    }
    assert_eq!(cpu.hl, 0x2002); // just past the 'B'
    assert_eq!(cpu.bc, 0x0002);
    assert!(cpu.flag_z());
    assert!(cpu.flag_pv()); // BC still nonzero
    assert_eq!(cpu.cyc, 21 + 16);
}

#[test]
fn test_cpir_exhausts_without_match() {
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0xED, 0xB1]);
    cpu.hl = 0x2000;
    cpu.bc = 0x0003;
    cpu.a = 0xEE;
    while cpu.pc != 2 {
        cpu.step(&mut bus);
    }
    assert_eq!(cpu.bc, 0);
    assert!(!cpu.flag_z());
    assert!(!cpu.flag_pv());
}

#[test]
fn test_cpi_wz_and_carry_preserved() {
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0x37, 0xED, 0xA1]); // SCF ; CPI
    cpu.hl = 0x2000;
    cpu.bc = 0x0001;
    cpu.wz = 0x1234;
    cpu.step(&mut bus);
    cpu.step(&mut bus);
    assert!(cpu.flag_c()); // block compares never touch C
    assert_eq!(cpu.wz, 0x1235);
    assert!(cpu.flag_n());
}

#[test]
fn test_cpd_decrements() {
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0xED, 0xA9]); // CPD
    cpu.hl = 0x2001;
    cpu.bc = 0x0002;
    cpu.wz = 0x1000;
    cpu.step(&mut bus);
    assert_eq!(cpu.hl, 0x2000);
    assert_eq!(cpu.bc, 0x0001);
    assert_eq!(cpu.wz, 0x0FFF);
}

#[test]
fn test_ini_reads_port_into_memory() {
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0xED, 0xA2]); // INI
    cpu.bc = 0x0210; // B=2 counts, C=$10 port
    cpu.hl = 0x3000;
    bus.feed(0x10, &[0x7E]);
    cpu.step(&mut bus);
    assert_eq!(bus.mem[0x3000], 0x7E);
    assert_eq!(cpu.b(), 0x01);
    assert_eq!(cpu.hl, 0x3001);
    assert_eq!(cpu.wz, 0x0211);
    assert_eq!(cpu.pc, 2);
    assert_eq!(cpu.cyc, 16);
}

#[test]
fn test_inir_repeats_until_b_zero() {
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0xED, 0xB2]); // INIR
    cpu.bc = 0x0310;
    cpu.hl = 0x3000;
    bus.feed(0x10, &[1, 2, 3]);
    let mut total = 0u32;
    while cpu.pc != 2 {
        total += cpu.step(&mut bus);
    }
    assert_eq!(&bus.mem[0x3000..0x3003], &[1, 2, 3]);
    assert_eq!(cpu.b(), 0);
    assert!(cpu.flag_z()); // B reached zero
    assert_eq!(total, 21 + 21 + 16);
}

#[test]
fn test_outi_writes_port_from_memory() {
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0xED, 0xA3]); // OUTI
    cpu.bc = 0x0181;
    cpu.hl = 0x2000;
    bus.mem[0x2000] = 0x41;
    cpu.step(&mut bus);
    assert_eq!(bus.out_log, vec![(0x81, 0x41)]);
    assert_eq!(cpu.b(), 0);
    assert!(cpu.flag_z());
    assert_eq!(cpu.wz, 0x0082); // BC after B decrement, plus one
}

#[test]
fn test_otir_streams_buffer() {
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0xED, 0xB3]); // OTIR
    cpu.bc = 0x0481;
    cpu.hl = 0x2000;
    bus.mem[0x2000..0x2004].copy_from_slice(b"OK\r\n");
    while cpu.pc != 2 {
        cpu.step(&mut bus);
    }
    assert_eq!(
        bus.out_log,
        vec![(0x81, b'O'), (0x81, b'K'), (0x81, b'\r'), (0x81, b'\n')]
    );
}

#[test]
fn test_outd_descends() {
    let mut cpu = Cpu::new();
    let mut bus = TestBus::load(&[0xED, 0xAB]); // OUTD
    cpu.bc = 0x0110;
    cpu.hl = 0x2000;
    bus.mem[0x2000] = 0x55;
    cpu.step(&mut bus);
    assert_eq!(bus.out_log, vec![(0x10, 0x55)]);
    assert_eq!(cpu.hl, 0x1FFF);
}
