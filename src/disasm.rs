//! Z80 Disassembler
//!
//! Single-instruction decode for the debugger view. Mirrors the interpreter's
//! decoding exactly: for every byte sequence, the reported length equals the
//! number of bytes one `step` consumes. In particular a DD/FD prefix whose
//! follower is another prefix byte (or ED) retires alone, and the DD CB form
//! takes its displacement before the final opcode byte.
//!
//! Syntax: standard Zilog mnemonics, `$XXXX`/`$XX` hex operands, signed
//! decimal displacements, relative branches resolved to absolute targets.

/// Result of disassembling an instruction
#[derive(Debug, Clone)]
pub struct DisasmResult {
    /// Raw opcode bytes as hex string (e.g., "DD 7E 05")
    pub bytes: String,
    /// Mnemonic with operands (e.g., "LD A,(IX+5)")
    pub mnemonic: String,
    /// Length of the instruction in bytes
    pub length: usize,
}

const R8: [&str; 8] = ["B", "C", "D", "E", "H", "L", "(HL)", "A"];
const RP: [&str; 4] = ["BC", "DE", "HL", "SP"];
const RP2: [&str; 4] = ["BC", "DE", "HL", "AF"];
const CC: [&str; 8] = ["NZ", "Z", "NC", "C", "PO", "PE", "P", "M"];
const ALU: [&str; 8] = [
    "ADD A,", "ADC A,", "SUB ", "SBC A,", "AND ", "XOR ", "OR ", "CP ",
];
const ROT: [&str; 8] = ["RLC", "RRC", "RL", "RR", "SLA", "SRA", "SLL", "SRL"];
const ACC_OPS: [&str; 8] = ["RLCA", "RRCA", "RLA", "RRA", "DAA", "CPL", "SCF", "CCF"];
const BLI: [[&str; 4]; 4] = [
    ["LDI", "CPI", "INI", "OUTI"],
    ["LDD", "CPD", "IND", "OUTD"],
    ["LDIR", "CPIR", "INIR", "OTIR"],
    ["LDDR", "CPDR", "INDR", "OTDR"],
];

/// Index register context for name substitution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Idx {
    Hl,
    Ix,
    Iy,
}

impl Idx {
    fn pair(self) -> &'static str {
        match self {
            Idx::Hl => "HL",
            Idx::Ix => "IX",
            Idx::Iy => "IY",
        }
    }

    fn high(self) -> &'static str {
        match self {
            Idx::Hl => "H",
            Idx::Ix => "IXH",
            Idx::Iy => "IYH",
        }
    }

    fn low(self) -> &'static str {
        match self {
            Idx::Hl => "L",
            Idx::Ix => "IXL",
            Idx::Iy => "IYL",
        }
    }
}

/// Disassemble one instruction.
///
/// `code` is a window of memory starting at `addr` (six bytes cover any
/// instruction); `addr` resolves relative-branch targets. Missing trailing
/// bytes decode as zero.
pub fn disassemble(code: &[u8], addr: u16) -> DisasmResult {
    if code.is_empty() {
        return DisasmResult {
            bytes: String::new(),
            mnemonic: "???".to_string(),
            length: 0,
        };
    }

    let (mnemonic, length) = disasm_main(code, addr);
    let bytes = code[..length.min(code.len())]
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ");

    DisasmResult {
        bytes,
        mnemonic,
        length,
    }
}

#[inline]
fn at(code: &[u8], i: usize) -> u8 {
    code.get(i).copied().unwrap_or(0)
}

fn imm16(code: &[u8], i: usize) -> u16 {
    at(code, i) as u16 | ((at(code, i + 1) as u16) << 8)
}

/// 8-bit register name with index substitution for H/L
fn reg(code: u8, idx: Idx) -> String {
    match code {
        4 => idx.high().to_string(),
        5 => idx.low().to_string(),
        _ => R8[code as usize].to_string(),
    }
}

/// Register pair name; p==2 is the index pair
fn rp_name(p: u8, idx: Idx) -> &'static str {
    if p == 2 {
        idx.pair()
    } else {
        RP[p as usize]
    }
}

/// Push/pop pair name; p==2 is the index pair
fn rp2_name(p: u8, idx: Idx) -> &'static str {
    if p == 2 {
        idx.pair()
    } else {
        RP2[p as usize]
    }
}

fn disasm_main(code: &[u8], addr: u16) -> (String, usize) {
    match at(code, 0) {
        0xCB => (disasm_cb(at(code, 1)), 2),
        0xED => disasm_ed(code),
        0xDD => disasm_index(code, addr, Idx::Ix),
        0xFD => disasm_index(code, addr, Idx::Iy),
        _ => disasm_op(code, addr, Idx::Hl),
    }
}

fn disasm_index(code: &[u8], addr: u16, idx: Idx) -> (String, usize) {
    match at(code, 1) {
        // A prefix followed by another prefix byte (or ED) retires alone
        0xDD | 0xFD | 0xED => (format!("DB ${:02X}", at(code, 0)), 1),
        0xCB => disasm_ddcb(code, idx),
        _ => {
            let (mnemonic, len) = disasm_op(&code[1..], addr.wrapping_add(1), idx);
            (mnemonic, len + 1)
        }
    }
}

/// Unprefixed (or index-substituted) instruction; `code[0]` is the opcode
fn disasm_op(code: &[u8], addr: u16, idx: Idx) -> (String, usize) {
    let op = at(code, 0);
    let x = op >> 6;
    let y = (op >> 3) & 0x07;
    let z = op & 0x07;
    let p = y >> 1;
    let q = y & 0x01;

    match x {
        0 => disasm_x0(code, addr, y, z, p, q, idx),
        1 => {
            if y == 6 && z == 6 {
                ("HALT".to_string(), 1)
            } else if idx != Idx::Hl && (y == 6 || z == 6) {
                let d = at(code, 1) as i8;
                if y == 6 {
                    (
                        format!("LD ({}{:+}),{}", idx.pair(), d, R8[z as usize]),
                        2,
                    )
                } else {
                    (
                        format!("LD {},({}{:+})", R8[y as usize], idx.pair(), d),
                        2,
                    )
                }
            } else {
                (format!("LD {},{}", reg(y, idx), reg(z, idx)), 1)
            }
        }
        2 => {
            if z == 6 && idx != Idx::Hl {
                let d = at(code, 1) as i8;
                (format!("{}({}{:+})", ALU[y as usize], idx.pair(), d), 2)
            } else {
                (format!("{}{}", ALU[y as usize], reg(z, idx)), 1)
            }
        }
        _ => disasm_x3(code, y, z, p, q, idx),
    }
}

fn disasm_x0(code: &[u8], addr: u16, y: u8, z: u8, p: u8, q: u8, idx: Idx) -> (String, usize) {
    match z {
        0 => match y {
            0 => ("NOP".to_string(), 1),
            1 => ("EX AF,AF'".to_string(), 1),
            2 => {
                let d = at(code, 1) as i8;
                let target = addr.wrapping_add(2).wrapping_add(d as i16 as u16);
                (format!("DJNZ ${:04X}", target), 2)
            }
            3 => {
                let d = at(code, 1) as i8;
                let target = addr.wrapping_add(2).wrapping_add(d as i16 as u16);
                (format!("JR ${:04X}", target), 2)
            }
            _ => {
                let d = at(code, 1) as i8;
                let target = addr.wrapping_add(2).wrapping_add(d as i16 as u16);
                (format!("JR {},${:04X}", CC[(y - 4) as usize], target), 2)
            }
        },
        1 => {
            if q == 0 {
                (format!("LD {},${:04X}", rp_name(p, idx), imm16(code, 1)), 3)
            } else {
                (format!("ADD {},{}", idx.pair(), rp_name(p, idx)), 1)
            }
        }
        2 => match (q, p) {
            (0, 0) => ("LD (BC),A".to_string(), 1),
            (0, 1) => ("LD (DE),A".to_string(), 1),
            (0, 2) => (format!("LD (${:04X}),{}", imm16(code, 1), idx.pair()), 3),
            (0, _) => (format!("LD (${:04X}),A", imm16(code, 1)), 3),
            (1, 0) => ("LD A,(BC)".to_string(), 1),
            (1, 1) => ("LD A,(DE)".to_string(), 1),
            (1, 2) => (format!("LD {},(${:04X})", idx.pair(), imm16(code, 1)), 3),
            _ => (format!("LD A,(${:04X})", imm16(code, 1)), 3),
        },
        3 => {
            let op = if q == 0 { "INC" } else { "DEC" };
            (format!("{} {}", op, rp_name(p, idx)), 1)
        }
        4 | 5 => {
            let op = if z == 4 { "INC" } else { "DEC" };
            if y == 6 && idx != Idx::Hl {
                let d = at(code, 1) as i8;
                (format!("{} ({}{:+})", op, idx.pair(), d), 2)
            } else {
                (format!("{} {}", op, reg(y, idx)), 1)
            }
        }
        6 => {
            if y == 6 && idx != Idx::Hl {
                let d = at(code, 1) as i8;
                (
                    format!("LD ({}{:+}),${:02X}", idx.pair(), d, at(code, 2)),
                    3,
                )
            } else {
                (format!("LD {},${:02X}", reg(y, idx), at(code, 1)), 2)
            }
        }
        _ => (ACC_OPS[y as usize].to_string(), 1),
    }
}

fn disasm_x3(code: &[u8], y: u8, z: u8, p: u8, q: u8, idx: Idx) -> (String, usize) {
    match z {
        0 => (format!("RET {}", CC[y as usize]), 1),
        1 => {
            if q == 0 {
                (format!("POP {}", rp2_name(p, idx)), 1)
            } else {
                match p {
                    0 => ("RET".to_string(), 1),
                    1 => ("EXX".to_string(), 1),
                    2 => (format!("JP ({})", idx.pair()), 1),
                    _ => (format!("LD SP,{}", idx.pair()), 1),
                }
            }
        }
        2 => (
            format!("JP {},${:04X}", CC[y as usize], imm16(code, 1)),
            3,
        ),
        3 => match y {
            0 => (format!("JP ${:04X}", imm16(code, 1)), 3),
            2 => (format!("OUT (${:02X}),A", at(code, 1)), 2),
            3 => (format!("IN A,(${:02X})", at(code, 1)), 2),
            4 => (format!("EX (SP),{}", idx.pair()), 1),
            5 => ("EX DE,HL".to_string(), 1),
            6 => ("DI".to_string(), 1),
            7 => ("EI".to_string(), 1),
            // y==1 is the CB prefix, routed before this point
            _ => (format!("DB ${:02X}", at(code, 0)), 1),
        },
        4 => (
            format!("CALL {},${:04X}", CC[y as usize], imm16(code, 1)),
            3,
        ),
        5 => {
            if q == 0 {
                (format!("PUSH {}", rp2_name(p, idx)), 1)
            } else if p == 0 {
                (format!("CALL ${:04X}", imm16(code, 1)), 3)
            } else {
                // DD/ED/FD prefixes are routed before this point
                (format!("DB ${:02X}", at(code, 0)), 1)
            }
        }
        6 => (format!("{}${:02X}", ALU[y as usize], at(code, 1)), 2),
        _ => (format!("RST ${:02X}", y * 8), 1),
    }
}

fn disasm_cb(op: u8) -> String {
    let x = op >> 6;
    let y = (op >> 3) & 0x07;
    let z = op & 0x07;
    let r = R8[z as usize];

    match x {
        0 => format!("{} {}", ROT[y as usize], r),
        1 => format!("BIT {},{}", y, r),
        2 => format!("RES {},{}", y, r),
        _ => format!("SET {},{}", y, r),
    }
}

fn disasm_ddcb(code: &[u8], idx: Idx) -> (String, usize) {
    let d = at(code, 2) as i8;
    let op = at(code, 3);
    let x = op >> 6;
    let y = (op >> 3) & 0x07;
    let z = op & 0x07;
    let mem = format!("({}{:+})", idx.pair(), d);

    let mnemonic = match x {
        1 => format!("BIT {},{}", y, mem),
        0 if z == 6 => format!("{} {}", ROT[y as usize], mem),
        // Undocumented register-copy forms
        0 => format!("{} {},{}", ROT[y as usize], mem, R8[z as usize]),
        2 if z == 6 => format!("RES {},{}", y, mem),
        2 => format!("RES {},{},{}", y, mem, R8[z as usize]),
        _ if z == 6 => format!("SET {},{}", y, mem),
        _ => format!("SET {},{},{}", y, mem, R8[z as usize]),
    };
    (mnemonic, 4)
}

fn disasm_ed(code: &[u8]) -> (String, usize) {
    let op = at(code, 1);
    let x = op >> 6;
    let y = (op >> 3) & 0x07;
    let z = op & 0x07;
    let p = y >> 1;
    let q = y & 0x01;

    if x == 2 && z <= 3 && y >= 4 {
        return (BLI[(y - 4) as usize][z as usize].to_string(), 2);
    }
    if x != 1 {
        return (format!("DB $ED,${:02X}", op), 2);
    }

    match z {
        0 => {
            if y == 6 {
                ("IN (C)".to_string(), 2)
            } else {
                (format!("IN {},(C)", R8[y as usize]), 2)
            }
        }
        1 => {
            if y == 6 {
                ("OUT (C),0".to_string(), 2)
            } else {
                (format!("OUT (C),{}", R8[y as usize]), 2)
            }
        }
        2 => {
            let op = if q == 0 { "SBC" } else { "ADC" };
            (format!("{} HL,{}", op, RP[p as usize]), 2)
        }
        3 => {
            let nn = imm16(code, 2);
            if q == 0 {
                (format!("LD (${:04X}),{}", nn, RP[p as usize]), 4)
            } else {
                (format!("LD {},(${:04X})", RP[p as usize], nn), 4)
            }
        }
        4 => ("NEG".to_string(), 2),
        5 => {
            if y == 1 {
                ("RETI".to_string(), 2)
            } else {
                ("RETN".to_string(), 2)
            }
        }
        6 => {
            let mode = match y & 0x03 {
                0 | 1 => "0",
                2 => "1",
                _ => "2",
            };
            (format!("IM {}", mode), 2)
        }
        _ => match y {
            0 => ("LD I,A".to_string(), 2),
            1 => ("LD R,A".to_string(), 2),
            2 => ("LD A,I".to_string(), 2),
            3 => ("LD A,R".to_string(), 2),
            4 => ("RRD".to_string(), 2),
            5 => ("RLD".to_string(), 2),
            _ => (format!("DB $ED,${:02X}", op), 2),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dis(code: &[u8]) -> (String, usize) {
        let r = disassemble(code, 0x0100);
        (r.mnemonic, r.length)
    }

    #[test]
    fn test_basic_ops() {
        assert_eq!(dis(&[0x00]), ("NOP".to_string(), 1));
        assert_eq!(dis(&[0x76]), ("HALT".to_string(), 1));
        assert_eq!(dis(&[0x3E, 0x42]), ("LD A,$42".to_string(), 2));
        assert_eq!(dis(&[0x21, 0x34, 0x12]), ("LD HL,$1234".to_string(), 3));
        assert_eq!(dis(&[0x7E]), ("LD A,(HL)".to_string(), 1));
        assert_eq!(dis(&[0x96]), ("SUB (HL)".to_string(), 1));
        assert_eq!(dis(&[0xC6, 0x01]), ("ADD A,$01".to_string(), 2));
    }

    #[test]
    fn test_relative_targets() {
        // At 0x0100, JR +5 lands at 0x0107
        assert_eq!(dis(&[0x18, 0x05]), ("JR $0107".to_string(), 2));
        // Backwards: DJNZ -2 loops onto itself
        assert_eq!(dis(&[0x10, 0xFE]), ("DJNZ $0100".to_string(), 2));
        assert_eq!(dis(&[0x20, 0x00]), ("JR NZ,$0102".to_string(), 2));
    }

    #[test]
    fn test_io_and_control() {
        assert_eq!(dis(&[0xD3, 0x81]), ("OUT ($81),A".to_string(), 2));
        assert_eq!(dis(&[0xDB, 0x00]), ("IN A,($00)".to_string(), 2));
        assert_eq!(dis(&[0xC3, 0x00, 0x20]), ("JP $2000".to_string(), 3));
        assert_eq!(dis(&[0xFF]), ("RST $38".to_string(), 1));
        assert_eq!(dis(&[0xFB]), ("EI".to_string(), 1));
    }

    #[test]
    fn test_cb_prefix() {
        assert_eq!(dis(&[0xCB, 0x00]), ("RLC B".to_string(), 2));
        assert_eq!(dis(&[0xCB, 0x46]), ("BIT 0,(HL)".to_string(), 2));
        assert_eq!(dis(&[0xCB, 0xFF]), ("SET 7,A".to_string(), 2));
        assert_eq!(dis(&[0xCB, 0x36]), ("SLL (HL)".to_string(), 2));
    }

    #[test]
    fn test_ed_prefix() {
        assert_eq!(dis(&[0xED, 0xB0]), ("LDIR".to_string(), 2));
        assert_eq!(dis(&[0xED, 0x44]), ("NEG".to_string(), 2));
        assert_eq!(dis(&[0xED, 0x4D]), ("RETI".to_string(), 2));
        assert_eq!(dis(&[0xED, 0x78]), ("IN A,(C)".to_string(), 2));
        assert_eq!(dis(&[0xED, 0x71]), ("OUT (C),0".to_string(), 2));
        assert_eq!(
            dis(&[0xED, 0x43, 0x00, 0x80]),
            ("LD ($8000),BC".to_string(), 4)
        );
        // Unrecognised ED decodes as data bytes
        assert_eq!(dis(&[0xED, 0x00]), ("DB $ED,$00".to_string(), 2));
    }

    #[test]
    fn test_index_prefix() {
        assert_eq!(dis(&[0xDD, 0x7E, 0x05]), ("LD A,(IX+5)".to_string(), 3));
        assert_eq!(dis(&[0xFD, 0x77, 0xFB]), ("LD (IY-5),A".to_string(), 3));
        assert_eq!(
            dis(&[0xDD, 0x36, 0x02, 0x99]),
            ("LD (IX+2),$99".to_string(), 4)
        );
        assert_eq!(dis(&[0xDD, 0x21, 0x00, 0x20]), ("LD IX,$2000".to_string(), 4));
        assert_eq!(dis(&[0xDD, 0x23]), ("INC IX".to_string(), 2));
        assert_eq!(dis(&[0xDD, 0x24]), ("INC IXH".to_string(), 2));
        assert_eq!(dis(&[0xDD, 0x65]), ("LD IXH,IXL".to_string(), 2));
        assert_eq!(dis(&[0xDD, 0xE9]), ("JP (IX)".to_string(), 2));
        // Register operand is not substituted next to a displacement operand
        assert_eq!(dis(&[0xDD, 0x66, 0x01]), ("LD H,(IX+1)".to_string(), 3));
    }

    #[test]
    fn test_prefix_chains_retire_alone() {
        assert_eq!(dis(&[0xDD, 0xDD, 0x21]), ("DB $DD".to_string(), 1));
        assert_eq!(dis(&[0xDD, 0xFD, 0x21]), ("DB $DD".to_string(), 1));
        assert_eq!(dis(&[0xFD, 0xED, 0xB0]), ("DB $FD".to_string(), 1));
    }

    #[test]
    fn test_ddcb() {
        assert_eq!(
            dis(&[0xDD, 0xCB, 0x05, 0x06]),
            ("RLC (IX+5)".to_string(), 4)
        );
        // Undocumented register-copy form
        assert_eq!(
            dis(&[0xDD, 0xCB, 0x05, 0x00]),
            ("RLC (IX+5),B".to_string(), 4)
        );
        assert_eq!(
            dis(&[0xFD, 0xCB, 0xFF, 0x4E]),
            ("BIT 1,(IY-1)".to_string(), 4)
        );
        assert_eq!(
            dis(&[0xDD, 0xCB, 0x00, 0xC7]),
            ("SET 0,(IX+0),A".to_string(), 4)
        );
    }
}
