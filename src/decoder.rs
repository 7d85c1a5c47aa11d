//! Table-driven decoder for the supported 16-bit x86 subset.
//!
//! Every opcode byte maps to an optional [`Rule`] in a 256-entry table. A rule
//! knows how many operand bytes follow the opcode and how to render them, so
//! decoding is one table lookup plus one operand read.

use std::fmt;

use crate::{Address, Decoded, Decoder, Insn, MAX_INSTRUCTION_SIZE};

/// Instruction addresses and branch targets live in a 32-bit address space.
pub const ADDRESS_MASK: Address = 0xFFFF_FFFF;

/// Address of image offset `offset` when offset 0 sits at `base`, wrapped to 32 bits.
pub fn linear_address(base: Address, offset: usize) -> Address {
    base.wrapping_add(offset as Address) & ADDRESS_MASK
}

/// 16-bit general purpose registers in opcode order.
pub const REGS16: [&str; 8] = ["ax", "cx", "dx", "bx", "sp", "bp", "si", "di"];

/// 8-bit register names for `mov r8, imm8`, lettered `'a' + n` then `l`.
pub const REGS8: [&str; 8] = ["al", "bl", "cl", "dl", "el", "fl", "gl", "hl"];

/// How to decode the bytes following one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// No operand bytes and no operands
    Bare(&'static str),
    /// Register encoded in the low three opcode bits
    Reg(&'static str),
    /// `mov r8, imm8`
    MovImm8,
    /// `mov r16, imm16`
    MovImm16,
    /// One immediate byte rendered as `0x%02X`
    Imm8(&'static str),
    /// Signed 8-bit displacement relative to the next instruction
    Rel8(&'static str),
    /// Signed 16-bit displacement relative to the next instruction
    Rel16(&'static str),
}

impl Rule {
    /// Number of bytes that follow the opcode byte
    pub const fn operand_len(&self) -> usize {
        match self {
            Rule::Bare(_) | Rule::Reg(_) => 0,
            Rule::MovImm8 | Rule::Imm8(_) | Rule::Rel8(_) => 1,
            Rule::MovImm16 | Rule::Rel16(_) => 2,
        }
    }

    /// Total encoded length, opcode included
    pub const fn encoded_len(&self) -> usize {
        1 + self.operand_len()
    }

    /// Mnemonic produced by this rule
    pub const fn mnemonic(&self) -> &'static str {
        match *self {
            Rule::Bare(m) | Rule::Reg(m) | Rule::Imm8(m) | Rule::Rel8(m) | Rule::Rel16(m) => m,
            Rule::MovImm8 | Rule::MovImm16 => "mov",
        }
    }

    /// Render operands for `opcode` given its operand bytes.
    ///
    /// `addr` is the absolute address of the opcode byte; it only matters
    /// for relative branches. Returns the operand text and the branch target.
    fn operands(&self, opcode: u8, operand: &[u8], addr: Address) -> (String, Option<Address>) {
        let reg = (opcode & 0x07) as usize;
        match *self {
            Rule::Bare(_) => (String::new(), None),
            Rule::Reg(_) => (REGS16[reg].to_string(), None),
            Rule::MovImm8 => (format!("{}, 0x{:02X}", REGS8[reg], operand[0]), None),
            Rule::MovImm16 => {
                let imm = u16::from_le_bytes([operand[0], operand[1]]);
                (format!("{}, 0x{:04X}", REGS16[reg], imm), None)
            }
            Rule::Imm8(_) => (format!("0x{:02X}", operand[0]), None),
            Rule::Rel8(_) => {
                let target = relative_target(addr, self.encoded_len(), operand[0] as i8 as i64);
                (format!("0x{:X}", target), Some(target))
            }
            Rule::Rel16(_) => {
                let disp = i16::from_le_bytes([operand[0], operand[1]]);
                let target = relative_target(addr, self.encoded_len(), disp as i64);
                (format!("0x{:X}", target), Some(target))
            }
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (+{} bytes)", self.mnemonic(), self.operand_len())
    }
}

/// `start + len + disp`, wrapped to the 32-bit address space.
pub fn relative_target(start: Address, len: usize, disp: i64) -> Address {
    start
        .wrapping_add(len as Address)
        .wrapping_add_signed(disp)
        & ADDRESS_MASK
}

const fn build_rules() -> [Option<Rule>; 256] {
    let mut table: [Option<Rule>; 256] = [None; 256];

    table[0x90] = Some(Rule::Bare("nop"));
    table[0xC3] = Some(Rule::Bare("ret"));
    table[0xCC] = Some(Rule::Bare("int3"));
    table[0xF4] = Some(Rule::Bare("hlt"));
    table[0xFA] = Some(Rule::Bare("cli"));
    table[0xFB] = Some(Rule::Bare("sti"));

    let mut n = 0;
    while n < 8 {
        table[0x50 + n] = Some(Rule::Reg("push"));
        table[0x58 + n] = Some(Rule::Reg("pop"));
        table[0xB0 + n] = Some(Rule::MovImm8);
        table[0xB8 + n] = Some(Rule::MovImm16);
        n += 1;
    }

    table[0xE8] = Some(Rule::Rel16("call"));
    table[0xE9] = Some(Rule::Rel16("jmp"));

    table[0x74] = Some(Rule::Rel8("jz"));
    table[0x75] = Some(Rule::Rel8("jnz"));
    table[0x7C] = Some(Rule::Rel8("jl"));
    table[0x7D] = Some(Rule::Rel8("jge"));
    table[0x7E] = Some(Rule::Rel8("jle"));
    table[0x7F] = Some(Rule::Rel8("jg"));

    table[0xCD] = Some(Rule::Imm8("int"));

    table
}

/// Opcode byte → decode rule.
pub static RULES: [Option<Rule>; 256] = build_rules();

/// Look up the decode rule for an opcode byte.
pub fn rule_for(opcode: u8) -> Option<Rule> {
    RULES[opcode as usize]
}

/// Decode one instruction at `at`, with addresses relative to `base`.
///
/// Callers guarantee `at < image.len()`. An unknown opcode, or one whose
/// operand bytes are cut off by the end of the image, yields
/// [`Decoded::Skipped`] covering only the opcode byte.
pub fn decode_at(image: &[u8], at: usize, base: Address) -> Decoded {
    let opcode = image[at];
    let addr = linear_address(base, at);
    let skipped = Decoded::Skipped { addr, byte: opcode };

    let Some(rule) = rule_for(opcode) else {
        return skipped;
    };

    let end = at + rule.encoded_len();
    if end > image.len() {
        log::trace!("Truncated {} at 0x{:X}", rule.mnemonic(), addr);
        return skipped;
    }

    let raw = &image[at..end];
    let (operands, target) = rule.operands(opcode, &raw[1..], addr);

    let mut bytes = [0u8; MAX_INSTRUCTION_SIZE];
    bytes[..raw.len()].copy_from_slice(raw);

    Decoded::Recognized(Insn {
        addr,
        size: raw.len() as u8,
        mnemonic: rule.mnemonic(),
        operands,
        target,
        bytes,
    })
}

/// Decode one instruction at `cursor` and return it with the advanced cursor.
///
/// Addresses are buffer offsets (base 0). The returned cursor is always
/// strictly greater than `cursor`.
pub fn decode_one(buffer: &[u8], cursor: usize) -> (Decoded, usize) {
    let decoded = decode_at(buffer, cursor, 0);
    let next = cursor + decoded.size();
    (decoded, next)
}

/// Decoder for the supported x86 subset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct X86Decoder;

impl X86Decoder {
    /// Construct a new X86Decoder.
    pub fn new() -> Self {
        X86Decoder
    }
}

impl fmt::Display for X86Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X86Decoder")
    }
}

impl Decoder for X86Decoder {
    fn decode(&self, image: &[u8], at: usize, base: Address) -> Decoded {
        decode_at(image, at, base)
    }
}
