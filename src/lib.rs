//! Core IR, traits, and dispatch for the pseudodis disassembler.
//!
//! pseudodis decodes a small, fixed subset of 16-bit x86 machine code into
//! symbolic instructions and rewrites the resulting stream into a flat,
//! goto-based pseudo-code view. Decoding is strictly forward and single-pass:
//! raw bytes become a [`Listing`](sweep::Listing) of [`Decoded`] entries,
//! and the listing becomes a [`PseudoCode`](pseudo::PseudoCode) block.
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use pseudodis::{
//!     decoder::X86Decoder,
//!     sweep::{self, SessionConfig},
//! };
//!
//! // Read binary file
//! let image = pseudodis::load_image("path/to/boot.bin").unwrap();
//!
//! // Decode at most 512 bytes starting at file offset 0x7c
//! let config = SessionConfig {
//!     start_offset: sweep::parse_hex_offset("7c").unwrap(),
//!     ..SessionConfig::default()
//! };
//! let listing = sweep::run(&image, &X86Decoder::new(), &config).unwrap();
//!
//! for line in listing.assembly_lines() {
//!     println!("{}", line);
//! }
//! print!("{}", listing.pseudo_code());
//! ```

pub mod parser;
pub mod decoder;
pub mod sweep;
pub mod pseudo;
pub mod format;

use std::fmt;
use std::path::Path;

/// Represents an address in memory
pub type Address = u64;

/// Longest encoding in the supported opcode table (opcode + imm16/rel16).
pub const MAX_INSTRUCTION_SIZE: usize = 3;

/// One recognized instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insn {
    /// Absolute address of the instruction (base address + cursor)
    pub addr: Address,
    /// Size of the instruction in bytes
    pub size: u8,
    /// Canonical lowercase mnemonic (e.g., "mov", "jz")
    pub mnemonic: &'static str,
    /// Rendered operands, empty when the instruction takes none
    pub operands: String,
    /// Absolute branch or call target, for relative control transfers
    pub target: Option<Address>,
    /// Raw bytes of the instruction, 0-padded past `size`
    pub bytes: [u8; MAX_INSTRUCTION_SIZE],
}

impl Insn {
    /// Returns the instruction bytes, up to the actual instruction size.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.size as usize]
    }

    /// Raw bytes as space separated upper-case hex pairs.
    pub fn raw_hex(&self) -> String {
        self.bytes()
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Fully composed assembly-view line: address, byte column, mnemonic column, operands.
    pub fn formatted_line(&self) -> String {
        format!(
            "0x{:08X}  {:<18} {:<8} {}",
            self.addr,
            self.raw_hex(),
            self.mnemonic,
            self.operands
        )
    }

    /// Address of the byte following this instruction
    pub fn end_address(&self) -> Address {
        self.addr + self.size as Address
    }

    /// Returns true for relative jumps, conditional or not
    pub fn is_branch(&self) -> bool {
        self.mnemonic.starts_with('j')
    }

    /// Returns true for relative calls
    pub fn is_call(&self) -> bool {
        self.mnemonic == "call"
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operands.is_empty() {
            write!(f, "{}", self.mnemonic)
        } else {
            write!(f, "{} {}", self.mnemonic, self.operands)
        }
    }
}

/// Outcome of one decode step.
///
/// Unrecognized opcodes and instructions whose operand bytes run past the end
/// of the buffer are not errors; they become `Skipped` and consume exactly one byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A fully decoded instruction
    Recognized(Insn),
    /// A single byte that did not start a supported instruction
    Skipped {
        /// Absolute address of the byte
        addr: Address,
        /// The byte value
        byte: u8,
    },
}

impl Decoded {
    /// Absolute address where this entry begins
    pub fn addr(&self) -> Address {
        match self {
            Decoded::Recognized(insn) => insn.addr,
            Decoded::Skipped { addr, .. } => *addr,
        }
    }

    /// Number of bytes this entry consumed (always at least 1)
    pub fn size(&self) -> usize {
        match self {
            Decoded::Recognized(insn) => insn.size as usize,
            Decoded::Skipped { .. } => 1,
        }
    }

    /// The recognized instruction, if any
    pub fn as_insn(&self) -> Option<&Insn> {
        match self {
            Decoded::Recognized(insn) => Some(insn),
            Decoded::Skipped { .. } => None,
        }
    }

    /// Returns true if this entry is a skipped byte
    pub fn is_skipped(&self) -> bool {
        matches!(self, Decoded::Skipped { .. })
    }

    /// Mnemonic of the instruction, empty for skipped bytes
    pub fn mnemonic(&self) -> &'static str {
        self.as_insn().map_or("", |insn| insn.mnemonic)
    }

    /// Assembly-view line, or an empty string when there is nothing to display
    pub fn formatted_line(&self) -> String {
        self.as_insn().map(Insn::formatted_line).unwrap_or_default()
    }
}

/// Decoder trait: turns the bytes at a cursor into one [`Decoded`] entry.
pub trait Decoder: Send + Sync {
    /// Decode a single instruction at `at` offset.
    ///
    /// # Arguments
    /// * `image` - The binary image to decode
    /// * `at` - Cursor into the image; callers guarantee `at < image.len()`
    /// * `base` - Address of image offset 0
    ///
    /// # Returns
    /// The decoded entry. Implementations must be total over every byte value.
    fn decode(&self, image: &[u8], at: usize, base: Address) -> Decoded;
}

/// Parser trait: inspect an image for a container header.
pub trait BinaryParser: Send + Sync {
    /// Parse binary data into image info
    ///
    /// # Arguments
    /// * `data` - The binary data to parse
    ///
    /// # Returns
    /// Image info; headerless data is reported as a raw image, not an error
    fn parse(&self, data: &[u8]) -> Result<parser::ImageInfo, DisassemblyError>;
}

/// Read a whole file into memory for decoding.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, DisassemblyError> {
    let path = path.as_ref();
    let image = std::fs::read(path)?;
    log::debug!("Loaded {} ({} bytes)", path.display(), image.len());
    Ok(image)
}

/// Error type for disassembly operations
#[derive(Debug, thiserror::Error)]
pub enum DisassemblyError {
    /// Failed to parse a container format
    #[error("Failed to parse binary format: {0}")]
    ParsingError(String),

    /// Start offset text is not a hexadecimal number
    #[error("Invalid start offset: {0:?}")]
    InvalidOffset(String),

    /// Start offset lies beyond the end of the image
    #[error("Start offset 0x{offset:X} is past the end of the image ({len} bytes)")]
    OffsetOutOfRange {
        /// Requested start offset
        offset: usize,
        /// Image length
        len: usize,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Generic(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mov_ax() -> Insn {
        Insn {
            addr: 0x7c00,
            size: 3,
            mnemonic: "mov",
            operands: "ax, 0x1234".to_string(),
            target: None,
            bytes: [0xb8, 0x34, 0x12],
        }
    }

    #[test]
    fn test_insn_bytes() {
        let insn = Insn {
            size: 1,
            mnemonic: "nop",
            operands: String::new(),
            bytes: [0x90, 0, 0],
            ..mov_ax()
        };

        assert_eq!(insn.bytes(), &[0x90]);
        assert_eq!(insn.raw_hex(), "90");
        assert_eq!(mov_ax().raw_hex(), "B8 34 12");
    }

    #[test]
    fn test_formatted_line_columns() {
        let line = mov_ax().formatted_line();
        assert_eq!(line, "0x00007C00  B8 34 12           mov      ax, 0x1234");
        assert_eq!(&line[..12], "0x00007C00  ");
        assert_eq!(&line[12..31], "B8 34 12           ");
        assert_eq!(&line[31..40], "mov      ");
    }

    #[test]
    fn test_skipped_has_empty_line() {
        let skipped = Decoded::Skipped { addr: 4, byte: 0xff };
        assert_eq!(skipped.formatted_line(), "");
        assert_eq!(skipped.mnemonic(), "");
        assert_eq!(skipped.size(), 1);
        assert!(skipped.as_insn().is_none());
    }

    #[test]
    fn test_recognized_accessors() {
        let decoded = Decoded::Recognized(mov_ax());
        assert_eq!(decoded.addr(), 0x7c00);
        assert_eq!(decoded.size(), 3);
        assert_eq!(decoded.mnemonic(), "mov");
        assert!(!decoded.is_skipped());
        assert_eq!(decoded.as_insn().unwrap().end_address(), 0x7c03);
        assert_eq!(decoded.as_insn().unwrap().to_string(), "mov ax, 0x1234");
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = load_image("/nonexistent/pseudodis/image.bin").unwrap_err();
        assert!(matches!(err, DisassemblyError::IoError(_)));
    }
}
