//! Linear-sweep decode sessions.
//!
//! A session owns a cursor into a read-only image and walks it forward one
//! decoded entry at a time until it reaches the end of the image or the
//! configured byte ceiling. Sessions share nothing, so many of them can run
//! over the same image in parallel.

use std::time::Instant;

use rayon::prelude::*;

use crate::decoder::linear_address;
use crate::pseudo::PseudoCode;
use crate::{Address, Decoded, Decoder, DisassemblyError, Insn};

/// Default per-session byte ceiling.
pub const DEFAULT_MAX_BYTES: usize = 512;

/// Parameters of one decode session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Image offset where decoding starts
    pub start_offset: usize,
    /// Address of image offset 0
    pub base_address: Address,
    /// Maximum number of bytes to decode, counted from `start_offset`
    pub max_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            start_offset: 0,
            base_address: 0,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl SessionConfig {
    /// Session starting at `start_offset` with default base and ceiling
    pub fn at(start_offset: usize) -> Self {
        Self {
            start_offset,
            ..Self::default()
        }
    }

    /// Address of the first decoded byte
    pub fn start_address(&self) -> Address {
        linear_address(self.base_address, self.start_offset)
    }
}

/// Parse a hexadecimal offset, with or without a `0x` prefix.
pub fn parse_hex_offset(text: &str) -> Result<usize, DisassemblyError> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    // from_str_radix also takes a leading sign
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(DisassemblyError::InvalidOffset(text.to_string()));
    }

    usize::from_str_radix(digits, 16).map_err(|_| DisassemblyError::InvalidOffset(text.to_string()))
}

/// Result of one decode session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    /// Image offset where decoding started
    pub start_offset: usize,
    /// Address of image offset 0
    pub base_address: Address,
    /// Every decoded entry, skipped bytes included, in memory order
    pub entries: Vec<Decoded>,
    /// Image offset where the cursor stopped
    pub end_offset: usize,
}

impl Listing {
    /// Address of the first decoded byte
    pub fn start_address(&self) -> Address {
        linear_address(self.base_address, self.start_offset)
    }

    /// Recognized instructions only
    pub fn instructions(&self) -> impl Iterator<Item = &Insn> + '_ {
        self.entries.iter().filter_map(Decoded::as_insn)
    }

    /// Number of bytes that did not start a supported instruction
    pub fn skipped(&self) -> usize {
        self.entries.iter().filter(|e| e.is_skipped()).count()
    }

    /// Number of bytes consumed by the session
    pub fn bytes_consumed(&self) -> usize {
        self.end_offset - self.start_offset
    }

    /// Assembly-view lines; skipped bytes are not shown
    pub fn assembly_lines(&self) -> Vec<String> {
        self.instructions().map(Insn::formatted_line).collect()
    }

    /// Pseudo-code for this session, named after its start address
    pub fn pseudo_code(&self) -> PseudoCode {
        PseudoCode::synthesize(self.start_address(), &self.entries)
    }
}

/// Linear sweep from `config.start_offset`.
///
/// # Arguments
/// * `image` - The binary image to disassemble
/// * `decoder` - The decoder to use for disassembly
/// * `config` - Start offset, base address and byte ceiling
///
/// # Returns
/// The decoded listing. Fails only when the start offset lies past the image.
pub fn run(image: &[u8], decoder: &dyn Decoder, config: &SessionConfig) -> Result<Listing, DisassemblyError> {
    let start = config.start_offset;
    if start > image.len() {
        return Err(DisassemblyError::OffsetOutOfRange {
            offset: start,
            len: image.len(),
        });
    }

    let limit = start.saturating_add(config.max_bytes).min(image.len());
    log::debug!(
        "Starting linear sweep at 0x{:X} over {} bytes (base 0x{:X})",
        start,
        limit - start,
        config.base_address
    );
    let start_time = Instant::now();

    let mut entries = Vec::new();
    let mut cursor = start;

    while cursor < limit {
        let mut decoded = decoder.decode(image, cursor, config.base_address);

        if decoded.size() == 0 {
            // Avoid an infinite loop on a zero-sized decode
            decoded = Decoded::Skipped {
                addr: decoded.addr(),
                byte: image[cursor],
            };
        }

        let next = cursor + decoded.size();
        if next > limit {
            log::debug!(
                "{} at 0x{:X} crosses the byte ceiling, stopping",
                decoded.mnemonic(),
                decoded.addr()
            );
            break;
        }

        entries.push(decoded);
        cursor = next;
    }

    let listing = Listing {
        start_offset: start,
        base_address: config.base_address,
        entries,
        end_offset: cursor,
    };

    log::debug!(
        "Linear sweep completed in {:?}: {} instructions, {} skipped bytes",
        start_time.elapsed(),
        listing.instructions().count(),
        listing.skipped()
    );

    Ok(listing)
}

/// Run independent sessions over the same image in parallel.
///
/// Results are returned in the order of `configs`.
pub fn run_many(
    image: &[u8],
    decoder: &dyn Decoder,
    configs: &[SessionConfig],
) -> Vec<Result<Listing, DisassemblyError>> {
    log::debug!("Running {} decode sessions in parallel", configs.len());

    configs
        .par_iter()
        .map(|config| run(image, decoder, config))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::X86Decoder;

    /// Claims every instruction is empty.
    struct ZeroSizeDecoder;

    impl Decoder for ZeroSizeDecoder {
        fn decode(&self, _image: &[u8], at: usize, base: Address) -> Decoded {
            Decoded::Recognized(Insn {
                addr: base + at as Address,
                size: 0,
                mnemonic: "nop",
                operands: String::new(),
                target: None,
                bytes: [0; crate::MAX_INSTRUCTION_SIZE],
            })
        }
    }

    #[test]
    fn test_parse_hex_offset() {
        assert_eq!(parse_hex_offset("0").unwrap(), 0);
        assert_eq!(parse_hex_offset("7c00").unwrap(), 0x7c00);
        assert_eq!(parse_hex_offset(" 0x1FE ").unwrap(), 0x1fe);
        assert_eq!(parse_hex_offset("0X10").unwrap(), 0x10);
        assert!(matches!(parse_hex_offset(""), Err(DisassemblyError::InvalidOffset(_))));
        assert!(matches!(parse_hex_offset("zz"), Err(DisassemblyError::InvalidOffset(_))));
    }

    #[test]
    fn test_parse_hex_offset_rejects_signs() {
        for text in ["+7c", "0x+7c", "-7c", "0x-1", "0x", "7c h"] {
            assert!(
                matches!(parse_hex_offset(text), Err(DisassemblyError::InvalidOffset(_))),
                "{:?} should be rejected",
                text
            );
        }
    }

    #[test]
    fn test_nop_ret_session() {
        let listing = run(&[0x90, 0xC3], &X86Decoder, &SessionConfig::default()).unwrap();
        let insns: Vec<_> = listing.instructions().collect();
        assert_eq!(insns.len(), 2);
        assert_eq!((insns[0].addr, insns[0].mnemonic), (0, "nop"));
        assert_eq!((insns[1].addr, insns[1].mnemonic), (1, "ret"));
        assert_eq!(listing.pseudo_code().body, vec!["return;"]);
        assert_eq!(listing.end_offset, 2);
    }

    #[test]
    fn test_cursor_reaches_end_of_image() {
        let image: Vec<u8> = (0..=255u8).rev().collect();
        let listing = run(&image, &X86Decoder, &SessionConfig::default()).unwrap();
        assert_eq!(listing.end_offset, image.len());
        assert_eq!(listing.bytes_consumed(), image.len());
        assert!(listing.entries.len() <= image.len());

        let consumed: usize = listing.entries.iter().map(Decoded::size).sum();
        assert_eq!(consumed, image.len());
    }

    #[test]
    fn test_entries_are_contiguous() {
        let image = [0xFF, 0xB8, 0x01, 0x00, 0xEE, 0x74, 0x00, 0xC3];
        let listing = run(&image, &X86Decoder, &SessionConfig::default()).unwrap();
        let mut expected = 0;
        for entry in &listing.entries {
            assert_eq!(entry.addr(), expected);
            expected += entry.size() as Address;
        }
        assert_eq!(listing.skipped(), 2);
        assert_eq!(listing.assembly_lines().len(), 3);
    }

    #[test]
    fn test_ceiling_stops_before_crossing_instruction() {
        // nop, then a 3-byte mov that would end past a 3-byte ceiling
        let image = [0x90, 0x90, 0xB8, 0x34, 0x12, 0xC3];
        let config = SessionConfig {
            max_bytes: 3,
            ..SessionConfig::default()
        };
        let listing = run(&image, &X86Decoder, &config).unwrap();
        assert_eq!(listing.entries.len(), 2);
        assert_eq!(listing.end_offset, 2);
    }

    #[test]
    fn test_ceiling_counts_from_start_offset() {
        let image = [0xFF; 16];
        let config = SessionConfig {
            start_offset: 4,
            max_bytes: 8,
            ..SessionConfig::default()
        };
        let listing = run(&image, &X86Decoder, &config).unwrap();
        assert_eq!(listing.entries.len(), 8);
        assert_eq!(listing.end_offset, 12);
        assert!(listing.assembly_lines().is_empty());
    }

    #[test]
    fn test_truncated_tail_is_skipped() {
        let listing = run(&[0x90, 0xE8, 0x00], &X86Decoder, &SessionConfig::default()).unwrap();
        assert_eq!(listing.entries.len(), 3);
        assert_eq!(listing.skipped(), 2);
        assert_eq!(listing.end_offset, 3);
    }

    #[test]
    fn test_base_address_and_start_offset() {
        let image = [0x00, 0x00, 0xE9, 0xFB, 0xFF];
        let config = SessionConfig {
            start_offset: 2,
            base_address: 0xFE,
            max_bytes: 16,
        };
        let listing = run(&image, &X86Decoder, &config).unwrap();
        let jmp = listing.instructions().next().unwrap();
        assert_eq!(jmp.addr, 0x100);
        assert_eq!(jmp.operands, "0xFE");
        assert_eq!(listing.pseudo_code().function_name(), "function_100");
    }

    #[test]
    fn test_addresses_wrap_past_32_bits() {
        let image = [0x90, 0xE9, 0x00, 0x00];
        let config = SessionConfig {
            base_address: 0xFFFF_FFFF,
            ..SessionConfig::default()
        };
        let listing = run(&image, &X86Decoder, &config).unwrap();

        assert_eq!(listing.start_address(), 0xFFFF_FFFF);
        let lines = listing.assembly_lines();
        assert!(lines[0].starts_with("0xFFFFFFFF  90 "));
        assert!(lines[1].starts_with("0x00000000  E9 00 00 "));
        assert!(lines[1].ends_with("jmp      0x3"));
        assert_eq!(listing.pseudo_code().function_name(), "function_FFFFFFFF");

        let config = SessionConfig {
            start_offset: 1,
            base_address: 0xFFFF_FFFF,
            max_bytes: 16,
        };
        assert_eq!(config.start_address(), 0);
        let listing = run(&image, &X86Decoder, &config).unwrap();
        assert_eq!(listing.pseudo_code().function_name(), "function_0");
    }

    #[test]
    fn test_offset_past_end_is_rejected() {
        let err = run(&[0x90], &X86Decoder, &SessionConfig::at(2)).unwrap_err();
        assert!(matches!(err, DisassemblyError::OffsetOutOfRange { offset: 2, len: 1 }));

        let empty = run(&[0x90], &X86Decoder, &SessionConfig::at(1)).unwrap();
        assert!(empty.entries.is_empty());
    }

    #[test]
    fn test_zero_sized_decode_still_advances() {
        let listing = run(&[0x90; 4], &ZeroSizeDecoder, &SessionConfig::default()).unwrap();
        assert_eq!(listing.entries.len(), 4);
        assert_eq!(listing.skipped(), 4);
        assert_eq!(listing.end_offset, 4);
    }

    #[test]
    fn test_run_many_matches_sequential_runs() {
        let image = [0xFA, 0xB0, 0x41, 0xCD, 0x10, 0xF4, 0xEB, 0xC3];
        let configs: Vec<_> = (0..image.len()).map(SessionConfig::at).collect();

        let parallel = run_many(&image, &X86Decoder, &configs);
        assert_eq!(parallel.len(), configs.len());
        for (config, result) in configs.iter().zip(parallel) {
            let sequential = run(&image, &X86Decoder, config).unwrap();
            assert_eq!(result.unwrap(), sequential);
        }
    }
}
