//! JSON and JSON Lines output formatters

use serde::{Deserialize, Serialize};

use super::ListingFormatter;
use crate::sweep::Listing;
use crate::{DisassemblyError, Insn};

/// Serializable instruction for JSON output
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct InstructionJson {
    /// Address of the instruction
    pub address: String,
    /// Size of the instruction in bytes
    pub size: u8,
    /// Bytes of the instruction as hex string
    pub bytes: String,
    /// Mnemonic (e.g., "mov", "jz")
    pub mnemonic: String,
    /// Operands
    pub operands: String,
    /// Branch or call target, if any
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub target: Option<String>,
    /// Assembly-view line
    pub line: String,
}

/// Serializable session for JSON output
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ListingJson {
    /// Image offset where decoding started
    pub start_offset: String,
    /// Address of image offset 0
    pub base_address: String,
    /// Image offset where decoding stopped
    pub end_offset: String,
    /// Bytes that did not decode
    pub skipped_bytes: usize,
    /// Recognized instructions
    pub instructions: Vec<InstructionJson>,
    /// Pseudo-code lines, wrapper included
    pub pseudo_code: Vec<String>,
}

fn json_error(e: serde_json::Error) -> DisassemblyError {
    DisassemblyError::Generic(format!("JSON serialization error: {}", e))
}

/// Convert an instruction to JSON format
fn instruction_to_json(insn: &Insn) -> InstructionJson {
    InstructionJson {
        address: format!("0x{:X}", insn.addr),
        size: insn.size,
        bytes: insn.raw_hex(),
        mnemonic: insn.mnemonic.to_string(),
        operands: insn.operands.clone(),
        target: insn.target.map(|t| format!("0x{:X}", t)),
        line: insn.formatted_line(),
    }
}

impl ListingFormatter for super::JsonFormatter {
    fn format(&self, listing: &Listing) -> Result<String, DisassemblyError> {
        let result = ListingJson {
            start_offset: format!("0x{:X}", listing.start_offset),
            base_address: format!("0x{:X}", listing.base_address),
            end_offset: format!("0x{:X}", listing.end_offset),
            skipped_bytes: listing.skipped(),
            instructions: listing.instructions().map(instruction_to_json).collect(),
            pseudo_code: listing.pseudo_code().lines(),
        };

        serde_json::to_string_pretty(&result).map_err(json_error)
    }
}

impl ListingFormatter for super::JsonLinesFormatter {
    fn format(&self, listing: &Listing) -> Result<String, DisassemblyError> {
        let mut output = String::new();

        for insn in listing.instructions() {
            output.push_str(&serde_json::to_string(&instruction_to_json(insn)).map_err(json_error)?);
            output.push('\n');
        }

        Ok(output)
    }
}
