//! CSV output formatter

use serde::Serialize;

use super::ListingFormatter;
use crate::sweep::Listing;
use crate::DisassemblyError;

#[derive(Serialize)]
struct Row<'a> {
    address: String,
    size: u8,
    bytes: String,
    mnemonic: &'a str,
    operands: &'a str,
}

impl ListingFormatter for super::CsvFormatter {
    fn format(&self, listing: &Listing) -> Result<String, DisassemblyError> {
        let csv_error = |e: csv::Error| DisassemblyError::Generic(format!("CSV serialization error: {}", e));

        let mut writer = csv::Writer::from_writer(Vec::new());

        // Header comes from the first row; keep it even when nothing decoded
        if listing.instructions().next().is_none() {
            writer
                .write_record(["address", "size", "bytes", "mnemonic", "operands"])
                .map_err(csv_error)?;
        }

        for insn in listing.instructions() {
            writer
                .serialize(Row {
                    address: format!("0x{:X}", insn.addr),
                    size: insn.size,
                    bytes: insn.raw_hex(),
                    mnemonic: insn.mnemonic,
                    operands: &insn.operands,
                })
                .map_err(csv_error)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| DisassemblyError::Generic(format!("CSV flush error: {}", e)))?;

        String::from_utf8(bytes).map_err(|e| DisassemblyError::Generic(e.to_string()))
    }
}
