//! Goblin-based container detection.
//!
//! Flat images (boot sectors, `.com` files, raw dumps) are decoded as-is. When
//! the image is an ELF, PE or Mach-O container the parser reports where its
//! first executable section lives in the FILE, so a session can start there.

use std::fmt;

use goblin::mach::{constants::cputype, Mach, MachO};
use goblin::{elf, pe, Object};

use crate::{BinaryParser, DisassemblyError};

/// Container format of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// No recognized header; decode the bytes directly
    Raw,
    /// ELF object or executable
    Elf,
    /// PE/COFF executable
    Pe,
    /// Mach-O binary
    MachO,
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageFormat::Raw => write!(f, "raw"),
            ImageFormat::Elf => write!(f, "ELF"),
            ImageFormat::Pe => write!(f, "PE"),
            ImageFormat::MachO => write!(f, "Mach-O"),
        }
    }
}

/// Instruction set declared by a container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Machine {
    /// 16/32-bit x86
    X86,
    /// x86-64
    X86_64,
    /// Anything else
    Other,
    /// No header to say
    Unknown,
}

impl Machine {
    /// Whether the supported opcode subset applies to this machine at all
    pub fn is_x86(&self) -> bool {
        matches!(self, Machine::X86 | Machine::X86_64)
    }
}

/// A byte range of the image that holds code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeRegion {
    /// Section or segment name
    pub name: String,
    /// File offset of the first byte
    pub offset: usize,
    /// Length in bytes
    pub size: usize,
}

impl CodeRegion {
    /// Create a new code region
    pub fn new(name: impl Into<String>, offset: usize, size: usize) -> Self {
        Self {
            name: name.into(),
            offset,
            size,
        }
    }

    /// File offset one past the last byte
    pub fn end_offset(&self) -> usize {
        self.offset.saturating_add(self.size)
    }
}

/// What the parser learned about an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    /// Detected container format
    pub format: ImageFormat,
    /// Declared machine
    pub machine: Machine,
    /// Executable regions in file order
    pub code_regions: Vec<CodeRegion>,
}

impl ImageInfo {
    /// Info for a headerless image.
    pub fn raw() -> Self {
        Self {
            format: ImageFormat::Raw,
            machine: Machine::Unknown,
            code_regions: Vec::new(),
        }
    }

    /// First executable region that actually lies inside an image of `len` bytes
    pub fn code_region(&self, len: usize) -> Option<&CodeRegion> {
        self.code_regions
            .iter()
            .find(|r| r.size > 0 && r.offset < len)
    }
}

/// A parser that recognizes ELF, PE, and Mach-O via Goblin.
#[derive(Debug, Default)]
pub struct GoblinParser;

impl GoblinParser {
    /// Construct a new GoblinParser.
    pub fn new() -> Self {
        GoblinParser
    }

    fn parse_elf(&self, elf: elf::Elf) -> ImageInfo {
        let machine = match elf.header.e_machine {
            elf::header::EM_386 => Machine::X86,
            elf::header::EM_X86_64 => Machine::X86_64,
            _ => Machine::Other,
        };

        let code_regions = elf
            .section_headers
            .iter()
            .filter(|sh| sh.is_executable() && sh.sh_type != elf::section_header::SHT_NOBITS)
            .map(|sh| {
                let name = elf.shdr_strtab.get_at(sh.sh_name).unwrap_or("");
                CodeRegion::new(name, sh.sh_offset as usize, sh.sh_size as usize)
            })
            .collect();

        ImageInfo {
            format: ImageFormat::Elf,
            machine,
            code_regions,
        }
    }

    fn parse_pe(&self, pe: pe::PE<'_>) -> ImageInfo {
        let machine = match pe.header.coff_header.machine {
            pe::header::COFF_MACHINE_X86 => Machine::X86,
            pe::header::COFF_MACHINE_X86_64 => Machine::X86_64,
            _ => Machine::Other,
        };

        let code_regions = pe
            .sections
            .iter()
            .filter(|s| (s.characteristics & pe::section_table::IMAGE_SCN_MEM_EXECUTE) != 0)
            .map(|s| {
                CodeRegion::new(
                    s.name().unwrap_or(""),
                    s.pointer_to_raw_data as usize,
                    s.size_of_raw_data as usize,
                )
            })
            .collect();

        ImageInfo {
            format: ImageFormat::Pe,
            machine,
            code_regions,
        }
    }

    fn parse_macho(&self, macho: &MachO) -> ImageInfo {
        let machine = match macho.header.cputype {
            cputype::CPU_TYPE_I386 => Machine::X86,
            cputype::CPU_TYPE_X86_64 => Machine::X86_64,
            _ => Machine::Other,
        };

        let mut code_regions = Vec::new();
        for segment in &macho.segments {
            // VM_PROT_EXECUTE
            if (segment.maxprot & 0x4) == 0 || segment.filesize == 0 {
                continue;
            }
            code_regions.push(CodeRegion::new(
                segment.name().unwrap_or(""),
                segment.fileoff as usize,
                segment.filesize as usize,
            ));
        }

        ImageInfo {
            format: ImageFormat::MachO,
            machine,
            code_regions,
        }
    }
}

impl fmt::Display for GoblinParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GoblinParser")
    }
}

impl BinaryParser for GoblinParser {
    fn parse(&self, data: &[u8]) -> Result<ImageInfo, DisassemblyError> {
        let info = match Object::parse(data) {
            Ok(Object::Elf(elf)) => self.parse_elf(elf),
            Ok(Object::PE(pe)) => self.parse_pe(pe),
            Ok(Object::Mach(Mach::Binary(macho))) => self.parse_macho(&macho),
            Ok(Object::Mach(Mach::Fat(_))) => {
                return Err(DisassemblyError::ParsingError(
                    "fat Mach-O archives are not supported; extract one architecture first".into(),
                ))
            }
            // Anything goblin cannot classify is a flat image
            _ => ImageInfo::raw(),
        };

        if info.format != ImageFormat::Raw && !info.machine.is_x86() {
            log::warn!(
                "{} image declares a non-x86 machine; decoding it as x86 anyway",
                info.format
            );
        }

        log::debug!(
            "Detected {} image with {} code region(s)",
            info.format,
            info.code_regions.len()
        );

        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_info() {
        let info = ImageInfo::raw();
        assert_eq!(info.format, ImageFormat::Raw);
        assert_eq!(info.machine, Machine::Unknown);
        assert!(info.code_region(512).is_none());
    }

    #[test]
    fn test_boot_sector_is_raw() {
        let mut sector = vec![0u8; 512];
        sector[..4].copy_from_slice(&[0xFA, 0x31, 0xC0, 0xF4]);
        sector[510] = 0x55;
        sector[511] = 0xAA;

        let info = GoblinParser::new().parse(&sector).unwrap();
        assert_eq!(info.format, ImageFormat::Raw);
        assert!(info.code_regions.is_empty());
    }

    #[test]
    fn test_empty_image_is_raw() {
        let info = GoblinParser::new().parse(&[]).unwrap();
        assert_eq!(info.format, ImageFormat::Raw);
    }

    #[test]
    fn test_code_region_must_fit_image() {
        let info = ImageInfo {
            format: ImageFormat::Elf,
            machine: Machine::X86,
            code_regions: vec![
                CodeRegion::new(".init", 0x2000, 0x10),
                CodeRegion::new(".empty", 0x40, 0),
                CodeRegion::new(".text", 0x100, 0x80),
            ],
        };
        let region = info.code_region(0x1000).unwrap();
        assert_eq!(region.name, ".text");
        assert_eq!(region.end_offset(), 0x180);
    }

    #[test]
    fn test_machine_is_x86() {
        assert!(Machine::X86.is_x86());
        assert!(Machine::X86_64.is_x86());
        assert!(!Machine::Other.is_x86());
    }
}
