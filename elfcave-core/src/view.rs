use goblin::elf::header::{ELFCLASS32, ELFCLASSNONE};
use goblin::elf64::header::SIZEOF_EHDR;

use crate::format::{determine_class, has_elf_magic, ElfClass};
use crate::header::Elf64Ehdr;
use crate::{InspectError, MappedBuffer, Result};

/// The ELF header always starts the file.
pub const ELF_HEADER_OFFSET: u64 = 0;

/// Header locations of a 64-bit ELF image, borrowed from its buffer.
///
/// Every offset has been checked against the buffer by [`ElfView::resolve`],
/// including the full extent of both header tables.
#[derive(Debug, Clone, Copy)]
pub struct ElfView<'a> {
    buffer: &'a MappedBuffer,
    header: Elf64Ehdr,
}

impl<'a> ElfView<'a> {
    pub fn resolve(buffer: &'a MappedBuffer) -> Result<Self> {
        match determine_class(buffer)? {
            ElfClass::SixtyFourBit => {}
            ElfClass::ThirtyTwoBit => return Err(InspectError::UnsupportedClass(ELFCLASS32)),
            ElfClass::None if has_elf_magic(buffer.as_slice()) => {
                return Err(InspectError::UnsupportedClass(ELFCLASSNONE))
            }
            ElfClass::None => return Err(InspectError::NotElf),
        }

        let bytes = buffer.view();
        let header = Elf64Ehdr::parse(bytes.slice(
            "ELF header",
            ELF_HEADER_OFFSET,
            SIZEOF_EHDR as u64,
        )?)?;
        bytes.slice(
            "program header table",
            header.e_phoff,
            header.program_table_len(),
        )?;
        bytes.slice(
            "section header table",
            header.e_shoff,
            header.section_table_len(),
        )?;

        log::debug!(
            "resolved ELF64 headers: phdr at {:#x} ({} entries), shdr at {:#x} ({} entries)",
            header.e_phoff,
            header.e_phnum,
            header.e_shoff,
            header.e_shnum
        );
        Ok(Self { buffer, header })
    }

    pub fn buffer(&self) -> &'a MappedBuffer {
        self.buffer
    }

    pub fn header(&self) -> &Elf64Ehdr {
        &self.header
    }

    pub fn elf_header_offset(&self) -> u64 {
        ELF_HEADER_OFFSET
    }

    pub fn program_header_offset(&self) -> u64 {
        self.header.e_phoff
    }

    pub fn section_header_offset(&self) -> u64 {
        self.header.e_shoff
    }

    pub fn elf_header_bytes(&self) -> &'a [u8] {
        self.region(ELF_HEADER_OFFSET, SIZEOF_EHDR as u64)
    }

    pub fn program_header_table(&self) -> &'a [u8] {
        self.region(self.header.e_phoff, self.header.program_table_len())
    }

    pub fn section_header_table(&self) -> &'a [u8] {
        self.region(self.header.e_shoff, self.header.section_table_len())
    }

    // Only called with extents `resolve` has already checked.
    fn region(&self, offset: u64, len: u64) -> &'a [u8] {
        let start = offset as usize;
        &self.buffer.as_slice()[start..start + len as usize]
    }
}
