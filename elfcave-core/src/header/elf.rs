use crate::header::Header;
use crate::{InspectError, Result};
use byteorder::{ByteOrder, ReadBytesExt, BE, LE};
use goblin::elf::header::{et_to_str, machine_to_str, EI_DATA, ELFDATA2LSB, ELFDATA2MSB, ET_EXEC};
use goblin::elf64::header::SIZEOF_EHDR;
use std::io::{self, Cursor, Read};

/// Decoded ELF header of a 64-bit object file (`Elf64_Ehdr`).
///
/// It sits at offset 0 of every ELF file and locates everything else; this
/// crate only relies on it to find the program and section header tables.
///
/// Reference: [ELF Specification v1.2](https://refspecs.linuxfoundation.org/elf/elf.pdf)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elf64Ehdr {
    /// Identification bytes: magic, class, data encoding, version, OS ABI.
    pub e_ident: [u8; 16],

    /// Object file type.
    ///
    /// Common values:
    /// - `ET_REL` (1): Relocatable file
    /// - `ET_EXEC` (2): Executable file
    /// - `ET_DYN` (3): Shared object
    /// - `ET_CORE` (4): Core dump
    pub e_type: u16,

    /// Target architecture, e.g. `EM_X86_64` (62) or `EM_AARCH64` (183).
    pub e_machine: u16,

    pub e_version: u32,

    /// Virtual address execution starts at once the image is loaded.
    pub e_entry: u64,

    /// File offset of the program header table.
    pub e_phoff: u64,

    /// File offset of the section header table.
    pub e_shoff: u64,

    pub e_flags: u32,
    pub e_ehsize: u16,

    /// Size of one program header table entry.
    pub e_phentsize: u16,

    /// Number of program header table entries.
    pub e_phnum: u16,

    /// Size of one section header table entry.
    pub e_shentsize: u16,

    /// Number of section header table entries.
    pub e_shnum: u16,

    /// Index of the section holding section names.
    pub e_shstrndx: u16,
}

impl Elf64Ehdr {
    /// Decodes the header from the start of `bytes`, honouring `EI_DATA`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SIZEOF_EHDR {
            return Err(InspectError::OutOfBounds {
                what: "ELF header",
                offset: 0,
                len: SIZEOF_EHDR as u64,
                size: bytes.len(),
            });
        }

        let mut cur = Cursor::new(&bytes[..SIZEOF_EHDR]);
        let decoded = match bytes[EI_DATA] {
            ELFDATA2LSB => Self::from_reader::<LE, _>(&mut cur),
            ELFDATA2MSB => Self::from_reader::<BE, _>(&mut cur),
            other => return Err(InspectError::UnsupportedEncoding(other)),
        };
        decoded.map_err(|e| InspectError::io("unable to decode ELF header", e))
    }

    fn from_reader<B: ByteOrder, R: Read>(cur: &mut R) -> io::Result<Self> {
        let mut e_ident = [0u8; 16];
        cur.read_exact(&mut e_ident)?;

        Ok(Elf64Ehdr {
            e_ident,
            e_type: cur.read_u16::<B>()?,
            e_machine: cur.read_u16::<B>()?,
            e_version: cur.read_u32::<B>()?,
            e_entry: cur.read_u64::<B>()?,
            e_phoff: cur.read_u64::<B>()?,
            e_shoff: cur.read_u64::<B>()?,
            e_flags: cur.read_u32::<B>()?,
            e_ehsize: cur.read_u16::<B>()?,
            e_phentsize: cur.read_u16::<B>()?,
            e_phnum: cur.read_u16::<B>()?,
            e_shentsize: cur.read_u16::<B>()?,
            e_shnum: cur.read_u16::<B>()?,
            e_shstrndx: cur.read_u16::<B>()?,
        })
    }

    /// Byte length of the program header table.
    pub fn program_table_len(&self) -> u64 {
        u64::from(self.e_phnum) * u64::from(self.e_phentsize)
    }

    /// Byte length of the section header table.
    pub fn section_table_len(&self) -> u64 {
        u64::from(self.e_shnum) * u64::from(self.e_shentsize)
    }

    /// e.g. "EXEC" or "DYN".
    pub fn type_name(&self) -> &'static str {
        et_to_str(self.e_type)
    }

    /// e.g. "X86_64" or "AARCH64".
    pub fn machine_name(&self) -> &'static str {
        machine_to_str(self.e_machine)
    }

    pub fn is_big_endian(&self) -> bool {
        self.e_ident[EI_DATA] == ELFDATA2MSB
    }
}

impl Header for Elf64Ehdr {
    fn entry_point(&self) -> u64 {
        self.e_entry
    }

    fn machine(&self) -> u16 {
        self.e_machine
    }

    fn object_type(&self) -> u16 {
        self.e_type
    }

    fn program_header_offset(&self) -> u64 {
        self.e_phoff
    }

    fn section_header_offset(&self) -> u64 {
        self.e_shoff
    }

    fn format_name(&self) -> &'static str {
        "ELF64"
    }

    fn is_executable(&self) -> bool {
        self.e_type == ET_EXEC
    }
}
