pub mod elf;

pub use elf::Elf64Ehdr;

pub trait Header: std::fmt::Debug + Send + Sync {
    /// Returns the virtual address of the entry point.
    fn entry_point(&self) -> u64;

    /// Returns the machine architecture identifier.
    fn machine(&self) -> u16;

    /// Returns the object file type (`ET_*`).
    fn object_type(&self) -> u16;

    /// File offset of the program header table.
    fn program_header_offset(&self) -> u64;

    /// File offset of the section header table.
    fn section_header_offset(&self) -> u64;

    /// Returns a short human-readable name, e.g. "ELF64".
    fn format_name(&self) -> &'static str;

    /// Returns true if the binary represents an executable (vs object/lib).
    fn is_executable(&self) -> bool;
}
