use std::fmt;

use goblin::elf::header::{EI_CLASS, ELFCLASS32, ELFCLASS64, ELFCLASSNONE, ELFMAG, SELFMAG};

use crate::{InspectError, MappedBuffer, Result};

/// Value of the `EI_CLASS` identification byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElfClass {
    None,
    ThirtyTwoBit,
    SixtyFourBit,
}

impl TryFrom<u8> for ElfClass {
    type Error = InspectError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            ELFCLASSNONE => Ok(ElfClass::None),
            ELFCLASS32 => Ok(ElfClass::ThirtyTwoBit),
            ELFCLASS64 => Ok(ElfClass::SixtyFourBit),
            other => Err(InspectError::UnsupportedClass(other)),
        }
    }
}

impl fmt::Display for ElfClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElfClass::None => "none",
            ElfClass::ThirtyTwoBit => "ELF32",
            ElfClass::SixtyFourBit => "ELF64",
        };
        write!(f, "{}", name)
    }
}

/// True iff `bytes` begins with `\x7fELF`.
pub fn has_elf_magic(bytes: &[u8]) -> bool {
    bytes.starts_with(ELFMAG)
}

/// Offset of the first ELF magic sequence that is not at the start of `bytes`.
pub fn misplaced_magic_offset(bytes: &[u8]) -> Option<usize> {
    bytes
        .windows(SELFMAG)
        .skip(1)
        .position(|w| w == ELFMAG)
        .map(|pos| pos + 1)
}

/// True iff the buffer starts with the ELF magic.
///
/// A magic sequence further into the buffer does not count. When warnings
/// are enabled it is searched for and logged.
pub fn is_elf(buffer: &MappedBuffer) -> bool {
    let bytes = buffer.as_slice();
    if has_elf_magic(bytes) {
        return true;
    }

    if log::log_enabled!(log::Level::Warn) {
        if let Some(pos) = misplaced_magic_offset(bytes) {
            log::warn!(
                "ELF magic found at offset {:#x} but the buffer begins at {:p}",
                pos,
                bytes.as_ptr()
            );
        }
    }
    false
}

/// Reads the class byte of a buffer.
///
/// Returns `ElfClass::None` for anything that is not ELF, and
/// `UnsupportedClass` for an ELF file whose class byte is unknown.
pub fn determine_class(buffer: &MappedBuffer) -> Result<ElfClass> {
    if !buffer.is_valid() {
        return Err(InspectError::InvalidBuffer);
    }
    if !has_elf_magic(buffer.as_slice()) {
        return Ok(ElfClass::None);
    }

    let class = buffer.view().read_u8("EI_CLASS", EI_CLASS as u64)?;
    ElfClass::try_from(class).inspect_err(|_| {
        log::error!("found an unsupported EI_CLASS value of {}", class);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AllocConfig;

    fn heap(bytes: &[u8]) -> MappedBuffer {
        MappedBuffer::from_bytes(bytes, &AllocConfig::default()).unwrap()
    }

    #[test]
    fn recognises_elf64() {
        let buffer = heap(b"\x7fELF\x02\x01\x01\x00");
        assert!(is_elf(&buffer));
        assert_eq!(determine_class(&buffer).unwrap(), ElfClass::SixtyFourBit);
    }

    #[test]
    fn recognises_elf32() {
        let buffer = heap(b"\x7fELF\x01\x01\x01\x00");
        assert_eq!(determine_class(&buffer).unwrap(), ElfClass::ThirtyTwoBit);
    }

    #[test]
    fn class_none_is_reported() {
        let buffer = heap(b"\x7fELF\x00\x01\x01\x00");
        assert_eq!(determine_class(&buffer).unwrap(), ElfClass::None);
    }

    #[test]
    fn non_elf_has_no_class() {
        let buffer = heap(b"#!/bin/sh\nexit 0\n");
        assert!(!is_elf(&buffer));
        assert_eq!(determine_class(&buffer).unwrap(), ElfClass::None);
    }

    #[test]
    fn magic_must_be_at_offset_zero() {
        let buffer = heap(b"\x00\x00\x7fELF\x02\x01\x01");
        assert!(!is_elf(&buffer));
        assert_eq!(determine_class(&buffer).unwrap(), ElfClass::None);
    }

    #[test]
    fn misplaced_magic_is_located() {
        assert_eq!(misplaced_magic_offset(b"\x00\x00\x7fELF\x02"), Some(2));
        assert_eq!(misplaced_magic_offset(b"\x7fELF\x02\x01"), None);
        assert_eq!(misplaced_magic_offset(b"\x7fELF\x7fELF"), Some(4));
        assert_eq!(misplaced_magic_offset(b"\x7fEL"), None);
    }

    #[test]
    fn unknown_class_byte_is_fatal() {
        let buffer = heap(b"\x7fELF\x09\x01\x01\x00");
        assert!(matches!(
            determine_class(&buffer),
            Err(InspectError::UnsupportedClass(9))
        ));
    }

    #[test]
    fn magic_without_class_byte_is_out_of_bounds() {
        let buffer = heap(b"\x7fELF");
        assert!(is_elf(&buffer));
        assert!(matches!(
            determine_class(&buffer),
            Err(InspectError::OutOfBounds { what: "EI_CLASS", .. })
        ));
    }

    #[test]
    fn class_byte_round_trips_through_display() {
        assert_eq!(ElfClass::try_from(2).unwrap().to_string(), "ELF64");
        assert_eq!(ElfClass::try_from(1).unwrap().to_string(), "ELF32");
    }
}
