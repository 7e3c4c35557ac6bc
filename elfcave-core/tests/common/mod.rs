#![allow(dead_code)]

use byteorder::{ByteOrder, LE};
use std::io::Write;
use tempfile::NamedTempFile;

pub const ENTRY: u64 = 0x401000;

/// Little-endian ELF64 executable image of `len` bytes with one program
/// header right after the ELF header and a section header table at `shoff`.
pub fn elf64_image(len: usize, shoff: u64, shnum: u16) -> Vec<u8> {
    let mut bytes = vec![0xCCu8; len];
    bytes[..64].fill(0);
    bytes[..8].copy_from_slice(b"\x7fELF\x02\x01\x01\x00");
    LE::write_u16(&mut bytes[16..], 2);
    LE::write_u16(&mut bytes[18..], 62);
    LE::write_u32(&mut bytes[20..], 1);
    LE::write_u64(&mut bytes[24..], ENTRY);
    LE::write_u64(&mut bytes[32..], 64);
    LE::write_u64(&mut bytes[40..], shoff);
    LE::write_u16(&mut bytes[52..], 64);
    LE::write_u16(&mut bytes[54..], 56);
    LE::write_u16(&mut bytes[56..], 1);
    LE::write_u16(&mut bytes[58..], 64);
    LE::write_u16(&mut bytes[60..], shnum);
    bytes
}

/// Fixture file under the target directory; `/tmp` may be mounted `noexec`,
/// which would refuse the executable mapping.
pub fn fixture(bytes: &[u8]) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("elfcave-")
        .tempfile_in(env!("CARGO_TARGET_TMPDIR"))
        .unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}
