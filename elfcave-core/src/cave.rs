use crate::{MappedBuffer, OriginKind};

/// A run of zero bytes inside a scanned image.
///
/// Borrows the image it was found in. An empty cave means no zero byte was
/// found; it has no offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeCave<'a> {
    source: &'a [u8],
    start: usize,
    len: usize,
}

impl<'a> CodeCave<'a> {
    /// Offset of the run within the scanned image, `None` if nothing was found.
    pub fn offset(&self) -> Option<usize> {
        (self.len > 0).then_some(self.start)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn kind(&self) -> OriginKind {
        OriginKind::Cave
    }

    /// The zero bytes themselves, aliasing the scanned image.
    pub fn as_bytes(&self) -> &'a [u8] {
        &self.source[self.start..self.start + self.len]
    }
}

/// Longest run of zero bytes in `bytes`.
///
/// Single pass. On ties the earliest run wins, and a run reaching the end of
/// the slice is considered.
pub fn largest_zero_run(bytes: &[u8]) -> CodeCave<'_> {
    let (mut best_start, mut best_len) = (0, 0);
    let (mut run_start, mut run_len) = (0, 0);

    for (i, &byte) in bytes.iter().enumerate() {
        if byte == 0 {
            if run_len == 0 {
                run_start = i;
            }
            run_len += 1;
        } else {
            if run_len > best_len {
                best_start = run_start;
                best_len = run_len;
            }
            run_len = 0;
        }
    }
    // Trailing run
    if run_len > best_len {
        best_start = run_start;
        best_len = run_len;
    }

    CodeCave {
        source: bytes,
        start: best_start,
        len: best_len,
    }
}

pub fn find_largest_zero_run(buffer: &MappedBuffer) -> CodeCave<'_> {
    let cave = largest_zero_run(buffer.as_slice());
    match cave.offset() {
        Some(offset) => log::info!("largest code cave: {} bytes at {:#x}", cave.len(), offset),
        None => log::info!("no zero bytes in {} byte image", buffer.len()),
    }
    cave
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_zero_bytes() {
        let cave = largest_zero_run(b"\x7fELF");
        assert!(cave.is_empty());
        assert_eq!(cave.offset(), None);
        assert!(cave.as_bytes().is_empty());
    }

    #[test]
    fn empty_input() {
        assert!(largest_zero_run(&[]).is_empty());
    }

    #[test]
    fn all_zero() {
        let bytes = [0u8; 37];
        let cave = largest_zero_run(&bytes);
        assert_eq!(cave.offset(), Some(0));
        assert_eq!(cave.len(), 37);
    }

    #[test]
    fn earliest_run_wins_ties() {
        let cave = largest_zero_run(b"A\0\0\0B\0\0\0C");
        assert_eq!(cave.offset(), Some(1));
        assert_eq!(cave.len(), 3);
    }

    #[test]
    fn trailing_run_is_counted() {
        let cave = largest_zero_run(b"A\0B\0\0\0\0");
        assert_eq!(cave.offset(), Some(3));
        assert_eq!(cave.len(), 4);
    }

    #[test]
    fn longer_later_run_replaces_earlier() {
        let cave = largest_zero_run(b"\0\0X\0\0\0\0Y\0");
        assert_eq!(cave.offset(), Some(3));
        assert_eq!(cave.len(), 4);
    }

    #[test]
    fn five_byte_run_beats_three_byte_run() {
        let cave = largest_zero_run(b"\x7fELF\x02\x01\x01\0\0\0\0\0X\0\0\0");
        assert_eq!(cave.offset(), Some(7));
        assert_eq!(cave.len(), 5);
        assert_eq!(cave.kind(), OriginKind::Cave);
    }

    #[test]
    fn cave_aliases_source() {
        let bytes = b"ab\0\0cd";
        let cave = largest_zero_run(bytes);
        assert_eq!(cave.as_bytes(), b"\0\0");
        assert_eq!(cave.as_bytes().as_ptr(), bytes[2..].as_ptr());
    }
}
