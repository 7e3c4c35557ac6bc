use std::ops::Range;

use crate::{InspectError, Result};

/// Resolves `offset..offset + len` against a region of `size` bytes.
///
/// `what` names the region being addressed so the resulting `OutOfBounds`
/// error reads like "program header table at 0x40+0x38 exceeds ...".
pub fn span(what: &'static str, size: usize, offset: u64, len: u64) -> Result<Range<usize>> {
    let out_of_bounds = || InspectError::OutOfBounds {
        what,
        offset,
        len,
        size,
    };

    let start = usize::try_from(offset).map_err(|_| out_of_bounds())?;
    let count = usize::try_from(len).map_err(|_| out_of_bounds())?;
    let end = start.checked_add(count).ok_or_else(out_of_bounds)?;
    if end > size {
        return Err(out_of_bounds());
    }
    Ok(start..end)
}

/// Read-only, bounds-checked window over a byte image.
#[derive(Debug, Clone, Copy)]
pub struct ByteView<'a> {
    data: &'a [u8],
}

impl<'a> ByteView<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &'a [u8] {
        self.data
    }

    pub fn slice(&self, what: &'static str, offset: u64, len: u64) -> Result<&'a [u8]> {
        let range = span(what, self.data.len(), offset, len)?;
        Ok(&self.data[range])
    }

    pub fn read_u8(&self, what: &'static str, offset: u64) -> Result<u8> {
        Ok(self.slice(what, offset, 1)?[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_within_bounds() {
        let view = ByteView::new(b"\x7fELF\x02");
        assert_eq!(view.slice("magic", 1, 3).unwrap(), b"ELF");
        assert_eq!(view.read_u8("class", 4).unwrap(), 2);
    }

    #[test]
    fn empty_slice_at_end_is_allowed() {
        let view = ByteView::new(&[1, 2, 3]);
        assert!(view.slice("tail", 3, 0).unwrap().is_empty());
    }

    #[test]
    fn slice_past_end_is_rejected() {
        let view = ByteView::new(&[0; 8]);
        let err = view.slice("table", 4, 5).unwrap_err();
        assert!(matches!(
            err,
            InspectError::OutOfBounds {
                what: "table",
                offset: 4,
                len: 5,
                size: 8
            }
        ));
        assert!(view.read_u8("class", 8).is_err());
    }

    #[test]
    fn overflowing_offsets_are_rejected() {
        let view = ByteView::new(&[0; 8]);
        assert!(view.slice("table", u64::MAX, 2).is_err());
        assert!(span("table", 8, 1, u64::MAX).is_err());
    }
}
