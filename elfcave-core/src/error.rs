use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, InspectError>;

/// Coarse failure categories. Usage errors belong to the front end and have no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Io,
    Format,
    UnsupportedClass,
    Allocation,
    Bounds,
}

#[derive(thiserror::Error, Debug)]
pub enum InspectError {
    #[error("'{}' does not exist", .path.display())]
    NotFound { path: PathBuf },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("'{}' is not a regular file", .path.display())]
    NotRegularFile { path: PathBuf },

    #[error("'{}' is empty", .path.display())]
    EmptyFile { path: PathBuf },

    #[error("buffer has no backing memory")]
    InvalidBuffer,

    #[error("missing ELF magic at offset 0")]
    NotElf,

    #[error("unsupported ELF class {0:#04x}")]
    UnsupportedClass(u8),

    #[error("unsupported ELF data encoding {0:#04x}")]
    UnsupportedEncoding(u8),

    #[error("{what} at {offset:#x}+{len:#x} exceeds buffer of {size:#x} bytes")]
    OutOfBounds {
        what: &'static str,
        offset: u64,
        len: u64,
        size: usize,
    },

    #[error("allocation of {len} bytes failed after {tries} attempts")]
    Allocation { len: usize, tries: u32 },

    #[error("msync failed")]
    SyncFailed(#[source] io::Error),

    #[error("munmap failed")]
    UnmapFailed(#[source] io::Error),

    #[error("msync failed ({sync}) and munmap failed ({unmap})")]
    SyncAndUnmapFailed { sync: io::Error, unmap: io::Error },
}

impl InspectError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        InspectError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            InspectError::NotFound { .. }
            | InspectError::Io { .. }
            | InspectError::SyncFailed(_)
            | InspectError::UnmapFailed(_)
            | InspectError::SyncAndUnmapFailed { .. } => ErrorKind::Io,
            InspectError::NotRegularFile { .. }
            | InspectError::EmptyFile { .. }
            | InspectError::InvalidBuffer
            | InspectError::NotElf
            | InspectError::UnsupportedEncoding(_) => ErrorKind::Format,
            InspectError::UnsupportedClass(_) => ErrorKind::UnsupportedClass,
            InspectError::Allocation { .. } => ErrorKind::Allocation,
            InspectError::OutOfBounds { .. } => ErrorKind::Bounds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(InspectError::NotElf.kind(), ErrorKind::Format);
        assert_eq!(
            InspectError::EmptyFile {
                path: PathBuf::from("x")
            }
            .kind(),
            ErrorKind::Format
        );
        assert_eq!(InspectError::UnsupportedClass(1).kind(), ErrorKind::UnsupportedClass);
        assert_eq!(
            InspectError::SyncFailed(io::Error::from_raw_os_error(libc::EIO)).kind(),
            ErrorKind::Io
        );
        assert_eq!(
            InspectError::OutOfBounds {
                what: "program header table",
                offset: 0x40,
                len: 0x38,
                size: 0x10,
            }
            .kind(),
            ErrorKind::Bounds
        );
    }

    #[test]
    fn out_of_bounds_message_names_region() {
        let err = InspectError::OutOfBounds {
            what: "section header table",
            offset: 0x1000,
            len: 0x40,
            size: 0x200,
        };
        assert_eq!(
            err.to_string(),
            "section header table at 0x1000+0x40 exceeds buffer of 0x200 bytes"
        );
    }
}
