use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::fd::AsRawFd;
use std::path::Path;
use std::ptr::{self, NonNull};
use std::sync::atomic::{compiler_fence, Ordering};

use crate::bytes::{span, ByteView};
use crate::{InspectError, Result};

/// Number of allocation attempts made before giving up on a heap buffer.
pub const DEFAULT_ALLOC_TRIES: u32 = 3;

/// Tunables for heap-backed buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocConfig {
    pub max_tries: u32,
}

impl Default for AllocConfig {
    fn default() -> Self {
        Self {
            max_tries: DEFAULT_ALLOC_TRIES,
        }
    }
}

/// Where the bytes of a buffer come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OriginKind {
    /// Shared file mapping, owned by the buffer.
    Mapping,
    /// Heap allocation, owned by the buffer.
    Heap,
    /// Sub-range of another buffer; owns nothing.
    Cave,
}

impl fmt::Display for OriginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OriginKind::Mapping => "mapping",
            OriginKind::Heap => "heap",
            OriginKind::Cave => "cave",
        };
        write!(f, "{}", name)
    }
}

enum Backing {
    Mapping { base: NonNull<u8>, len: usize },
    Heap(Vec<u8>),
    Unmapped,
}

/// A contiguous byte image owned exclusively by this value.
///
/// File-backed buffers are mapped `PROT_READ | PROT_WRITE | PROT_EXEC` and
/// `MAP_SHARED`, so writes through [`MappedBuffer::as_mut_slice`] land in the
/// file. The mapping must be released with [`MappedBuffer::unmap`]; dropping a
/// still-mapped buffer unmaps it without syncing.
pub struct MappedBuffer {
    backing: Backing,
}

// SAFETY: the mapped region is owned exclusively by the buffer and only
// mutated through `&mut self`.
unsafe impl Send for MappedBuffer {}
unsafe impl Sync for MappedBuffer {}

impl MappedBuffer {
    /// Opens `path` read/write and maps the whole file into memory.
    ///
    /// The file descriptor is closed before returning, whether or not the
    /// mapping succeeded.
    pub fn open_and_map<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let (file, len) = open_regular(path, true)?;

        // SAFETY: `file` is a regular file of `len` bytes, open for reading
        // and writing, and `len` is non-zero.
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        let mapped = if addr == libc::MAP_FAILED {
            Err(InspectError::io(
                format!("unable to map '{}'", path.display()),
                io::Error::last_os_error(),
            ))
        } else {
            NonNull::new(addr.cast::<u8>()).ok_or_else(|| {
                InspectError::io(
                    format!("unable to map '{}'", path.display()),
                    io::Error::other("mmap returned a null mapping"),
                )
            })
        };
        // The mapping keeps its own reference to the file.
        drop(file);

        let base = mapped?;
        log::debug!("mapped '{}' ({} bytes) at {:p}", path.display(), len, base);
        Ok(Self {
            backing: Backing::Mapping { base, len },
        })
    }

    /// Zero-filled heap buffer of `len` bytes, retrying the allocation up to
    /// `config.max_tries` times.
    pub fn allocate(len: usize, config: &AllocConfig) -> Result<Self> {
        if len == 0 {
            return Err(InspectError::InvalidBuffer);
        }

        let mut bytes: Vec<u8> = Vec::new();
        let mut reserved = false;
        for attempt in 1..=config.max_tries {
            match bytes.try_reserve_exact(len) {
                Ok(()) => {
                    reserved = true;
                    break;
                }
                Err(e) => log::warn!(
                    "allocation of {} bytes failed (attempt {}/{}): {}",
                    len,
                    attempt,
                    config.max_tries,
                    e
                ),
            }
        }
        if !reserved {
            return Err(InspectError::Allocation {
                len,
                tries: config.max_tries,
            });
        }

        bytes.resize(len, 0);
        Ok(Self {
            backing: Backing::Heap(bytes),
        })
    }

    /// Heap copy of `bytes`.
    pub fn from_bytes(bytes: &[u8], config: &AllocConfig) -> Result<Self> {
        let mut buffer = Self::allocate(bytes.len(), config)?;
        buffer.as_mut_slice().copy_from_slice(bytes);
        Ok(buffer)
    }

    /// Reads the whole of `path` into a private heap buffer.
    ///
    /// Applies the same checks as [`MappedBuffer::open_and_map`] but never
    /// writes to the file.
    pub fn read_file<P: AsRef<Path>>(path: P, config: &AllocConfig) -> Result<Self> {
        let path = path.as_ref();
        let (mut file, len) = open_regular(path, false)?;
        let mut buffer = Self::allocate(len, config)?;
        file.read_exact(buffer.as_mut_slice())
            .map_err(|e| InspectError::io(format!("unable to read '{}'", path.display()), e))?;
        log::debug!("read '{}' ({} bytes) into heap", path.display(), len);
        Ok(buffer)
    }

    pub fn kind(&self) -> OriginKind {
        match self.backing {
            Backing::Heap(_) => OriginKind::Heap,
            Backing::Mapping { .. } | Backing::Unmapped => OriginKind::Mapping,
        }
    }

    /// Structural validity: backing memory is present and non-empty.
    pub fn is_valid(&self) -> bool {
        !self.is_empty()
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.backing, Backing::Mapping { .. })
    }

    pub fn len(&self) -> usize {
        match &self.backing {
            Backing::Mapping { len, .. } => *len,
            Backing::Heap(bytes) => bytes.len(),
            Backing::Unmapped => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Base address of the image, null once unmapped.
    pub fn as_ptr(&self) -> *const u8 {
        match &self.backing {
            Backing::Mapping { base, .. } => base.as_ptr(),
            Backing::Heap(bytes) => bytes.as_ptr(),
            Backing::Unmapped => ptr::null(),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.backing {
            // SAFETY: `base` maps `len` bytes for as long as `self` is mapped.
            Backing::Mapping { base, len } => unsafe {
                std::slice::from_raw_parts(base.as_ptr(), *len)
            },
            Backing::Heap(bytes) => bytes.as_slice(),
            Backing::Unmapped => &[],
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match &mut self.backing {
            // SAFETY: as above, and `&mut self` guarantees exclusivity.
            Backing::Mapping { base, len } => unsafe {
                std::slice::from_raw_parts_mut(base.as_ptr(), *len)
            },
            Backing::Heap(bytes) => bytes.as_mut_slice(),
            Backing::Unmapped => &mut [],
        }
    }

    pub fn view(&self) -> ByteView<'_> {
        ByteView::new(self.as_slice())
    }

    pub fn read_at(&self, offset: u64, len: u64) -> Result<&[u8]> {
        self.view().slice("read", offset, len)
    }

    pub fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let range = span("write", self.len(), offset, bytes.len() as u64)?;
        self.as_mut_slice()[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Removes the file mapping, flushing dirty pages first when `sync` is set.
    ///
    /// The unmap is attempted even if the flush fails; both failures are
    /// reported. The buffer is left empty either way.
    pub fn unmap(&mut self, sync: bool) -> Result<()> {
        let Backing::Mapping { base, len } = self.backing else {
            return Err(InspectError::InvalidBuffer);
        };
        self.backing = Backing::Unmapped;

        let synced = if sync { msync(base, len) } else { Ok(()) };
        match &synced {
            Ok(()) if sync => log::debug!("synced {} bytes at {:p} to file", len, base),
            Ok(()) => {}
            Err(e) => log::error!("msync of {:p} failed: {}", base, e),
        }

        let unmapped = munmap(base, len);
        match &unmapped {
            Ok(()) => log::debug!("unmapped {} bytes at {:p}", len, base),
            Err(e) => log::error!("munmap of {:p} failed: {}", base, e),
        }

        match (synced, unmapped) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(sync), Ok(())) => Err(InspectError::SyncFailed(sync)),
            (Ok(()), Err(unmap)) => Err(InspectError::UnmapFailed(unmap)),
            (Err(sync), Err(unmap)) => Err(InspectError::SyncAndUnmapFailed { sync, unmap }),
        }
    }

    /// Releases the buffer.
    ///
    /// Heap contents are zeroed before they go back to the allocator. A
    /// buffer that is still mapped is synced and unmapped first.
    pub fn release(mut self) -> Result<()> {
        if self.is_mapped() {
            self.unmap(true)?;
        }
        Ok(())
    }
}

impl Drop for MappedBuffer {
    fn drop(&mut self) {
        match &mut self.backing {
            Backing::Heap(bytes) => scrub(bytes),
            Backing::Mapping { base, len } => {
                if let Err(e) = munmap(*base, *len) {
                    log::warn!("munmap of {:p} on drop failed: {}", *base, e);
                }
            }
            Backing::Unmapped => {}
        }
    }
}

impl fmt::Debug for MappedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedBuffer")
            .field("kind", &self.kind())
            .field("base", &self.as_ptr())
            .field("len", &self.len())
            .finish()
    }
}

fn open_regular(path: &Path, write: bool) -> Result<(File, usize)> {
    let file = OpenOptions::new()
        .read(true)
        .write(write)
        .open(path)
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => InspectError::NotFound {
                path: path.to_path_buf(),
            },
            _ if e.raw_os_error() == Some(libc::EISDIR) => InspectError::NotRegularFile {
                path: path.to_path_buf(),
            },
            _ => InspectError::io(format!("unable to open '{}'", path.display()), e),
        })?;

    let metadata = file
        .metadata()
        .map_err(|e| InspectError::io(format!("unable to fstat '{}'", path.display()), e))?;
    if !metadata.is_file() {
        return Err(InspectError::NotRegularFile {
            path: path.to_path_buf(),
        });
    }
    if metadata.len() == 0 {
        return Err(InspectError::EmptyFile {
            path: path.to_path_buf(),
        });
    }

    let len = usize::try_from(metadata.len()).map_err(|_| {
        InspectError::io(
            format!("unable to map '{}'", path.display()),
            io::Error::other("file does not fit in the address space"),
        )
    })?;
    Ok((file, len))
}

fn msync(base: NonNull<u8>, len: usize) -> io::Result<()> {
    // SAFETY: `base..base + len` is a live mapping owned by the caller.
    let rc = unsafe {
        libc::msync(
            base.as_ptr().cast(),
            len,
            libc::MS_SYNC | libc::MS_INVALIDATE,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn munmap(base: NonNull<u8>, len: usize) -> io::Result<()> {
    // SAFETY: the caller gives up every reference into the region.
    let rc = unsafe { libc::munmap(base.as_ptr().cast(), len) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn scrub(bytes: &mut [u8]) {
    for byte in bytes.iter_mut() {
        // SAFETY: `byte` is a valid, aligned `&mut u8`.
        unsafe { ptr::write_volatile(byte, 0) };
    }
    compiler_fence(Ordering::SeqCst);
}
