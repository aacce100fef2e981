//! Signal tracks: owned buffers or memory-mapped `.npy` files
//!
//! A [`Track`] is the storage for one channel of one chromosome. Owned
//! tracks are plain vectors. Mapped tracks view the data section of an
//! uncompressed `.npy` file in place; read-write maps write through to disk.

use crate::core::element::{Dtype, Element};
use crate::core::error::{EngineError, Result};
use memmap2::{Mmap, MmapMut};
use ndarray::ArrayView1;
use ndarray_npy::ViewNpyExt;
use std::collections::HashSet;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

/// Files currently mapped read-write by a live track
static RW_MAPPED: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();

fn rw_registry() -> &'static Mutex<HashSet<PathBuf>> {
    RW_MAPPED.get_or_init(|| Mutex::new(HashSet::new()))
}

fn register_rw(path: &Path) -> Result<()> {
    let mut held = rw_registry().lock().unwrap_or_else(|e| e.into_inner());
    if !held.insert(path.to_path_buf()) {
        return Err(EngineError::AlreadyMapped(path.to_path_buf()));
    }
    Ok(())
}

fn unregister_rw(path: &Path) {
    let mut held = rw_registry().lock().unwrap_or_else(|e| e.into_inner());
    held.remove(path);
}

/// True if some live track maps `path` read-write
pub fn is_mapped_read_write(path: &Path) -> bool {
    let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    rw_registry()
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .contains(&key)
}

enum Mapping {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

impl Mapping {
    fn bytes(&self) -> &[u8] {
        match self {
            Mapping::ReadOnly(m) => &m[..],
            Mapping::ReadWrite(m) => &m[..],
        }
    }
}

/// The data section of a mapped `.npy` file
pub struct MappedTrack<T: Element> {
    mapping: Mapping,
    offset: usize,
    len: usize,
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: Element> MappedTrack<T> {
    /// Map an uncompressed `.npy` file holding a 1-D array of `T`
    pub fn open(path: &Path, writable: bool) -> Result<Self> {
        let path = path.canonicalize()?;
        let found = {
            let mut file = File::open(&path)?;
            sniff_dtype(&mut file, &path)?
        };
        if found != T::DTYPE {
            return Err(EngineError::DtypeMismatch {
                path,
                expected: T::DTYPE.descr().to_string(),
                found: found.descr().to_string(),
            });
        }

        let mapping = if writable {
            register_rw(&path)?;
            let file = match OpenOptions::new().read(true).write(true).open(&path) {
                Ok(f) => f,
                Err(e) => {
                    unregister_rw(&path);
                    return Err(e.into());
                }
            };
            // SAFETY: the registry guarantees no other track in this process
            // maps the file read-write; external writers are not supported.
            match unsafe { MmapMut::map_mut(&file) } {
                Ok(m) => Mapping::ReadWrite(m),
                Err(e) => {
                    unregister_rw(&path);
                    return Err(e.into());
                }
            }
        } else {
            let file = File::open(&path)?;
            // SAFETY: read-only view; the file is not truncated while mapped.
            Mapping::ReadOnly(unsafe { Mmap::map(&file)? })
        };

        let (offset, len) = {
            let bytes = mapping.bytes();
            let view = match ArrayView1::<T>::view_npy(bytes) {
                Ok(v) => v,
                Err(e) => {
                    if writable {
                        unregister_rw(&path);
                    }
                    return Err(EngineError::npy(&path, e));
                }
            };
            (view.as_ptr() as usize - bytes.as_ptr() as usize, view.len())
        };

        log::debug!(
            "Mapped {} ({} elements, {})",
            path.display(),
            len,
            if writable { "read-write" } else { "read-only" }
        );

        Ok(Self {
            mapping,
            offset,
            len,
            path,
            _marker: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_writable(&self) -> bool {
        matches!(self.mapping, Mapping::ReadWrite(_))
    }

    fn as_slice(&self) -> &[T] {
        let bytes = self.mapping.bytes();
        // SAFETY: `view_npy` validated type, alignment and length of this
        // region when the track was opened, and the mapping lives as long
        // as `self`.
        unsafe { std::slice::from_raw_parts(bytes.as_ptr().add(self.offset) as *const T, self.len) }
    }

    fn as_mut_slice(&mut self) -> Option<&mut [T]> {
        match &mut self.mapping {
            Mapping::ReadWrite(m) => {
                // SAFETY: as in `as_slice`; the mutable borrow of `self`
                // makes this the only live view.
                Some(unsafe {
                    std::slice::from_raw_parts_mut(m.as_mut_ptr().add(self.offset) as *mut T, self.len)
                })
            }
            Mapping::ReadOnly(_) => None,
        }
    }

    /// Flush pending writes of a read-write map
    pub fn flush(&self) -> Result<()> {
        if let Mapping::ReadWrite(m) = &self.mapping {
            m.flush()?;
        }
        Ok(())
    }
}

impl<T: Element> Drop for MappedTrack<T> {
    fn drop(&mut self) {
        if let Mapping::ReadWrite(m) = &self.mapping {
            if let Err(e) = m.flush() {
                log::warn!("Failed to flush {}: {}", self.path.display(), e);
            }
            unregister_rw(&self.path);
        }
    }
}

/// One channel of one chromosome
pub enum Track<T: Element> {
    Owned(Vec<T>),
    Mapped(MappedTrack<T>),
}

impl<T: Element> Track<T> {
    pub fn zeros(len: usize) -> Self {
        Track::Owned(vec![T::zero(); len])
    }

    pub fn from_vec(values: Vec<T>) -> Self {
        Track::Owned(values)
    }

    /// Map a `.npy` file (see [`MappedTrack::open`])
    pub fn map_file(path: &Path, writable: bool) -> Result<Self> {
        Ok(Track::Mapped(MappedTrack::open(path, writable)?))
    }

    pub fn len(&self) -> usize {
        match self {
            Track::Owned(v) => v.len(),
            Track::Mapped(m) => m.len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, Track::Mapped(_))
    }

    pub fn as_slice(&self) -> &[T] {
        match self {
            Track::Owned(v) => v,
            Track::Mapped(m) => m.as_slice(),
        }
    }

    /// Mutable access; a read-only mapping is first copied into memory
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        if let Track::Mapped(m) = self {
            if !m.is_writable() {
                let owned = m.as_slice().to_vec();
                *self = Track::Owned(owned);
            }
        }
        match self {
            Track::Owned(v) => v,
            Track::Mapped(m) => m.as_mut_slice().unwrap_or(&mut []),
        }
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.as_slice().iter().map(|v| v.to_f64()).collect()
    }

    pub fn flush(&self) -> Result<()> {
        match self {
            Track::Owned(_) => Ok(()),
            Track::Mapped(m) => m.flush(),
        }
    }
}

impl<T: Element> Clone for Track<T> {
    fn clone(&self) -> Self {
        Track::Owned(self.as_slice().to_vec())
    }
}

impl<T: Element> PartialEq for Track<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Element> fmt::Debug for Track<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Track::Owned(v) => write!(f, "Track::Owned({} x {})", v.len(), T::DTYPE),
            Track::Mapped(m) => write!(
                f,
                "Track::Mapped({} x {}, {})",
                m.len,
                T::DTYPE,
                m.path.display()
            ),
        }
    }
}

const NPY_MAGIC: &[u8] = b"\x93NUMPY";

/// Read the element type from a `.npy` header without reading the data
pub fn sniff_dtype<R: Read>(reader: &mut R, path: &Path) -> Result<Dtype> {
    let bad = |message: &str| EngineError::npy(path, message);

    let mut preamble = [0u8; 8];
    reader.read_exact(&mut preamble)?;
    if &preamble[..6] != NPY_MAGIC {
        return Err(bad("missing .npy magic string"));
    }
    let header_len = match preamble[6] {
        1 => {
            let mut len = [0u8; 2];
            reader.read_exact(&mut len)?;
            u16::from_le_bytes(len) as usize
        }
        2 | 3 => {
            let mut len = [0u8; 4];
            reader.read_exact(&mut len)?;
            u32::from_le_bytes(len) as usize
        }
        v => return Err(bad(&format!("unsupported .npy version {}", v))),
    };

    let mut header = vec![0u8; header_len];
    reader.read_exact(&mut header)?;
    let header = String::from_utf8_lossy(&header);

    let descr = header
        .find("'descr'")
        .and_then(|pos| {
            let rest = &header[pos + "'descr'".len()..];
            let open = rest.find('\'')?;
            let rest = &rest[open + 1..];
            let close = rest.find('\'')?;
            Some(rest[..close].to_string())
        })
        .ok_or_else(|| bad("header has no 'descr' entry"))?;

    Dtype::from_descr(&descr).ok_or_else(|| EngineError::DtypeMismatch {
        path: path.to_path_buf(),
        expected: "one of <f4 <f8 <u4 |u1 |b1".to_string(),
        found: descr,
    })
}
