//! POSIX shared-memory region lifecycle.
//!
//! The server creates one region per client (`ShmRegion::create`), the
//! client maps the same object by name (`ShmRegion::open`). Dropping an
//! `ShmRegion` unmaps it; the name persists until [`ShmRegion::unlink`],
//! which the server calls during teardown.

use crate::error::RingError;
use crate::layout::HEADER_BYTES;
use memmap2::MmapRaw;
use std::ffi::CString;
use std::fs::File;
use std::io;
use std::os::fd::FromRawFd;

/// A mapped POSIX shared-memory object.
#[derive(Debug)]
pub struct ShmRegion {
    name: String,
    map: MmapRaw,
}

fn shm_name(name: &str) -> Result<CString, RingError> {
    CString::new(name).map_err(|_| RingError::BadName { name: name.into() })
}

impl ShmRegion {
    /// Creates (or reopens) the named object read-write, sizes it to
    /// `region_bytes` and maps it shared.
    ///
    /// Mode 0666: the client process that will map this region is typically
    /// unrelated to the server's user.
    pub fn create(name: &str, region_bytes: usize) -> Result<Self, RingError> {
        if region_bytes <= HEADER_BYTES {
            return Err(RingError::RegionTooSmall {
                len: region_bytes,
                min: HEADER_BYTES + 1,
            });
        }
        let c_name = shm_name(name)?;

        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_CREAT | libc::O_RDWR, 0o666) };
        if fd < 0 {
            return Err(RingError::CreateShm {
                name: name.into(),
                source: io::Error::last_os_error(),
            });
        }
        // SAFETY: shm_open returned a fresh descriptor we now own.
        let file = unsafe { File::from_raw_fd(fd) };

        file.set_len(region_bytes as u64)
            .map_err(|source| RingError::CreateShm {
                name: name.into(),
                source,
            })?;

        let map = MmapRaw::map_raw(&file).map_err(|source| RingError::MapRegion {
            name: name.into(),
            source,
        })?;

        // The descriptor can go; the mapping keeps the object alive.
        drop(file);

        Ok(Self {
            name: name.to_owned(),
            map,
        })
    }

    /// Opens and maps an existing object, taking its size from the object.
    pub fn open(name: &str) -> Result<Self, RingError> {
        let c_name = shm_name(name)?;

        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0o666) };
        if fd < 0 {
            return Err(RingError::OpenShm {
                name: name.into(),
                source: io::Error::last_os_error(),
            });
        }
        // SAFETY: shm_open returned a fresh descriptor we now own.
        let file = unsafe { File::from_raw_fd(fd) };

        let len = file
            .metadata()
            .map_err(|source| RingError::OpenShm {
                name: name.into(),
                source,
            })?
            .len() as usize;
        if len <= HEADER_BYTES {
            return Err(RingError::RegionTooSmall {
                len,
                min: HEADER_BYTES + 1,
            });
        }

        let map = MmapRaw::map_raw(&file).map_err(|source| RingError::MapRegion {
            name: name.into(),
            source,
        })?;
        drop(file);

        Ok(Self {
            name: name.to_owned(),
            map,
        })
    }

    /// The object name, e.g. `/logc_shm_client_7`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Base address of the mapping.
    pub fn as_ptr(&self) -> *mut u8 {
        self.map.as_mut_ptr()
    }

    /// Mapped length in bytes.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True when nothing is mapped.
    pub fn is_empty(&self) -> bool {
        self.map.len() == 0
    }

    /// Removes the object name. Existing mappings stay valid until dropped.
    pub fn unlink(&self) -> Result<(), RingError> {
        let c_name = shm_name(&self.name)?;
        let rc = unsafe { libc::shm_unlink(c_name.as_ptr()) };
        if rc != 0 {
            return Err(RingError::UnlinkShm {
                name: self.name.clone(),
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }
}
