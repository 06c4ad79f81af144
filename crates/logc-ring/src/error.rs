use std::io;
use thiserror::Error;

/// Errors raised while managing a shared ring region.
#[derive(Debug, Error)]
pub enum RingError {
    /// The shared-memory object name contains a NUL byte.
    #[error("invalid shared-memory name '{name}'")]
    BadName {
        /// The rejected name.
        name: String,
    },

    /// `shm_open(O_CREAT)` or sizing the fresh object failed.
    #[error("cannot create shared-memory object '{name}'")]
    CreateShm {
        /// Object name passed to `shm_open`.
        name: String,
        #[source]
        source: io::Error,
    },

    /// `shm_open` on an existing object failed.
    #[error("cannot open shared-memory object '{name}'")]
    OpenShm {
        /// Object name passed to `shm_open`.
        name: String,
        #[source]
        source: io::Error,
    },

    /// Mapping the object into the address space failed.
    #[error("cannot map shared-memory object '{name}'")]
    MapRegion {
        /// Object name being mapped.
        name: String,
        #[source]
        source: io::Error,
    },

    /// `shm_unlink` failed.
    #[error("cannot unlink shared-memory object '{name}'")]
    UnlinkShm {
        /// Object name passed to `shm_unlink`.
        name: String,
        #[source]
        source: io::Error,
    },

    /// The mapped region is too small to hold the header and payload.
    #[error("region of {len} bytes cannot hold a ring (minimum {min})")]
    RegionTooSmall {
        /// Observed region length.
        len: usize,
        /// Minimum acceptable length.
        min: usize,
    },

    /// The region base address is not aligned for the header words.
    #[error("region base {addr:#x} is not 4-byte aligned")]
    Misaligned {
        /// Observed base address.
        addr: usize,
    },
}

impl RingError {
    /// The OS errno behind this error, when there is one.
    ///
    /// The server forwards this value verbatim in a failed `INIT` response.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::CreateShm { source, .. }
            | Self::OpenShm { source, .. }
            | Self::MapRegion { source, .. }
            | Self::UnlinkShm { source, .. } => source.raw_os_error(),
            Self::BadName { .. } => Some(libc::EINVAL),
            Self::RegionTooSmall { .. } | Self::Misaligned { .. } => None,
        }
    }
}
