//! Binary layout of the shared ring region.
//!
//! The region is a header followed by the payload arena. Both the logging
//! client and the server map the same POSIX shared-memory object and address
//! it through this layout, so it must be bit-exact across processes: every
//! header field is a natively-aligned 32-bit word at the start of the region.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ w_offset │ r_offset │ marker │ capacity │ used │ threshold │ │  header
//! │ read_lock │ pad                                              │  (32 B)
//! ├──────────────────────────────────────────────────────────────┤
//! │                   payload: [u8; capacity]                    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! `capacity` is the payload length, i.e. `region_bytes - HEADER_BYTES`.

use std::mem::size_of;
use std::sync::atomic::{AtomicU32, Ordering};

/// Size of the ring header in bytes. The payload arena starts here.
pub const HEADER_BYTES: usize = 32;

/// Ring header, resident at offset 0 of the shared region.
///
/// All mutable words are `AtomicU32`: the header is shared between processes
/// that coordinate only through these words. `capacity` and `threshold` are
/// written once, before the region name is handed to the peer, and are only
/// loaded afterwards.
#[repr(C)]
pub(crate) struct Header {
    /// Next payload index to write; producers advance this.
    pub w_offset: AtomicU32,
    /// Next payload index to read; mutated only by the reader.
    pub r_offset: AtomicU32,
    /// Index past the last valid byte of the pre-wrap segment, published by
    /// the producer that wraps.
    pub marker: AtomicU32,
    /// Payload length in bytes. Immutable after init.
    pub capacity: AtomicU32,
    /// Currently occupied bytes. Advisory; drives the threshold check.
    pub used: AtomicU32,
    /// `used` level above which an append reports a threshold crossing.
    /// Immutable after init.
    pub threshold: AtomicU32,
    /// 0 = idle, 1 = a reader is inside `drain`.
    pub read_lock: AtomicU32,
    /// Keeps the header at a round 32 bytes.
    _pad: u32,
}

const _: () = assert!(size_of::<Header>() == HEADER_BYTES);

impl Header {
    /// Writes a fresh header: empty ring, the given geometry.
    ///
    /// Relaxed stores suffice: the peer process only learns the region name
    /// (over the socket) after this returns, which orders the init before
    /// any remote access.
    pub(crate) fn init(&self, capacity: u32, threshold: u32) {
        self.w_offset.store(0, Ordering::Relaxed);
        self.r_offset.store(0, Ordering::Relaxed);
        self.marker.store(0, Ordering::Relaxed);
        self.capacity.store(capacity, Ordering::Relaxed);
        self.used.store(0, Ordering::Relaxed);
        self.threshold.store(threshold, Ordering::Relaxed);
        self.read_lock.store(0, Ordering::Relaxed);
    }
}
