use crate::invariants::{
    debug_assert_offset_in_range, debug_assert_reader_holds_lock, debug_assert_span_fits,
};
use crate::layout::{Header, HEADER_BYTES};
use crate::{Metrics, MetricsSnapshot, RingError};
use crossbeam_utils::Backoff;
use std::ptr;
use std::sync::atomic::Ordering;

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// The ring is shared between processes that see each other only through the
// header words and the payload bytes. There is no mutex anywhere: producers
// coordinate through `w_offset`/`marker`/`used`, the single reader excludes
// duplicate drains through `read_lock`.
//
// ## Producer (append path)
//
// 1. fetch_add `len` to `w_offset` with Relaxed: the reservation. The
//    returned value is this producer's exclusive span start.
// 2. If the span crosses the payload end, publish `marker` with Release and
//    resolve the wrap (CAS `w_offset` back to 0), then re-reserve.
// 3. Copy the record into the reserved span (no ordering needed: the span
//    is exclusively owned between reservation and the `used` update).
// 4. fetch_add `len` to `used` with Release, publishing the copy.
//
// ## Reader (drain path)
//
// 1. CAS `read_lock` 0→1 with Acquire; a losing reader returns 0 at once.
// 2. Load `w_offset` and `marker` with Acquire, pairing with the producers'
//    Release stores.
// 3. Copy the readable span(s) out.
// 4. Store `r_offset` (plain value, Relaxed; single-reader invariant),
//    fetch_sub `used`, release `read_lock` with Release.
//
// ## What Relaxed does NOT give us
//
// A reservation advances `w_offset` before the payload copy lands, so a
// reader that snapshots `w_offset` at exactly the wrong moment can copy a
// span whose tail the producer is still writing. The design accepts this:
// the reader runs strictly after the threshold notification that the same
// append sent, so on any cache-coherent host the copy is complete by the
// time the drain starts. The Acquire/Release pairs above make the common
// case exact without changing the wait-free producer.
//
// ## Exclusive span ownership
//
// `fetch_add` hands every producer a disjoint `[pos, pos+len)` span; the
// producer that crosses the payload end is unique per wrap (reservation
// starts are strictly increasing between wraps), so its plain-looking
// `marker` publication has exactly one writer per epoch.
//
// =============================================================================

/// Outcome of a successful append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Append {
    /// The record was written; the fill level is below the threshold.
    Ok,
    /// The record was written and `used` now exceeds the threshold: the
    /// caller should notify the drain side.
    NotifyThreshold,
}

impl Append {
    /// True when the drain side should be notified.
    #[inline]
    pub fn should_notify(self) -> bool {
        matches!(self, Self::NotifyThreshold)
    }
}

/// Wait-free multi-producer / single-reader byte ring over a raw region.
///
/// `RingBuf` is a typed view: it does not own the bytes it works on. The
/// mapping (or test buffer) behind it must stay valid and writable for as
/// long as the view is used: the client keeps its [`crate::ShmRegion`]
/// alive beside the view, the server likewise.
///
/// Producers call [`RingBuf::append`] from any number of threads; exactly
/// one process may call [`RingBuf::drain`].
pub struct RingBuf {
    base: *mut u8,
    region_len: usize,
    metrics: Metrics,
}

// SAFETY: all shared-state access goes through the atomic header words, and
// payload spans are disjoint per reservation. The raw pointer itself is only
// ever used for in-bounds byte copies.
unsafe impl Send for RingBuf {}
unsafe impl Sync for RingBuf {}

impl RingBuf {
    /// Constructs a view over a raw region.
    ///
    /// # Safety
    ///
    /// `base` must point to at least `region_len` readable and writable
    /// bytes that remain valid (and are not moved or unmapped) for the
    /// lifetime of the returned view and all uses of it.
    pub unsafe fn from_raw(base: *mut u8, region_len: usize) -> Result<Self, RingError> {
        if region_len <= HEADER_BYTES {
            return Err(RingError::RegionTooSmall {
                len: region_len,
                min: HEADER_BYTES + 1,
            });
        }
        if (base as usize) % 4 != 0 {
            return Err(RingError::Misaligned { addr: base as usize });
        }
        Ok(Self {
            base,
            region_len,
            metrics: Metrics::new(),
        })
    }

    /// Writes a fresh header: empty ring, capacity derived from the region
    /// length, the given threshold.
    ///
    /// Called once by the side that owns the region lifecycle, before the
    /// region name is handed to the peer.
    pub fn init(&self, threshold: u32) {
        self.header()
            .init((self.region_len - HEADER_BYTES) as u32, threshold);
    }

    #[inline]
    fn header(&self) -> &Header {
        // SAFETY: from_raw checked size and alignment; the header is the
        // first 32 bytes of the region and all its words are atomics.
        unsafe { &*self.base.cast::<Header>() }
    }

    #[inline]
    fn payload(&self) -> *mut u8 {
        // SAFETY: from_raw guaranteed the region extends past the header.
        unsafe { self.base.add(HEADER_BYTES) }
    }

    /// Payload capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.header().capacity.load(Ordering::Relaxed)
    }

    /// Currently occupied bytes (advisory).
    #[inline]
    pub fn used(&self) -> u32 {
        self.header().used.load(Ordering::Relaxed)
    }

    /// Notification threshold in bytes.
    #[inline]
    pub fn threshold(&self) -> u32 {
        self.header().threshold.load(Ordering::Relaxed)
    }

    /// Counters for this side of the ring.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    // ---------------------------------------------------------------------
    // PRODUCER API
    // ---------------------------------------------------------------------

    /// Appends one record. Multi-producer safe, wait-free, never blocks.
    ///
    /// Returns [`Append::NotifyThreshold`] when the post-append fill level
    /// exceeds the threshold. The ring does not guard against producers
    /// lapping the reader: with a sane threshold the drain side is notified
    /// long before the payload fills, and overwritten spans surface as
    /// overruns on the drain side rather than as producer errors.
    pub fn append(&self, record: &[u8]) -> Append {
        let header = self.header();
        let capacity = header.capacity.load(Ordering::Relaxed);
        let len = record.len() as u32;

        if record.len() > capacity as usize {
            // Can never fit; dropping the record beats wedging the
            // reservation loop below.
            self.metrics.record_rejected();
            return Append::Ok;
        }

        let mut pos = header.w_offset.fetch_add(len, Ordering::Relaxed);
        while u64::from(pos) + u64::from(len) > u64::from(capacity) {
            if pos <= capacity {
                // This producer crossed the payload end: reservation starts
                // are strictly increasing between wraps, so it is the only
                // one in this position. Publish where the pre-wrap data
                // ends. (`pos == capacity` is the exact-boundary wrap: the
                // pre-wrap segment ends at the payload end.)
                header.marker.store(pos, Ordering::Release);
            }
            let backoff = Backoff::new();
            loop {
                let w = header.w_offset.load(Ordering::Relaxed);
                if w < capacity {
                    // Some producer already completed the wrap.
                    break;
                }
                if header
                    .w_offset
                    .compare_exchange(w, 0, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    break;
                }
                backoff.spin();
            }
            pos = header.w_offset.fetch_add(len, Ordering::Relaxed);
        }

        debug_assert_span_fits!(pos, len, capacity);

        // SAFETY: `[pos, pos+len)` is this producer's exclusive reservation
        // and lies inside the payload (checked above); source and
        // destination cannot overlap.
        unsafe {
            ptr::copy_nonoverlapping(
                record.as_ptr(),
                self.payload().add(pos as usize),
                record.len(),
            );
        }

        let used = header.used.fetch_add(len, Ordering::Release).wrapping_add(len);
        self.metrics.record_append(record.len());

        if used > header.threshold.load(Ordering::Relaxed) {
            self.metrics.record_threshold_crossing();
            Append::NotifyThreshold
        } else {
            Append::Ok
        }
    }

    // ---------------------------------------------------------------------
    // READER API
    // ---------------------------------------------------------------------

    /// Copies all currently readable bytes into `dst` and returns the count.
    ///
    /// Single-reader: if another drain is in progress the call returns 0
    /// immediately without waiting and without touching the cursors. A
    /// return of 0 is also normal when the ring is empty or when a producer
    /// is mid-wrap; the caller simply drains again on the next
    /// notification.
    ///
    /// `dst` should hold at least `capacity` bytes; shorter destinations
    /// truncate the drained span.
    pub fn drain(&self, dst: &mut [u8]) -> usize {
        let header = self.header();

        if header
            .read_lock
            .compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return 0;
        }
        debug_assert_reader_holds_lock!(header.read_lock.load(Ordering::Relaxed));

        let capacity = header.capacity.load(Ordering::Relaxed);
        let r = header.r_offset.load(Ordering::Relaxed);
        let w = header.w_offset.load(Ordering::Acquire);
        let m = header.marker.load(Ordering::Acquire);

        if w > capacity {
            // A producer holds a transient post-increment w_offset while it
            // resolves a wrap. Back off; the pending notification retries.
            header.read_lock.store(0, Ordering::Release);
            return 0;
        }
        debug_assert_offset_in_range!("r_offset", r, capacity);

        if header.used.load(Ordering::Relaxed) > capacity {
            // Producers lapped the reader; whatever we copy below is the
            // documented arbitrary-bytes outcome.
            self.metrics.record_overrun();
        }

        let n = if r == w {
            0
        } else if r < w {
            let n = ((w - r) as usize).min(dst.len());
            // SAFETY: `[r, r+n)` is inside the payload; `dst` has room for
            // `n` by construction.
            unsafe {
                ptr::copy_nonoverlapping(self.payload().add(r as usize), dst.as_mut_ptr(), n);
            }
            n
        } else {
            // Wrapped: the pre-wrap segment ends at the marker, the rest
            // starts at payload index 0.
            if m < r || m > capacity {
                // Producers lapped the reader far enough to recycle the
                // marker; the segment bounds are meaningless. Resynchronize
                // to an empty ring and report nothing.
                header.r_offset.store(w, Ordering::Relaxed);
                header.used.store(0, Ordering::Relaxed);
                header.read_lock.store(0, Ordering::Release);
                return 0;
            }
            let first = ((m - r) as usize).min(dst.len());
            // SAFETY: `[r, r+first)` is inside the payload (m <= capacity).
            unsafe {
                ptr::copy_nonoverlapping(self.payload().add(r as usize), dst.as_mut_ptr(), first);
            }
            let second = (w as usize).min(dst.len() - first);
            // SAFETY: `[0, second)` is inside the payload; dst has `first`
            // bytes occupied and room for `second` more.
            unsafe {
                ptr::copy_nonoverlapping(self.payload(), dst.as_mut_ptr().add(first), second);
            }
            first + second
        };

        header.r_offset.store(w, Ordering::Relaxed);
        header.used.fetch_sub(n as u32, Ordering::Relaxed);
        header.read_lock.store(0, Ordering::Release);

        if n > 0 {
            self.metrics.record_drain(n);
        }
        n
    }
}
