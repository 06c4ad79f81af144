//! logc-ring: wait-free byte ring over a POSIX shared-memory region.
//!
//! The ring carries formatted log records from producer threads in one
//! process to a single draining reader in another. Both sides map the same
//! shared-memory object and coordinate exclusively through eight 32-bit
//! header words at the start of the region; there is no process-shared
//! mutex and producers never block.
//!
//! # Example
//!
//! ```no_run
//! use logc_ring::{RingBuf, RingConfig, ShmRegion};
//!
//! let config = RingConfig::default();
//!
//! // Owner side: create, map and initialize the region.
//! let region = ShmRegion::create("/logc_shm_client_7", config.region_bytes)?;
//! let ring = unsafe { RingBuf::from_raw(region.as_ptr(), region.len()) }?;
//! ring.init(config.threshold());
//!
//! // Producer side (any thread, same or another process):
//! if ring.append(b"hello\n").should_notify() {
//!     // tell the drain side to come and collect
//! }
//!
//! // Drain side:
//! let mut out = vec![0u8; ring.capacity() as usize];
//! let n = ring.drain(&mut out);
//! # let _ = n;
//! # Ok::<(), logc_ring::RingError>(())
//! ```

mod config;
mod error;
mod invariants;
mod layout;
mod metrics;
mod region;
mod ring;

pub use config::{RingConfig, DEFAULT_REGION_BYTES, DEFAULT_THRESHOLD_FRACTION};
pub use error::RingError;
pub use layout::HEADER_BYTES;
pub use metrics::{Metrics, MetricsSnapshot};
pub use region::ShmRegion;
pub use ring::{Append, RingBuf};
