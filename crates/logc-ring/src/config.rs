use crate::layout::HEADER_BYTES;

/// Reference region size: 16 KiB, header included.
pub const DEFAULT_REGION_BYTES: usize = 16 * 1024;

/// Reference threshold: notify once half the payload is occupied.
pub const DEFAULT_THRESHOLD_FRACTION: f64 = 0.5;

/// Geometry of a ring region.
#[derive(Debug, Clone, Copy)]
pub struct RingConfig {
    /// Total region size in bytes, header included.
    pub region_bytes: usize,
    /// Fraction of the payload capacity at which appends report a threshold
    /// crossing. A fraction above 1.0 effectively disables notification.
    pub threshold_fraction: f64,
}

impl RingConfig {
    /// Creates a configuration with custom geometry.
    ///
    /// # Panics
    ///
    /// Panics if the region cannot hold the header plus at least one payload
    /// byte, if it exceeds the 32-bit offset space, or if the threshold
    /// fraction is not positive.
    pub fn new(region_bytes: usize, threshold_fraction: f64) -> Self {
        assert!(
            region_bytes > HEADER_BYTES,
            "region must hold the header plus payload"
        );
        assert!(
            region_bytes <= u32::MAX as usize,
            "ring offsets are 32-bit words"
        );
        assert!(threshold_fraction > 0.0, "threshold fraction must be positive");

        Self {
            region_bytes,
            threshold_fraction,
        }
    }

    /// Payload capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> u32 {
        (self.region_bytes - HEADER_BYTES) as u32
    }

    /// Threshold in bytes, derived from the capacity.
    #[inline]
    pub fn threshold(&self) -> u32 {
        let t = f64::from(self.capacity()) * self.threshold_fraction;
        if t >= f64::from(u32::MAX) {
            u32::MAX
        } else {
            t as u32
        }
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            region_bytes: DEFAULT_REGION_BYTES,
            threshold_fraction: DEFAULT_THRESHOLD_FRACTION,
        }
    }
}
