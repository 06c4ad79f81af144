//! Property-based tests for the byte ring.
//!
//! The model is simple: as long as producers never lap the reader, the
//! concatenation of everything drained equals the concatenation of
//! everything appended, in append order.

use logc_ring::{RingBuf, HEADER_BYTES};
use proptest::prelude::*;

const CAPACITY: usize = 1024;

/// Heap-backed ring: aligned storage plus a view over it.
fn heap_ring(capacity: usize, threshold: u32) -> (Box<[u32]>, RingBuf) {
    let words = (HEADER_BYTES + capacity).div_ceil(4);
    let mut storage = vec![0u32; words].into_boxed_slice();
    let ring =
        unsafe { RingBuf::from_raw(storage.as_mut_ptr().cast::<u8>(), HEADER_BYTES + capacity) }
            .unwrap();
    ring.init(threshold);
    (storage, ring)
}

#[derive(Debug, Clone)]
enum Op {
    Append { len: usize, fill: u8 },
    Drain,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1..=CAPACITY / 4, any::<u8>()).prop_map(|(len, fill)| Op::Append { len, fill }),
        1 => Just(Op::Drain),
    ]
}

proptest! {
    /// Random append/drain interleavings below the lap point round-trip
    /// every byte in order.
    #[test]
    fn drained_bytes_equal_appended_bytes(ops in prop::collection::vec(op_strategy(), 1..200)) {
        let (_mem, ring) = heap_ring(CAPACITY, u32::MAX);
        let mut appended: Vec<u8> = Vec::new();
        let mut drained: Vec<u8> = Vec::new();
        let mut out = vec![0u8; CAPACITY];
        let mut record_no = 0u8;

        for op in ops {
            match op {
                Op::Append { len, fill } => {
                    // Skip appends that would lap the reader; the overwrite
                    // regime is explicitly outside this model.
                    if ring.used() as usize + len > CAPACITY {
                        continue;
                    }
                    record_no = record_no.wrapping_add(1);
                    let record: Vec<u8> = (0..len)
                        .map(|i| fill.wrapping_add(record_no).wrapping_add(i as u8))
                        .collect();
                    ring.append(&record);
                    appended.extend_from_slice(&record);
                }
                Op::Drain => {
                    let n = ring.drain(&mut out);
                    drained.extend_from_slice(&out[..n]);
                }
            }
        }

        // Collect the remainder.
        let n = ring.drain(&mut out);
        drained.extend_from_slice(&out[..n]);

        prop_assert_eq!(drained, appended);
        prop_assert_eq!(ring.used(), 0);
    }

    /// `used` tracks appends and drains exactly while below the lap point.
    #[test]
    fn used_is_monotone_modular(ops in prop::collection::vec(op_strategy(), 1..200)) {
        let (_mem, ring) = heap_ring(CAPACITY, u32::MAX);
        let mut out = vec![0u8; CAPACITY];

        for op in ops {
            match op {
                Op::Append { len, fill } => {
                    if ring.used() as usize + len > CAPACITY {
                        continue;
                    }
                    let before = ring.used();
                    ring.append(&vec![fill; len]);
                    prop_assert_eq!(ring.used(), before + len as u32);
                }
                Op::Drain => {
                    let before = ring.used();
                    let n = ring.drain(&mut out) as u32;
                    prop_assert_eq!(ring.used(), before - n);
                }
            }
            prop_assert!(ring.used() as usize <= CAPACITY);
        }
    }
}
