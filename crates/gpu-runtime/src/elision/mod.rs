//! Redundant-state elision caches.
//!
//! Each tracker keeps the logical state last requested by the command stream
//! plus dirty bits for the parts not yet written to the native context. A
//! flush writes only what is both dirty and consumed by the bound pipeline;
//! everything else stays pending for a later pipeline.

mod input_buffers;
mod persistent;
mod push_constants;

pub use input_buffers::{InputBinding, InputBufferTracker};
pub use persistent::{PersistentPipelineState, StencilFuncState};
pub use push_constants::PushConstantTracker;

/// Mask with `count` bits set starting at bit `offset`.
pub(crate) fn range_mask(offset: u32, count: u32) -> u32 {
    debug_assert!(offset + count <= 32);
    (((1u64 << count) - 1) << offset) as u32
}

/// Indices of the set bits of `mask`, lowest first.
pub(crate) fn iter_bits(mut mask: u32) -> impl Iterator<Item = u32> {
    std::iter::from_fn(move || {
        if mask == 0 {
            return None;
        }
        let bit = mask.trailing_zeros();
        mask &= mask - 1;
        Some(bit)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_mask_covers_requested_slots() {
        assert_eq!(range_mask(0, 0), 0);
        assert_eq!(range_mask(2, 3), 0b11100);
        assert_eq!(range_mask(0, 32), u32::MAX);
    }

    #[test]
    fn iter_bits_yields_ascending_indices() {
        assert_eq!(iter_bits(0b1010_0101).collect::<Vec<_>>(), vec![0, 2, 5, 7]);
        assert_eq!(iter_bits(0).count(), 0);
    }
}
