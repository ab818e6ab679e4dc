//! Usage transitions.
//!
//! Every backend maps abstract usage bitsets to a native state through a
//! [`BarrierPolicy`]. A transition is only produced when the native states
//! before and after differ, so usage combinations that land on the same native
//! state never cost a barrier. Host-mapped buffers are pinned to one state for
//! their whole lifetime and never transition.

use std::fmt;

use crate::format::TextureFormat;
use crate::usage::{BufferUsage, TextureUsage};

/// Maps abstract usage to the native state a backend tracks.
///
/// Multiple usage bits set at once resolve to the union of their native states.
pub trait BarrierPolicy {
    type State: Copy + Eq + fmt::Debug;

    fn buffer_state(usage: BufferUsage) -> Self::State;

    fn texture_state(usage: TextureUsage, format: TextureFormat) -> Self::State;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition<S> {
    pub before: S,
    pub after: S,
}

fn transition<S: Copy + Eq>(before: S, after: S) -> Option<Transition<S>> {
    (before != after).then_some(Transition { before, after })
}

/// The transition a buffer needs to go from `current` to `target` usage, if any.
pub fn buffer_transition<P: BarrierPolicy>(
    allowed: BufferUsage,
    current: BufferUsage,
    target: BufferUsage,
) -> Option<Transition<P::State>> {
    if allowed.is_host_mapped() {
        return None;
    }
    transition(P::buffer_state(current), P::buffer_state(target))
}

/// The transition a texture needs to go from `current` to `target` usage, if any.
pub fn texture_transition<P: BarrierPolicy>(
    format: TextureFormat,
    current: TextureUsage,
    target: TextureUsage,
) -> Option<Transition<P::State>> {
    transition(
        P::texture_state(current, format),
        P::texture_state(target, format),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Exposes usage bits directly as the native state.
    struct Identity;

    impl BarrierPolicy for Identity {
        type State = u32;

        fn buffer_state(usage: BufferUsage) -> u32 {
            usage.bits()
        }

        fn texture_state(usage: TextureUsage, _format: TextureFormat) -> u32 {
            usage.bits()
        }
    }

    #[test]
    fn distinct_bitsets_are_distinct_states() {
        let allowed = BufferUsage::TRANSFER_DST | BufferUsage::VERTEX;
        let t = buffer_transition::<Identity>(
            allowed,
            BufferUsage::TRANSFER_DST,
            BufferUsage::VERTEX,
        );
        assert!(t.is_some());

        let t = buffer_transition::<Identity>(
            allowed,
            BufferUsage::TRANSFER_DST | BufferUsage::VERTEX,
            BufferUsage::VERTEX,
        );
        assert!(t.is_some());

        let t = buffer_transition::<Identity>(allowed, BufferUsage::VERTEX, BufferUsage::VERTEX);
        assert_eq!(t, None);
    }

    #[test]
    fn mapped_buffers_never_transition() {
        for allowed in [
            BufferUsage::MAP_READ | BufferUsage::TRANSFER_DST,
            BufferUsage::MAP_WRITE | BufferUsage::TRANSFER_SRC,
        ] {
            for target in [
                BufferUsage::TRANSFER_DST,
                BufferUsage::TRANSFER_SRC,
                BufferUsage::MAP_READ,
                BufferUsage::empty(),
            ] {
                assert_eq!(
                    buffer_transition::<Identity>(allowed, BufferUsage::MAP_READ, target),
                    None
                );
            }
        }
    }
}
