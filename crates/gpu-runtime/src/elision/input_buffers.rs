use crate::elision::{iter_bits, range_mask};
use crate::objects::{BufferId, InputState, InputStateId, VertexBufferBinding, MAX_VERTEX_INPUTS};

/// A binding the native context needs before the next draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputBinding {
    Index { buffer: BufferId, offset: u64 },
    Vertex { slot: u32, buffer: BufferId, offset: u64 },
}

/// Vertex and index buffer bindings not yet reflected in the native context.
///
/// On APIs where vertex attribute pointers bake in the vertex buffer, a
/// change of input layout invalidates every live slot even if the buffers
/// themselves did not change.
#[derive(Debug, Clone, Default)]
pub struct InputBufferTracker {
    index_buffer: Option<(BufferId, u64)>,
    index_dirty: bool,
    vertex_buffers: [Option<VertexBufferBinding>; MAX_VERTEX_INPUTS],
    dirty: u32,
    last_input_state: Option<InputStateId>,
}

impl InputBufferTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Code outside the executor may change bindings between passes, so the
    /// next pipeline bind re-binds everything its layout uses.
    pub fn on_begin_pass(&mut self) {
        self.last_input_state = None;
    }

    pub fn on_set_index_buffer(&mut self, buffer: BufferId, offset: u64) {
        self.index_buffer = Some((buffer, offset));
        self.index_dirty = true;
    }

    /// # Panics
    ///
    /// If the range runs past [`MAX_VERTEX_INPUTS`]; the executor rejects
    /// such commands before they get here.
    pub fn on_set_vertex_buffers(&mut self, start_slot: u32, buffers: &[VertexBufferBinding]) {
        let end = start_slot as usize + buffers.len();
        assert!(end <= MAX_VERTEX_INPUTS);

        for (slot, binding) in self.vertex_buffers[start_slot as usize..end]
            .iter_mut()
            .zip(buffers)
        {
            *slot = Some(*binding);
        }
        self.dirty |= range_mask(start_slot, buffers.len() as u32);
    }

    /// Returns whether the input layout changed, in which case the native
    /// vertex input state for `id` must be bound before the next draw.
    pub fn on_set_pipeline(&mut self, id: InputStateId, input_state: &InputState) -> bool {
        if self.last_input_state == Some(id) {
            return false;
        }
        // The index buffer binding is part of the vertex array state that the
        // new layout replaces.
        self.index_dirty = true;
        self.dirty |= input_state.inputs_set_mask();
        self.last_input_state = Some(id);
        true
    }

    /// Emits the index buffer if dirty, then every slot that is dirty and live
    /// in `input_state`. Slots outside the layout stay dirty.
    pub fn apply<E>(
        &mut self,
        input_state: &InputState,
        mut bind: impl FnMut(InputBinding) -> Result<(), E>,
    ) -> Result<(), E> {
        if self.index_dirty {
            if let Some((buffer, offset)) = self.index_buffer {
                bind(InputBinding::Index { buffer, offset })?;
            }
            self.index_dirty = false;
        }

        let pending = self.dirty & input_state.inputs_set_mask();
        for slot in iter_bits(pending) {
            if let Some(binding) = self.vertex_buffers[slot as usize] {
                bind(InputBinding::Vertex {
                    slot,
                    buffer: binding.buffer,
                    offset: binding.offset,
                })?;
            }
        }
        self.dirty &= !pending;
        Ok(())
    }

    pub fn dirty_slots(&self) -> u32 {
        self.dirty
    }

    pub fn is_index_dirty(&self) -> bool {
        self.index_dirty
    }
}
