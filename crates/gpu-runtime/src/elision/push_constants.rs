use crate::elision::{iter_bits, range_mask};
use crate::objects::{PushConstantLayout, PushConstantType, MAX_PUSH_CONSTANTS};
use crate::usage::{PerStage, ShaderStage, ShaderStages};

/// Push-constant values per stage plus the slots not yet written natively.
///
/// Constant storage is aliased across pipelines with different layouts, so a
/// pipeline switch marks every slot the new pipeline consumes as dirty.
#[derive(Debug, Clone)]
pub struct PushConstantTracker {
    values: PerStage<[u32; MAX_PUSH_CONSTANTS]>,
    dirty: PerStage<u32>,
}

impl Default for PushConstantTracker {
    fn default() -> Self {
        Self {
            values: PerStage([[0; MAX_PUSH_CONSTANTS]; ShaderStage::COUNT]),
            dirty: PerStage::default(),
        }
    }
}

impl PushConstantTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values are reset at pass boundaries; a pipeline is always bound before
    /// the next draw or dispatch marks them dirty again.
    pub fn on_begin_pass(&mut self) {
        for values in self.values.0.iter_mut() {
            *values = [0; MAX_PUSH_CONSTANTS];
        }
    }

    /// # Panics
    ///
    /// If the range runs past [`MAX_PUSH_CONSTANTS`]; the executor rejects
    /// such commands before they get here.
    pub fn on_set_push_constants(&mut self, stages: ShaderStages, offset: u32, values: &[u32]) {
        let start = offset as usize;
        let end = start + values.len();
        assert!(end <= MAX_PUSH_CONSTANTS);

        let range = range_mask(offset, values.len() as u32);
        for stage in stages.stages() {
            self.values[stage][start..end].copy_from_slice(values);
            self.dirty[stage] |= range;
        }
    }

    pub fn on_set_pipeline(&mut self, layouts: &PerStage<PushConstantLayout>) {
        for (stage, layout) in layouts.iter() {
            self.dirty[stage] |= layout.mask;
        }
    }

    /// Writes every slot that is dirty and consumed by `layouts`, then clears
    /// those dirty bits. Slots the pipeline does not consume stay dirty.
    pub fn apply<E>(
        &mut self,
        layouts: &PerStage<PushConstantLayout>,
        mut write: impl FnMut(ShaderStage, u32, PushConstantType, u32) -> Result<(), E>,
    ) -> Result<(), E> {
        for (stage, layout) in layouts.iter() {
            let pending = self.dirty[stage] & layout.mask;
            for slot in iter_bits(pending) {
                let value = self.values[stage][slot as usize];
                write(stage, slot, layout.types[slot as usize], value)?;
            }
            self.dirty[stage] &= !pending;
        }
        Ok(())
    }

    pub fn dirty(&self, stage: ShaderStage) -> u32 {
        self.dirty[stage]
    }

    pub fn value(&self, stage: ShaderStage, slot: u32) -> u32 {
        self.values[stage][slot as usize]
    }
}
