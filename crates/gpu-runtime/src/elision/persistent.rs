use crate::format::CompareFunction;
use crate::objects::StencilState;

/// Stencil state as the native context sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilFuncState {
    pub front_compare: CompareFunction,
    pub back_compare: CompareFunction,
    pub reference: u32,
    pub read_mask: u32,
}

impl Default for StencilFuncState {
    fn default() -> Self {
        Self {
            front_compare: CompareFunction::Always,
            back_compare: CompareFunction::Always,
            reference: 0,
            read_mask: 0xff,
        }
    }
}

/// Auxiliary state that outlives pipeline binds.
///
/// The stencil reference is set by the command stream independently of the
/// pipeline, but natively it is part of the same call as the compare functions
/// and read mask. Changes are applied immediately; identical values are
/// skipped.
#[derive(Debug, Clone, Default)]
pub struct PersistentPipelineState {
    stencil: StencilFuncState,
}

impl PersistentPipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Establishes known defaults at the start of an execution.
    pub fn set_default_state(&mut self, apply: impl FnOnce(&StencilFuncState)) {
        self.stencil = StencilFuncState::default();
        apply(&self.stencil);
    }

    /// Re-establishes a pipeline's compare functions and read mask while
    /// keeping the current reference.
    pub fn set_stencil_funcs_and_mask(
        &mut self,
        state: &StencilState,
        apply: impl FnOnce(&StencilFuncState),
    ) {
        let next = StencilFuncState {
            front_compare: state.front_compare,
            back_compare: state.back_compare,
            read_mask: state.read_mask,
            ..self.stencil
        };
        self.update(next, apply);
    }

    pub fn set_stencil_reference(&mut self, reference: u32, apply: impl FnOnce(&StencilFuncState)) {
        let next = StencilFuncState {
            reference,
            ..self.stencil
        };
        self.update(next, apply);
    }

    pub fn stencil(&self) -> StencilFuncState {
        self.stencil
    }

    fn update(&mut self, next: StencilFuncState, apply: impl FnOnce(&StencilFuncState)) {
        if next == self.stencil {
            return;
        }
        self.stencil = next;
        apply(&self.stencil);
    }
}
