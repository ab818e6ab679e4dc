//! Command stream replay.
//!
//! [`Executor`] walks a recorded stream, resolves object ids against the
//! [`ObjectTable`], consults the barrier policy for usage transitions and
//! drives a [`Backend`]. Everything that is the same for every native model
//! (clear-once semantics, binding index assignment, copy pitch conversion,
//! the barrier after dispatch) lives here; backends only translate.

use tracing::trace;

use crate::cmd::{
    BufferCopy, BufferTextureCopy, CmdStream, CmdWord, Command, DrawArgs, DrawIndexedArgs,
    Extent3d, Origin3d,
};
use crate::config::RuntimeConfig;
use crate::error::{ExecuteError, ObjectError};
use crate::format::{Color, TextureFormat};
use crate::objects::{
    BindGroupId, BindingResource, BindingType, BufferId, Framebuffer, FramebufferId, InputState,
    InputStateId, LoadOp, ObjectTable, Pipeline, PipelineId, PipelineLayout, RenderPass,
    RenderPassId, RenderPipelineState, SamplerId, TextureId, TextureViewId, VertexBufferBinding,
    MAX_BINDINGS_PER_GROUP, MAX_PUSH_CONSTANTS, MAX_VERTEX_INPUTS,
};
use crate::state_tracker::{buffer_transition, texture_transition, BarrierPolicy, Transition};
use crate::usage::{BufferUsage, ShaderStages, TextureUsage};

/// The currently bound pipeline with everything it references resolved.
#[derive(Debug, Clone, Copy)]
pub struct BoundPipeline<'a> {
    pub id: PipelineId,
    pub pipeline: &'a Pipeline,
    pub layout: &'a PipelineLayout,
    /// Present for render pipelines.
    pub input_state: Option<(InputStateId, &'a InputState)>,
}

impl<'a> BoundPipeline<'a> {
    fn resolve(objects: &'a ObjectTable, id: PipelineId) -> Result<Self, ObjectError> {
        let pipeline = objects.pipeline(id)?;
        let layout = objects.pipeline_layout(pipeline.layout)?;
        let input_state = match pipeline.render_state() {
            Some(state) => Some((state.input_state, objects.input_state(state.input_state)?)),
            None => None,
        };
        Ok(Self {
            id,
            pipeline,
            layout,
            input_state,
        })
    }

    pub fn render_state(&self) -> Option<&'a RenderPipelineState> {
        self.pipeline.render_state()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RenderPassBegin<'a> {
    pub render_pass_id: RenderPassId,
    pub render_pass: &'a RenderPass,
    pub framebuffer_id: FramebufferId,
    pub framebuffer: &'a Framebuffer,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorTarget {
    pub location: u32,
    pub attachment: u32,
    pub view: TextureViewId,
    pub texture: TextureId,
    pub level: u32,
    pub format: TextureFormat,
    /// Set only on the first subpass that uses the attachment.
    pub clear: Option<Color>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilTarget {
    pub attachment: u32,
    pub view: TextureViewId,
    pub texture: TextureId,
    pub level: u32,
    pub format: TextureFormat,
    pub clear_depth: Option<f32>,
    pub clear_stencil: Option<u32>,
}

/// The attachments one subpass renders to, with the clears it must perform.
#[derive(Debug, Clone, PartialEq)]
pub struct SubpassTarget {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub colors: Vec<ColorTarget>,
    pub depth_stencil: Option<DepthStencilTarget>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedResource {
    UniformBuffer {
        buffer: BufferId,
        offset: u64,
        size: u64,
    },
    StorageBuffer {
        buffer: BufferId,
        offset: u64,
        size: u64,
    },
    Sampler(SamplerId),
    SampledTexture {
        view: TextureViewId,
        texture: TextureId,
    },
}

/// One binding of a bind group at the native index the pipeline layout
/// assigned to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedBinding {
    pub binding: u32,
    pub native_index: u32,
    pub resource: ResolvedResource,
}

/// Buffer/texture copy with the row pitch also expressed in texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureCopy {
    pub buffer: BufferId,
    pub buffer_offset: u64,
    pub row_pitch: u32,
    pub row_length: u32,
    pub texture: TextureId,
    pub format: TextureFormat,
    pub level: u32,
    pub origin: Origin3d,
    pub extent: Extent3d,
}

pub type BackendState<B> = <<B as Backend>::Barriers as BarrierPolicy>::State;

/// One native execution model.
///
/// Hooks are invoked in stream order. Implementations own their native
/// handle tables and elision caches; the executor owns the abstract state.
pub trait Backend {
    type Barriers: BarrierPolicy;

    /// Called once before the first record of a stream.
    fn begin_execution(&mut self) -> Result<(), ExecuteError> {
        Ok(())
    }

    fn begin_compute_pass(&mut self) -> Result<(), ExecuteError>;

    fn end_compute_pass(&mut self) -> Result<(), ExecuteError> {
        Ok(())
    }

    fn begin_render_pass(&mut self, begin: &RenderPassBegin<'_>) -> Result<(), ExecuteError> {
        let _ = begin;
        Ok(())
    }

    fn begin_subpass(&mut self, target: &SubpassTarget) -> Result<(), ExecuteError>;

    fn end_subpass(&mut self) -> Result<(), ExecuteError>;

    fn end_render_pass(&mut self) -> Result<(), ExecuteError> {
        Ok(())
    }

    fn set_pipeline(&mut self, pipeline: &BoundPipeline<'_>) -> Result<(), ExecuteError>;

    fn set_push_constants(
        &mut self,
        stages: ShaderStages,
        offset: u32,
        values: &[u32],
    ) -> Result<(), ExecuteError>;

    fn set_bind_group(
        &mut self,
        index: u32,
        group: BindGroupId,
        pipeline: &BoundPipeline<'_>,
        bindings: &[ResolvedBinding],
    ) -> Result<(), ExecuteError>;

    fn set_vertex_buffers(
        &mut self,
        start_slot: u32,
        buffers: &[VertexBufferBinding],
    ) -> Result<(), ExecuteError>;

    fn set_index_buffer(&mut self, buffer: BufferId, offset: u64) -> Result<(), ExecuteError>;

    fn set_stencil_reference(&mut self, reference: u32) -> Result<(), ExecuteError>;

    fn set_blend_color(&mut self, color: Color) -> Result<(), ExecuteError>;

    /// Writes pending elision-cache state the pipeline consumes. Called before
    /// every draw and dispatch.
    fn flush(&mut self, pipeline: &BoundPipeline<'_>) -> Result<(), ExecuteError>;

    fn draw(&mut self, pipeline: &BoundPipeline<'_>, args: &DrawArgs) -> Result<(), ExecuteError>;

    fn draw_indexed(
        &mut self,
        pipeline: &BoundPipeline<'_>,
        args: &DrawIndexedArgs,
    ) -> Result<(), ExecuteError>;

    fn dispatch(
        &mut self,
        pipeline: &BoundPipeline<'_>,
        x: u32,
        y: u32,
        z: u32,
    ) -> Result<(), ExecuteError>;

    /// Orders all prior GPU work against all later work.
    fn full_barrier(&mut self) -> Result<(), ExecuteError>;

    fn copy_buffer_to_buffer(&mut self, copy: &BufferCopy) -> Result<(), ExecuteError>;

    fn copy_buffer_to_texture(&mut self, copy: &TextureCopy) -> Result<(), ExecuteError>;

    fn copy_texture_to_buffer(&mut self, copy: &TextureCopy) -> Result<(), ExecuteError>;

    fn transition_buffer(
        &mut self,
        buffer: BufferId,
        transition: Transition<BackendState<Self>>,
    ) -> Result<(), ExecuteError>;

    fn transition_texture(
        &mut self,
        texture: TextureId,
        transition: Transition<BackendState<Self>>,
    ) -> Result<(), ExecuteError>;

    /// Called once after the last record.
    fn finish(&mut self) -> Result<(), ExecuteError> {
        Ok(())
    }
}

/// Counters for one executed stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub commands: usize,
    pub render_passes: u32,
    pub subpasses: u32,
    pub compute_passes: u32,
    pub draw_calls: u32,
    pub dispatches: u32,
    pub pipeline_switches: u32,
    pub transitions_emitted: u32,
    pub transitions_elided: u32,
}

#[derive(Debug, Default)]
struct BoundState {
    pass: Option<(RenderPassId, FramebufferId)>,
    subpass: u32,
    pipeline: Option<PipelineId>,
}

impl BoundState {
    fn pipeline(&self, what: &'static str) -> Result<PipelineId, ExecuteError> {
        self.pipeline.ok_or(ExecuteError::NoBoundPipeline(what))
    }

    fn pass(&self, what: &'static str) -> Result<(RenderPassId, FramebufferId), ExecuteError> {
        self.pass.ok_or(ExecuteError::NotInRenderPass(what))
    }
}

/// Usages a stream overwrote, oldest first, so an abandoned submission can
/// put the table back the way the GPU last saw it.
#[derive(Debug, Default)]
struct UsageJournal {
    buffers: Vec<(BufferId, BufferUsage)>,
    textures: Vec<(TextureId, TextureUsage)>,
}

impl UsageJournal {
    fn clear(&mut self) {
        self.buffers.clear();
        self.textures.clear();
    }

    fn restore(&mut self, objects: &mut ObjectTable) {
        for (id, usage) in self.buffers.drain(..).rev() {
            if let Ok(buffer) = objects.buffer_mut(id) {
                buffer.set_current_usage(usage);
            }
        }
        for (id, usage) in self.textures.drain(..).rev() {
            if let Ok(texture) = objects.texture_mut(id) {
                texture.set_current_usage(usage);
            }
        }
    }
}

pub struct Executor<'a> {
    objects: &'a mut ObjectTable,
    config: &'a RuntimeConfig,
    journal: UsageJournal,
}

impl<'a> Executor<'a> {
    pub fn new(objects: &'a mut ObjectTable, config: &'a RuntimeConfig) -> Self {
        Self {
            objects,
            config,
            journal: UsageJournal::default(),
        }
    }

    /// Replays `words` on `backend`.
    ///
    /// Stops at the first decode or native failure. Usage transitions the
    /// stream made are rolled back before the error is returned; the
    /// commands already issued stay recorded and the caller discards them.
    pub fn execute<B: Backend + ?Sized>(
        &mut self,
        words: &[CmdWord],
        backend: &mut B,
    ) -> Result<ExecutionReport, ExecuteError> {
        self.journal.clear();
        let result = self.replay(words, backend);
        if result.is_err() {
            self.rollback();
        }
        result
    }

    /// Restores the usages the last [`Executor::execute`] changed. Used when
    /// a stream recorded cleanly but its native submission failed.
    pub fn rollback(&mut self) {
        self.journal.restore(self.objects);
    }

    fn replay<B: Backend + ?Sized>(
        &mut self,
        words: &[CmdWord],
        backend: &mut B,
    ) -> Result<ExecutionReport, ExecuteError> {
        let mut report = ExecutionReport::default();
        let mut state = BoundState::default();

        backend.begin_execution()?;
        for command in CmdStream::new(words).commands() {
            let command = command?;
            if self.config.trace_commands {
                trace!(?command, "execute");
            }
            report.commands += 1;
            self.execute_command(command, &mut state, &mut report, backend)?;
        }
        backend.finish()?;

        Ok(report)
    }

    fn execute_command<B: Backend + ?Sized>(
        &mut self,
        command: Command<'_>,
        state: &mut BoundState,
        report: &mut ExecutionReport,
        backend: &mut B,
    ) -> Result<(), ExecuteError> {
        match command {
            Command::BeginComputePass => {
                report.compute_passes += 1;
                backend.begin_compute_pass()?;
            }
            Command::EndComputePass => backend.end_compute_pass()?,
            Command::BeginRenderPass {
                render_pass,
                framebuffer,
            } => {
                let begin = RenderPassBegin {
                    render_pass_id: render_pass,
                    render_pass: self.objects.render_pass(render_pass)?,
                    framebuffer_id: framebuffer,
                    framebuffer: self.objects.framebuffer(framebuffer)?,
                };
                state.pass = Some((render_pass, framebuffer));
                state.subpass = 0;
                report.render_passes += 1;
                backend.begin_render_pass(&begin)?;
            }
            Command::BeginRenderSubpass => {
                let (render_pass, framebuffer) = state.pass("begin subpass")?;
                let target = subpass_target(self.objects, render_pass, framebuffer, state.subpass)?;
                report.subpasses += 1;
                backend.begin_subpass(&target)?;
            }
            Command::EndRenderSubpass => {
                state.pass("end subpass")?;
                backend.end_subpass()?;
                state.subpass += 1;
            }
            Command::EndRenderPass => {
                state.pass("end render pass")?;
                backend.end_render_pass()?;
                state.pass = None;
            }
            Command::SetComputePipeline(id) | Command::SetRenderPipeline(id) => {
                let pipeline = BoundPipeline::resolve(self.objects, id)?;
                debug_assert_eq!(
                    pipeline.pipeline.is_compute(),
                    matches!(command, Command::SetComputePipeline(_))
                );
                backend.set_pipeline(&pipeline)?;
                state.pipeline = Some(id);
                report.pipeline_switches += 1;
            }
            Command::SetPushConstants {
                stages,
                offset,
                values,
            } => {
                check_slots("push constants", offset, values.len(), MAX_PUSH_CONSTANTS)?;
                backend.set_push_constants(stages, offset, values)?;
            }
            Command::SetBindGroup { index, group } => {
                let pipeline = BoundPipeline::resolve(self.objects, state.pipeline("bind group")?)?;
                let bindings = resolve_bindings(self.objects, index, group, pipeline.layout)?;
                backend.set_bind_group(index, group, &pipeline, &bindings)?;
            }
            Command::SetVertexBuffers {
                start_slot,
                buffers,
            } => {
                let bindings: Vec<VertexBufferBinding> = buffers.iter().collect();
                check_slots("vertex buffers", start_slot, bindings.len(), MAX_VERTEX_INPUTS)?;
                backend.set_vertex_buffers(start_slot, &bindings)?;
            }
            Command::SetIndexBuffer { buffer, offset } => {
                backend.set_index_buffer(buffer, offset)?;
            }
            Command::SetStencilReference(reference) => backend.set_stencil_reference(reference)?,
            Command::SetBlendColor(color) => backend.set_blend_color(color)?,
            Command::Draw(args) => {
                let pipeline = BoundPipeline::resolve(self.objects, state.pipeline("draw")?)?;
                backend.flush(&pipeline)?;
                backend.draw(&pipeline, &args)?;
                report.draw_calls += 1;
            }
            Command::DrawIndexed(args) => {
                let pipeline = BoundPipeline::resolve(self.objects, state.pipeline("draw")?)?;
                backend.flush(&pipeline)?;
                backend.draw_indexed(&pipeline, &args)?;
                report.draw_calls += 1;
            }
            Command::Dispatch { x, y, z } => {
                let pipeline = BoundPipeline::resolve(self.objects, state.pipeline("dispatch")?)?;
                backend.flush(&pipeline)?;
                backend.dispatch(&pipeline, x, y, z)?;
                // No hazard tracking between dispatches.
                backend.full_barrier()?;
                report.dispatches += 1;
            }
            Command::CopyBufferToBuffer(copy) => backend.copy_buffer_to_buffer(&copy)?,
            Command::CopyBufferToTexture(copy) => {
                let copy = texture_copy(self.objects, &copy)?;
                backend.copy_buffer_to_texture(&copy)?;
            }
            Command::CopyTextureToBuffer(copy) => {
                let copy = texture_copy(self.objects, &copy)?;
                backend.copy_texture_to_buffer(&copy)?;
            }
            Command::TransitionBufferUsage { buffer, usage } => {
                let entry = self.objects.buffer_mut(buffer)?;
                let transition = buffer_transition::<B::Barriers>(
                    entry.allowed_usage(),
                    entry.current_usage(),
                    usage,
                );
                self.journal.buffers.push((buffer, entry.current_usage()));
                entry.set_current_usage(usage);
                match transition {
                    Some(transition) => {
                        backend.transition_buffer(buffer, transition)?;
                        report.transitions_emitted += 1;
                    }
                    None => report.transitions_elided += 1,
                }
            }
            Command::TransitionTextureUsage { texture, usage } => {
                let entry = self.objects.texture_mut(texture)?;
                let transition =
                    texture_transition::<B::Barriers>(entry.format(), entry.current_usage(), usage);
                self.journal.textures.push((texture, entry.current_usage()));
                entry.set_current_usage(usage);
                match transition {
                    Some(transition) => {
                        backend.transition_texture(texture, transition)?;
                        report.transitions_emitted += 1;
                    }
                    None => report.transitions_elided += 1,
                }
            }
        }
        Ok(())
    }
}

/// Replays `words` against `backend` with a one-off [`Executor`].
pub fn execute<B: Backend + ?Sized>(
    words: &[CmdWord],
    objects: &mut ObjectTable,
    config: &RuntimeConfig,
    backend: &mut B,
) -> Result<ExecutionReport, ExecuteError> {
    Executor::new(objects, config).execute(words, backend)
}

fn subpass_target(
    objects: &ObjectTable,
    render_pass: RenderPassId,
    framebuffer: FramebufferId,
    index: u32,
) -> Result<SubpassTarget, ExecuteError> {
    let pass = objects.render_pass(render_pass)?;
    let fb = objects.framebuffer(framebuffer)?;
    let subpass = pass.subpass(index).ok_or(ExecuteError::SubpassOutOfRange {
        index,
        count: pass.subpass_count(),
    })?;

    let resolve = |attachment: u32| -> Result<_, ExecuteError> {
        let info = pass
            .attachment(attachment)
            .ok_or(ExecuteError::InvalidAttachment(attachment))?;
        let view_id = *fb
            .attachments
            .get(attachment as usize)
            .ok_or(ExecuteError::InvalidAttachment(attachment))?;
        let view = objects.texture_view(view_id)?;
        let first_use = info.first_subpass == index;
        Ok((info, view_id, *view, first_use))
    };

    let mut colors = Vec::new();
    for (location, attachment) in subpass.colors() {
        let (info, view_id, view, first_use) = resolve(attachment)?;
        let clear = (first_use && info.desc.color_load_op == LoadOp::Clear)
            .then(|| fb.clear_value(attachment).color);
        colors.push(ColorTarget {
            location,
            attachment,
            view: view_id,
            texture: view.texture,
            level: view.base_mip_level,
            format: info.desc.format,
            clear,
        });
    }

    let depth_stencil = match subpass.depth_stencil_attachment {
        Some(attachment) => {
            let (info, view_id, view, first_use) = resolve(attachment)?;
            let format = info.desc.format;
            let value = fb.clear_value(attachment);
            Some(DepthStencilTarget {
                attachment,
                view: view_id,
                texture: view.texture,
                level: view.base_mip_level,
                format,
                clear_depth: (first_use
                    && format.has_depth()
                    && info.desc.depth_load_op == LoadOp::Clear)
                    .then_some(value.depth),
                clear_stencil: (first_use
                    && format.has_stencil()
                    && info.desc.stencil_load_op == LoadOp::Clear)
                    .then_some(value.stencil),
            })
        }
        None => None,
    };

    Ok(SubpassTarget {
        index,
        width: fb.width,
        height: fb.height,
        colors,
        depth_stencil,
    })
}

fn resolve_bindings(
    objects: &ObjectTable,
    group_index: u32,
    group_id: BindGroupId,
    layout: &PipelineLayout,
) -> Result<Vec<ResolvedBinding>, ExecuteError> {
    let group_count = layout.bind_group_count();
    if group_index >= group_count {
        return Err(ExecuteError::SlotOutOfRange {
            what: "bind groups",
            end: group_index + 1,
            limit: group_count,
        });
    }
    let group = objects.bind_group(group_id)?;
    let group_layout = objects.bind_group_layout(group.layout())?;

    let mut bindings = Vec::new();
    for (binding, entry) in group_layout.entries() {
        let Some(resource) = group.resource(binding) else {
            continue;
        };
        let resource = match (entry.ty, resource) {
            (BindingType::UniformBuffer, BindingResource::Buffer { buffer, offset, size }) => {
                ResolvedResource::UniformBuffer {
                    buffer,
                    offset,
                    size,
                }
            }
            (BindingType::StorageBuffer, BindingResource::Buffer { buffer, offset, size }) => {
                ResolvedResource::StorageBuffer {
                    buffer,
                    offset,
                    size,
                }
            }
            (BindingType::Sampler, BindingResource::Sampler(sampler)) => {
                ResolvedResource::Sampler(sampler)
            }
            (BindingType::SampledTexture, BindingResource::TextureView(view)) => {
                ResolvedResource::SampledTexture {
                    view,
                    texture: objects.texture_view(view)?.texture,
                }
            }
            (ty, resource) => unreachable!("binding {binding} of type {ty:?} holds {resource:?}"),
        };
        bindings.push(ResolvedBinding {
            binding,
            native_index: layout
                .binding_index(group_index, binding)
                .ok_or(ExecuteError::SlotOutOfRange {
                    what: "bindings",
                    end: binding + 1,
                    limit: MAX_BINDINGS_PER_GROUP as u32,
                })?,
            resource,
        });
    }
    Ok(bindings)
}

/// Rejects `count` slots starting at `start` that run past `limit`.
fn check_slots(
    what: &'static str,
    start: u32,
    count: usize,
    limit: usize,
) -> Result<(), ExecuteError> {
    let end = start as usize + count;
    if end > limit {
        return Err(ExecuteError::SlotOutOfRange {
            what,
            end: end as u32,
            limit: limit as u32,
        });
    }
    Ok(())
}

fn texture_copy(objects: &ObjectTable, copy: &BufferTextureCopy) -> Result<TextureCopy, ObjectError> {
    let format = objects.texture(copy.texture)?.format();
    Ok(TextureCopy {
        buffer: copy.buffer,
        buffer_offset: copy.buffer_offset,
        row_pitch: copy.row_pitch,
        row_length: copy.row_pitch / format.texel_size(),
        texture: copy.texture,
        format,
        level: copy.level,
        origin: copy.origin,
        extent: copy.extent,
    })
}
