//! Vulkan backend.
//!
//! Buffers are created natively and backed by ranges from the crate's
//! [`MemoryAllocator`]. Native render passes carry their own load operations,
//! so subpass clears are expressed as clear values when the pass begins rather
//! than as explicit clear calls.

use std::fmt;

use bitflags::bitflags;
use tracing::debug;

use crate::cmd::{BufferCopy, CmdWord, DrawArgs, DrawIndexedArgs, Extent3d, Origin3d};
use crate::config::RuntimeConfig;
use crate::device::{ReleaseQueue, SubmissionTracker};
use crate::elision::PushConstantTracker;
use crate::error::{ExecuteError, GpuError};
use crate::executor::{
    Backend, BoundPipeline, ExecutionReport, Executor, RenderPassBegin, ResolvedBinding,
    SubpassTarget, TextureCopy,
};
use crate::format::{Color, IndexFormat, TextureFormat};
use crate::memory::{
    AllocatorStats, DeviceMemoryAllocation, MemoryAllocator, MemoryDevice, MemoryRequirements,
};
use crate::objects::{
    BindGroupId, BufferDescriptor, BufferId, FramebufferId, ObjectTable, PipelineId,
    RenderPassId, TextureId, VertexBufferBinding,
};
use crate::serial::Serial;
use crate::state_tracker::{BarrierPolicy, Transition};
use crate::usage::{BufferUsage, ShaderStages, TextureUsage};

use super::Registry;

bitflags! {
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const INDIRECT_COMMAND_READ = 0x1;
        const INDEX_READ = 0x2;
        const VERTEX_ATTRIBUTE_READ = 0x4;
        const UNIFORM_READ = 0x8;
        const INPUT_ATTACHMENT_READ = 0x10;
        const SHADER_READ = 0x20;
        const SHADER_WRITE = 0x40;
        const COLOR_ATTACHMENT_READ = 0x80;
        const COLOR_ATTACHMENT_WRITE = 0x100;
        const DEPTH_STENCIL_ATTACHMENT_READ = 0x200;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 0x400;
        const TRANSFER_READ = 0x800;
        const TRANSFER_WRITE = 0x1000;
        const HOST_READ = 0x2000;
        const HOST_WRITE = 0x4000;
        const MEMORY_READ = 0x8000;
        const MEMORY_WRITE = 0x10000;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct PipelineStageFlags: u32 {
        const TOP_OF_PIPE = 0x1;
        const DRAW_INDIRECT = 0x2;
        const VERTEX_INPUT = 0x4;
        const VERTEX_SHADER = 0x8;
        const FRAGMENT_SHADER = 0x80;
        const EARLY_FRAGMENT_TESTS = 0x100;
        const LATE_FRAGMENT_TESTS = 0x200;
        const COLOR_ATTACHMENT_OUTPUT = 0x400;
        const COMPUTE_SHADER = 0x800;
        const TRANSFER = 0x1000;
        const BOTTOM_OF_PIPE = 0x2000;
        const HOST = 0x4000;
        const ALL_GRAPHICS = 0x8000;
        const ALL_COMMANDS = 0x10000;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct VkBufferUsageFlags: u32 {
        const TRANSFER_SRC = 0x1;
        const TRANSFER_DST = 0x2;
        const UNIFORM_BUFFER = 0x10;
        const STORAGE_BUFFER = 0x20;
        const INDEX_BUFFER = 0x40;
        const VERTEX_BUFFER = 0x80;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct ImageAspectFlags: u32 {
        const COLOR = 0x1;
        const DEPTH = 0x2;
        const STENCIL = 0x4;
    }
}

#[repr(u32)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    #[default]
    Undefined = 0,
    General = 1,
    ColorAttachmentOptimal = 2,
    DepthStencilAttachmentOptimal = 3,
    ShaderReadOnlyOptimal = 5,
    TransferSrcOptimal = 6,
    TransferDstOptimal = 7,
    PresentSrc = 1_000_001_002,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PipelineBindPoint {
    Graphics,
    Compute,
}

/// Native state of a resource: what may access it, where in the pipeline,
/// and (for images) its layout. Buffers always report `Undefined`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct VulkanState {
    pub access: AccessFlags,
    pub stages: PipelineStageFlags,
    pub layout: ImageLayout,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemoryBarrier {
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BufferMemoryBarrier<B> {
    pub buffer: B,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ImageMemoryBarrier<I> {
    pub image: I,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub aspect: ImageAspectFlags,
}

/// Barrier arrays recorded by one `vkCmdPipelineBarrier`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineBarrier<B, I> {
    pub src_stages: PipelineStageFlags,
    pub dst_stages: PipelineStageFlags,
    pub memory: Vec<MemoryBarrier>,
    pub buffers: Vec<BufferMemoryBarrier<B>>,
    pub images: Vec<ImageMemoryBarrier<I>>,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BufferImageCopy {
    pub buffer_offset: u64,
    /// Texels, not bytes.
    pub buffer_row_length: u32,
    /// Zero means tightly packed rows.
    pub buffer_image_height: u32,
    pub aspect: ImageAspectFlags,
    pub mip_level: u32,
    pub image_offset: Origin3d,
    pub image_extent: Extent3d,
}

pub const WHOLE_SIZE: u64 = u64::MAX;

/// Device, command buffer and queue entry points used by [`VulkanDevice`].
///
/// `cmd_*` methods record into the single pending command buffer.
pub trait VulkanNative: MemoryDevice {
    type Buffer: Copy + Eq + fmt::Debug;
    type Image: Copy + Eq + fmt::Debug;
    type RenderPass: Copy + fmt::Debug;
    type Framebuffer: Copy + fmt::Debug;
    type Pipeline: Copy + fmt::Debug;
    type PipelineLayout: Copy + fmt::Debug;
    type DescriptorSet: Copy + fmt::Debug;

    fn create_buffer(
        &mut self,
        size: u64,
        usage: VkBufferUsageFlags,
    ) -> Result<Self::Buffer, GpuError>;
    fn buffer_memory_requirements(&self, buffer: Self::Buffer) -> MemoryRequirements;
    fn bind_buffer_memory(
        &mut self,
        buffer: Self::Buffer,
        memory: Self::Memory,
        offset: u64,
    ) -> Result<(), GpuError>;
    fn destroy_buffer(&mut self, buffer: Self::Buffer);

    fn cmd_pipeline_barrier(&mut self, barrier: &PipelineBarrier<Self::Buffer, Self::Image>);
    fn cmd_begin_render_pass(
        &mut self,
        render_pass: Self::RenderPass,
        framebuffer: Self::Framebuffer,
        width: u32,
        height: u32,
        clear_values: &[ClearValue],
    );
    fn cmd_next_subpass(&mut self);
    fn cmd_end_render_pass(&mut self);
    fn cmd_set_viewport_and_scissor(&mut self, width: u32, height: u32);
    fn cmd_set_stencil_reference(&mut self, reference: u32);
    fn cmd_set_blend_constants(&mut self, constants: [f32; 4]);

    fn cmd_bind_pipeline(&mut self, bind_point: PipelineBindPoint, pipeline: Self::Pipeline);
    fn cmd_push_constants(
        &mut self,
        layout: Self::PipelineLayout,
        stages: ShaderStages,
        offset: u32,
        values: &[u32],
    );
    fn cmd_bind_descriptor_sets(
        &mut self,
        bind_point: PipelineBindPoint,
        layout: Self::PipelineLayout,
        first_set: u32,
        sets: &[Self::DescriptorSet],
    );
    fn cmd_bind_vertex_buffers(
        &mut self,
        first_binding: u32,
        buffers: &[Self::Buffer],
        offsets: &[u64],
    );
    fn cmd_bind_index_buffer(&mut self, buffer: Self::Buffer, offset: u64, format: IndexFormat);

    fn cmd_draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );
    fn cmd_draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
    fn cmd_dispatch(&mut self, x: u32, y: u32, z: u32);

    fn cmd_copy_buffer(
        &mut self,
        src: Self::Buffer,
        src_offset: u64,
        dst: Self::Buffer,
        dst_offset: u64,
        size: u64,
    );
    fn cmd_copy_buffer_to_image(
        &mut self,
        src: Self::Buffer,
        dst: Self::Image,
        layout: ImageLayout,
        region: &BufferImageCopy,
    );
    fn cmd_copy_image_to_buffer(
        &mut self,
        src: Self::Image,
        layout: ImageLayout,
        dst: Self::Buffer,
        region: &BufferImageCopy,
    );

    /// Ends the pending command buffer and submits it.
    fn submit(&mut self) -> Result<(), GpuError>;
    /// Drops everything recorded since the last `submit`.
    fn reset_commands(&mut self);
    fn signal(&mut self, value: u64) -> Result<(), GpuError>;
    fn completed_value(&self) -> u64;
    fn wait_for(&mut self, value: u64) -> Result<(), GpuError>;
}

pub struct VulkanBarriers;

impl BarrierPolicy for VulkanBarriers {
    type State = VulkanState;

    fn buffer_state(usage: BufferUsage) -> VulkanState {
        let mut access = AccessFlags::empty();
        let mut stages = PipelineStageFlags::empty();

        if usage.contains(BufferUsage::MAP_READ) {
            access |= AccessFlags::HOST_READ;
            stages |= PipelineStageFlags::HOST;
        }
        if usage.contains(BufferUsage::MAP_WRITE) {
            access |= AccessFlags::HOST_WRITE;
            stages |= PipelineStageFlags::HOST;
        }
        if usage.contains(BufferUsage::TRANSFER_SRC) {
            access |= AccessFlags::TRANSFER_READ;
            stages |= PipelineStageFlags::TRANSFER;
        }
        if usage.contains(BufferUsage::TRANSFER_DST) {
            access |= AccessFlags::TRANSFER_WRITE;
            stages |= PipelineStageFlags::TRANSFER;
        }
        if usage.contains(BufferUsage::INDEX) {
            access |= AccessFlags::INDEX_READ;
            stages |= PipelineStageFlags::VERTEX_INPUT;
        }
        if usage.contains(BufferUsage::VERTEX) {
            access |= AccessFlags::VERTEX_ATTRIBUTE_READ;
            stages |= PipelineStageFlags::VERTEX_INPUT;
        }
        if usage.contains(BufferUsage::UNIFORM) {
            access |= AccessFlags::UNIFORM_READ;
            stages |= shader_stages();
        }
        if usage.contains(BufferUsage::STORAGE) {
            access |= AccessFlags::SHADER_READ | AccessFlags::SHADER_WRITE;
            stages |= shader_stages();
        }
        if stages.is_empty() {
            stages = PipelineStageFlags::TOP_OF_PIPE;
        }

        VulkanState {
            access,
            stages,
            layout: ImageLayout::Undefined,
        }
    }

    fn texture_state(usage: TextureUsage, format: TextureFormat) -> VulkanState {
        let depth_stencil = format.has_depth_or_stencil();
        let mut access = AccessFlags::empty();
        let mut stages = PipelineStageFlags::empty();

        if usage.contains(TextureUsage::TRANSFER_SRC) {
            access |= AccessFlags::TRANSFER_READ;
            stages |= PipelineStageFlags::TRANSFER;
        }
        if usage.contains(TextureUsage::TRANSFER_DST) {
            access |= AccessFlags::TRANSFER_WRITE;
            stages |= PipelineStageFlags::TRANSFER;
        }
        if usage.contains(TextureUsage::SAMPLED) {
            access |= AccessFlags::SHADER_READ;
            stages |= shader_stages();
        }
        if usage.contains(TextureUsage::STORAGE) {
            access |= AccessFlags::SHADER_READ | AccessFlags::SHADER_WRITE;
            stages |= shader_stages();
        }
        if usage.contains(TextureUsage::OUTPUT_ATTACHMENT) {
            if depth_stencil {
                access |= AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
                stages |= PipelineStageFlags::EARLY_FRAGMENT_TESTS
                    | PipelineStageFlags::LATE_FRAGMENT_TESTS;
            } else {
                access |=
                    AccessFlags::COLOR_ATTACHMENT_READ | AccessFlags::COLOR_ATTACHMENT_WRITE;
                stages |= PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
            }
        }
        if usage.contains(TextureUsage::PRESENT) {
            access |= AccessFlags::MEMORY_READ;
            stages |= PipelineStageFlags::BOTTOM_OF_PIPE;
        }
        if stages.is_empty() {
            stages = PipelineStageFlags::TOP_OF_PIPE;
        }

        VulkanState {
            access,
            stages,
            layout: image_layout(usage, depth_stencil),
        }
    }
}

fn shader_stages() -> PipelineStageFlags {
    PipelineStageFlags::VERTEX_SHADER
        | PipelineStageFlags::FRAGMENT_SHADER
        | PipelineStageFlags::COMPUTE_SHADER
}

/// Layout an image must be in for `usage`. Combined usages fall back to
/// `General`.
pub fn image_layout(usage: TextureUsage, depth_stencil: bool) -> ImageLayout {
    if usage.is_empty() {
        return ImageLayout::Undefined;
    }
    if usage.bits().count_ones() > 1 {
        return ImageLayout::General;
    }
    if usage == TextureUsage::TRANSFER_SRC {
        ImageLayout::TransferSrcOptimal
    } else if usage == TextureUsage::TRANSFER_DST {
        ImageLayout::TransferDstOptimal
    } else if usage == TextureUsage::SAMPLED {
        ImageLayout::ShaderReadOnlyOptimal
    } else if usage == TextureUsage::STORAGE {
        ImageLayout::General
    } else if usage == TextureUsage::OUTPUT_ATTACHMENT {
        if depth_stencil {
            ImageLayout::DepthStencilAttachmentOptimal
        } else {
            ImageLayout::ColorAttachmentOptimal
        }
    } else if usage == TextureUsage::PRESENT {
        ImageLayout::PresentSrc
    } else {
        unreachable!("unmapped texture usage {usage:?}")
    }
}

pub fn buffer_usage_flags(usage: BufferUsage) -> VkBufferUsageFlags {
    let mut flags = VkBufferUsageFlags::empty();
    if usage.contains(BufferUsage::TRANSFER_SRC) {
        flags |= VkBufferUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(BufferUsage::TRANSFER_DST) {
        flags |= VkBufferUsageFlags::TRANSFER_DST;
    }
    if usage.contains(BufferUsage::INDEX) {
        flags |= VkBufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::VERTEX) {
        flags |= VkBufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        flags |= VkBufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE) {
        flags |= VkBufferUsageFlags::STORAGE_BUFFER;
    }
    flags
}

fn aspect(format: TextureFormat) -> ImageAspectFlags {
    let mut aspect = ImageAspectFlags::empty();
    if format.has_depth() {
        aspect |= ImageAspectFlags::DEPTH;
    }
    if format.has_stencil() {
        aspect |= ImageAspectFlags::STENCIL;
    }
    if aspect.is_empty() {
        aspect = ImageAspectFlags::COLOR;
    }
    aspect
}

#[derive(Debug)]
pub struct VulkanBuffer<B, M> {
    pub buffer: B,
    pub allocation: DeviceMemoryAllocation<M>,
}

#[derive(Debug, Clone, Copy)]
struct VulkanTexture<I> {
    image: I,
    format: TextureFormat,
    layout: ImageLayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VulkanPipeline<P, L> {
    pub pipeline: P,
    pub layout: L,
}

/// Native render pass waiting for its first subpass.
struct PendingRenderPass<R, F> {
    render_pass: R,
    framebuffer: F,
    width: u32,
    height: u32,
    clear_values: Vec<ClearValue>,
}

type NativePipeline<N> =
    VulkanPipeline<<N as VulkanNative>::Pipeline, <N as VulkanNative>::PipelineLayout>;

pub struct VulkanDevice<N: VulkanNative> {
    native: N,
    allocator: MemoryAllocator<N::Memory>,
    serials: SubmissionTracker,
    releases: ReleaseQueue<N::Buffer>,

    buffers: Registry<BufferId, VulkanBuffer<N::Buffer, N::Memory>>,
    textures: Registry<TextureId, VulkanTexture<N::Image>>,
    render_passes: Registry<RenderPassId, N::RenderPass>,
    framebuffers: Registry<FramebufferId, N::Framebuffer>,
    pipelines: Registry<PipelineId, NativePipeline<N>>,
    bind_groups: Registry<BindGroupId, N::DescriptorSet>,

    push_constants: PushConstantTracker,
    pending_pass: Option<PendingRenderPass<N::RenderPass, N::Framebuffer>>,
    index_buffer: Option<(BufferId, u64)>,
    bound_index_buffer: Option<(BufferId, u64, IndexFormat)>,
    /// Layouts overwritten by the submission being recorded.
    layout_journal: Vec<(TextureId, ImageLayout)>,
    config: RuntimeConfig,
}

impl<N: VulkanNative> VulkanDevice<N> {
    pub fn new(native: N, config: RuntimeConfig) -> Self {
        Self {
            native,
            allocator: MemoryAllocator::new(&config),
            serials: SubmissionTracker::new(),
            releases: ReleaseQueue::new(),
            buffers: Registry::default(),
            textures: Registry::default(),
            render_passes: Registry::default(),
            framebuffers: Registry::default(),
            pipelines: Registry::default(),
            bind_groups: Registry::default(),
            push_constants: PushConstantTracker::new(),
            pending_pass: None,
            index_buffer: None,
            bound_index_buffer: None,
            layout_journal: Vec::new(),
            config,
        }
    }

    pub fn native(&self) -> &N {
        &self.native
    }

    pub fn native_mut(&mut self) -> &mut N {
        &mut self.native
    }

    pub fn pending_serial(&self) -> Serial {
        self.serials.pending_serial()
    }

    pub fn last_completed(&self) -> Serial {
        self.serials.last_completed()
    }

    pub fn allocator_stats(&self) -> AllocatorStats {
        self.allocator.stats()
    }

    /// Creates the native buffer and binds it to sub-allocated memory.
    /// Host-mapped buffers get persistently mapped memory.
    pub fn create_buffer(&mut self, id: BufferId, desc: &BufferDescriptor) -> Result<(), GpuError> {
        let buffer = self
            .native
            .create_buffer(desc.size, buffer_usage_flags(desc.usage))?;
        let requirements = self.native.buffer_memory_requirements(buffer);
        let allocation = match self.allocator.allocate(
            &mut self.native,
            &requirements,
            desc.usage.is_host_mapped(),
        ) {
            Ok(allocation) => allocation,
            Err(err) => {
                self.native.destroy_buffer(buffer);
                return Err(err);
            }
        };
        if let Err(err) =
            self.native
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        {
            self.native.destroy_buffer(buffer);
            self.allocator
                .free(allocation, self.serials.pending_serial());
            return Err(err);
        }
        debug!(
            buffer = id.0,
            size = desc.size,
            offset = allocation.offset(),
            "created buffer"
        );
        self.buffers
            .insert(id, VulkanBuffer { buffer, allocation });
        Ok(())
    }

    pub fn buffer(&self, id: BufferId) -> Result<&VulkanBuffer<N::Buffer, N::Memory>, ExecuteError> {
        Ok(self.buffers.get(id)?)
    }

    /// The buffer and its memory are reclaimed once the pending submission
    /// completes.
    pub fn destroy_buffer(&mut self, id: BufferId) -> Result<(), ExecuteError> {
        let buffer = self.buffers.remove(id)?;
        let serial = self.serials.pending_serial();
        self.releases.release(buffer.buffer, serial);
        self.allocator.free(buffer.allocation, serial);
        Ok(())
    }

    /// Registers an image created by the host, currently laid out for
    /// `initial_usage`.
    pub fn register_texture(
        &mut self,
        id: TextureId,
        image: N::Image,
        format: TextureFormat,
        initial_usage: TextureUsage,
    ) {
        let layout = image_layout(initial_usage, format.has_depth_or_stencil());
        self.textures.insert(
            id,
            VulkanTexture {
                image,
                format,
                layout,
            },
        );
    }

    pub fn texture_layout(&self, id: TextureId) -> Result<ImageLayout, ExecuteError> {
        Ok(self.textures.get(id)?.layout)
    }

    pub fn register_render_pass(&mut self, id: RenderPassId, render_pass: N::RenderPass) {
        self.render_passes.insert(id, render_pass);
    }

    pub fn register_framebuffer(&mut self, id: FramebufferId, framebuffer: N::Framebuffer) {
        self.framebuffers.insert(id, framebuffer);
    }

    pub fn register_pipeline(&mut self, id: PipelineId, pipeline: NativePipeline<N>) {
        self.pipelines.insert(id, pipeline);
    }

    pub fn register_bind_group(&mut self, id: BindGroupId, set: N::DescriptorSet) {
        self.bind_groups.insert(id, set);
    }

    /// Records `words`, submits them and signals the next serial.
    pub fn submit(
        &mut self,
        words: &[CmdWord],
        objects: &mut ObjectTable,
    ) -> Result<(Serial, ExecutionReport), ExecuteError> {
        let config = self.config.clone();
        let mut executor = Executor::new(objects, &config);
        let report = match executor.execute(words, self) {
            Ok(report) => report,
            Err(err) => {
                self.abandon_recording();
                return Err(err);
            }
        };
        if let Err(err) = self.native.submit() {
            executor.rollback();
            self.abandon_recording();
            return Err(err.into());
        }
        self.layout_journal.clear();
        let serial = self.serials.submitted();
        self.native.signal(serial.0)?;
        Ok((serial, report))
    }

    /// Drops the recorded commands and puts every image back in the layout
    /// the last successful submission left it in.
    fn abandon_recording(&mut self) {
        self.native.reset_commands();
        self.pending_pass = None;
        for (id, layout) in self.layout_journal.drain(..).rev() {
            if let Ok(texture) = self.textures.get_mut(id) {
                texture.layout = layout;
            }
        }
    }

    /// Processes completed work without blocking.
    pub fn tick(&mut self) -> bool {
        let completed = Serial(self.native.completed_value());
        self.tick_to(completed)
    }

    fn tick_to(&mut self, completed: Serial) -> bool {
        if !self.serials.update_completed(completed) {
            return false;
        }
        let native = &mut self.native;
        let destroyed = self
            .releases
            .tick(completed, |buffer| native.destroy_buffer(buffer));
        self.allocator.tick(completed);
        debug!(%completed, destroyed, "completion tick");
        true
    }

    /// Waits for all submitted work, destroys every buffer and returns the
    /// device memory.
    pub fn shutdown(mut self) -> Result<N, GpuError> {
        let serial = self.serials.submitted();
        self.native.signal(serial.0)?;
        self.native.wait_for(serial.0)?;
        self.tick_to(serial);

        let Self {
            mut native,
            mut allocator,
            mut buffers,
            ..
        } = self;
        for (_, buffer) in buffers.drain() {
            native.destroy_buffer(buffer.buffer);
            allocator.free(buffer.allocation, serial);
        }
        allocator.tick(serial);
        allocator.destroy(&mut native);
        Ok(native)
    }

    fn bind_point(pipeline: &BoundPipeline<'_>) -> PipelineBindPoint {
        if pipeline.pipeline.is_compute() {
            PipelineBindPoint::Compute
        } else {
            PipelineBindPoint::Graphics
        }
    }
}

impl<N: VulkanNative> Backend for VulkanDevice<N> {
    type Barriers = VulkanBarriers;

    fn begin_compute_pass(&mut self) -> Result<(), ExecuteError> {
        self.push_constants.on_begin_pass();
        Ok(())
    }

    fn begin_render_pass(&mut self, begin: &RenderPassBegin<'_>) -> Result<(), ExecuteError> {
        let render_pass = *self.render_passes.get(begin.render_pass_id)?;
        let framebuffer = *self.framebuffers.get(begin.framebuffer_id)?;
        let clear_values = (0..begin.render_pass.attachment_count())
            .map(|attachment| {
                let value = begin.framebuffer.clear_value(attachment);
                let depth_stencil = begin
                    .render_pass
                    .attachment(attachment)
                    .is_some_and(|info| info.desc.format.has_depth_or_stencil());
                if depth_stencil {
                    ClearValue::DepthStencil {
                        depth: value.depth,
                        stencil: value.stencil,
                    }
                } else {
                    ClearValue::Color(value.color.to_array())
                }
            })
            .collect();
        self.pending_pass = Some(PendingRenderPass {
            render_pass,
            framebuffer,
            width: begin.framebuffer.width,
            height: begin.framebuffer.height,
            clear_values,
        });
        Ok(())
    }

    fn begin_subpass(&mut self, target: &SubpassTarget) -> Result<(), ExecuteError> {
        self.push_constants.on_begin_pass();
        self.bound_index_buffer = None;

        if target.index == 0 {
            if let Some(pass) = self.pending_pass.take() {
                self.native.cmd_begin_render_pass(
                    pass.render_pass,
                    pass.framebuffer,
                    pass.width,
                    pass.height,
                    &pass.clear_values,
                );
                self.native
                    .cmd_set_viewport_and_scissor(pass.width, pass.height);
            }
        } else {
            self.native.cmd_next_subpass();
        }
        Ok(())
    }

    fn end_subpass(&mut self) -> Result<(), ExecuteError> {
        Ok(())
    }

    fn end_render_pass(&mut self) -> Result<(), ExecuteError> {
        self.native.cmd_end_render_pass();
        Ok(())
    }

    fn set_pipeline(&mut self, pipeline: &BoundPipeline<'_>) -> Result<(), ExecuteError> {
        let native_pipeline = *self.pipelines.get(pipeline.id)?;
        self.native
            .cmd_bind_pipeline(Self::bind_point(pipeline), native_pipeline.pipeline);
        self.push_constants
            .on_set_pipeline(&pipeline.pipeline.push_constants);
        Ok(())
    }

    fn set_push_constants(
        &mut self,
        stages: ShaderStages,
        offset: u32,
        values: &[u32],
    ) -> Result<(), ExecuteError> {
        self.push_constants
            .on_set_push_constants(stages, offset, values);
        Ok(())
    }

    fn set_bind_group(
        &mut self,
        index: u32,
        group: BindGroupId,
        pipeline: &BoundPipeline<'_>,
        _bindings: &[ResolvedBinding],
    ) -> Result<(), ExecuteError> {
        let layout = self.pipelines.get(pipeline.id)?.layout;
        let set = *self.bind_groups.get(group)?;
        self.native
            .cmd_bind_descriptor_sets(Self::bind_point(pipeline), layout, index, &[set]);
        Ok(())
    }

    fn set_vertex_buffers(
        &mut self,
        start_slot: u32,
        buffers: &[VertexBufferBinding],
    ) -> Result<(), ExecuteError> {
        let mut handles = Vec::with_capacity(buffers.len());
        let mut offsets = Vec::with_capacity(buffers.len());
        for binding in buffers {
            handles.push(self.buffers.get(binding.buffer)?.buffer);
            offsets.push(binding.offset);
        }
        self.native
            .cmd_bind_vertex_buffers(start_slot, &handles, &offsets);
        Ok(())
    }

    fn set_index_buffer(&mut self, buffer: BufferId, offset: u64) -> Result<(), ExecuteError> {
        // The index type comes from the pipeline, so binding waits for the
        // next indexed draw.
        self.index_buffer = Some((buffer, offset));
        Ok(())
    }

    fn set_stencil_reference(&mut self, reference: u32) -> Result<(), ExecuteError> {
        self.native.cmd_set_stencil_reference(reference);
        Ok(())
    }

    fn set_blend_color(&mut self, color: Color) -> Result<(), ExecuteError> {
        self.native.cmd_set_blend_constants(color.to_array());
        Ok(())
    }

    fn flush(&mut self, pipeline: &BoundPipeline<'_>) -> Result<(), ExecuteError> {
        let layout = self.pipelines.get(pipeline.id)?.layout;
        let native = &mut self.native;
        self.push_constants.apply(
            &pipeline.pipeline.push_constants,
            |stage, slot, _ty, value| -> Result<(), ExecuteError> {
                native.cmd_push_constants(layout, stage.flag(), slot * 4, &[value]);
                Ok(())
            },
        )
    }

    fn draw(&mut self, _pipeline: &BoundPipeline<'_>, args: &DrawArgs) -> Result<(), ExecuteError> {
        self.native.cmd_draw(
            args.vertex_count,
            args.instance_count,
            args.first_vertex,
            args.first_instance,
        );
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        pipeline: &BoundPipeline<'_>,
        args: &DrawIndexedArgs,
    ) -> Result<(), ExecuteError> {
        if let (Some((buffer, offset)), Some(state)) = (self.index_buffer, pipeline.render_state())
        {
            let wanted = (buffer, offset, state.index_format);
            if self.bound_index_buffer != Some(wanted) {
                let handle = self.buffers.get(buffer)?.buffer;
                self.native
                    .cmd_bind_index_buffer(handle, offset, state.index_format);
                self.bound_index_buffer = Some(wanted);
            }
        }
        self.native.cmd_draw_indexed(
            args.index_count,
            args.instance_count,
            args.first_index,
            args.base_vertex,
            args.first_instance,
        );
        Ok(())
    }

    fn dispatch(
        &mut self,
        _pipeline: &BoundPipeline<'_>,
        x: u32,
        y: u32,
        z: u32,
    ) -> Result<(), ExecuteError> {
        self.native.cmd_dispatch(x, y, z);
        Ok(())
    }

    fn full_barrier(&mut self) -> Result<(), ExecuteError> {
        self.native.cmd_pipeline_barrier(&PipelineBarrier {
            src_stages: PipelineStageFlags::ALL_COMMANDS,
            dst_stages: PipelineStageFlags::ALL_COMMANDS,
            memory: vec![MemoryBarrier {
                src_access: AccessFlags::MEMORY_WRITE,
                dst_access: AccessFlags::MEMORY_READ | AccessFlags::MEMORY_WRITE,
            }],
            buffers: Vec::new(),
            images: Vec::new(),
        });
        Ok(())
    }

    fn copy_buffer_to_buffer(&mut self, copy: &BufferCopy) -> Result<(), ExecuteError> {
        let src = self.buffers.get(copy.src)?.buffer;
        let dst = self.buffers.get(copy.dst)?.buffer;
        self.native
            .cmd_copy_buffer(src, copy.src_offset, dst, copy.dst_offset, copy.size);
        Ok(())
    }

    fn copy_buffer_to_texture(&mut self, copy: &TextureCopy) -> Result<(), ExecuteError> {
        let buffer = self.buffers.get(copy.buffer)?.buffer;
        let texture = *self.textures.get(copy.texture)?;
        self.native.cmd_copy_buffer_to_image(
            buffer,
            texture.image,
            texture.layout,
            &buffer_image_copy(copy, texture.format),
        );
        Ok(())
    }

    fn copy_texture_to_buffer(&mut self, copy: &TextureCopy) -> Result<(), ExecuteError> {
        let buffer = self.buffers.get(copy.buffer)?.buffer;
        let texture = *self.textures.get(copy.texture)?;
        self.native.cmd_copy_image_to_buffer(
            texture.image,
            texture.layout,
            buffer,
            &buffer_image_copy(copy, texture.format),
        );
        Ok(())
    }

    fn transition_buffer(
        &mut self,
        buffer: BufferId,
        transition: Transition<VulkanState>,
    ) -> Result<(), ExecuteError> {
        let handle = self.buffers.get(buffer)?.buffer;
        self.native.cmd_pipeline_barrier(&PipelineBarrier {
            src_stages: transition.before.stages,
            dst_stages: transition.after.stages,
            memory: Vec::new(),
            buffers: vec![BufferMemoryBarrier {
                buffer: handle,
                src_access: transition.before.access,
                dst_access: transition.after.access,
                offset: 0,
                size: WHOLE_SIZE,
            }],
            images: Vec::new(),
        });
        Ok(())
    }

    fn transition_texture(
        &mut self,
        texture: TextureId,
        transition: Transition<VulkanState>,
    ) -> Result<(), ExecuteError> {
        let entry = self.textures.get_mut(texture)?;
        let barrier = ImageMemoryBarrier {
            image: entry.image,
            src_access: transition.before.access,
            dst_access: transition.after.access,
            old_layout: entry.layout,
            new_layout: transition.after.layout,
            aspect: aspect(entry.format),
        };
        self.layout_journal.push((texture, entry.layout));
        entry.layout = transition.after.layout;
        self.native.cmd_pipeline_barrier(&PipelineBarrier {
            src_stages: transition.before.stages,
            dst_stages: transition.after.stages,
            memory: Vec::new(),
            buffers: Vec::new(),
            images: vec![barrier],
        });
        Ok(())
    }
}

fn buffer_image_copy(copy: &TextureCopy, format: TextureFormat) -> BufferImageCopy {
    BufferImageCopy {
        buffer_offset: copy.buffer_offset,
        buffer_row_length: copy.row_length,
        buffer_image_height: 0,
        aspect: aspect(format),
        mip_level: copy.level,
        image_offset: copy.origin,
        image_extent: copy.extent,
    }
}
