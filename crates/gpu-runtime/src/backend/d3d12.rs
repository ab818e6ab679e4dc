//! Direct3D 12 backend.
//!
//! Resources carry explicit states; usage transitions become resource
//! barriers recorded immediately into the pending command list. Submission
//! serials are fence values, and the device's [`CompletionTracker`] decides
//! when released resources may be destroyed and when map reads may observe
//! their data.

use std::fmt;
use std::ops::Range;

use bitflags::bitflags;
use tracing::debug;

use crate::cmd::{BufferCopy, CmdWord, DrawArgs, DrawIndexedArgs, Extent3d, Origin3d};
use crate::config::RuntimeConfig;
use crate::device::CompletionTracker;
use crate::elision::{InputBinding, InputBufferTracker, PushConstantTracker};
use crate::error::{ExecuteError, GpuError};
use crate::executor::{
    Backend, BoundPipeline, ExecutionReport, Executor, ResolvedBinding, ResolvedResource,
    SubpassTarget, TextureCopy,
};
use crate::format::{Color, IndexFormat, PrimitiveTopology, TextureFormat};
use crate::map_read::MapReadCallback;
use crate::memory::align_up;
use crate::objects::{
    BindGroupId, BufferDescriptor, BufferId, ObjectTable, PipelineId, TextureDescriptor,
    TextureId, VertexBufferBinding, MAX_BINDINGS_PER_GROUP,
};
use crate::serial::Serial;
use crate::state_tracker::{BarrierPolicy, Transition};
use crate::usage::{BufferUsage, PerStage, ShaderStages, TextureUsage};

use super::Registry;

bitflags! {
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct D3d12ResourceStates: u32 {
        const COMMON = 0;
        const VERTEX_AND_CONSTANT_BUFFER = 0x1;
        const INDEX_BUFFER = 0x2;
        const RENDER_TARGET = 0x4;
        const UNORDERED_ACCESS = 0x8;
        const DEPTH_WRITE = 0x10;
        const DEPTH_READ = 0x20;
        const NON_PIXEL_SHADER_RESOURCE = 0x40;
        const PIXEL_SHADER_RESOURCE = 0x80;
        const INDIRECT_ARGUMENT = 0x200;
        const COPY_DEST = 0x400;
        const COPY_SOURCE = 0x800;
        const GENERIC_READ = 0xAC3;
        const PRESENT = 0;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct D3d12ResourceFlags: u32 {
        const ALLOW_RENDER_TARGET = 0x1;
        const ALLOW_DEPTH_STENCIL = 0x2;
        const ALLOW_UNORDERED_ACCESS = 0x4;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct D3d12ClearFlags: u32 {
        const DEPTH = 0x1;
        const STENCIL = 0x2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapType {
    Default,
    Upload,
    Readback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceDimension {
    Buffer,
    Texture2d {
        height: u32,
        depth_or_array_size: u32,
        mip_levels: u32,
        format: TextureFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceDesc {
    pub dimension: ResourceDimension,
    pub width: u64,
    pub flags: D3d12ResourceFlags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceBarrier<R> {
    Transition {
        resource: R,
        before: D3d12ResourceStates,
        after: D3d12ResourceStates,
    },
    /// `None` orders every UAV access.
    Uav { resource: Option<R> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBufferView {
    pub location: u64,
    pub size: u64,
    pub stride: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBufferView {
    pub location: u64,
    pub size: u64,
    pub format: IndexFormat,
}

/// Layout of texel data inside a buffer for buffer/texture copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacedFootprint {
    pub offset: u64,
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    /// Bytes between rows.
    pub row_pitch: u32,
}

/// Device, command list and queue entry points used by [`D3d12Device`].
///
/// Command-list methods record into the single pending list; `execute`
/// closes and submits it.
pub trait D3d12Native {
    type Resource: Clone + fmt::Debug;
    /// Host view of a mapped resource covering the whole resource.
    type Mapping: AsRef<[u8]>;
    type Descriptor: Copy + fmt::Debug;
    type GpuDescriptor: Copy + fmt::Debug;
    type PipelineState;
    type RootSignature;

    fn create_committed_resource(
        &mut self,
        heap: HeapType,
        desc: &ResourceDesc,
        initial_state: D3d12ResourceStates,
    ) -> Result<Self::Resource, GpuError>;
    fn destroy_resource(&mut self, resource: Self::Resource);
    fn gpu_virtual_address(&self, resource: &Self::Resource) -> u64;
    fn map(
        &mut self,
        resource: &Self::Resource,
        read_range: Range<usize>,
    ) -> Result<Self::Mapping, GpuError>;
    fn unmap(&mut self, resource: &Self::Resource);

    fn create_render_target_view(
        &mut self,
        resource: &Self::Resource,
        format: TextureFormat,
        mip_level: u32,
    ) -> Result<Self::Descriptor, GpuError>;
    fn create_depth_stencil_view(
        &mut self,
        resource: &Self::Resource,
        format: TextureFormat,
        mip_level: u32,
    ) -> Result<Self::Descriptor, GpuError>;
    fn free_descriptor(&mut self, descriptor: Self::Descriptor);

    fn resource_barrier(&mut self, barriers: &[ResourceBarrier<Self::Resource>]);
    fn om_set_render_targets(
        &mut self,
        render_targets: &[Self::Descriptor],
        depth_stencil: Option<Self::Descriptor>,
    );
    fn clear_render_target_view(&mut self, view: Self::Descriptor, color: [f32; 4]);
    fn clear_depth_stencil_view(
        &mut self,
        view: Self::Descriptor,
        flags: D3d12ClearFlags,
        depth: f32,
        stencil: u8,
    );
    fn rs_set_viewport_and_scissor(&mut self, width: u32, height: u32);
    fn om_set_blend_factor(&mut self, factor: [f32; 4]);
    fn om_set_stencil_ref(&mut self, reference: u32);

    fn set_root_signature(&mut self, compute: bool, signature: &Self::RootSignature);
    fn set_pipeline_state(&mut self, state: &Self::PipelineState);
    fn set_root_32bit_constant(&mut self, compute: bool, parameter: u32, value: u32, offset: u32);
    fn set_root_constant_buffer_view(&mut self, compute: bool, parameter: u32, location: u64);
    fn set_root_unordered_access_view(&mut self, compute: bool, parameter: u32, location: u64);
    fn set_root_descriptor_table(
        &mut self,
        compute: bool,
        parameter: u32,
        table: Self::GpuDescriptor,
    );

    fn ia_set_primitive_topology(&mut self, topology: PrimitiveTopology);
    fn ia_set_vertex_buffers(&mut self, start_slot: u32, views: &[VertexBufferView]);
    fn ia_set_index_buffer(&mut self, view: &IndexBufferView);
    fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    );
    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    );
    fn dispatch(&mut self, x: u32, y: u32, z: u32);

    fn copy_buffer_region(
        &mut self,
        dst: &Self::Resource,
        dst_offset: u64,
        src: &Self::Resource,
        src_offset: u64,
        size: u64,
    );
    fn copy_buffer_to_texture_region(
        &mut self,
        dst: &Self::Resource,
        mip_level: u32,
        origin: Origin3d,
        src: &Self::Resource,
        footprint: &PlacedFootprint,
    );
    fn copy_texture_to_buffer_region(
        &mut self,
        dst: &Self::Resource,
        footprint: &PlacedFootprint,
        src: &Self::Resource,
        mip_level: u32,
        origin: Origin3d,
        extent: Extent3d,
    );

    /// Closes the pending command list and submits it.
    fn execute(&mut self) -> Result<(), GpuError>;
    /// Drops everything recorded since the last `execute`.
    fn reset_command_list(&mut self);
    fn signal(&mut self, value: u64) -> Result<(), GpuError>;
    fn completed_value(&self) -> u64;
    fn wait_for(&mut self, value: u64) -> Result<(), GpuError>;
}

pub struct D3d12Barriers;

impl BarrierPolicy for D3d12Barriers {
    type State = D3d12ResourceStates;

    fn buffer_state(usage: BufferUsage) -> D3d12ResourceStates {
        let mut state = D3d12ResourceStates::COMMON;
        if usage.contains(BufferUsage::TRANSFER_SRC) {
            state |= D3d12ResourceStates::COPY_SOURCE;
        }
        if usage.contains(BufferUsage::TRANSFER_DST) {
            state |= D3d12ResourceStates::COPY_DEST;
        }
        if usage.intersects(BufferUsage::VERTEX | BufferUsage::UNIFORM) {
            state |= D3d12ResourceStates::VERTEX_AND_CONSTANT_BUFFER;
        }
        if usage.contains(BufferUsage::INDEX) {
            state |= D3d12ResourceStates::INDEX_BUFFER;
        }
        if usage.contains(BufferUsage::STORAGE) {
            state |= D3d12ResourceStates::UNORDERED_ACCESS;
        }
        state
    }

    fn texture_state(usage: TextureUsage, format: TextureFormat) -> D3d12ResourceStates {
        let mut state = D3d12ResourceStates::COMMON;
        if usage.contains(TextureUsage::TRANSFER_SRC) {
            state |= D3d12ResourceStates::COPY_SOURCE;
        }
        if usage.contains(TextureUsage::TRANSFER_DST) {
            state |= D3d12ResourceStates::COPY_DEST;
        }
        if usage.contains(TextureUsage::SAMPLED) {
            state |= D3d12ResourceStates::PIXEL_SHADER_RESOURCE
                | D3d12ResourceStates::NON_PIXEL_SHADER_RESOURCE;
        }
        if usage.contains(TextureUsage::STORAGE) {
            state |= D3d12ResourceStates::UNORDERED_ACCESS;
        }
        if usage.contains(TextureUsage::OUTPUT_ATTACHMENT) {
            state |= if format.has_depth_or_stencil() {
                D3d12ResourceStates::DEPTH_WRITE
            } else {
                D3d12ResourceStates::RENDER_TARGET
            };
        }
        if usage.contains(TextureUsage::PRESENT) {
            state |= D3d12ResourceStates::PRESENT;
        }
        state
    }
}

pub fn heap_type(allowed: BufferUsage) -> HeapType {
    if allowed.contains(BufferUsage::MAP_READ) {
        HeapType::Readback
    } else if allowed.contains(BufferUsage::MAP_WRITE) {
        HeapType::Upload
    } else {
        HeapType::Default
    }
}

fn buffer_flags(allowed: BufferUsage) -> D3d12ResourceFlags {
    let mut flags = D3d12ResourceFlags::empty();
    if allowed.contains(BufferUsage::STORAGE) {
        flags |= D3d12ResourceFlags::ALLOW_UNORDERED_ACCESS;
    }
    flags
}

fn texture_flags(allowed: TextureUsage, format: TextureFormat) -> D3d12ResourceFlags {
    let mut flags = D3d12ResourceFlags::empty();
    if allowed.contains(TextureUsage::STORAGE) {
        flags |= D3d12ResourceFlags::ALLOW_UNORDERED_ACCESS;
    }
    if allowed.contains(TextureUsage::OUTPUT_ATTACHMENT) {
        flags |= if format.has_depth_or_stencil() {
            D3d12ResourceFlags::ALLOW_DEPTH_STENCIL
        } else {
            D3d12ResourceFlags::ALLOW_RENDER_TARGET
        };
    }
    flags
}

#[derive(Debug, Clone)]
pub struct D3d12Buffer<R> {
    pub resource: R,
    /// Size of the native resource, after alignment.
    pub size: u64,
    pub heap: HeapType,
}

/// Root parameter slots one bind group binds into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupRootParameters {
    /// Root CBV/UAV parameter per buffer binding.
    pub buffers: [Option<u32>; MAX_BINDINGS_PER_GROUP],
    pub view_table: Option<u32>,
    pub sampler_table: Option<u32>,
}

/// A pipeline state object and the root signature layout it was built with.
pub struct D3d12Pipeline<N: D3d12Native> {
    pub state: N::PipelineState,
    pub root_signature: N::RootSignature,
    /// Root constants parameter per stage.
    pub push_constant_parameters: PerStage<Option<u32>>,
    /// Indexed by bind group index.
    pub groups: Vec<GroupRootParameters>,
}

/// Shader-visible descriptor tables of a bind group's textures and samplers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct D3d12BindGroupTables<G> {
    pub views: Option<G>,
    pub samplers: Option<G>,
}

pub struct D3d12Device<N: D3d12Native> {
    native: N,
    config: RuntimeConfig,
    completion: CompletionTracker<N::Resource, N::Mapping>,

    buffers: Registry<BufferId, D3d12Buffer<N::Resource>>,
    textures: Registry<TextureId, N::Resource>,
    pipelines: Registry<PipelineId, D3d12Pipeline<N>>,
    bind_groups: Registry<BindGroupId, D3d12BindGroupTables<N::GpuDescriptor>>,

    push_constants: PushConstantTracker,
    input_buffers: InputBufferTracker,
    subpass_descriptors: Vec<N::Descriptor>,
}

impl<N: D3d12Native> D3d12Device<N> {
    pub fn new(native: N, config: RuntimeConfig) -> Self {
        Self {
            native,
            config,
            completion: CompletionTracker::new(),
            buffers: Registry::default(),
            textures: Registry::default(),
            pipelines: Registry::default(),
            bind_groups: Registry::default(),
            push_constants: PushConstantTracker::new(),
            input_buffers: InputBufferTracker::new(),
            subpass_descriptors: Vec::new(),
        }
    }

    pub fn native(&self) -> &N {
        &self.native
    }

    pub fn native_mut(&mut self) -> &mut N {
        &mut self.native
    }

    pub fn completion(&self) -> &CompletionTracker<N::Resource, N::Mapping> {
        &self.completion
    }

    /// Creates the native resource for a buffer.
    ///
    /// Mapped buffers live in readback or upload heaps, which pin their state
    /// for the buffer's whole lifetime.
    pub fn create_buffer(
        &mut self,
        id: BufferId,
        desc: &BufferDescriptor,
        initial_usage: BufferUsage,
    ) -> Result<(), GpuError> {
        let heap = heap_type(desc.usage);
        let mut state = D3d12Barriers::buffer_state(initial_usage);
        match heap {
            HeapType::Readback => state |= D3d12ResourceStates::COPY_DEST,
            HeapType::Upload => state |= D3d12ResourceStates::GENERIC_READ,
            HeapType::Default => {}
        }
        let size = align_up(desc.size, self.config.buffer_alignment);
        let resource = self.native.create_committed_resource(
            heap,
            &ResourceDesc {
                dimension: ResourceDimension::Buffer,
                width: size,
                flags: buffer_flags(desc.usage),
            },
            state,
        )?;
        debug!(buffer = id.0, size, ?heap, "created buffer");
        self.buffers.insert(
            id,
            D3d12Buffer {
                resource,
                size,
                heap,
            },
        );
        Ok(())
    }

    pub fn create_texture(
        &mut self,
        id: TextureId,
        desc: &TextureDescriptor,
        initial_usage: TextureUsage,
    ) -> Result<(), GpuError> {
        let resource = self.native.create_committed_resource(
            HeapType::Default,
            &ResourceDesc {
                dimension: ResourceDimension::Texture2d {
                    height: desc.height,
                    depth_or_array_size: desc.depth,
                    mip_levels: desc.mip_levels,
                    format: desc.format,
                },
                width: u64::from(desc.width),
                flags: texture_flags(desc.usage, desc.format),
            },
            D3d12Barriers::texture_state(initial_usage, desc.format),
        )?;
        self.textures.insert(id, resource);
        Ok(())
    }

    pub fn buffer(&self, id: BufferId) -> Result<&D3d12Buffer<N::Resource>, ExecuteError> {
        Ok(self.buffers.get(id)?)
    }

    /// Queues the buffer's resource for destruction once the GPU is done with
    /// it. Outstanding map reads fail with `Unknown`.
    pub fn destroy_buffer(&mut self, id: BufferId) -> Result<(), ExecuteError> {
        let buffer = self.buffers.remove(id)?;
        self.completion.cancel_map_reads(id);
        self.completion.release(buffer.resource);
        Ok(())
    }

    pub fn destroy_texture(&mut self, id: TextureId) -> Result<(), ExecuteError> {
        let resource = self.textures.remove(id)?;
        self.completion.release(resource);
        Ok(())
    }

    pub fn register_pipeline(&mut self, id: PipelineId, pipeline: D3d12Pipeline<N>) {
        self.pipelines.insert(id, pipeline);
    }

    pub fn register_bind_group(
        &mut self,
        id: BindGroupId,
        tables: D3d12BindGroupTables<N::GpuDescriptor>,
    ) {
        self.bind_groups.insert(id, tables);
    }

    /// Maps a readback buffer and delivers `range` to `callback` once every
    /// submission recorded so far has completed.
    pub fn map_read_async(
        &mut self,
        id: BufferId,
        request_serial: u32,
        range: Range<usize>,
        callback: MapReadCallback,
    ) -> Result<(), ExecuteError> {
        let buffer = self.buffers.get(id)?;
        debug_assert_eq!(buffer.heap, HeapType::Readback);
        let mapping = self.native.map(&buffer.resource, range.clone())?;
        self.completion
            .track_map_read(id, request_serial, mapping, range, callback);
        Ok(())
    }

    pub fn unmap(&mut self, id: BufferId) -> Result<(), ExecuteError> {
        self.completion.cancel_map_reads(id);
        let buffer = self.buffers.get(id)?;
        self.native.unmap(&buffer.resource);
        Ok(())
    }

    /// Records `words`, submits them and signals the next serial.
    ///
    /// If recording fails the pending command list is discarded and nothing
    /// is submitted.
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
        if let Err(err) = self.native.execute() {
            executor.rollback();
            self.abandon_recording();
            return Err(err.into());
        }
        let serial = self.completion.submitted();
        self.native.signal(serial.0)?;
        Ok((serial, report))
    }

    /// Processes completed work without blocking.
    pub fn tick(&mut self) -> bool {
        let completed = Serial(self.native.completed_value());
        let native = &mut self.native;
        self.completion
            .tick(completed, |resource| native.destroy_resource(resource))
    }

    /// Waits for all submitted work and destroys every resource.
    pub fn shutdown(mut self) -> Result<N, GpuError> {
        // Serial for objects released since the last submission.
        let serial = self.completion.submitted();
        self.native.signal(serial.0)?;
        self.native.wait_for(serial.0)?;
        self.tick();

        for (_, buffer) in self.buffers.drain() {
            self.native.destroy_resource(buffer.resource);
        }
        for (_, texture) in self.textures.drain() {
            self.native.destroy_resource(texture);
        }
        Ok(self.native)
    }

    fn abandon_recording(&mut self) {
        self.native.reset_command_list();
        self.release_subpass_descriptors();
    }

    fn release_subpass_descriptors(&mut self) {
        for descriptor in self.subpass_descriptors.drain(..) {
            self.native.free_descriptor(descriptor);
        }
    }
}

impl<N: D3d12Native> Backend for D3d12Device<N> {
    type Barriers = D3d12Barriers;

    fn begin_compute_pass(&mut self) -> Result<(), ExecuteError> {
        self.push_constants.on_begin_pass();
        Ok(())
    }

    fn begin_subpass(&mut self, target: &SubpassTarget) -> Result<(), ExecuteError> {
        self.push_constants.on_begin_pass();
        self.input_buffers.on_begin_pass();

        let mut render_targets = Vec::with_capacity(target.colors.len());
        for color in &target.colors {
            let resource = self.textures.get(color.texture)?;
            let rtv = self
                .native
                .create_render_target_view(resource, color.format, color.level)?;
            self.subpass_descriptors.push(rtv);
            render_targets.push(rtv);
            if let Some(clear) = color.clear {
                self.native.clear_render_target_view(rtv, clear.to_array());
            }
        }

        let mut dsv = None;
        if let Some(depth_stencil) = &target.depth_stencil {
            let resource = self.textures.get(depth_stencil.texture)?;
            let view = self.native.create_depth_stencil_view(
                resource,
                depth_stencil.format,
                depth_stencil.level,
            )?;
            self.subpass_descriptors.push(view);
            dsv = Some(view);

            let mut flags = D3d12ClearFlags::empty();
            if depth_stencil.clear_depth.is_some() {
                flags |= D3d12ClearFlags::DEPTH;
            }
            if depth_stencil.clear_stencil.is_some() {
                flags |= D3d12ClearFlags::STENCIL;
            }
            if !flags.is_empty() {
                self.native.clear_depth_stencil_view(
                    view,
                    flags,
                    depth_stencil.clear_depth.unwrap_or(1.0),
                    depth_stencil.clear_stencil.unwrap_or(0) as u8,
                );
            }
        }

        self.native.om_set_render_targets(&render_targets, dsv);
        self.native
            .rs_set_viewport_and_scissor(target.width, target.height);
        Ok(())
    }

    fn end_subpass(&mut self) -> Result<(), ExecuteError> {
        self.release_subpass_descriptors();
        Ok(())
    }

    fn set_pipeline(&mut self, pipeline: &BoundPipeline<'_>) -> Result<(), ExecuteError> {
        let native_pipeline = self.pipelines.get(pipeline.id)?;
        let compute = pipeline.pipeline.is_compute();
        self.native
            .set_root_signature(compute, &native_pipeline.root_signature);
        self.native.set_pipeline_state(&native_pipeline.state);
        if let Some(state) = pipeline.render_state() {
            self.native.ia_set_primitive_topology(state.topology);
        }

        self.push_constants
            .on_set_pipeline(&pipeline.pipeline.push_constants);
        if let Some((id, input_state)) = pipeline.input_state {
            self.input_buffers.on_set_pipeline(id, input_state);
        }
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
        bindings: &[ResolvedBinding],
    ) -> Result<(), ExecuteError> {
        let native_pipeline = self.pipelines.get(pipeline.id)?;
        let compute = pipeline.pipeline.is_compute();
        let Some(parameters) = native_pipeline.groups.get(index as usize) else {
            return Ok(());
        };

        let mut uses_tables = false;
        for binding in bindings {
            let (buffer, offset, storage) = match binding.resource {
                ResolvedResource::UniformBuffer { buffer, offset, .. } => (buffer, offset, false),
                ResolvedResource::StorageBuffer { buffer, offset, .. } => (buffer, offset, true),
                ResolvedResource::Sampler(_) | ResolvedResource::SampledTexture { .. } => {
                    uses_tables = true;
                    continue;
                }
            };
            let Some(parameter) = parameters.buffers[binding.binding as usize] else {
                continue;
            };
            let resource = &self.buffers.get(buffer)?.resource;
            let location = self.native.gpu_virtual_address(resource) + offset;
            if storage {
                self.native
                    .set_root_unordered_access_view(compute, parameter, location);
            } else {
                self.native
                    .set_root_constant_buffer_view(compute, parameter, location);
            }
        }

        if uses_tables {
            let tables = *self.bind_groups.get(group)?;
            if let (Some(parameter), Some(table)) = (parameters.view_table, tables.views) {
                self.native
                    .set_root_descriptor_table(compute, parameter, table);
            }
            if let (Some(parameter), Some(table)) = (parameters.sampler_table, tables.samplers) {
                self.native
                    .set_root_descriptor_table(compute, parameter, table);
            }
        }
        Ok(())
    }

    fn set_vertex_buffers(
        &mut self,
        start_slot: u32,
        buffers: &[VertexBufferBinding],
    ) -> Result<(), ExecuteError> {
        self.input_buffers.on_set_vertex_buffers(start_slot, buffers);
        Ok(())
    }

    fn set_index_buffer(&mut self, buffer: BufferId, offset: u64) -> Result<(), ExecuteError> {
        self.input_buffers.on_set_index_buffer(buffer, offset);
        Ok(())
    }

    fn set_stencil_reference(&mut self, reference: u32) -> Result<(), ExecuteError> {
        self.native.om_set_stencil_ref(reference);
        Ok(())
    }

    fn set_blend_color(&mut self, color: Color) -> Result<(), ExecuteError> {
        self.native.om_set_blend_factor(color.to_array());
        Ok(())
    }

    fn flush(&mut self, pipeline: &BoundPipeline<'_>) -> Result<(), ExecuteError> {
        let native_pipeline = self.pipelines.get(pipeline.id)?;
        let compute = pipeline.pipeline.is_compute();
        let native = &mut self.native;
        self.push_constants.apply(
            &pipeline.pipeline.push_constants,
            |stage, slot, _ty, value| -> Result<(), ExecuteError> {
                if let Some(parameter) = native_pipeline.push_constant_parameters[stage] {
                    native.set_root_32bit_constant(compute, parameter, value, slot);
                }
                Ok(())
            },
        )?;

        if let (Some((_, input_state)), Some(state)) = (pipeline.input_state, pipeline.render_state())
        {
            let buffers = &self.buffers;
            self.input_buffers
                .apply(input_state, |binding| -> Result<(), ExecuteError> {
                    match binding {
                        InputBinding::Index { buffer, offset } => {
                            let buffer = buffers.get(buffer)?;
                            let location = native.gpu_virtual_address(&buffer.resource) + offset;
                            native.ia_set_index_buffer(&IndexBufferView {
                                location,
                                size: buffer.size.saturating_sub(offset),
                                format: state.index_format,
                            });
                        }
                        InputBinding::Vertex {
                            slot,
                            buffer,
                            offset,
                        } => {
                            let buffer = buffers.get(buffer)?;
                            let location = native.gpu_virtual_address(&buffer.resource) + offset;
                            let stride = input_state.input(slot).map_or(0, |input| input.stride);
                            native.ia_set_vertex_buffers(
                                slot,
                                &[VertexBufferView {
                                    location,
                                    size: buffer.size.saturating_sub(offset),
                                    stride,
                                }],
                            );
                        }
                    }
                    Ok(())
                })?;
        }
        Ok(())
    }

    fn draw(&mut self, _pipeline: &BoundPipeline<'_>, args: &DrawArgs) -> Result<(), ExecuteError> {
        self.native.draw_instanced(
            args.vertex_count,
            args.instance_count,
            args.first_vertex,
            args.first_instance,
        );
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        _pipeline: &BoundPipeline<'_>,
        args: &DrawIndexedArgs,
    ) -> Result<(), ExecuteError> {
        self.native.draw_indexed_instanced(
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
        self.native.dispatch(x, y, z);
        Ok(())
    }

    fn full_barrier(&mut self) -> Result<(), ExecuteError> {
        self.native
            .resource_barrier(&[ResourceBarrier::Uav { resource: None }]);
        Ok(())
    }

    fn copy_buffer_to_buffer(&mut self, copy: &BufferCopy) -> Result<(), ExecuteError> {
        let src = &self.buffers.get(copy.src)?.resource;
        let dst = &self.buffers.get(copy.dst)?.resource;
        self.native
            .copy_buffer_region(dst, copy.dst_offset, src, copy.src_offset, copy.size);
        Ok(())
    }

    fn copy_buffer_to_texture(&mut self, copy: &TextureCopy) -> Result<(), ExecuteError> {
        let buffer = &self.buffers.get(copy.buffer)?.resource;
        let texture = self.textures.get(copy.texture)?;
        self.native.copy_buffer_to_texture_region(
            texture,
            copy.level,
            copy.origin,
            buffer,
            &footprint(copy),
        );
        Ok(())
    }

    fn copy_texture_to_buffer(&mut self, copy: &TextureCopy) -> Result<(), ExecuteError> {
        let buffer = &self.buffers.get(copy.buffer)?.resource;
        let texture = self.textures.get(copy.texture)?;
        self.native.copy_texture_to_buffer_region(
            buffer,
            &footprint(copy),
            texture,
            copy.level,
            copy.origin,
            copy.extent,
        );
        Ok(())
    }

    fn transition_buffer(
        &mut self,
        buffer: BufferId,
        transition: Transition<D3d12ResourceStates>,
    ) -> Result<(), ExecuteError> {
        let resource = self.buffers.get(buffer)?.resource.clone();
        self.native.resource_barrier(&[ResourceBarrier::Transition {
            resource,
            before: transition.before,
            after: transition.after,
        }]);
        Ok(())
    }

    fn transition_texture(
        &mut self,
        texture: TextureId,
        transition: Transition<D3d12ResourceStates>,
    ) -> Result<(), ExecuteError> {
        let resource = self.textures.get(texture)?.clone();
        self.native.resource_barrier(&[ResourceBarrier::Transition {
            resource,
            before: transition.before,
            after: transition.after,
        }]);
        Ok(())
    }
}

fn footprint(copy: &TextureCopy) -> PlacedFootprint {
    PlacedFootprint {
        offset: copy.buffer_offset,
        format: copy.format,
        width: copy.extent.width,
        height: copy.extent.height,
        depth: copy.extent.depth,
        row_pitch: copy.row_pitch,
    }
}
