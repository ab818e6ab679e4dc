//! Backend-independent object descriptors.
//!
//! The creation layer registers these in an [`ObjectTable`]; command streams
//! refer to them by id. Each buffer and texture also carries its *current*
//! usage, which the executor updates as transition records are replayed.

use hashbrown::HashMap;

use crate::error::ObjectError;
use crate::format::{Color, CompareFunction, IndexFormat, PrimitiveTopology, TextureFormat};
use crate::format::{VertexFormat, VertexStepMode};
use crate::usage::{BufferUsage, PerStage, ShaderStage, ShaderStages, TextureUsage};

pub const MAX_PUSH_CONSTANTS: usize = 32;
pub const MAX_VERTEX_INPUTS: usize = 16;
pub const MAX_VERTEX_ATTRIBUTES: usize = 16;
pub const MAX_BIND_GROUPS: usize = 4;
pub const MAX_BINDINGS_PER_GROUP: usize = 16;
pub const MAX_COLOR_ATTACHMENTS: usize = 4;

/// Id types share a `u32` namespace per kind.
pub trait ObjectId: Copy + Eq + std::hash::Hash {
    const KIND: &'static str;

    fn raw(self) -> u32;

    fn unknown(self) -> ObjectError {
        ObjectError::Unknown {
            kind: Self::KIND,
            id: self.raw(),
        }
    }

    fn unregistered(self) -> ObjectError {
        ObjectError::Unregistered {
            kind: Self::KIND,
            id: self.raw(),
        }
    }
}

macro_rules! object_ids {
    ($($name:ident => $kind:literal,)*) => {
        $(
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u32);

            impl ObjectId for $name {
                const KIND: &'static str = $kind;

                fn raw(self) -> u32 {
                    self.0
                }
            }
        )*
    };
}

object_ids! {
    BufferId => "buffer",
    TextureId => "texture",
    TextureViewId => "texture view",
    SamplerId => "sampler",
    BindGroupLayoutId => "bind group layout",
    BindGroupId => "bind group",
    PipelineLayoutId => "pipeline layout",
    InputStateId => "input state",
    PipelineId => "pipeline",
    RenderPassId => "render pass",
    FramebufferId => "framebuffer",
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub size: u64,
    /// Every usage the buffer may ever be transitioned to.
    pub usage: BufferUsage,
}

#[derive(Debug, Clone)]
pub struct Buffer {
    desc: BufferDescriptor,
    current_usage: BufferUsage,
}

impl Buffer {
    pub fn new(desc: BufferDescriptor, initial_usage: BufferUsage) -> Self {
        debug_assert!(desc.usage.contains(initial_usage));
        Self {
            desc,
            current_usage: initial_usage,
        }
    }

    pub fn size(&self) -> u64 {
        self.desc.size
    }

    pub fn allowed_usage(&self) -> BufferUsage {
        self.desc.usage
    }

    pub fn current_usage(&self) -> BufferUsage {
        self.current_usage
    }

    pub(crate) fn set_current_usage(&mut self, usage: BufferUsage) {
        self.current_usage = usage;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_levels: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

#[derive(Debug, Clone)]
pub struct Texture {
    desc: TextureDescriptor,
    current_usage: TextureUsage,
}

impl Texture {
    pub fn new(desc: TextureDescriptor, initial_usage: TextureUsage) -> Self {
        debug_assert!(desc.usage.contains(initial_usage));
        Self {
            desc,
            current_usage: initial_usage,
        }
    }

    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.desc
    }

    pub fn format(&self) -> TextureFormat {
        self.desc.format
    }

    pub fn allowed_usage(&self) -> TextureUsage {
        self.desc.usage
    }

    pub fn current_usage(&self) -> TextureUsage {
        self.current_usage
    }

    pub(crate) fn set_current_usage(&mut self, usage: TextureUsage) {
        self.current_usage = usage;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureView {
    pub texture: TextureId,
    pub base_mip_level: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingType {
    UniformBuffer,
    StorageBuffer,
    Sampler,
    SampledTexture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingLayoutEntry {
    pub ty: BindingType,
    pub visibility: ShaderStages,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindGroupLayout {
    entries: [Option<BindingLayoutEntry>; MAX_BINDINGS_PER_GROUP],
}

impl BindGroupLayout {
    pub fn new(entries: &[(u32, BindingType, ShaderStages)]) -> Self {
        let mut layout = Self::default();
        for &(binding, ty, visibility) in entries {
            assert!((binding as usize) < MAX_BINDINGS_PER_GROUP);
            layout.entries[binding as usize] = Some(BindingLayoutEntry { ty, visibility });
        }
        layout
    }

    pub fn entry(&self, binding: u32) -> Option<&BindingLayoutEntry> {
        self.entries.get(binding as usize)?.as_ref()
    }

    /// Active bindings in binding order.
    pub fn entries(&self) -> impl Iterator<Item = (u32, &BindingLayoutEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(binding, entry)| Some((binding as u32, entry.as_ref()?)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingResource {
    Buffer {
        buffer: BufferId,
        offset: u64,
        size: u64,
    },
    Sampler(SamplerId),
    TextureView(TextureViewId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBufferBinding {
    pub buffer: BufferId,
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindGroup {
    layout: BindGroupLayoutId,
    resources: [Option<BindingResource>; MAX_BINDINGS_PER_GROUP],
}

impl BindGroup {
    pub fn new(layout: BindGroupLayoutId, resources: &[(u32, BindingResource)]) -> Self {
        let mut group = Self {
            layout,
            resources: [None; MAX_BINDINGS_PER_GROUP],
        };
        for &(binding, resource) in resources {
            assert!((binding as usize) < MAX_BINDINGS_PER_GROUP);
            group.resources[binding as usize] = Some(resource);
        }
        group
    }

    pub fn layout(&self) -> BindGroupLayoutId {
        self.layout
    }

    pub fn resource(&self, binding: u32) -> Option<BindingResource> {
        *self.resources.get(binding as usize)?
    }
}

/// Number of native binding points of each kind a layout consumes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindingCounts {
    pub uniform_buffers: u32,
    pub storage_buffers: u32,
    pub samplers: u32,
    pub sampled_textures: u32,
}

impl BindingCounts {
    fn next_index(&mut self, ty: BindingType) -> u32 {
        let counter = match ty {
            BindingType::UniformBuffer => &mut self.uniform_buffers,
            BindingType::StorageBuffer => &mut self.storage_buffers,
            BindingType::Sampler => &mut self.samplers,
            BindingType::SampledTexture => &mut self.sampled_textures,
        };
        let index = *counter;
        *counter += 1;
        index
    }
}

/// Ordered bind group layouts plus the native index assigned to every
/// (group, binding) pair.
///
/// Indices are sequential per binding type across all groups, so two groups
/// binding a uniform buffer at binding 0 get distinct native slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineLayout {
    bind_group_layouts: Vec<BindGroupLayoutId>,
    binding_indices: [[u32; MAX_BINDINGS_PER_GROUP]; MAX_BIND_GROUPS],
    counts: BindingCounts,
}

impl PipelineLayout {
    pub fn new(
        bind_group_layouts: Vec<BindGroupLayoutId>,
        objects: &ObjectTable,
    ) -> Result<Self, ObjectError> {
        assert!(bind_group_layouts.len() <= MAX_BIND_GROUPS);

        let mut binding_indices = [[0; MAX_BINDINGS_PER_GROUP]; MAX_BIND_GROUPS];
        let mut counts = BindingCounts::default();
        for (group, &layout_id) in bind_group_layouts.iter().enumerate() {
            let layout = objects.bind_group_layout(layout_id)?;
            for (binding, entry) in layout.entries() {
                binding_indices[group][binding as usize] = counts.next_index(entry.ty);
            }
        }

        Ok(Self {
            bind_group_layouts,
            binding_indices,
            counts,
        })
    }

    pub fn bind_group_layout(&self, group: u32) -> Option<BindGroupLayoutId> {
        self.bind_group_layouts.get(group as usize).copied()
    }

    pub fn bind_group_count(&self) -> u32 {
        self.bind_group_layouts.len() as u32
    }

    /// Native index of `binding` in bind group `group`, or `None` when the
    /// layout has no such group or the binding is past the per-group limit.
    pub fn binding_index(&self, group: u32, binding: u32) -> Option<u32> {
        if group >= self.bind_group_count() {
            return None;
        }
        self.binding_indices
            .get(group as usize)?
            .get(binding as usize)
            .copied()
    }

    pub fn binding_counts(&self) -> BindingCounts {
        self.counts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushConstantType {
    Int,
    UInt,
    Float,
}

/// The push-constant slots one stage of a pipeline consumes, and how each is
/// interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushConstantLayout {
    pub mask: u32,
    pub types: [PushConstantType; MAX_PUSH_CONSTANTS],
}

impl Default for PushConstantLayout {
    fn default() -> Self {
        Self {
            mask: 0,
            types: [PushConstantType::UInt; MAX_PUSH_CONSTANTS],
        }
    }
}

impl PushConstantLayout {
    pub fn new(offset: u32, types: &[PushConstantType]) -> Self {
        let mut layout = Self::default();
        for (i, &ty) in types.iter().enumerate() {
            let slot = offset as usize + i;
            assert!(slot < MAX_PUSH_CONSTANTS);
            layout.mask |= 1 << slot;
            layout.types[slot] = ty;
        }
        layout
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexInput {
    pub stride: u32,
    pub step_mode: VertexStepMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub input_slot: u32,
    pub offset: u64,
    pub format: VertexFormat,
}

/// Vertex input layout: which buffer slots a pipeline reads and where each
/// shader location finds its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputState {
    inputs: [Option<VertexInput>; MAX_VERTEX_INPUTS],
    attributes: [Option<VertexAttribute>; MAX_VERTEX_ATTRIBUTES],
}

impl Default for InputState {
    fn default() -> Self {
        Self {
            inputs: [None; MAX_VERTEX_INPUTS],
            attributes: [None; MAX_VERTEX_ATTRIBUTES],
        }
    }
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, slot: u32, stride: u32, step_mode: VertexStepMode) -> Self {
        assert!((slot as usize) < MAX_VERTEX_INPUTS);
        self.inputs[slot as usize] = Some(VertexInput { stride, step_mode });
        self
    }

    pub fn with_attribute(
        mut self,
        location: u32,
        input_slot: u32,
        offset: u64,
        format: VertexFormat,
    ) -> Self {
        assert!((location as usize) < MAX_VERTEX_ATTRIBUTES);
        self.attributes[location as usize] = Some(VertexAttribute {
            input_slot,
            offset,
            format,
        });
        self
    }

    /// Bitmask of the vertex buffer slots this layout reads.
    pub fn inputs_set_mask(&self) -> u32 {
        self.inputs
            .iter()
            .enumerate()
            .filter(|(_, input)| input.is_some())
            .fold(0, |mask, (slot, _)| mask | (1 << slot))
    }

    pub fn input(&self, slot: u32) -> Option<&VertexInput> {
        self.inputs.get(slot as usize)?.as_ref()
    }

    pub fn attributes(&self) -> impl Iterator<Item = (u32, &VertexAttribute)> {
        self.attributes
            .iter()
            .enumerate()
            .filter_map(|(location, attr)| Some((location as u32, attr.as_ref()?)))
    }

    pub fn attributes_using_input(
        &self,
        slot: u32,
    ) -> impl Iterator<Item = (u32, &VertexAttribute)> {
        self.attributes()
            .filter(move |(_, attr)| attr.input_slot == slot)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilState {
    pub front_compare: CompareFunction,
    pub back_compare: CompareFunction,
    pub read_mask: u32,
}

impl Default for StencilState {
    fn default() -> Self {
        Self {
            front_compare: CompareFunction::Always,
            back_compare: CompareFunction::Always,
            read_mask: 0xff,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPipelineState {
    pub input_state: InputStateId,
    pub index_format: IndexFormat,
    pub topology: PrimitiveTopology,
    pub stencil: StencilState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineKind {
    Render(RenderPipelineState),
    Compute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub layout: PipelineLayoutId,
    pub push_constants: PerStage<PushConstantLayout>,
    pub kind: PipelineKind,
}

impl Pipeline {
    pub fn render(layout: PipelineLayoutId, state: RenderPipelineState) -> Self {
        Self {
            layout,
            push_constants: PerStage::default(),
            kind: PipelineKind::Render(state),
        }
    }

    pub fn compute(layout: PipelineLayoutId) -> Self {
        Self {
            layout,
            push_constants: PerStage::default(),
            kind: PipelineKind::Compute,
        }
    }

    pub fn with_push_constants(mut self, stage: ShaderStage, layout: PushConstantLayout) -> Self {
        self.push_constants[stage] = layout;
        self
    }

    pub fn render_state(&self) -> Option<&RenderPipelineState> {
        match &self.kind {
            PipelineKind::Render(state) => Some(state),
            PipelineKind::Compute => None,
        }
    }

    pub fn is_compute(&self) -> bool {
        matches!(self.kind, PipelineKind::Compute)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOp {
    Load,
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentDescriptor {
    pub format: TextureFormat,
    pub color_load_op: LoadOp,
    pub depth_load_op: LoadOp,
    pub stencil_load_op: LoadOp,
}

impl AttachmentDescriptor {
    pub fn color(format: TextureFormat, load_op: LoadOp) -> Self {
        Self {
            format,
            color_load_op: load_op,
            depth_load_op: LoadOp::Load,
            stencil_load_op: LoadOp::Load,
        }
    }

    pub fn depth_stencil(format: TextureFormat, depth_load_op: LoadOp, stencil_load_op: LoadOp) -> Self {
        Self {
            format,
            color_load_op: LoadOp::Load,
            depth_load_op,
            stencil_load_op,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentInfo {
    pub desc: AttachmentDescriptor,
    /// First subpass that references the attachment; its clear happens there.
    pub first_subpass: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubpassDescriptor {
    /// Attachment index per color location.
    pub color_attachments: [Option<u32>; MAX_COLOR_ATTACHMENTS],
    pub depth_stencil_attachment: Option<u32>,
}

impl SubpassDescriptor {
    pub fn new(colors: &[(u32, u32)], depth_stencil_attachment: Option<u32>) -> Self {
        let mut subpass = Self {
            depth_stencil_attachment,
            ..Self::default()
        };
        for &(location, attachment) in colors {
            assert!((location as usize) < MAX_COLOR_ATTACHMENTS);
            subpass.color_attachments[location as usize] = Some(attachment);
        }
        subpass
    }

    /// `(location, attachment)` pairs in location order.
    pub fn colors(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.color_attachments
            .iter()
            .enumerate()
            .filter_map(|(location, attachment)| Some((location as u32, (*attachment)?)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderPass {
    attachments: Vec<AttachmentInfo>,
    subpasses: Vec<SubpassDescriptor>,
}

impl RenderPass {
    pub fn new(attachments: &[AttachmentDescriptor], subpasses: Vec<SubpassDescriptor>) -> Self {
        let mut infos: Vec<AttachmentInfo> = attachments
            .iter()
            .map(|&desc| AttachmentInfo {
                desc,
                first_subpass: u32::MAX,
            })
            .collect();

        for (index, subpass) in subpasses.iter().enumerate() {
            let referenced = subpass
                .colors()
                .map(|(_, attachment)| attachment)
                .chain(subpass.depth_stencil_attachment);
            for attachment in referenced {
                let info = &mut infos[attachment as usize];
                info.first_subpass = info.first_subpass.min(index as u32);
            }
        }

        Self {
            attachments: infos,
            subpasses,
        }
    }

    pub fn attachment(&self, index: u32) -> Option<&AttachmentInfo> {
        self.attachments.get(index as usize)
    }

    pub fn attachment_count(&self) -> u32 {
        self.attachments.len() as u32
    }

    pub fn subpass(&self, index: u32) -> Option<&SubpassDescriptor> {
        self.subpasses.get(index as usize)
    }

    pub fn subpass_count(&self) -> u32 {
        self.subpasses.len() as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearValue {
    pub color: Color,
    pub depth: f32,
    pub stencil: u32,
}

impl Default for ClearValue {
    fn default() -> Self {
        Self {
            color: Color::TRANSPARENT,
            depth: 1.0,
            stencil: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Framebuffer {
    pub render_pass: RenderPassId,
    pub width: u32,
    pub height: u32,
    pub attachments: Vec<TextureViewId>,
    pub clear_values: Vec<ClearValue>,
}

impl Framebuffer {
    pub fn new(
        render_pass: RenderPassId,
        width: u32,
        height: u32,
        attachments: Vec<TextureViewId>,
    ) -> Self {
        let clear_values = vec![ClearValue::default(); attachments.len()];
        Self {
            render_pass,
            width,
            height,
            attachments,
            clear_values,
        }
    }

    pub fn with_clear_color(mut self, attachment: u32, color: Color) -> Self {
        self.clear_values[attachment as usize].color = color;
        self
    }

    pub fn with_clear_depth_stencil(mut self, attachment: u32, depth: f32, stencil: u32) -> Self {
        let value = &mut self.clear_values[attachment as usize];
        value.depth = depth;
        value.stencil = stencil;
        self
    }

    pub fn clear_value(&self, attachment: u32) -> ClearValue {
        self.clear_values
            .get(attachment as usize)
            .copied()
            .unwrap_or_default()
    }
}

fn get<'a, K: ObjectId, V>(map: &'a HashMap<K, V>, id: K) -> Result<&'a V, ObjectError> {
    map.get(&id).ok_or_else(|| id.unknown())
}

fn get_mut<'a, K: ObjectId, V>(map: &'a mut HashMap<K, V>, id: K) -> Result<&'a mut V, ObjectError> {
    map.get_mut(&id).ok_or_else(|| id.unknown())
}

/// Every abstract object a command stream may reference.
#[derive(Debug, Default)]
pub struct ObjectTable {
    buffers: HashMap<BufferId, Buffer>,
    textures: HashMap<TextureId, Texture>,
    texture_views: HashMap<TextureViewId, TextureView>,
    bind_group_layouts: HashMap<BindGroupLayoutId, BindGroupLayout>,
    bind_groups: HashMap<BindGroupId, BindGroup>,
    pipeline_layouts: HashMap<PipelineLayoutId, PipelineLayout>,
    input_states: HashMap<InputStateId, InputState>,
    pipelines: HashMap<PipelineId, Pipeline>,
    render_passes: HashMap<RenderPassId, RenderPass>,
    framebuffers: HashMap<FramebufferId, Framebuffer>,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_buffer(&mut self, id: BufferId, buffer: Buffer) {
        self.buffers.insert(id, buffer);
    }

    pub fn remove_buffer(&mut self, id: BufferId) -> Option<Buffer> {
        self.buffers.remove(&id)
    }

    pub fn buffer(&self, id: BufferId) -> Result<&Buffer, ObjectError> {
        get(&self.buffers, id)
    }

    pub fn buffer_mut(&mut self, id: BufferId) -> Result<&mut Buffer, ObjectError> {
        get_mut(&mut self.buffers, id)
    }

    pub fn insert_texture(&mut self, id: TextureId, texture: Texture) {
        self.textures.insert(id, texture);
    }

    pub fn remove_texture(&mut self, id: TextureId) -> Option<Texture> {
        self.textures.remove(&id)
    }

    pub fn texture(&self, id: TextureId) -> Result<&Texture, ObjectError> {
        get(&self.textures, id)
    }

    pub fn texture_mut(&mut self, id: TextureId) -> Result<&mut Texture, ObjectError> {
        get_mut(&mut self.textures, id)
    }

    pub fn insert_texture_view(&mut self, id: TextureViewId, view: TextureView) {
        self.texture_views.insert(id, view);
    }

    pub fn texture_view(&self, id: TextureViewId) -> Result<&TextureView, ObjectError> {
        get(&self.texture_views, id)
    }

    pub fn insert_bind_group_layout(&mut self, id: BindGroupLayoutId, layout: BindGroupLayout) {
        self.bind_group_layouts.insert(id, layout);
    }

    pub fn bind_group_layout(&self, id: BindGroupLayoutId) -> Result<&BindGroupLayout, ObjectError> {
        get(&self.bind_group_layouts, id)
    }

    pub fn insert_bind_group(&mut self, id: BindGroupId, group: BindGroup) {
        self.bind_groups.insert(id, group);
    }

    pub fn bind_group(&self, id: BindGroupId) -> Result<&BindGroup, ObjectError> {
        get(&self.bind_groups, id)
    }

    pub fn insert_pipeline_layout(&mut self, id: PipelineLayoutId, layout: PipelineLayout) {
        self.pipeline_layouts.insert(id, layout);
    }

    pub fn pipeline_layout(&self, id: PipelineLayoutId) -> Result<&PipelineLayout, ObjectError> {
        get(&self.pipeline_layouts, id)
    }

    pub fn insert_input_state(&mut self, id: InputStateId, state: InputState) {
        self.input_states.insert(id, state);
    }

    pub fn input_state(&self, id: InputStateId) -> Result<&InputState, ObjectError> {
        get(&self.input_states, id)
    }

    pub fn insert_pipeline(&mut self, id: PipelineId, pipeline: Pipeline) {
        self.pipelines.insert(id, pipeline);
    }

    pub fn pipeline(&self, id: PipelineId) -> Result<&Pipeline, ObjectError> {
        get(&self.pipelines, id)
    }

    pub fn insert_render_pass(&mut self, id: RenderPassId, pass: RenderPass) {
        self.render_passes.insert(id, pass);
    }

    pub fn render_pass(&self, id: RenderPassId) -> Result<&RenderPass, ObjectError> {
        get(&self.render_passes, id)
    }

    pub fn insert_framebuffer(&mut self, id: FramebufferId, framebuffer: Framebuffer) {
        self.framebuffers.insert(id, framebuffer);
    }

    pub fn framebuffer(&self, id: FramebufferId) -> Result<&Framebuffer, ObjectError> {
        get(&self.framebuffers, id)
    }
}
