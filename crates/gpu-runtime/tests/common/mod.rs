//! Shared scene and streams for backend integration tests.
//!
//! Every backend test builds the same abstract objects: a 4x4 color target
//! rendered by a one-subpass pass, a vertex buffer, a storage buffer bound to
//! a compute pipeline and a readback buffer.

#![allow(dead_code)]

use gpu_runtime::cmd::{BufferCopy, BufferTextureCopy, CmdWord, CmdWriter, DrawArgs, Extent3d, Origin3d};
use gpu_runtime::objects::{
    AttachmentDescriptor, BindGroup, BindGroupId, BindGroupLayout, BindGroupLayoutId,
    BindingResource, BindingType, Buffer, BufferDescriptor, BufferId, Framebuffer, FramebufferId,
    InputState, InputStateId, LoadOp, ObjectTable, Pipeline, PipelineId, PipelineLayout,
    PipelineLayoutId, PushConstantLayout, PushConstantType, RenderPass, RenderPassId,
    RenderPipelineState, StencilState, SubpassDescriptor, Texture, TextureDescriptor, TextureId,
    TextureView, TextureViewId, VertexBufferBinding,
};
use gpu_runtime::{
    BufferUsage, Color, IndexFormat, PrimitiveTopology, ShaderStage, ShaderStages, TextureFormat,
    TextureUsage, VertexFormat, VertexStepMode,
};

pub const RED: Color = Color {
    r: 1.0,
    g: 0.0,
    b: 0.0,
    a: 1.0,
};

pub const VERTICES: BufferId = BufferId(1);
pub const STORAGE: BufferId = BufferId(2);
pub const READBACK: BufferId = BufferId(3);
pub const COLOR: TextureId = TextureId(1);
pub const COLOR_VIEW: TextureViewId = TextureViewId(1);
pub const PASS: RenderPassId = RenderPassId(1);
pub const FRAMEBUFFER: FramebufferId = FramebufferId(1);
pub const STORAGE_GROUP: BindGroupId = BindGroupId(1);
pub const DRAW_PIPELINE: PipelineId = PipelineId(1);
pub const COMPUTE_PIPELINE: PipelineId = PipelineId(2);

pub const TARGET_SIZE: u32 = 4;

/// Installs a test-writer `tracing` subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Buffers of the scene with their initial usage.
pub fn buffers() -> Vec<(BufferId, BufferDescriptor, BufferUsage)> {
    vec![
        (
            VERTICES,
            BufferDescriptor {
                size: 36,
                usage: BufferUsage::VERTEX | BufferUsage::TRANSFER_DST,
            },
            BufferUsage::TRANSFER_DST,
        ),
        (
            STORAGE,
            BufferDescriptor {
                size: 300,
                usage: BufferUsage::STORAGE | BufferUsage::TRANSFER_SRC,
            },
            BufferUsage::STORAGE,
        ),
        (
            READBACK,
            BufferDescriptor {
                size: 64,
                usage: BufferUsage::MAP_READ | BufferUsage::TRANSFER_DST,
            },
            BufferUsage::TRANSFER_DST,
        ),
    ]
}

pub fn color_texture() -> TextureDescriptor {
    TextureDescriptor {
        width: TARGET_SIZE,
        height: TARGET_SIZE,
        depth: 1,
        mip_levels: 1,
        format: TextureFormat::R8G8B8A8Unorm,
        usage: TextureUsage::OUTPUT_ATTACHMENT | TextureUsage::TRANSFER_SRC,
    }
}

pub fn scene() -> ObjectTable {
    let mut objects = ObjectTable::new();
    for (id, desc, initial_usage) in buffers() {
        objects.insert_buffer(id, Buffer::new(desc, initial_usage));
    }
    objects.insert_texture(
        COLOR,
        Texture::new(color_texture(), TextureUsage::OUTPUT_ATTACHMENT),
    );
    objects.insert_texture_view(
        COLOR_VIEW,
        TextureView {
            texture: COLOR,
            base_mip_level: 0,
        },
    );

    objects.insert_render_pass(
        PASS,
        RenderPass::new(
            &[AttachmentDescriptor::color(
                TextureFormat::R8G8B8A8Unorm,
                LoadOp::Clear,
            )],
            vec![SubpassDescriptor::new(&[(0, 0)], None)],
        ),
    );
    objects.insert_framebuffer(
        FRAMEBUFFER,
        Framebuffer::new(PASS, TARGET_SIZE, TARGET_SIZE, vec![COLOR_VIEW]).with_clear_color(0, RED),
    );

    objects.insert_bind_group_layout(
        BindGroupLayoutId(1),
        BindGroupLayout::new(&[(0, BindingType::StorageBuffer, ShaderStages::COMPUTE)]),
    );
    objects.insert_bind_group(
        STORAGE_GROUP,
        BindGroup::new(
            BindGroupLayoutId(1),
            &[(
                0,
                BindingResource::Buffer {
                    buffer: STORAGE,
                    offset: 0,
                    size: 256,
                },
            )],
        ),
    );
    let compute_layout = PipelineLayout::new(vec![BindGroupLayoutId(1)], &objects)
        .expect("bind group layout is registered");
    objects.insert_pipeline_layout(PipelineLayoutId(1), compute_layout);
    let draw_layout =
        PipelineLayout::new(Vec::new(), &objects).expect("empty layout needs no lookups");
    objects.insert_pipeline_layout(PipelineLayoutId(2), draw_layout);

    objects.insert_input_state(
        InputStateId(1),
        InputState::new()
            .with_input(0, 12, VertexStepMode::Vertex)
            .with_attribute(0, 0, 0, VertexFormat::FloatR32G32B32),
    );
    objects.insert_pipeline(
        DRAW_PIPELINE,
        Pipeline::render(
            PipelineLayoutId(2),
            RenderPipelineState {
                input_state: InputStateId(1),
                index_format: IndexFormat::Uint16,
                topology: PrimitiveTopology::TriangleList,
                stencil: StencilState::default(),
            },
        ),
    );
    objects.insert_pipeline(
        COMPUTE_PIPELINE,
        Pipeline::compute(PipelineLayoutId(1)).with_push_constants(
            ShaderStage::Compute,
            PushConstantLayout::new(0, &[PushConstantType::UInt; 2]),
        ),
    );
    objects
}

pub fn triangle_args() -> DrawArgs {
    DrawArgs {
        vertex_count: 3,
        instance_count: 1,
        first_vertex: 0,
        first_instance: 0,
    }
}

/// Clears the target red and draws one triangle from `VERTICES` at slot 0.
pub fn record_triangle(w: &mut CmdWriter) {
    w.begin_render_pass(PASS, FRAMEBUFFER);
    w.begin_render_subpass();
    w.set_render_pipeline(DRAW_PIPELINE);
    w.set_vertex_buffers(
        0,
        &[VertexBufferBinding {
            buffer: VERTICES,
            offset: 0,
        }],
    );
    w.draw(triangle_args());
    w.end_render_subpass();
    w.end_render_pass();
}

pub fn triangle_stream() -> Vec<CmdWord> {
    let mut w = CmdWriter::new();
    record_triangle(&mut w);
    w.finish()
}

/// One dispatch with push constants `[5, 6]` and the storage group at index 0.
pub fn compute_stream() -> Vec<CmdWord> {
    let mut w = CmdWriter::new();
    w.begin_compute_pass();
    w.set_compute_pipeline(COMPUTE_PIPELINE);
    w.set_push_constants(ShaderStages::COMPUTE, 0, &[5, 6]);
    w.set_bind_group(0, STORAGE_GROUP);
    w.dispatch(1, 1, 1);
    w.end_compute_pass();
    w.finish()
}

/// Copies the first 64 bytes of the storage buffer into the readback buffer.
pub fn readback_stream() -> Vec<CmdWord> {
    let mut w = CmdWriter::new();
    w.transition_buffer_usage(STORAGE, BufferUsage::TRANSFER_SRC);
    w.copy_buffer_to_buffer(BufferCopy {
        src: STORAGE,
        src_offset: 0,
        dst: READBACK,
        dst_offset: 0,
        size: 64,
    });
    w.finish()
}

/// Reads the whole color target back with a 16-byte row pitch.
pub fn target_copy() -> BufferTextureCopy {
    BufferTextureCopy {
        buffer: STORAGE,
        buffer_offset: 0,
        row_pitch: 16,
        texture: COLOR,
        level: 0,
        origin: Origin3d::default(),
        extent: Extent3d {
            width: TARGET_SIZE,
            height: TARGET_SIZE,
            depth: 1,
        },
    }
}
