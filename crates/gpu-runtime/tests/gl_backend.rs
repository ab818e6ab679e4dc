mod common;

use common::*;
use gpu_runtime::backend::gl::{
    consts, GLbitfield, GLenum, GLint, GLuint, GlContext, GlDevice, GlPipeline, GlTexture,
};
use gpu_runtime::cmd::CmdWriter;
use gpu_runtime::objects::{
    InputState, InputStateId, ObjectTable, Pipeline, PipelineId, PipelineLayoutId,
    RenderPipelineState, StencilState, VertexBufferBinding,
};
use gpu_runtime::{
    ExecuteError, IndexFormat, ObjectError, PrimitiveTopology, RuntimeConfig, ShaderStage,
    VertexFormat, VertexStepMode,
};
use pretty_assertions::assert_eq;

#[derive(Debug, Clone, PartialEq)]
enum GlCall {
    BindBuffer(GLenum, GLuint),
    BindBufferRange {
        target: GLenum,
        index: GLuint,
        buffer: GLuint,
        offset: u64,
        size: u64,
    },
    ClearColor(GLint, Vec<f32>),
    StencilFunc(GLenum, GLenum, GLint),
    Uniform1ui(GLint, GLuint),
    VertexAttribPointer {
        location: GLuint,
        stride: GLint,
        offset: u64,
    },
    PixelStore(GLenum, GLint),
    BindVertexArray(GLuint),
    DrawArrays {
        mode: GLenum,
        first: GLint,
        count: GLint,
        instances: GLint,
    },
    Dispatch(GLuint, GLuint, GLuint),
    MemoryBarrier(GLbitfield),
    Other(&'static str),
}

#[derive(Default)]
struct RecordingGl {
    calls: Vec<GlCall>,
    next_name: GLuint,
    deleted_buffers: Vec<GLuint>,
    live_framebuffers: Vec<GLuint>,
}

impl RecordingGl {
    fn name(&mut self) -> GLuint {
        self.next_name += 1;
        self.next_name
    }

    fn count(&self, pred: impl Fn(&GlCall) -> bool) -> usize {
        self.calls.iter().filter(|&call| pred(call)).count()
    }
}

impl GlContext for RecordingGl {
    fn gen_buffer(&mut self) -> GLuint {
        self.name()
    }

    fn delete_buffer(&mut self, buffer: GLuint) {
        self.deleted_buffers.push(buffer);
    }

    fn bind_buffer(&mut self, target: GLenum, buffer: GLuint) {
        self.calls.push(GlCall::BindBuffer(target, buffer));
    }

    fn buffer_data(&mut self, _target: GLenum, _size: u64, _usage: GLenum) {
        self.calls.push(GlCall::Other("buffer_data"));
    }

    fn bind_buffer_range(
        &mut self,
        target: GLenum,
        index: GLuint,
        buffer: GLuint,
        offset: u64,
        size: u64,
    ) {
        self.calls.push(GlCall::BindBufferRange {
            target,
            index,
            buffer,
            offset,
            size,
        });
    }

    fn copy_buffer_sub_data(
        &mut self,
        _read_target: GLenum,
        _write_target: GLenum,
        _read_offset: u64,
        _write_offset: u64,
        _size: u64,
    ) {
        self.calls.push(GlCall::Other("copy_buffer_sub_data"));
    }

    fn gen_framebuffer(&mut self) -> GLuint {
        let framebuffer = self.name();
        self.live_framebuffers.push(framebuffer);
        framebuffer
    }

    fn delete_framebuffer(&mut self, framebuffer: GLuint) {
        self.live_framebuffers.retain(|&live| live != framebuffer);
        self.calls.push(GlCall::Other("delete_framebuffer"));
    }

    fn bind_framebuffer(&mut self, _target: GLenum, _framebuffer: GLuint) {
        self.calls.push(GlCall::Other("bind_framebuffer"));
    }

    fn framebuffer_texture_2d(
        &mut self,
        _target: GLenum,
        _attachment: GLenum,
        _tex_target: GLenum,
        _texture: GLuint,
        _level: GLint,
    ) {
        self.calls.push(GlCall::Other("framebuffer_texture_2d"));
    }

    fn draw_buffers(&mut self, _buffers: &[GLenum]) {
        self.calls.push(GlCall::Other("draw_buffers"));
    }

    fn clear_buffer_fv(&mut self, buffer: GLenum, draw_buffer: GLint, value: &[f32]) {
        assert_eq!(buffer, consts::COLOR, "only color targets in these tests");
        self.calls
            .push(GlCall::ClearColor(draw_buffer, value.to_vec()));
    }

    fn clear_buffer_iv(&mut self, _buffer: GLenum, _draw_buffer: GLint, _value: &[GLint]) {
        self.calls.push(GlCall::Other("clear_buffer_iv"));
    }

    fn clear_buffer_fi(&mut self, _buffer: GLenum, _draw_buffer: GLint, _depth: f32, _stencil: GLint) {
        self.calls.push(GlCall::Other("clear_buffer_fi"));
    }

    fn blend_color(&mut self, _r: f32, _g: f32, _b: f32, _a: f32) {
        self.calls.push(GlCall::Other("blend_color"));
    }

    fn viewport(&mut self, _x: GLint, _y: GLint, _width: GLint, _height: GLint) {
        self.calls.push(GlCall::Other("viewport"));
    }

    fn stencil_func_separate(&mut self, face: GLenum, func: GLenum, reference: GLint, _mask: GLuint) {
        self.calls.push(GlCall::StencilFunc(face, func, reference));
    }

    fn use_program(&mut self, _program: GLuint) {
        self.calls.push(GlCall::Other("use_program"));
    }

    fn uniform_1i(&mut self, _location: GLint, _value: GLint) {
        self.calls.push(GlCall::Other("uniform_1i"));
    }

    fn uniform_1ui(&mut self, location: GLint, value: GLuint) {
        self.calls.push(GlCall::Uniform1ui(location, value));
    }

    fn uniform_1f(&mut self, _location: GLint, _value: f32) {
        self.calls.push(GlCall::Other("uniform_1f"));
    }

    fn bind_vertex_array(&mut self, vertex_array: GLuint) {
        self.calls.push(GlCall::BindVertexArray(vertex_array));
    }

    fn vertex_attrib_pointer(
        &mut self,
        location: GLuint,
        _components: GLint,
        _ty: GLenum,
        _normalized: bool,
        stride: GLint,
        offset: u64,
    ) {
        self.calls.push(GlCall::VertexAttribPointer {
            location,
            stride,
            offset,
        });
    }

    fn active_texture(&mut self, _unit: GLenum) {
        self.calls.push(GlCall::Other("active_texture"));
    }

    fn bind_texture(&mut self, _target: GLenum, _texture: GLuint) {
        self.calls.push(GlCall::Other("bind_texture"));
    }

    fn bind_sampler(&mut self, _unit: GLuint, _sampler: GLuint) {
        self.calls.push(GlCall::Other("bind_sampler"));
    }

    fn pixel_store_i(&mut self, pname: GLenum, param: GLint) {
        self.calls.push(GlCall::PixelStore(pname, param));
    }

    fn tex_sub_image_2d(
        &mut self,
        _target: GLenum,
        _level: GLint,
        _x: GLint,
        _y: GLint,
        _width: GLint,
        _height: GLint,
        _format: GLenum,
        _ty: GLenum,
        _offset: u64,
    ) {
        self.calls.push(GlCall::Other("tex_sub_image_2d"));
    }

    fn read_pixels(
        &mut self,
        _x: GLint,
        _y: GLint,
        _width: GLint,
        _height: GLint,
        _format: GLenum,
        _ty: GLenum,
        _offset: u64,
    ) {
        self.calls.push(GlCall::Other("read_pixels"));
    }

    fn draw_arrays_instanced(&mut self, mode: GLenum, first: GLint, count: GLint, instances: GLint) {
        self.calls.push(GlCall::DrawArrays {
            mode,
            first,
            count,
            instances,
        });
    }

    fn draw_arrays_instanced_base_instance(
        &mut self,
        _mode: GLenum,
        _first: GLint,
        _count: GLint,
        _instances: GLint,
        _base_instance: GLuint,
    ) {
        self.calls.push(GlCall::Other("draw_arrays_instanced_base_instance"));
    }

    fn draw_elements_instanced(
        &mut self,
        _mode: GLenum,
        _count: GLint,
        _ty: GLenum,
        _offset: u64,
        _instances: GLint,
    ) {
        self.calls.push(GlCall::Other("draw_elements_instanced"));
    }

    fn draw_elements_instanced_base_vertex(
        &mut self,
        _mode: GLenum,
        _count: GLint,
        _ty: GLenum,
        _offset: u64,
        _instances: GLint,
        _base_vertex: GLint,
    ) {
        self.calls
            .push(GlCall::Other("draw_elements_instanced_base_vertex"));
    }

    fn draw_elements_instanced_base_vertex_base_instance(
        &mut self,
        _mode: GLenum,
        _count: GLint,
        _ty: GLenum,
        _offset: u64,
        _instances: GLint,
        _base_vertex: GLint,
        _base_instance: GLuint,
    ) {
        self.calls
            .push(GlCall::Other("draw_elements_instanced_base_vertex_base_instance"));
    }

    fn dispatch_compute(&mut self, x: GLuint, y: GLuint, z: GLuint) {
        self.calls.push(GlCall::Dispatch(x, y, z));
    }

    fn memory_barrier(&mut self, barriers: GLbitfield) {
        self.calls.push(GlCall::MemoryBarrier(barriers));
    }
}

const PROGRAM: GLuint = 100;
const VERTEX_ARRAY: GLuint = 200;
const TEXTURE_HANDLE: GLuint = 300;

fn device() -> (GlDevice<RecordingGl>, ObjectTable) {
    init_tracing();
    let mut device = GlDevice::new(RecordingGl::default());
    for (id, desc, _) in buffers() {
        device.create_buffer(id, &desc);
    }
    device.register_texture(
        COLOR,
        GlTexture {
            handle: TEXTURE_HANDLE,
            target: consts::TEXTURE_2D,
        },
    );
    device.register_input_state(InputStateId(1), VERTEX_ARRAY);
    device.register_pipeline(DRAW_PIPELINE, GlPipeline::new(PROGRAM));

    let mut compute = GlPipeline::new(PROGRAM + 1);
    compute.push_constant_locations[ShaderStage::Compute][0] = 7;
    compute.push_constant_locations[ShaderStage::Compute][1] = 8;
    device.register_pipeline(COMPUTE_PIPELINE, compute);

    device.context_mut().calls.clear();
    (device, scene())
}

#[test]
fn triangle_clears_once_binds_slot_zero_and_draws() -> anyhow::Result<()> {
    let (mut device, mut objects) = device();
    let vertices = device.buffer_handle(VERTICES)?;

    let report = device.execute(&triangle_stream(), &mut objects, &RuntimeConfig::default())?;
    assert_eq!(report.draw_calls, 1);

    let gl = device.context();
    assert_eq!(
        gl.count(|call| matches!(call, GlCall::ClearColor(..))),
        1
    );
    assert!(gl.calls.contains(&GlCall::ClearColor(0, RED.to_array().to_vec())));

    let attrib = gl
        .calls
        .iter()
        .position(|call| matches!(call, GlCall::VertexAttribPointer { .. }))
        .expect("vertex attribute pointer");
    assert_eq!(
        gl.calls[attrib],
        GlCall::VertexAttribPointer {
            location: 0,
            stride: 12,
            offset: 0,
        }
    );
    assert_eq!(
        gl.calls[attrib - 1],
        GlCall::BindBuffer(consts::ARRAY_BUFFER, vertices)
    );
    assert_eq!(
        gl.count(|call| matches!(call, GlCall::VertexAttribPointer { .. })),
        1
    );

    let draws: Vec<&GlCall> = gl
        .calls
        .iter()
        .filter(|call| matches!(call, GlCall::DrawArrays { .. }))
        .collect();
    assert_eq!(
        draws,
        vec![&GlCall::DrawArrays {
            mode: consts::TRIANGLES,
            first: 0,
            count: 3,
            instances: 1,
        }]
    );
    Ok(())
}

const SHARED_LAYOUT_PIPELINE: PipelineId = PipelineId(3);
const STRIDED_PIPELINE: PipelineId = PipelineId(4);
const STRIDED_INPUT_STATE: InputStateId = InputStateId(2);
const STRIDED_VERTEX_ARRAY: GLuint = 201;

fn insert_render_pipeline(objects: &mut ObjectTable, id: PipelineId, input_state: InputStateId) {
    objects.insert_pipeline(
        id,
        Pipeline::render(
            PipelineLayoutId(2),
            RenderPipelineState {
                input_state,
                index_format: IndexFormat::Uint16,
                topology: PrimitiveTopology::TriangleList,
                stencil: StencilState::default(),
            },
        ),
    );
}

fn strided_input_state() -> InputState {
    InputState::new()
        .with_input(0, 24, VertexStepMode::Vertex)
        .with_attribute(0, 0, 0, VertexFormat::FloatR32G32B32)
}

#[test]
fn vertex_arrays_follow_the_input_state() -> anyhow::Result<()> {
    let (mut device, mut objects) = device();
    objects.insert_input_state(STRIDED_INPUT_STATE, strided_input_state());
    insert_render_pipeline(&mut objects, SHARED_LAYOUT_PIPELINE, InputStateId(1));
    insert_render_pipeline(&mut objects, STRIDED_PIPELINE, STRIDED_INPUT_STATE);
    device.register_pipeline(SHARED_LAYOUT_PIPELINE, GlPipeline::new(PROGRAM + 3));
    device.register_pipeline(STRIDED_PIPELINE, GlPipeline::new(PROGRAM + 4));
    device.register_input_state(STRIDED_INPUT_STATE, STRIDED_VERTEX_ARRAY);

    let mut w = CmdWriter::new();
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
    w.set_render_pipeline(SHARED_LAYOUT_PIPELINE);
    w.draw(triangle_args());
    w.set_render_pipeline(STRIDED_PIPELINE);
    w.draw(triangle_args());
    w.end_render_subpass();
    w.end_render_pass();
    device.execute(&w.finish(), &mut objects, &RuntimeConfig::default())?;

    let gl = device.context();
    let vertex_arrays: Vec<_> = gl
        .calls
        .iter()
        .filter(|call| matches!(call, GlCall::BindVertexArray(_)))
        .collect();
    // Pipelines sharing an input state share its vertex array.
    assert_eq!(
        vertex_arrays,
        vec![
            &GlCall::BindVertexArray(VERTEX_ARRAY),
            &GlCall::BindVertexArray(STRIDED_VERTEX_ARRAY),
        ]
    );
    let strides: Vec<_> = gl
        .calls
        .iter()
        .filter_map(|call| match call {
            GlCall::VertexAttribPointer { stride, .. } => Some(*stride),
            _ => None,
        })
        .collect();
    assert_eq!(strides, vec![12, 24]);
    assert_eq!(gl.count(|call| matches!(call, GlCall::DrawArrays { .. })), 3);
    Ok(())
}

#[test]
fn render_pipeline_needs_a_registered_vertex_array() {
    let (mut device, mut objects) = device();
    objects.insert_input_state(STRIDED_INPUT_STATE, strided_input_state());
    insert_render_pipeline(&mut objects, STRIDED_PIPELINE, STRIDED_INPUT_STATE);
    device.register_pipeline(STRIDED_PIPELINE, GlPipeline::new(PROGRAM + 4));

    let mut w = CmdWriter::new();
    w.begin_render_pass(PASS, FRAMEBUFFER);
    w.begin_render_subpass();
    w.set_render_pipeline(STRIDED_PIPELINE);
    let err = device
        .execute(&w.finish(), &mut objects, &RuntimeConfig::default())
        .unwrap_err();
    assert!(matches!(
        err,
        ExecuteError::Object(ObjectError::Unregistered {
            kind: "input state",
            id: 2,
        })
    ));
}

#[test]
fn subpass_with_unregistered_attachment_creates_no_framebuffer() {
    let (_, mut objects) = device();
    let mut device = GlDevice::new(RecordingGl::default());

    let mut w = CmdWriter::new();
    w.begin_render_pass(PASS, FRAMEBUFFER);
    w.begin_render_subpass();
    let err = device
        .execute(&w.finish(), &mut objects, &RuntimeConfig::default())
        .unwrap_err();
    assert!(matches!(
        err,
        ExecuteError::Object(ObjectError::Unregistered {
            kind: "texture",
            ..
        })
    ));
    assert_eq!(device.context().next_name, 0);
}

#[test]
fn stream_failing_inside_a_subpass_deletes_its_framebuffer() -> anyhow::Result<()> {
    let (mut device, mut objects) = device();
    let mut w = CmdWriter::new();
    w.begin_render_pass(PASS, FRAMEBUFFER);
    w.begin_render_subpass();
    w.draw(triangle_args());

    let err = device
        .execute(&w.finish(), &mut objects, &RuntimeConfig::default())
        .unwrap_err();
    assert!(matches!(err, ExecuteError::NoBoundPipeline("draw")));
    assert!(device.context().live_framebuffers.is_empty());

    // The next stream starts from a clean slate.
    let mut w = CmdWriter::new();
    record_triangle(&mut w);
    device.execute(&w.finish(), &mut objects, &RuntimeConfig::default())?;
    assert!(device.context().live_framebuffers.is_empty());
    Ok(())
}

#[test]
fn second_draw_with_same_layout_skips_vertex_setup() -> anyhow::Result<()> {
    let (mut device, mut objects) = device();
    let mut w = CmdWriter::new();
    record_triangle(&mut w);
    // Beginning a pass forgets what the vertex array holds.
    record_triangle(&mut w);
    let words = w.finish();

    device.execute(&words, &mut objects, &RuntimeConfig::default())?;
    let gl = device.context();
    assert_eq!(
        gl.count(|call| matches!(call, GlCall::VertexAttribPointer { .. })),
        2
    );

    // Within one pass a repeated draw does not touch the vertex array.
    let mut w = CmdWriter::new();
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
    w.set_render_pipeline(DRAW_PIPELINE);
    w.draw(triangle_args());
    w.end_render_subpass();
    w.end_render_pass();

    device.context_mut().calls.clear();
    device.execute(&w.finish(), &mut objects, &RuntimeConfig::default())?;
    let gl = device.context();
    assert_eq!(
        gl.count(|call| matches!(call, GlCall::VertexAttribPointer { .. })),
        1
    );
    assert_eq!(gl.count(|call| matches!(call, GlCall::DrawArrays { .. })), 2);
    Ok(())
}

#[test]
fn dispatch_applies_constants_and_barriers() -> anyhow::Result<()> {
    let (mut device, mut objects) = device();
    let storage = device.buffer_handle(STORAGE)?;

    let report = device.execute(&compute_stream(), &mut objects, &RuntimeConfig::default())?;
    assert_eq!(report.dispatches, 1);

    let interesting: Vec<GlCall> = device
        .context()
        .calls
        .iter()
        .filter(|call| !matches!(call, GlCall::Other(_) | GlCall::StencilFunc(..)))
        .cloned()
        .collect();
    assert_eq!(
        interesting,
        vec![
            GlCall::BindBufferRange {
                target: consts::SHADER_STORAGE_BUFFER,
                index: 0,
                buffer: storage,
                offset: 0,
                size: 256,
            },
            GlCall::Uniform1ui(7, 5),
            GlCall::Uniform1ui(8, 6),
            GlCall::Dispatch(1, 1, 1),
            GlCall::MemoryBarrier(consts::ALL_BARRIER_BITS),
        ]
    );
    Ok(())
}

#[test]
fn stencil_reference_is_only_applied_on_change() -> anyhow::Result<()> {
    let (mut device, mut objects) = device();
    let mut w = CmdWriter::new();
    w.set_stencil_reference(0);
    w.set_stencil_reference(5);
    w.set_stencil_reference(5);

    device.execute(&w.finish(), &mut objects, &RuntimeConfig::default())?;
    let stencil: Vec<&GlCall> = device
        .context()
        .calls
        .iter()
        .filter(|call| matches!(call, GlCall::StencilFunc(..)))
        .collect();
    // Defaults at the start of the stream, then one change, front and back.
    assert_eq!(
        stencil,
        vec![
            &GlCall::StencilFunc(consts::FRONT, consts::ALWAYS, 0),
            &GlCall::StencilFunc(consts::BACK, consts::ALWAYS, 0),
            &GlCall::StencilFunc(consts::FRONT, consts::ALWAYS, 5),
            &GlCall::StencilFunc(consts::BACK, consts::ALWAYS, 5),
        ]
    );
    Ok(())
}

#[test]
fn texture_readback_sets_pack_row_length_in_texels() -> anyhow::Result<()> {
    let (mut device, mut objects) = device();
    let mut w = CmdWriter::new();
    w.copy_texture_to_buffer(target_copy());

    device.execute(&w.finish(), &mut objects, &RuntimeConfig::default())?;
    let pixel_store: Vec<&GlCall> = device
        .context()
        .calls
        .iter()
        .filter(|call| matches!(call, GlCall::PixelStore(..)))
        .collect();
    assert_eq!(
        pixel_store,
        vec![
            &GlCall::PixelStore(consts::PACK_ROW_LENGTH, 4),
            &GlCall::PixelStore(consts::PACK_ROW_LENGTH, 0),
        ]
    );
    Ok(())
}

#[test]
fn destroyed_buffer_is_deleted_and_unregistered() -> anyhow::Result<()> {
    let (mut device, _) = device();
    let handle = device.buffer_handle(READBACK)?;
    device.destroy_buffer(READBACK)?;
    assert_eq!(device.context().deleted_buffers, vec![handle]);
    assert!(device.buffer_handle(READBACK).is_err());
    Ok(())
}
