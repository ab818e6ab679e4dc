//! OpenGL backend.
//!
//! GL keeps most state in one implicit context, but vertex buffers live in
//! the vertex array object of the bound input layout and push constants are
//! program uniforms. Both are re-applied through the elision caches whenever
//! a pipeline switch invalidates them. GL has no explicit barriers; usage
//! transitions fold into the next bind.

use crate::cmd::{BufferCopy, CmdWord, DrawArgs, DrawIndexedArgs};
use crate::config::RuntimeConfig;
use crate::elision::{
    InputBinding, InputBufferTracker, PersistentPipelineState, PushConstantTracker,
    StencilFuncState,
};
use crate::error::{ExecuteError, ObjectError};
use crate::executor::{
    self, Backend, BoundPipeline, ExecutionReport, ResolvedBinding, ResolvedResource,
    SubpassTarget, TextureCopy,
};
use crate::format::{
    Color, CompareFunction, IndexFormat, PrimitiveTopology, TextureFormat, VertexFormat,
};
use crate::objects::{
    BindGroupId, BufferDescriptor, BufferId, InputState, InputStateId, ObjectTable, PipelineId,
    PushConstantType, SamplerId, TextureId, VertexBufferBinding, MAX_COLOR_ATTACHMENTS,
    MAX_PUSH_CONSTANTS,
};
use crate::state_tracker::{BarrierPolicy, Transition};
use crate::usage::{BufferUsage, PerStage, ShaderStage, ShaderStages, TextureUsage};

use super::Registry;

pub type GLenum = u32;
pub type GLuint = u32;
pub type GLint = i32;
pub type GLbitfield = u32;

pub mod consts {
    use super::{GLbitfield, GLenum};

    pub const NONE: GLenum = 0;

    pub const COLOR: GLenum = 0x1800;
    pub const DEPTH: GLenum = 0x1801;
    pub const STENCIL: GLenum = 0x1802;
    pub const DEPTH_STENCIL: GLenum = 0x84F9;

    pub const TEXTURE_2D: GLenum = 0x0DE1;
    pub const TEXTURE0: GLenum = 0x84C0;

    pub const ARRAY_BUFFER: GLenum = 0x8892;
    pub const ELEMENT_ARRAY_BUFFER: GLenum = 0x8893;
    pub const PIXEL_PACK_BUFFER: GLenum = 0x88EB;
    pub const PIXEL_UNPACK_BUFFER: GLenum = 0x88EC;
    pub const UNIFORM_BUFFER: GLenum = 0x8A11;
    pub const SHADER_STORAGE_BUFFER: GLenum = 0x90D2;
    pub const DYNAMIC_DRAW: GLenum = 0x88E8;

    pub const READ_FRAMEBUFFER: GLenum = 0x8CA8;
    pub const DRAW_FRAMEBUFFER: GLenum = 0x8CA9;
    pub const COLOR_ATTACHMENT0: GLenum = 0x8CE0;
    pub const DEPTH_ATTACHMENT: GLenum = 0x8D00;
    pub const STENCIL_ATTACHMENT: GLenum = 0x8D20;
    pub const DEPTH_STENCIL_ATTACHMENT: GLenum = 0x821A;

    pub const UNSIGNED_BYTE: GLenum = 0x1401;
    pub const UNSIGNED_SHORT: GLenum = 0x1403;
    pub const UNSIGNED_INT: GLenum = 0x1405;
    pub const FLOAT: GLenum = 0x1406;
    pub const FLOAT_32_UNSIGNED_INT_24_8_REV: GLenum = 0x8DAD;

    pub const RED: GLenum = 0x1903;
    pub const RG: GLenum = 0x8227;
    pub const RGBA: GLenum = 0x1908;
    pub const BGRA: GLenum = 0x80E1;
    pub const RGBA_INTEGER: GLenum = 0x8D99;

    pub const UNPACK_ROW_LENGTH: GLenum = 0x0CF2;
    pub const PACK_ROW_LENGTH: GLenum = 0x0D02;

    pub const POINTS: GLenum = 0x0000;
    pub const LINES: GLenum = 0x0001;
    pub const LINE_STRIP: GLenum = 0x0003;
    pub const TRIANGLES: GLenum = 0x0004;
    pub const TRIANGLE_STRIP: GLenum = 0x0005;

    pub const NEVER: GLenum = 0x0200;
    pub const LESS: GLenum = 0x0201;
    pub const EQUAL: GLenum = 0x0202;
    pub const LEQUAL: GLenum = 0x0203;
    pub const GREATER: GLenum = 0x0204;
    pub const NOTEQUAL: GLenum = 0x0205;
    pub const GEQUAL: GLenum = 0x0206;
    pub const ALWAYS: GLenum = 0x0207;

    pub const FRONT: GLenum = 0x0404;
    pub const BACK: GLenum = 0x0405;

    pub const ALL_BARRIER_BITS: GLbitfield = 0xFFFF_FFFF;
}

use consts::*;

/// GL entry points used by [`GlDevice`]. Byte offsets into bound buffers are
/// passed as `u64` instead of pointers.
pub trait GlContext {
    fn gen_buffer(&mut self) -> GLuint;
    fn delete_buffer(&mut self, buffer: GLuint);
    fn bind_buffer(&mut self, target: GLenum, buffer: GLuint);
    fn buffer_data(&mut self, target: GLenum, size: u64, usage: GLenum);
    fn bind_buffer_range(
        &mut self,
        target: GLenum,
        index: GLuint,
        buffer: GLuint,
        offset: u64,
        size: u64,
    );
    fn copy_buffer_sub_data(
        &mut self,
        read_target: GLenum,
        write_target: GLenum,
        read_offset: u64,
        write_offset: u64,
        size: u64,
    );

    fn gen_framebuffer(&mut self) -> GLuint;
    fn delete_framebuffer(&mut self, framebuffer: GLuint);
    fn bind_framebuffer(&mut self, target: GLenum, framebuffer: GLuint);
    fn framebuffer_texture_2d(
        &mut self,
        target: GLenum,
        attachment: GLenum,
        tex_target: GLenum,
        texture: GLuint,
        level: GLint,
    );
    fn draw_buffers(&mut self, buffers: &[GLenum]);
    fn clear_buffer_fv(&mut self, buffer: GLenum, draw_buffer: GLint, value: &[f32]);
    fn clear_buffer_iv(&mut self, buffer: GLenum, draw_buffer: GLint, value: &[GLint]);
    fn clear_buffer_fi(&mut self, buffer: GLenum, draw_buffer: GLint, depth: f32, stencil: GLint);
    fn blend_color(&mut self, r: f32, g: f32, b: f32, a: f32);
    fn viewport(&mut self, x: GLint, y: GLint, width: GLint, height: GLint);
    fn stencil_func_separate(&mut self, face: GLenum, func: GLenum, reference: GLint, mask: GLuint);

    fn use_program(&mut self, program: GLuint);
    fn uniform_1i(&mut self, location: GLint, value: GLint);
    fn uniform_1ui(&mut self, location: GLint, value: GLuint);
    fn uniform_1f(&mut self, location: GLint, value: f32);

    fn bind_vertex_array(&mut self, vertex_array: GLuint);
    fn vertex_attrib_pointer(
        &mut self,
        location: GLuint,
        components: GLint,
        ty: GLenum,
        normalized: bool,
        stride: GLint,
        offset: u64,
    );

    fn active_texture(&mut self, unit: GLenum);
    fn bind_texture(&mut self, target: GLenum, texture: GLuint);
    fn bind_sampler(&mut self, unit: GLuint, sampler: GLuint);
    fn pixel_store_i(&mut self, pname: GLenum, param: GLint);
    #[allow(clippy::too_many_arguments)]
    fn tex_sub_image_2d(
        &mut self,
        target: GLenum,
        level: GLint,
        x: GLint,
        y: GLint,
        width: GLint,
        height: GLint,
        format: GLenum,
        ty: GLenum,
        offset: u64,
    );
    #[allow(clippy::too_many_arguments)]
    fn read_pixels(
        &mut self,
        x: GLint,
        y: GLint,
        width: GLint,
        height: GLint,
        format: GLenum,
        ty: GLenum,
        offset: u64,
    );

    fn draw_arrays_instanced(&mut self, mode: GLenum, first: GLint, count: GLint, instances: GLint);
    fn draw_arrays_instanced_base_instance(
        &mut self,
        mode: GLenum,
        first: GLint,
        count: GLint,
        instances: GLint,
        base_instance: GLuint,
    );
    fn draw_elements_instanced(
        &mut self,
        mode: GLenum,
        count: GLint,
        ty: GLenum,
        offset: u64,
        instances: GLint,
    );
    fn draw_elements_instanced_base_vertex(
        &mut self,
        mode: GLenum,
        count: GLint,
        ty: GLenum,
        offset: u64,
        instances: GLint,
        base_vertex: GLint,
    );
    #[allow(clippy::too_many_arguments)]
    fn draw_elements_instanced_base_vertex_base_instance(
        &mut self,
        mode: GLenum,
        count: GLint,
        ty: GLenum,
        offset: u64,
        instances: GLint,
        base_vertex: GLint,
        base_instance: GLuint,
    );
    fn dispatch_compute(&mut self, x: GLuint, y: GLuint, z: GLuint);
    fn memory_barrier(&mut self, barriers: GLbitfield);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlTexture {
    pub handle: GLuint,
    pub target: GLenum,
}

/// A linked program plus what the creation layer learned while linking it.
#[derive(Debug, Clone)]
pub struct GlPipeline {
    pub program: GLuint,
    /// Uniform location of every push-constant slot, per stage.
    pub push_constant_locations: PerStage<[GLint; MAX_PUSH_CONSTANTS]>,
    /// Texture units each sampler binding index feeds.
    pub sampler_units: Vec<Vec<GLuint>>,
    /// Texture units each sampled-texture binding index feeds.
    pub texture_units: Vec<Vec<GLuint>>,
}

impl GlPipeline {
    pub fn new(program: GLuint) -> Self {
        Self {
            program,
            push_constant_locations: PerStage([[-1; MAX_PUSH_CONSTANTS]; ShaderStage::COUNT]),
            sampler_units: Vec::new(),
            texture_units: Vec::new(),
        }
    }

    fn units(units: &[Vec<GLuint>], index: u32) -> &[GLuint] {
        units.get(index as usize).map_or(&[], Vec::as_slice)
    }
}

/// Every usage maps to the same state: GL re-binds at the point of use.
#[derive(Debug, Clone, Copy)]
pub struct GlBarriers;

impl BarrierPolicy for GlBarriers {
    type State = ();

    fn buffer_state(_usage: BufferUsage) {}

    fn texture_state(_usage: TextureUsage, _format: TextureFormat) {}
}

pub fn compare_function(func: CompareFunction) -> GLenum {
    match func {
        CompareFunction::Never => NEVER,
        CompareFunction::Less => LESS,
        CompareFunction::LessEqual => LEQUAL,
        CompareFunction::Greater => GREATER,
        CompareFunction::GreaterEqual => GEQUAL,
        CompareFunction::Equal => EQUAL,
        CompareFunction::NotEqual => NOTEQUAL,
        CompareFunction::Always => ALWAYS,
    }
}

pub fn primitive_topology(topology: PrimitiveTopology) -> GLenum {
    match topology {
        PrimitiveTopology::PointList => POINTS,
        PrimitiveTopology::LineList => LINES,
        PrimitiveTopology::LineStrip => LINE_STRIP,
        PrimitiveTopology::TriangleList => TRIANGLES,
        PrimitiveTopology::TriangleStrip => TRIANGLE_STRIP,
    }
}

fn index_type(format: IndexFormat) -> GLenum {
    match format {
        IndexFormat::Uint16 => UNSIGNED_SHORT,
        IndexFormat::Uint32 => UNSIGNED_INT,
    }
}

fn vertex_type(format: VertexFormat) -> GLenum {
    match format {
        VertexFormat::FloatR32G32B32A32
        | VertexFormat::FloatR32G32B32
        | VertexFormat::FloatR32G32
        | VertexFormat::FloatR32 => FLOAT,
        VertexFormat::UnormR8G8B8A8 | VertexFormat::UnormR8G8 => UNSIGNED_BYTE,
    }
}

/// `(format, type)` pair for pixel transfers.
pub fn pixel_format(format: TextureFormat) -> (GLenum, GLenum) {
    match format {
        TextureFormat::R8G8B8A8Unorm => (RGBA, UNSIGNED_BYTE),
        TextureFormat::R8G8Unorm => (RG, UNSIGNED_BYTE),
        TextureFormat::R8Unorm => (RED, UNSIGNED_BYTE),
        TextureFormat::R8G8B8A8Uint => (RGBA_INTEGER, UNSIGNED_BYTE),
        TextureFormat::B8G8R8A8Unorm => (BGRA, UNSIGNED_BYTE),
        TextureFormat::D32FloatS8Uint => (DEPTH_STENCIL, FLOAT_32_UNSIGNED_INT_24_8_REV),
    }
}

fn depth_stencil_attachment_point(format: TextureFormat) -> GLenum {
    match (format.has_depth(), format.has_stencil()) {
        (true, true) => DEPTH_STENCIL_ATTACHMENT,
        (true, false) => DEPTH_ATTACHMENT,
        (false, _) => STENCIL_ATTACHMENT,
    }
}

fn apply_stencil<C: GlContext>(context: &mut C, state: &StencilFuncState) {
    context.stencil_func_separate(
        FRONT,
        compare_function(state.front_compare),
        state.reference as GLint,
        state.read_mask,
    );
    context.stencil_func_separate(
        BACK,
        compare_function(state.back_compare),
        state.reference as GLint,
        state.read_mask,
    );
}

fn bind_input<C: GlContext>(
    context: &mut C,
    buffers: &Registry<BufferId, GLuint>,
    input_state: &InputState,
    binding: InputBinding,
) -> Result<(), ExecuteError> {
    match binding {
        InputBinding::Index { buffer, .. } => {
            let handle = *buffers.get(buffer)?;
            context.bind_buffer(ELEMENT_ARRAY_BUFFER, handle);
        }
        InputBinding::Vertex {
            slot,
            buffer,
            offset,
        } => {
            let handle = *buffers.get(buffer)?;
            let stride = input_state.input(slot).map_or(0, |input| input.stride);
            for (location, attribute) in input_state.attributes_using_input(slot) {
                context.bind_buffer(ARRAY_BUFFER, handle);
                context.vertex_attrib_pointer(
                    location,
                    attribute.format.components() as GLint,
                    vertex_type(attribute.format),
                    attribute.format.is_normalized(),
                    stride as GLint,
                    offset + attribute.offset,
                );
            }
        }
    }
    Ok(())
}

/// A GL context plus the native objects registered with it.
pub struct GlDevice<C> {
    context: C,
    buffers: Registry<BufferId, GLuint>,
    textures: Registry<TextureId, GlTexture>,
    samplers: Registry<SamplerId, GLuint>,
    pipelines: Registry<PipelineId, GlPipeline>,
    /// One vertex array object per input layout.
    vertex_arrays: Registry<InputStateId, GLuint>,

    push_constants: PushConstantTracker,
    input_buffers: InputBufferTracker,
    persistent: PersistentPipelineState,
    index_buffer_offset: u64,
    current_fbo: Option<GLuint>,
}

impl<C: GlContext> GlDevice<C> {
    pub fn new(context: C) -> Self {
        Self {
            context,
            buffers: Registry::default(),
            textures: Registry::default(),
            samplers: Registry::default(),
            pipelines: Registry::default(),
            vertex_arrays: Registry::default(),
            push_constants: PushConstantTracker::new(),
            input_buffers: InputBufferTracker::new(),
            persistent: PersistentPipelineState::new(),
            index_buffer_offset: 0,
            current_fbo: None,
        }
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn create_buffer(&mut self, id: BufferId, desc: &BufferDescriptor) -> GLuint {
        let handle = self.context.gen_buffer();
        self.context.bind_buffer(ARRAY_BUFFER, handle);
        self.context.buffer_data(ARRAY_BUFFER, desc.size, DYNAMIC_DRAW);
        self.buffers.insert(id, handle);
        handle
    }

    /// Deletes the buffer right away; the driver keeps it alive for commands
    /// already submitted.
    pub fn destroy_buffer(&mut self, id: BufferId) -> Result<(), ExecuteError> {
        let handle = self.buffers.remove(id)?;
        self.context.delete_buffer(handle);
        Ok(())
    }

    pub fn buffer_handle(&self, id: BufferId) -> Result<GLuint, ExecuteError> {
        Ok(*self.buffers.get(id)?)
    }

    pub fn register_texture(&mut self, id: TextureId, texture: GlTexture) {
        self.textures.insert(id, texture);
    }

    pub fn register_sampler(&mut self, id: SamplerId, sampler: GLuint) {
        self.samplers.insert(id, sampler);
    }

    pub fn register_pipeline(&mut self, id: PipelineId, pipeline: GlPipeline) {
        self.pipelines.insert(id, pipeline);
    }

    /// Registers the vertex array object describing `id`'s attributes. Every
    /// render pipeline using that input state shares it.
    pub fn register_input_state(&mut self, id: InputStateId, vertex_array: GLuint) {
        self.vertex_arrays.insert(id, vertex_array);
    }

    pub fn execute(
        &mut self,
        words: &[CmdWord],
        objects: &mut ObjectTable,
        config: &RuntimeConfig,
    ) -> Result<ExecutionReport, ExecuteError> {
        let result = executor::execute(words, objects, config, self);
        if result.is_err() {
            // A stream that stopped inside a subpass never reaches its end.
            self.release_framebuffer();
        }
        result
    }

    fn release_framebuffer(&mut self) {
        if let Some(fbo) = self.current_fbo.take() {
            self.context.delete_framebuffer(fbo);
        }
    }
}

impl<C: GlContext> Backend for GlDevice<C> {
    type Barriers = GlBarriers;

    fn begin_execution(&mut self) -> Result<(), ExecuteError> {
        let context = &mut self.context;
        self.persistent
            .set_default_state(|state| apply_stencil(context, state));
        Ok(())
    }

    fn begin_compute_pass(&mut self) -> Result<(), ExecuteError> {
        self.push_constants.on_begin_pass();
        Ok(())
    }

    fn begin_subpass(&mut self, target: &SubpassTarget) -> Result<(), ExecuteError> {
        self.push_constants.on_begin_pass();
        self.input_buffers.on_begin_pass();

        let color_textures = target
            .colors
            .iter()
            .map(|color| Ok(self.textures.get(color.texture)?.handle))
            .collect::<Result<Vec<_>, ObjectError>>()?;
        let depth_stencil_texture = match &target.depth_stencil {
            Some(depth_stencil) => Some(self.textures.get(depth_stencil.texture)?.handle),
            None => None,
        };

        // Break any feedback loop with the previous subpass before clearing.
        self.context.bind_framebuffer(READ_FRAMEBUFFER, 0);
        let fbo = self.context.gen_framebuffer();
        self.context.bind_framebuffer(DRAW_FRAMEBUFFER, fbo);
        self.current_fbo = Some(fbo);

        let mut draw_buffers = [NONE; MAX_COLOR_ATTACHMENTS];
        let mut draw_buffer_count = 0;
        for (color, &texture) in target.colors.iter().zip(&color_textures) {
            let attachment = COLOR_ATTACHMENT0 + color.location;
            self.context.framebuffer_texture_2d(
                DRAW_FRAMEBUFFER,
                attachment,
                TEXTURE_2D,
                texture,
                color.level as GLint,
            );
            draw_buffers[color.location as usize] = attachment;
            draw_buffer_count = color.location as usize + 1;
        }
        self.context.draw_buffers(&draw_buffers[..draw_buffer_count]);

        if let (Some(depth_stencil), Some(texture)) =
            (&target.depth_stencil, depth_stencil_texture)
        {
            self.context.framebuffer_texture_2d(
                DRAW_FRAMEBUFFER,
                depth_stencil_attachment_point(depth_stencil.format),
                TEXTURE_2D,
                texture,
                depth_stencil.level as GLint,
            );
        }

        for color in &target.colors {
            if let Some(clear) = color.clear {
                self.context
                    .clear_buffer_fv(COLOR, color.location as GLint, &clear.to_array());
            }
        }
        if let Some(depth_stencil) = &target.depth_stencil {
            match (depth_stencil.clear_depth, depth_stencil.clear_stencil) {
                (Some(depth), Some(stencil)) => {
                    self.context
                        .clear_buffer_fi(DEPTH_STENCIL, 0, depth, stencil as GLint)
                }
                (Some(depth), None) => self.context.clear_buffer_fv(DEPTH, 0, &[depth]),
                (None, Some(stencil)) => {
                    self.context
                        .clear_buffer_iv(STENCIL, 0, &[stencil as GLint])
                }
                (None, None) => {}
            }
        }

        self.context.blend_color(0.0, 0.0, 0.0, 0.0);
        self.context
            .viewport(0, 0, target.width as GLint, target.height as GLint);
        Ok(())
    }

    fn end_subpass(&mut self) -> Result<(), ExecuteError> {
        self.release_framebuffer();
        Ok(())
    }

    fn set_pipeline(&mut self, pipeline: &BoundPipeline<'_>) -> Result<(), ExecuteError> {
        let gl_pipeline = self.pipelines.get(pipeline.id)?;
        self.context.use_program(gl_pipeline.program);

        if let Some(state) = pipeline.render_state() {
            let context = &mut self.context;
            self.persistent
                .set_stencil_funcs_and_mask(&state.stencil, |stencil| {
                    apply_stencil(context, stencil)
                });
        }

        self.push_constants
            .on_set_pipeline(&pipeline.pipeline.push_constants);
        if let Some((id, input_state)) = pipeline.input_state {
            let vertex_array = *self.vertex_arrays.get(id)?;
            if self.input_buffers.on_set_pipeline(id, input_state) {
                self.context.bind_vertex_array(vertex_array);
            }
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
        _index: u32,
        _group: BindGroupId,
        pipeline: &BoundPipeline<'_>,
        bindings: &[ResolvedBinding],
    ) -> Result<(), ExecuteError> {
        let gl_pipeline = self.pipelines.get(pipeline.id)?;
        for binding in bindings {
            match binding.resource {
                ResolvedResource::UniformBuffer {
                    buffer,
                    offset,
                    size,
                } => {
                    let handle = *self.buffers.get(buffer)?;
                    self.context.bind_buffer_range(
                        UNIFORM_BUFFER,
                        binding.native_index,
                        handle,
                        offset,
                        size,
                    );
                }
                ResolvedResource::StorageBuffer {
                    buffer,
                    offset,
                    size,
                } => {
                    let handle = *self.buffers.get(buffer)?;
                    self.context.bind_buffer_range(
                        SHADER_STORAGE_BUFFER,
                        binding.native_index,
                        handle,
                        offset,
                        size,
                    );
                }
                ResolvedResource::Sampler(sampler) => {
                    let handle = *self.samplers.get(sampler)?;
                    for &unit in GlPipeline::units(&gl_pipeline.sampler_units, binding.native_index)
                    {
                        self.context.bind_sampler(unit, handle);
                    }
                }
                ResolvedResource::SampledTexture { texture, .. } => {
                    let texture = self.textures.get(texture)?;
                    for &unit in GlPipeline::units(&gl_pipeline.texture_units, binding.native_index)
                    {
                        self.context.active_texture(TEXTURE0 + unit);
                        self.context.bind_texture(texture.target, texture.handle);
                    }
                }
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
        self.index_buffer_offset = offset;
        self.input_buffers.on_set_index_buffer(buffer, offset);
        Ok(())
    }

    fn set_stencil_reference(&mut self, reference: u32) -> Result<(), ExecuteError> {
        let context = &mut self.context;
        self.persistent
            .set_stencil_reference(reference, |state| apply_stencil(context, state));
        Ok(())
    }

    fn set_blend_color(&mut self, color: Color) -> Result<(), ExecuteError> {
        self.context.blend_color(color.r, color.g, color.b, color.a);
        Ok(())
    }

    fn flush(&mut self, pipeline: &BoundPipeline<'_>) -> Result<(), ExecuteError> {
        let gl_pipeline = self.pipelines.get(pipeline.id)?;
        let context = &mut self.context;
        self.push_constants.apply(
            &pipeline.pipeline.push_constants,
            |stage, slot, ty, value| -> Result<(), ExecuteError> {
                let location = gl_pipeline.push_constant_locations[stage][slot as usize];
                match ty {
                    PushConstantType::Int => context.uniform_1i(location, bytemuck::cast(value)),
                    PushConstantType::UInt => context.uniform_1ui(location, value),
                    PushConstantType::Float => context.uniform_1f(location, bytemuck::cast(value)),
                }
                Ok(())
            },
        )?;

        if let Some((_, input_state)) = pipeline.input_state {
            let buffers = &self.buffers;
            self.input_buffers.apply(input_state, |binding| {
                bind_input(context, buffers, input_state, binding)
            })?;
        }
        Ok(())
    }

    fn draw(&mut self, pipeline: &BoundPipeline<'_>, args: &DrawArgs) -> Result<(), ExecuteError> {
        let state = pipeline
            .render_state()
            .ok_or(ExecuteError::NoBoundPipeline("draw"))?;
        let mode = primitive_topology(state.topology);
        if args.first_instance > 0 {
            self.context.draw_arrays_instanced_base_instance(
                mode,
                args.first_vertex as GLint,
                args.vertex_count as GLint,
                args.instance_count as GLint,
                args.first_instance,
            );
        } else {
            self.context.draw_arrays_instanced(
                mode,
                args.first_vertex as GLint,
                args.vertex_count as GLint,
                args.instance_count as GLint,
            );
        }
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        pipeline: &BoundPipeline<'_>,
        args: &DrawIndexedArgs,
    ) -> Result<(), ExecuteError> {
        let state = pipeline
            .render_state()
            .ok_or(ExecuteError::NoBoundPipeline("draw"))?;
        let mode = primitive_topology(state.topology);
        let ty = index_type(state.index_format);
        let offset =
            u64::from(args.first_index) * state.index_format.size() + self.index_buffer_offset;
        if args.first_instance > 0 {
            self.context.draw_elements_instanced_base_vertex_base_instance(
                mode,
                args.index_count as GLint,
                ty,
                offset,
                args.instance_count as GLint,
                args.base_vertex,
                args.first_instance,
            );
        } else if args.base_vertex != 0 {
            self.context.draw_elements_instanced_base_vertex(
                mode,
                args.index_count as GLint,
                ty,
                offset,
                args.instance_count as GLint,
                args.base_vertex,
            );
        } else {
            self.context.draw_elements_instanced(
                mode,
                args.index_count as GLint,
                ty,
                offset,
                args.instance_count as GLint,
            );
        }
        Ok(())
    }

    fn dispatch(
        &mut self,
        _pipeline: &BoundPipeline<'_>,
        x: u32,
        y: u32,
        z: u32,
    ) -> Result<(), ExecuteError> {
        self.context.dispatch_compute(x, y, z);
        Ok(())
    }

    fn full_barrier(&mut self) -> Result<(), ExecuteError> {
        self.context.memory_barrier(ALL_BARRIER_BITS);
        Ok(())
    }

    fn copy_buffer_to_buffer(&mut self, copy: &BufferCopy) -> Result<(), ExecuteError> {
        let src = *self.buffers.get(copy.src)?;
        let dst = *self.buffers.get(copy.dst)?;
        self.context.bind_buffer(PIXEL_PACK_BUFFER, src);
        self.context.bind_buffer(PIXEL_UNPACK_BUFFER, dst);
        self.context.copy_buffer_sub_data(
            PIXEL_PACK_BUFFER,
            PIXEL_UNPACK_BUFFER,
            copy.src_offset,
            copy.dst_offset,
            copy.size,
        );
        self.context.bind_buffer(PIXEL_PACK_BUFFER, 0);
        self.context.bind_buffer(PIXEL_UNPACK_BUFFER, 0);
        Ok(())
    }

    fn copy_buffer_to_texture(&mut self, copy: &TextureCopy) -> Result<(), ExecuteError> {
        let buffer = *self.buffers.get(copy.buffer)?;
        let texture = *self.textures.get(copy.texture)?;
        let (format, ty) = pixel_format(copy.format);

        self.context.bind_buffer(PIXEL_UNPACK_BUFFER, buffer);
        self.context.active_texture(TEXTURE0);
        self.context.bind_texture(texture.target, texture.handle);
        self.context
            .pixel_store_i(UNPACK_ROW_LENGTH, copy.row_length as GLint);
        self.context.tex_sub_image_2d(
            texture.target,
            copy.level as GLint,
            copy.origin.x as GLint,
            copy.origin.y as GLint,
            copy.extent.width as GLint,
            copy.extent.height as GLint,
            format,
            ty,
            copy.buffer_offset,
        );
        self.context.pixel_store_i(UNPACK_ROW_LENGTH, 0);
        self.context.bind_buffer(PIXEL_UNPACK_BUFFER, 0);
        Ok(())
    }

    fn copy_texture_to_buffer(&mut self, copy: &TextureCopy) -> Result<(), ExecuteError> {
        let buffer = *self.buffers.get(copy.buffer)?;
        let texture = *self.textures.get(copy.texture)?;
        let (format, ty) = pixel_format(copy.format);
        debug_assert!(copy.extent.depth == 1 && copy.origin.z == 0);

        // Reading back goes through a framebuffer; attach the texture to a
        // temporary one.
        self.context.bind_texture(TEXTURE_2D, texture.handle);
        let read_fbo = self.context.gen_framebuffer();
        self.context.bind_framebuffer(READ_FRAMEBUFFER, read_fbo);
        self.context.framebuffer_texture_2d(
            READ_FRAMEBUFFER,
            COLOR_ATTACHMENT0,
            TEXTURE_2D,
            texture.handle,
            copy.level as GLint,
        );

        self.context.bind_buffer(PIXEL_PACK_BUFFER, buffer);
        self.context
            .pixel_store_i(PACK_ROW_LENGTH, copy.row_length as GLint);
        self.context.read_pixels(
            copy.origin.x as GLint,
            copy.origin.y as GLint,
            copy.extent.width as GLint,
            copy.extent.height as GLint,
            format,
            ty,
            copy.buffer_offset,
        );
        self.context.pixel_store_i(PACK_ROW_LENGTH, 0);
        self.context.bind_buffer(PIXEL_PACK_BUFFER, 0);
        self.context.delete_framebuffer(read_fbo);
        Ok(())
    }

    fn transition_buffer(
        &mut self,
        _buffer: BufferId,
        _transition: Transition<()>,
    ) -> Result<(), ExecuteError> {
        Ok(())
    }

    fn transition_texture(
        &mut self,
        _texture: TextureId,
        _transition: Transition<()>,
    ) -> Result<(), ExecuteError> {
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ExecuteError> {
        // Leave sampler unit 0 clean for code sharing the context.
        self.context.bind_sampler(0, 0);
        Ok(())
    }
}
