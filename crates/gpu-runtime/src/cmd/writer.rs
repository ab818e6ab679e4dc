use crate::cmd::{
    split_qword, BufferCopy, BufferTextureCopy, CmdWord, DrawArgs, DrawIndexedArgs, Opcode,
};
use crate::format::Color;
use crate::objects::{
    BindGroupId, BufferId, FramebufferId, PipelineId, RenderPassId, TextureId,
    VertexBufferBinding,
};
use crate::usage::{BufferUsage, ShaderStages, TextureUsage};

/// Builds a command stream.
#[derive(Debug, Default)]
pub struct CmdWriter {
    words: Vec<CmdWord>,
}

impl CmdWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> Vec<CmdWord> {
        self.words
    }

    fn push_cmd(&mut self, opcode: Opcode, payload: &[CmdWord]) {
        self.words.push(opcode as CmdWord);
        self.words.push(payload.len() as CmdWord);
        self.words.extend_from_slice(payload);
    }

    pub fn begin_compute_pass(&mut self) {
        self.push_cmd(Opcode::BeginComputePass, &[]);
    }

    pub fn end_compute_pass(&mut self) {
        self.push_cmd(Opcode::EndComputePass, &[]);
    }

    pub fn begin_render_pass(&mut self, render_pass: RenderPassId, framebuffer: FramebufferId) {
        self.push_cmd(Opcode::BeginRenderPass, &[render_pass.0, framebuffer.0]);
    }

    pub fn end_render_pass(&mut self) {
        self.push_cmd(Opcode::EndRenderPass, &[]);
    }

    pub fn begin_render_subpass(&mut self) {
        self.push_cmd(Opcode::BeginRenderSubpass, &[]);
    }

    pub fn end_render_subpass(&mut self) {
        self.push_cmd(Opcode::EndRenderSubpass, &[]);
    }

    pub fn set_compute_pipeline(&mut self, pipeline: PipelineId) {
        self.push_cmd(Opcode::SetComputePipeline, &[pipeline.0]);
    }

    pub fn set_render_pipeline(&mut self, pipeline: PipelineId) {
        self.push_cmd(Opcode::SetRenderPipeline, &[pipeline.0]);
    }

    pub fn set_push_constants(&mut self, stages: ShaderStages, offset: u32, values: &[u32]) {
        let mut payload = Vec::with_capacity(3 + values.len());
        payload.extend_from_slice(&[stages.bits(), offset, values.len() as u32]);
        payload.extend_from_slice(values);
        self.push_cmd(Opcode::SetPushConstants, &payload);
    }

    pub fn set_bind_group(&mut self, index: u32, group: BindGroupId) {
        self.push_cmd(Opcode::SetBindGroup, &[index, group.0]);
    }

    pub fn set_vertex_buffers(&mut self, start_slot: u32, buffers: &[VertexBufferBinding]) {
        let mut payload = Vec::with_capacity(2 + buffers.len() * 3);
        payload.extend_from_slice(&[start_slot, buffers.len() as u32]);
        for binding in buffers {
            payload.push(binding.buffer.0);
            payload.extend_from_slice(&split_qword(binding.offset));
        }
        self.push_cmd(Opcode::SetVertexBuffers, &payload);
    }

    pub fn set_index_buffer(&mut self, buffer: BufferId, offset: u64) {
        let [lo, hi] = split_qword(offset);
        self.push_cmd(Opcode::SetIndexBuffer, &[buffer.0, lo, hi]);
    }

    pub fn set_stencil_reference(&mut self, reference: u32) {
        self.push_cmd(Opcode::SetStencilReference, &[reference]);
    }

    pub fn set_blend_color(&mut self, color: Color) {
        let payload = color.to_array().map(f32::to_bits);
        self.push_cmd(Opcode::SetBlendColor, &payload);
    }

    pub fn draw(&mut self, args: DrawArgs) {
        self.push_cmd(
            Opcode::Draw,
            &[
                args.vertex_count,
                args.instance_count,
                args.first_vertex,
                args.first_instance,
            ],
        );
    }

    pub fn draw_indexed(&mut self, args: DrawIndexedArgs) {
        self.push_cmd(
            Opcode::DrawIndexed,
            &[
                args.index_count,
                args.instance_count,
                args.first_index,
                args.base_vertex as u32,
                args.first_instance,
            ],
        );
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.push_cmd(Opcode::Dispatch, &[x, y, z]);
    }

    pub fn copy_buffer_to_buffer(&mut self, copy: BufferCopy) {
        let [src_lo, src_hi] = split_qword(copy.src_offset);
        let [dst_lo, dst_hi] = split_qword(copy.dst_offset);
        let [size_lo, size_hi] = split_qword(copy.size);
        self.push_cmd(
            Opcode::CopyBufferToBuffer,
            &[
                copy.src.0, src_lo, src_hi, copy.dst.0, dst_lo, dst_hi, size_lo, size_hi,
            ],
        );
    }

    pub fn copy_buffer_to_texture(&mut self, copy: BufferTextureCopy) {
        self.push_buffer_texture_copy(Opcode::CopyBufferToTexture, copy);
    }

    pub fn copy_texture_to_buffer(&mut self, copy: BufferTextureCopy) {
        self.push_buffer_texture_copy(Opcode::CopyTextureToBuffer, copy);
    }

    fn push_buffer_texture_copy(&mut self, opcode: Opcode, copy: BufferTextureCopy) {
        let [offset_lo, offset_hi] = split_qword(copy.buffer_offset);
        self.push_cmd(
            opcode,
            &[
                copy.buffer.0,
                offset_lo,
                offset_hi,
                copy.row_pitch,
                copy.texture.0,
                copy.level,
                copy.origin.x,
                copy.origin.y,
                copy.origin.z,
                copy.extent.width,
                copy.extent.height,
                copy.extent.depth,
            ],
        );
    }

    pub fn transition_buffer_usage(&mut self, buffer: BufferId, usage: BufferUsage) {
        self.push_cmd(Opcode::TransitionBufferUsage, &[buffer.0, usage.bits()]);
    }

    pub fn transition_texture_usage(&mut self, texture: TextureId, usage: TextureUsage) {
        self.push_cmd(Opcode::TransitionTextureUsage, &[texture.0, usage.bits()]);
    }
}
