//! Recorded command stream format.
//!
//! The stream is word-addressed so a front end can write it with minimal
//! packing overhead. Every record is `[opcode, payload_words, payload...]`.
//! Payloads hold fixed fields first (64-bit values as lo/hi word pairs, floats
//! as their bit patterns), then any trailing array. Streams are assumed to have
//! been validated by the recorder; decoding only rejects structural damage.

mod writer;

use crate::format::Color;
use crate::objects::{
    BindGroupId, BufferId, FramebufferId, PipelineId, RenderPassId, TextureId,
    VertexBufferBinding,
};
use crate::usage::{BufferUsage, ShaderStages, TextureUsage};

pub use writer::CmdWriter;

pub type CmdWord = u32;

#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Opcode {
    // Pass control.
    BeginComputePass = 0x01,
    EndComputePass = 0x02,
    BeginRenderPass = 0x03,
    EndRenderPass = 0x04,
    BeginRenderSubpass = 0x05,
    EndRenderSubpass = 0x06,

    // State binding.
    SetComputePipeline = 0x10,
    SetRenderPipeline = 0x11,
    SetPushConstants = 0x12,
    SetBindGroup = 0x13,
    SetVertexBuffers = 0x14,
    SetIndexBuffer = 0x15,
    SetStencilReference = 0x16,
    SetBlendColor = 0x17,

    // Work.
    Draw = 0x20,
    DrawIndexed = 0x21,
    Dispatch = 0x22,

    // Copies.
    CopyBufferToBuffer = 0x30,
    CopyBufferToTexture = 0x31,
    CopyTextureToBuffer = 0x32,

    // Usage tracking.
    TransitionBufferUsage = 0x40,
    TransitionTextureUsage = 0x41,
}

impl Opcode {
    pub fn from_word(word: CmdWord) -> Option<Self> {
        Some(match word {
            0x01 => Self::BeginComputePass,
            0x02 => Self::EndComputePass,
            0x03 => Self::BeginRenderPass,
            0x04 => Self::EndRenderPass,
            0x05 => Self::BeginRenderSubpass,
            0x06 => Self::EndRenderSubpass,
            0x10 => Self::SetComputePipeline,
            0x11 => Self::SetRenderPipeline,
            0x12 => Self::SetPushConstants,
            0x13 => Self::SetBindGroup,
            0x14 => Self::SetVertexBuffers,
            0x15 => Self::SetIndexBuffer,
            0x16 => Self::SetStencilReference,
            0x17 => Self::SetBlendColor,
            0x20 => Self::Draw,
            0x21 => Self::DrawIndexed,
            0x22 => Self::Dispatch,
            0x30 => Self::CopyBufferToBuffer,
            0x31 => Self::CopyBufferToTexture,
            0x32 => Self::CopyTextureToBuffer,
            0x40 => Self::TransitionBufferUsage,
            0x41 => Self::TransitionTextureUsage,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CmdParseError {
    #[error("truncated command header at word {at_word}")]
    TruncatedHeader { at_word: usize },
    #[error("unknown opcode {opcode:#x} at word {at_word}")]
    UnknownOpcode { opcode: CmdWord, at_word: usize },
    #[error(
        "truncated payload for opcode {opcode:?} at word {at_word}: expected {expected_words} words, only {remaining_words} remaining"
    )]
    TruncatedPayload {
        opcode: Opcode,
        expected_words: usize,
        remaining_words: usize,
        at_word: usize,
    },
    #[error("payload for opcode {opcode:?} has {actual_words} words, expected {expected_words}")]
    BadPayload {
        opcode: Opcode,
        expected_words: usize,
        actual_words: usize,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CmdHeader {
    pub opcode: Opcode,
    /// Payload length in `CmdWord`s (excluding the header).
    pub payload_words: u32,
}

#[derive(Debug)]
pub struct CmdPacket<'a> {
    pub header: CmdHeader,
    pub payload: &'a [CmdWord],
}

/// Iterator over the raw packets of a stream.
pub struct CmdStream<'a> {
    words: &'a [CmdWord],
    cursor: usize,
}

impl<'a> CmdStream<'a> {
    pub fn new(words: &'a [CmdWord]) -> Self {
        Self { words, cursor: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.cursor >= self.words.len()
    }

    /// Decoded commands instead of raw packets.
    pub fn commands(self) -> impl Iterator<Item = Result<Command<'a>, CmdParseError>> {
        self.map(|packet| Command::decode(&packet?))
    }
}

impl<'a> Iterator for CmdStream<'a> {
    type Item = Result<CmdPacket<'a>, CmdParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.words.len() {
            return None;
        }
        let at_word = self.cursor;
        if at_word + 2 > self.words.len() {
            // Stop after reporting; the rest of the stream is unreadable.
            self.cursor = self.words.len();
            return Some(Err(CmdParseError::TruncatedHeader { at_word }));
        }

        let opcode_word = self.words[at_word];
        let payload_words = self.words[at_word + 1] as usize;
        let Some(opcode) = Opcode::from_word(opcode_word) else {
            self.cursor = self.words.len();
            return Some(Err(CmdParseError::UnknownOpcode {
                opcode: opcode_word,
                at_word,
            }));
        };

        let payload_start = at_word + 2;
        let remaining_words = self.words.len() - payload_start;
        if payload_words > remaining_words {
            self.cursor = self.words.len();
            return Some(Err(CmdParseError::TruncatedPayload {
                opcode,
                expected_words: payload_words,
                remaining_words,
                at_word,
            }));
        }

        let payload_end = payload_start + payload_words;
        self.cursor = payload_end;
        Some(Ok(CmdPacket {
            header: CmdHeader {
                opcode,
                payload_words: payload_words as u32,
            },
            payload: &self.words[payload_start..payload_end],
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawArgs {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawIndexedArgs {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCopy {
    pub src: BufferId,
    pub src_offset: u64,
    pub dst: BufferId,
    pub dst_offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Origin3d {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent3d {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

/// Buffer/texture copy in either direction, as recorded. The row pitch is in
/// bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferTextureCopy {
    pub buffer: BufferId,
    pub buffer_offset: u64,
    pub row_pitch: u32,
    pub texture: TextureId,
    pub level: u32,
    pub origin: Origin3d,
    pub extent: Extent3d,
}

/// Trailing `(buffer, offset_lo, offset_hi)` triples of a vertex buffer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBuffers<'a> {
    words: &'a [CmdWord],
}

impl<'a> VertexBuffers<'a> {
    const STRIDE: usize = 3;

    pub fn len(&self) -> usize {
        self.words.len() / Self::STRIDE
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = VertexBufferBinding> + 'a {
        self.words
            .chunks_exact(Self::STRIDE)
            .map(|entry| VertexBufferBinding {
                buffer: BufferId(entry[0]),
                offset: qword(entry[1], entry[2]),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command<'a> {
    BeginComputePass,
    EndComputePass,
    BeginRenderPass {
        render_pass: RenderPassId,
        framebuffer: FramebufferId,
    },
    EndRenderPass,
    BeginRenderSubpass,
    EndRenderSubpass,
    SetComputePipeline(PipelineId),
    SetRenderPipeline(PipelineId),
    SetPushConstants {
        stages: ShaderStages,
        offset: u32,
        values: &'a [u32],
    },
    SetBindGroup {
        index: u32,
        group: BindGroupId,
    },
    SetVertexBuffers {
        start_slot: u32,
        buffers: VertexBuffers<'a>,
    },
    SetIndexBuffer {
        buffer: BufferId,
        offset: u64,
    },
    SetStencilReference(u32),
    SetBlendColor(Color),
    Draw(DrawArgs),
    DrawIndexed(DrawIndexedArgs),
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    CopyBufferToBuffer(BufferCopy),
    CopyBufferToTexture(BufferTextureCopy),
    CopyTextureToBuffer(BufferTextureCopy),
    TransitionBufferUsage {
        buffer: BufferId,
        usage: BufferUsage,
    },
    TransitionTextureUsage {
        texture: TextureId,
        usage: TextureUsage,
    },
}

pub(crate) fn qword(lo: CmdWord, hi: CmdWord) -> u64 {
    u64::from(lo) | (u64::from(hi) << 32)
}

pub(crate) fn split_qword(value: u64) -> [CmdWord; 2] {
    [(value & 0xffff_ffff) as u32, (value >> 32) as u32]
}

const BUFFER_TEXTURE_COPY_WORDS: usize = 12;

fn decode_buffer_texture_copy(p: &[CmdWord]) -> BufferTextureCopy {
    BufferTextureCopy {
        buffer: BufferId(p[0]),
        buffer_offset: qword(p[1], p[2]),
        row_pitch: p[3],
        texture: TextureId(p[4]),
        level: p[5],
        origin: Origin3d {
            x: p[6],
            y: p[7],
            z: p[8],
        },
        extent: Extent3d {
            width: p[9],
            height: p[10],
            depth: p[11],
        },
    }
}

impl<'a> Command<'a> {
    pub fn decode(packet: &CmdPacket<'a>) -> Result<Self, CmdParseError> {
        let opcode = packet.header.opcode;
        let payload = packet.payload;
        let bad = |expected_words: usize| CmdParseError::BadPayload {
            opcode,
            expected_words,
            actual_words: payload.len(),
        };
        let fixed = |words: usize| -> Result<&'a [CmdWord], CmdParseError> {
            if payload.len() == words {
                Ok(payload)
            } else {
                Err(bad(words))
            }
        };

        Ok(match opcode {
            Opcode::BeginComputePass => {
                fixed(0)?;
                Command::BeginComputePass
            }
            Opcode::EndComputePass => {
                fixed(0)?;
                Command::EndComputePass
            }
            Opcode::BeginRenderPass => {
                let p = fixed(2)?;
                Command::BeginRenderPass {
                    render_pass: RenderPassId(p[0]),
                    framebuffer: FramebufferId(p[1]),
                }
            }
            Opcode::EndRenderPass => {
                fixed(0)?;
                Command::EndRenderPass
            }
            Opcode::BeginRenderSubpass => {
                fixed(0)?;
                Command::BeginRenderSubpass
            }
            Opcode::EndRenderSubpass => {
                fixed(0)?;
                Command::EndRenderSubpass
            }
            Opcode::SetComputePipeline => Command::SetComputePipeline(PipelineId(fixed(1)?[0])),
            Opcode::SetRenderPipeline => Command::SetRenderPipeline(PipelineId(fixed(1)?[0])),
            Opcode::SetPushConstants => {
                let count = *payload.get(2).ok_or(bad(3))? as usize;
                let p = fixed(3 + count)?;
                Command::SetPushConstants {
                    stages: ShaderStages::from_bits_retain(p[0]),
                    offset: p[1],
                    values: &p[3..],
                }
            }
            Opcode::SetBindGroup => {
                let p = fixed(2)?;
                Command::SetBindGroup {
                    index: p[0],
                    group: BindGroupId(p[1]),
                }
            }
            Opcode::SetVertexBuffers => {
                let count = *payload.get(1).ok_or(bad(2))? as usize;
                let p = fixed(2 + count * VertexBuffers::STRIDE)?;
                Command::SetVertexBuffers {
                    start_slot: p[0],
                    buffers: VertexBuffers { words: &p[2..] },
                }
            }
            Opcode::SetIndexBuffer => {
                let p = fixed(3)?;
                Command::SetIndexBuffer {
                    buffer: BufferId(p[0]),
                    offset: qword(p[1], p[2]),
                }
            }
            Opcode::SetStencilReference => Command::SetStencilReference(fixed(1)?[0]),
            Opcode::SetBlendColor => {
                let p = fixed(4)?;
                Command::SetBlendColor(Color::new(
                    f32::from_bits(p[0]),
                    f32::from_bits(p[1]),
                    f32::from_bits(p[2]),
                    f32::from_bits(p[3]),
                ))
            }
            Opcode::Draw => {
                let p = fixed(4)?;
                Command::Draw(DrawArgs {
                    vertex_count: p[0],
                    instance_count: p[1],
                    first_vertex: p[2],
                    first_instance: p[3],
                })
            }
            Opcode::DrawIndexed => {
                let p = fixed(5)?;
                Command::DrawIndexed(DrawIndexedArgs {
                    index_count: p[0],
                    instance_count: p[1],
                    first_index: p[2],
                    base_vertex: p[3] as i32,
                    first_instance: p[4],
                })
            }
            Opcode::Dispatch => {
                let p = fixed(3)?;
                Command::Dispatch {
                    x: p[0],
                    y: p[1],
                    z: p[2],
                }
            }
            Opcode::CopyBufferToBuffer => {
                let p = fixed(8)?;
                Command::CopyBufferToBuffer(BufferCopy {
                    src: BufferId(p[0]),
                    src_offset: qword(p[1], p[2]),
                    dst: BufferId(p[3]),
                    dst_offset: qword(p[4], p[5]),
                    size: qword(p[6], p[7]),
                })
            }
            Opcode::CopyBufferToTexture => Command::CopyBufferToTexture(
                decode_buffer_texture_copy(fixed(BUFFER_TEXTURE_COPY_WORDS)?),
            ),
            Opcode::CopyTextureToBuffer => Command::CopyTextureToBuffer(
                decode_buffer_texture_copy(fixed(BUFFER_TEXTURE_COPY_WORDS)?),
            ),
            Opcode::TransitionBufferUsage => {
                let p = fixed(2)?;
                Command::TransitionBufferUsage {
                    buffer: BufferId(p[0]),
                    usage: BufferUsage::from_bits_retain(p[1]),
                }
            }
            Opcode::TransitionTextureUsage => {
                let p = fixed(2)?;
                Command::TransitionTextureUsage {
                    texture: TextureId(p[0]),
                    usage: TextureUsage::from_bits_retain(p[1]),
                }
            }
        })
    }
}
