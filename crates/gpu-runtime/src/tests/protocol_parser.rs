use pretty_assertions::assert_eq;

use crate::cmd::{
    BufferTextureCopy, CmdParseError, CmdStream, CmdWriter, Command, DrawIndexedArgs, Extent3d,
    Opcode, Origin3d,
};
use crate::format::Color;
use crate::objects::{BufferId, FramebufferId, RenderPassId, TextureId, VertexBufferBinding};
use crate::usage::{BufferUsage, ShaderStages};

fn decode_all(words: &[u32]) -> Result<Vec<Command<'_>>, CmdParseError> {
    CmdStream::new(words).commands().collect()
}

#[test]
fn writer_output_decodes_to_the_recorded_commands() {
    let mut w = CmdWriter::new();
    w.begin_render_pass(RenderPassId(1), FramebufferId(2));
    w.set_push_constants(ShaderStages::VERTEX | ShaderStages::FRAGMENT, 4, &[7, 8]);
    w.set_vertex_buffers(
        1,
        &[
            VertexBufferBinding {
                buffer: BufferId(3),
                offset: 0x1_0000_0010,
            },
            VertexBufferBinding {
                buffer: BufferId(4),
                offset: 0,
            },
        ],
    );
    w.set_blend_color(Color::new(0.25, 0.5, 0.75, 1.0));
    w.draw_indexed(DrawIndexedArgs {
        index_count: 6,
        instance_count: 1,
        first_index: 3,
        base_vertex: -2,
        first_instance: 0,
    });
    w.transition_buffer_usage(BufferId(3), BufferUsage::VERTEX | BufferUsage::INDEX);
    w.end_render_pass();
    let words = w.finish();

    let commands = decode_all(&words).unwrap();
    assert_eq!(commands.len(), 6);
    assert_eq!(
        commands[0],
        Command::BeginRenderPass {
            render_pass: RenderPassId(1),
            framebuffer: FramebufferId(2),
        }
    );
    assert_eq!(
        commands[1],
        Command::SetPushConstants {
            stages: ShaderStages::VERTEX | ShaderStages::FRAGMENT,
            offset: 4,
            values: &[7, 8],
        }
    );
    let Command::SetVertexBuffers { start_slot, buffers } = commands[2] else {
        panic!("expected vertex buffers, got {:?}", commands[2]);
    };
    assert_eq!(start_slot, 1);
    assert_eq!(buffers.len(), 2);
    assert_eq!(buffers.iter().next().map(|b| b.offset), Some(0x1_0000_0010));
    assert_eq!(
        commands[3],
        Command::SetBlendColor(Color::new(0.25, 0.5, 0.75, 1.0))
    );
    let Command::DrawIndexed(args) = commands[4] else {
        panic!("expected indexed draw, got {:?}", commands[4]);
    };
    assert_eq!(args.base_vertex, -2);
    assert_eq!(
        commands[5],
        Command::TransitionBufferUsage {
            buffer: BufferId(3),
            usage: BufferUsage::VERTEX | BufferUsage::INDEX,
        }
    );
}

#[test]
fn buffer_texture_copy_keeps_64bit_offsets() {
    let copy = BufferTextureCopy {
        buffer: BufferId(1),
        buffer_offset: 0xdead_beef_0000,
        row_pitch: 256,
        texture: TextureId(9),
        level: 2,
        origin: Origin3d { x: 1, y: 2, z: 0 },
        extent: Extent3d {
            width: 16,
            height: 8,
            depth: 1,
        },
    };
    let mut w = CmdWriter::new();
    w.copy_buffer_to_texture(copy);
    let words = w.finish();
    assert_eq!(words.len(), 2 + 12);
    assert_eq!(
        decode_all(&words).unwrap(),
        vec![Command::CopyBufferToTexture(copy)]
    );
}

#[test]
fn truncated_header_is_rejected() {
    let words = [Opcode::Draw as u32];
    assert_eq!(
        decode_all(&words),
        Err(CmdParseError::TruncatedHeader { at_word: 0 })
    );
}

#[test]
fn unknown_opcode_is_rejected() {
    let mut w = CmdWriter::new();
    w.begin_compute_pass();
    let mut words = w.finish();
    words.extend_from_slice(&[0xff, 0]);

    let mut commands = CmdStream::new(&words).commands();
    assert_eq!(commands.next(), Some(Ok(Command::BeginComputePass)));
    assert_eq!(
        commands.next(),
        Some(Err(CmdParseError::UnknownOpcode {
            opcode: 0xff,
            at_word: 2,
        }))
    );
    assert_eq!(commands.next(), None);
}

#[test]
fn truncated_payload_is_rejected() {
    let words = [Opcode::Dispatch as u32, 3, 1, 1];
    assert_eq!(
        decode_all(&words),
        Err(CmdParseError::TruncatedPayload {
            opcode: Opcode::Dispatch,
            expected_words: 3,
            remaining_words: 2,
            at_word: 0,
        })
    );
}

#[test]
fn payload_length_must_match_the_record_layout() {
    let words = [Opcode::Dispatch as u32, 2, 1, 1];
    assert_eq!(
        decode_all(&words),
        Err(CmdParseError::BadPayload {
            opcode: Opcode::Dispatch,
            expected_words: 3,
            actual_words: 2,
        })
    );

    // The push constant count must agree with the trailing array.
    let words = [Opcode::SetPushConstants as u32, 4, 1, 0, 2, 5];
    assert_eq!(
        decode_all(&words),
        Err(CmdParseError::BadPayload {
            opcode: Opcode::SetPushConstants,
            expected_words: 5,
            actual_words: 4,
        })
    );
}
