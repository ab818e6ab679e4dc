use crate::cmd::CmdParseError;

/// Failure reported by a native driver entry point.
///
/// Native failures are never retried internally; they abort the pending
/// submission and surface to the device owner.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GpuError {
    #[error("out of device memory (requested {requested} bytes)")]
    OutOfMemory { requested: u64 },
    #[error("no memory type satisfies type bits {type_bits:#x} (mappable={mappable})")]
    NoCompatibleMemoryType { type_bits: u32, mappable: bool },
    #[error("device lost")]
    DeviceLost,
    #[error("native call {call} failed with code {code:#x}")]
    Native { call: &'static str, code: i32 },
}

/// A command or resource referenced an object the table does not know about.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObjectError {
    #[error("unknown {kind} {id}")]
    Unknown { kind: &'static str, id: u32 },
    #[error("{kind} {id} is not registered with the backend")]
    Unregistered { kind: &'static str, id: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error(transparent)]
    Parse(#[from] CmdParseError),
    #[error(transparent)]
    Object(#[from] ObjectError),
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error("{0} issued with no pipeline bound")]
    NoBoundPipeline(&'static str),
    #[error("{0} issued outside of a render pass")]
    NotInRenderPass(&'static str),
    #[error("subpass {index} begun but the render pass has {count}")]
    SubpassOutOfRange { index: u32, count: u32 },
    #[error("attachment {0} is not part of the render pass and framebuffer")]
    InvalidAttachment(u32),
    #[error("{what} reach slot {end} but only {limit} exist")]
    SlotOutOfRange {
        what: &'static str,
        end: u32,
        limit: u32,
    },
}
