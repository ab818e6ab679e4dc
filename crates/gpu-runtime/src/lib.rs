//! `gpu-runtime` replays recorded GPU command streams against a native driver
//! and tracks GPU/CPU asynchrony for the resources those streams touch.
//!
//! The crate provides:
//! - A word-addressed command stream format with a writer and decoder (see [`cmd`]).
//! - Serial-ordered deferral queues and per-device completion tracking
//!   (see [`SerialQueue`] and [`CompletionTracker`]).
//! - A sub-allocating device memory allocator with deferred reclamation
//!   (see [`memory::MemoryAllocator`]).
//! - Usage/state transition policy and redundant-state elision caches
//!   (see [`state_tracker`] and [`elision`]).
//! - A generic command executor plus GL, D3D12 and Vulkan backends that drive
//!   the native APIs through entry-point traits (see [`executor`] and [`backend`]).

mod config;
mod error;
mod format;
mod serial;
mod usage;

pub mod backend;
pub mod cmd;
pub mod device;
pub mod elision;
pub mod executor;
pub mod map_read;
pub mod memory;
pub mod objects;
pub mod state_tracker;

pub use config::RuntimeConfig;
pub use device::{CompletionTracker, ReleaseQueue, SubmissionTracker};
pub use error::{ExecuteError, GpuError, ObjectError};
pub use format::{
    Color, CompareFunction, IndexFormat, PrimitiveTopology, TextureFormat, VertexFormat,
    VertexStepMode,
};
pub use serial::{Serial, SerialQueue};
pub use usage::{BufferUsage, PerStage, ShaderStage, ShaderStages, TextureUsage};

#[cfg(test)]
mod tests;
