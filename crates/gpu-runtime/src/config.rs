/// Tunables shared by the executor and backend devices.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Emit a `trace!` event for every decoded command record.
    pub trace_commands: bool,
    /// Size of the device memory blocks the allocator sub-allocates from.
    /// Requests larger than this get a dedicated block.
    pub memory_block_size: u64,
    /// Alignment applied to buffer sizes on backends that require it
    /// (D3D12 constant buffer placement).
    pub buffer_alignment: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            trace_commands: false,
            memory_block_size: 64 * 1024 * 1024,
            buffer_alignment: 256,
        }
    }
}
