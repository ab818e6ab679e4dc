//! Device memory sub-allocation with deferred reclamation.
//!
//! Memory is reserved from the device in large blocks per memory type and
//! handed out as aligned ranges. Freed ranges are not reusable straight away:
//! they are queued with the serial of the submission that last used them and
//! only return to the free pool once [`MemoryAllocator::tick`] observes that
//! serial as completed.

use std::fmt;
use std::ops::Range;
use std::ptr::NonNull;

use bitflags::bitflags;
use tracing::{debug, warn};

use crate::config::RuntimeConfig;
use crate::error::GpuError;
use crate::serial::{Serial, SerialQueue};

bitflags! {
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct MemoryPropertyFlags: u32 {
        const DEVICE_LOCAL = 0x1;
        const HOST_VISIBLE = 0x2;
        const HOST_COHERENT = 0x4;
        const HOST_CACHED = 0x8;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryType {
    pub properties: MemoryPropertyFlags,
    pub heap_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRequirements {
    pub size: u64,
    pub alignment: u64,
    /// Bit `i` set means memory type `i` may back the resource.
    pub memory_type_bits: u32,
}

/// Device entry points the allocator needs.
pub trait MemoryDevice {
    type Memory: Copy + Eq + fmt::Debug;

    fn memory_types(&self) -> &[MemoryType];

    fn allocate_memory(&mut self, memory_type: u32, size: u64) -> Result<Self::Memory, GpuError>;

    /// Maps the whole allocation persistently.
    fn map_memory(&mut self, memory: Self::Memory, size: u64) -> Result<NonNull<u8>, GpuError>;

    fn free_memory(&mut self, memory: Self::Memory);
}

/// Round `value` up to the nearest multiple of `alignment`.
///
/// `alignment` must be > 0.
pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment > 0);

    let add = alignment - 1;
    match value.checked_add(add) {
        Some(v) => v / alignment * alignment,
        None => u64::MAX / alignment * alignment,
    }
}

/// Picks the memory type for a resource.
///
/// Mappable resources need host-visible, host-coherent memory. Everything
/// else prefers device-local memory and falls back to any allowed type.
pub fn find_memory_type(types: &[MemoryType], type_bits: u32, mappable: bool) -> Option<u32> {
    let allowed = types
        .iter()
        .enumerate()
        .filter(|(index, _)| *index < 32 && type_bits & (1 << index) != 0);

    if mappable {
        let required = MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT;
        return allowed
            .filter(|(_, ty)| ty.properties.contains(required))
            .map(|(index, _)| index as u32)
            .next();
    }

    let mut fallback = None;
    for (index, ty) in allowed {
        if ty.properties.contains(MemoryPropertyFlags::DEVICE_LOCAL) {
            return Some(index as u32);
        }
        fallback.get_or_insert(index as u32);
    }
    fallback
}

/// A range of device memory backing one resource.
///
/// Exclusively owned by that resource until moved into
/// [`MemoryAllocator::free`].
#[derive(Debug)]
pub struct DeviceMemoryAllocation<M> {
    memory: M,
    offset: u64,
    size: u64,
    mapped: Option<NonNull<u8>>,
    block: usize,
}

impl<M: Copy> DeviceMemoryAllocation<M> {
    pub fn memory(&self) -> M {
        self.memory
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Host address of the allocation when it lives in mappable memory.
    pub fn mapped_ptr(&self) -> Option<NonNull<u8>> {
        self.mapped
    }
}

#[derive(Debug)]
struct MemoryBlock<M> {
    memory: M,
    memory_type: u32,
    size: u64,
    mapped: Option<NonNull<u8>>,
    /// Sorted, non-overlapping, never adjacent.
    free: Vec<Range<u64>>,
}

impl<M> MemoryBlock<M> {
    fn new(memory: M, memory_type: u32, size: u64, mapped: Option<NonNull<u8>>) -> Self {
        Self {
            memory,
            memory_type,
            size,
            mapped,
            free: vec![0..size],
        }
    }

    /// First fit over the free list.
    fn try_allocate(&mut self, size: u64, alignment: u64) -> Option<u64> {
        let (index, start) = self.free.iter().enumerate().find_map(|(index, range)| {
            let start = align_up(range.start, alignment);
            let end = start.checked_add(size)?;
            (end <= range.end).then_some((index, start))
        })?;

        let range = self.free.remove(index);
        let end = start + size;
        let mut insert_at = index;
        if range.start < start {
            self.free.insert(insert_at, range.start..start);
            insert_at += 1;
        }
        if end < range.end {
            self.free.insert(insert_at, end..range.end);
        }
        Some(start)
    }

    fn release(&mut self, range: Range<u64>) {
        let index = self.free.partition_point(|free| free.start < range.start);
        debug_assert!(index == 0 || self.free[index - 1].end <= range.start);
        debug_assert!(index == self.free.len() || range.end <= self.free[index].start);

        let merges_prev = index > 0 && self.free[index - 1].end == range.start;
        let merges_next = index < self.free.len() && self.free[index].start == range.end;
        match (merges_prev, merges_next) {
            (true, true) => {
                let next = self.free.remove(index);
                self.free[index - 1].end = next.end;
            }
            (true, false) => self.free[index - 1].end = range.end,
            (false, true) => self.free[index].start = range.start,
            (false, false) => self.free.insert(index, range),
        }
    }

    fn free_bytes(&self) -> u64 {
        self.free.iter().map(|range| range.end - range.start).sum()
    }

    fn mapped_at(&self, offset: u64) -> Option<NonNull<u8>> {
        let base = self.mapped?;
        NonNull::new(base.as_ptr().wrapping_add(offset as usize))
    }
}

#[derive(Debug)]
struct PendingFree {
    block: usize,
    range: Range<u64>,
}

/// Snapshot of allocator occupancy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    pub blocks: usize,
    pub reserved_bytes: u64,
    /// Includes ranges freed but not yet reclaimed.
    pub used_bytes: u64,
    pub pending_free_bytes: u64,
}

pub struct MemoryAllocator<M> {
    blocks: Vec<MemoryBlock<M>>,
    pending: SerialQueue<PendingFree>,
    block_size: u64,
}

impl<M: Copy + Eq + fmt::Debug> MemoryAllocator<M> {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self::with_block_size(config.memory_block_size)
    }

    pub fn with_block_size(block_size: u64) -> Self {
        Self {
            blocks: Vec::new(),
            pending: SerialQueue::new(),
            block_size: block_size.max(1),
        }
    }

    pub fn allocate<D: MemoryDevice<Memory = M>>(
        &mut self,
        device: &mut D,
        requirements: &MemoryRequirements,
        mappable: bool,
    ) -> Result<DeviceMemoryAllocation<M>, GpuError> {
        let memory_type =
            find_memory_type(device.memory_types(), requirements.memory_type_bits, mappable)
                .ok_or(GpuError::NoCompatibleMemoryType {
                    type_bits: requirements.memory_type_bits,
                    mappable,
                })?;
        let size = requirements.size;
        let alignment = requirements.alignment.max(1);

        for (index, block) in self.blocks.iter_mut().enumerate() {
            if block.memory_type != memory_type {
                continue;
            }
            if let Some(offset) = block.try_allocate(size, alignment) {
                return Ok(DeviceMemoryAllocation {
                    memory: block.memory,
                    offset,
                    size,
                    mapped: block.mapped_at(offset),
                    block: index,
                });
            }
        }

        let block_size = size.max(self.block_size);
        let memory = device
            .allocate_memory(memory_type, block_size)
            .map_err(|err| {
                warn!(memory_type, block_size, %err, "device memory allocation failed");
                err
            })?;
        let mapped = if mappable {
            match device.map_memory(memory, block_size) {
                Ok(ptr) => Some(ptr),
                Err(err) => {
                    device.free_memory(memory);
                    return Err(err);
                }
            }
        } else {
            None
        };
        debug!(memory_type, block_size, mappable, "reserved device memory block");

        let mut block = MemoryBlock::new(memory, memory_type, block_size, mapped);
        let offset = block
            .try_allocate(size, alignment)
            .ok_or(GpuError::OutOfMemory { requested: size })?;
        let allocation = DeviceMemoryAllocation {
            memory,
            offset,
            size,
            mapped: block.mapped_at(offset),
            block: self.blocks.len(),
        };
        self.blocks.push(block);
        Ok(allocation)
    }

    /// Returns `allocation` to the allocator once `serial` has completed.
    ///
    /// Until then the range may still be read or written by in-flight GPU
    /// work and is not handed out again.
    pub fn free(&mut self, allocation: DeviceMemoryAllocation<M>, serial: Serial) {
        let range = allocation.offset..allocation.offset + allocation.size;
        self.pending.enqueue(
            PendingFree {
                block: allocation.block,
                range,
            },
            serial,
        );
    }

    /// Reclaims every range freed at or before `finished`.
    pub fn tick(&mut self, finished: Serial) {
        let mut reclaimed = 0u64;
        for pending in self.pending.drain_up_to(finished) {
            reclaimed += pending.range.end - pending.range.start;
            self.blocks[pending.block].release(pending.range);
        }
        if reclaimed > 0 {
            debug!(%finished, reclaimed, "reclaimed device memory");
        }
    }

    pub fn stats(&self) -> AllocatorStats {
        let reserved_bytes: u64 = self.blocks.iter().map(|block| block.size).sum();
        let free_bytes: u64 = self.blocks.iter().map(MemoryBlock::free_bytes).sum();
        AllocatorStats {
            blocks: self.blocks.len(),
            reserved_bytes,
            used_bytes: reserved_bytes - free_bytes,
            pending_free_bytes: self
                .pending
                .iter()
                .map(|pending| pending.range.end - pending.range.start)
                .sum(),
        }
    }

    /// Returns every block to the device. All frees must have been reclaimed.
    pub fn destroy<D: MemoryDevice<Memory = M>>(mut self, device: &mut D) {
        debug_assert!(
            self.pending.is_empty(),
            "device memory freed but never reclaimed"
        );
        for block in self.blocks.drain(..) {
            device.free_memory(block.memory);
        }
    }
}

impl<M> Drop for MemoryAllocator<M> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            debug_assert!(
                self.pending.is_empty(),
                "{} device memory ranges outlived their GPU fence",
                self.pending.len()
            );
        }
    }
}
