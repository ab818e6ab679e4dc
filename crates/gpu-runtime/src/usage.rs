use std::ops::{Index, IndexMut};

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const MAP_READ = 1 << 0;
        const MAP_WRITE = 1 << 1;
        const TRANSFER_SRC = 1 << 2;
        const TRANSFER_DST = 1 << 3;
        const INDEX = 1 << 4;
        const VERTEX = 1 << 5;
        const UNIFORM = 1 << 6;
        const STORAGE = 1 << 7;
    }
}

impl BufferUsage {
    /// Buffers created for host mapping are pinned to a single native state
    /// for their whole lifetime.
    pub fn is_host_mapped(self) -> bool {
        self.intersects(Self::MAP_READ | Self::MAP_WRITE)
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const SAMPLED = 1 << 2;
        const STORAGE = 1 << 3;
        const OUTPUT_ATTACHMENT = 1 << 4;
        const PRESENT = 1 << 5;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ShaderStage {
    Vertex = 0,
    Fragment = 1,
    Compute = 2,
}

impl ShaderStage {
    pub const COUNT: usize = 3;
    pub const ALL: [ShaderStage; Self::COUNT] =
        [ShaderStage::Vertex, ShaderStage::Fragment, ShaderStage::Compute];

    pub fn flag(self) -> ShaderStages {
        match self {
            ShaderStage::Vertex => ShaderStages::VERTEX,
            ShaderStage::Fragment => ShaderStages::FRAGMENT,
            ShaderStage::Compute => ShaderStages::COMPUTE,
        }
    }
}

impl ShaderStages {
    /// Individual stages contained in the set, in stage order.
    pub fn stages(self) -> impl Iterator<Item = ShaderStage> {
        ShaderStage::ALL
            .into_iter()
            .filter(move |stage| self.contains(stage.flag()))
    }
}

/// Fixed per-stage storage indexed by [`ShaderStage`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerStage<T>(pub [T; ShaderStage::COUNT]);

impl<T> PerStage<T> {
    pub fn iter(&self) -> impl Iterator<Item = (ShaderStage, &T)> {
        ShaderStage::ALL.into_iter().zip(self.0.iter())
    }
}

impl<T> Index<ShaderStage> for PerStage<T> {
    type Output = T;

    fn index(&self, stage: ShaderStage) -> &T {
        &self.0[stage as usize]
    }
}

impl<T> IndexMut<ShaderStage> for PerStage<T> {
    fn index_mut(&mut self, stage: ShaderStage) -> &mut T {
        &mut self.0[stage as usize]
    }
}
