use bytemuck::{Pod, Zeroable};

#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    R8G8B8A8Unorm = 0,
    R8G8Unorm = 1,
    R8Unorm = 2,
    R8G8B8A8Uint = 3,
    B8G8R8A8Unorm = 4,
    D32FloatS8Uint = 5,
}

impl TextureFormat {
    /// Bytes per texel, used to convert byte row pitches into texel row lengths.
    pub fn texel_size(self) -> u32 {
        match self {
            TextureFormat::R8G8B8A8Unorm
            | TextureFormat::R8G8B8A8Uint
            | TextureFormat::B8G8R8A8Unorm => 4,
            TextureFormat::R8G8Unorm => 2,
            TextureFormat::R8Unorm => 1,
            TextureFormat::D32FloatS8Uint => 8,
        }
    }

    pub fn has_depth(self) -> bool {
        matches!(self, TextureFormat::D32FloatS8Uint)
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, TextureFormat::D32FloatS8Uint)
    }

    pub fn has_depth_or_stencil(self) -> bool {
        self.has_depth() || self.has_stencil()
    }
}

#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    Uint16 = 0,
    Uint32 = 1,
}

impl IndexFormat {
    pub fn size(self) -> u64 {
        match self {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }
}

#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    FloatR32G32B32A32 = 0,
    FloatR32G32B32 = 1,
    FloatR32G32 = 2,
    FloatR32 = 3,
    UnormR8G8B8A8 = 4,
    UnormR8G8 = 5,
}

impl VertexFormat {
    pub fn components(self) -> u32 {
        match self {
            VertexFormat::FloatR32G32B32A32 | VertexFormat::UnormR8G8B8A8 => 4,
            VertexFormat::FloatR32G32B32 => 3,
            VertexFormat::FloatR32G32 | VertexFormat::UnormR8G8 => 2,
            VertexFormat::FloatR32 => 1,
        }
    }

    pub fn is_normalized(self) -> bool {
        matches!(self, VertexFormat::UnormR8G8B8A8 | VertexFormat::UnormR8G8)
    }
}

#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum VertexStepMode {
    Vertex = 0,
    Instance = 1,
}

#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    PointList = 0,
    LineList = 1,
    LineStrip = 2,
    TriangleList = 3,
    TriangleStrip = 4,
}

#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Never = 0,
    Less = 1,
    LessEqual = 2,
    Greater = 3,
    GreaterEqual = 4,
    Equal = 5,
    NotEqual = 6,
    Always = 7,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const TRANSPARENT: Color = Color::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [f32; 4] {
        bytemuck::cast(self)
    }
}
