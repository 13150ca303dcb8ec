// Standard vertex format is to have two streams:
// Position = positions only
// Attributes = all other data, interleaved
use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Zeroable, Pod)]
pub struct Position {
    pub position: [f32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Zeroable, Pod)]
pub struct Attributes {
    pub normal: [f32; 3],
    pub colour: [f32; 3],
    pub tex_coord: [f32; 2],
    pub bone_ids: [u32; 4],
    pub bone_weights: [f32; 4],
}

/// CPU side vertex storage shared by every mesh of one model. Indices are
/// relative to the start of the streams, offset per submesh.
pub struct Buffers {
    pub positions: Vec<Position>,
    pub attributes: Vec<Attributes>,
    pub indices: Vec<u32>,
}

impl Buffers {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            positions: Vec::new(),
            attributes: Vec::new(),
            indices: Vec::new(),
        }
    }
}

impl Default for Buffers {
    fn default() -> Self {
        Self::new()
    }
}
