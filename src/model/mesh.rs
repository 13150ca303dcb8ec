/// A leaf renderable unit: a contiguous range of the shared index buffer
/// plus a material reference. `vertex_offset` is added to every index in
/// the range to address the shared vertex streams.
#[derive(Clone, Debug)]
pub struct Mesh {
    pub name: String,
    pub first_index: u32,
    pub index_count: u32,
    pub vertex_offset: u32,
    pub vertex_count: u32,
    pub material_id: Option<usize>,
    /// Owning node, for the per submesh world transform
    pub node: usize,
    pub visible: bool,
}
