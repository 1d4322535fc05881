use foundation::math::Vec3;
use tiling::tile_key::TileKey;

/// How a bound index list is assembled into primitives.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PrimitiveMode {
    TriangleStrip,
    Lines,
    LineStrip,
}

/// Index and texture-coordinate data shared by every tile of one size.
#[derive(Debug, Copy, Clone)]
pub struct TopologyBinding<'a> {
    /// Tile size in cells, `(width, height)`.
    pub cells: (u32, u32),
    pub strip_indices: &'a [u32],
    pub wireframe_indices: &'a [u32],
    pub outline_indices: &'a [u32],
    /// Interleaved `(s, t)` pairs, one per vertex.
    pub texcoords: &'a [f32],
}

/// One indexed draw of a tile's resident vertex buffer.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DrawIndexed {
    pub tile: TileKey,
    pub mode: PrimitiveMode,
    pub index_count: u32,
    /// World-space origin the `f32` vertices are relative to.
    pub reference_center: Vec3,
}

/// The rendering backend as seen by the terrain renderer.
///
/// Vertex buffers are addressed by tile: uploading for a tile replaces that
/// tile's previous buffer.
pub trait GraphicsContext {
    fn upload_vertex_buffer(&mut self, tile: TileKey, vertices: &[f32]);

    fn bind_shared_topology(&mut self, topology: TopologyBinding<'_>);

    fn draw_indexed(&mut self, draw: DrawIndexed);
}
