use std::collections::HashMap;
use std::sync::Arc;

use gpu::context::TopologyBinding;
use parking_lot::Mutex;

/// Index and texture-coordinate data for every tile of one size.
///
/// Vertices form a `(height + 3) x (width + 3)` grid, row-major from the
/// south-west corner; the outermost ring is the skirt.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedTopology {
    pub width: u32,
    pub height: u32,
    pub strip_indices: Vec<u32>,
    pub wireframe_indices: Vec<u32>,
    pub outline_indices: Vec<u32>,
    pub texcoords: Vec<f32>,
}

impl SharedTopology {
    pub fn build(width: u32, height: u32) -> Self {
        let cols = width + 3;
        let rows = height + 3;
        Self {
            width,
            height,
            strip_indices: strip_indices(rows, cols),
            wireframe_indices: wireframe_indices(width, height, cols),
            outline_indices: outline_indices(width, height, cols),
            texcoords: texcoords(width, height),
        }
    }

    /// Vertices per tile including the skirt ring.
    pub fn vertex_count(&self) -> usize {
        (self.width as usize + 3) * (self.height as usize + 3)
    }

    pub fn binding(&self) -> TopologyBinding<'_> {
        TopologyBinding {
            cells: (self.width, self.height),
            strip_indices: &self.strip_indices,
            wireframe_indices: &self.wireframe_indices,
            outline_indices: &self.outline_indices,
            texcoords: &self.texcoords,
        }
    }
}

/// One triangle strip over the whole grid, rows joined by degenerate
/// triangles. Every row contributes an even count so winding is kept.
fn strip_indices(rows: u32, cols: u32) -> Vec<u32> {
    let mut out = Vec::with_capacity(((rows - 1) * (2 * cols + 2)) as usize);
    for r in 0..rows - 1 {
        if r > 0 {
            out.push(r * cols + cols - 1);
            out.push(r * cols);
        }
        for c in 0..cols {
            out.push(r * cols + c);
            out.push((r + 1) * cols + c);
        }
    }
    out
}

/// Line pairs along every interior cell edge.
fn wireframe_indices(width: u32, height: u32, cols: u32) -> Vec<u32> {
    let at = |r: u32, c: u32| (r + 1) * cols + (c + 1);
    let mut out = Vec::new();
    for r in 0..=height {
        for c in 0..width {
            out.extend([at(r, c), at(r, c + 1)]);
        }
    }
    for c in 0..=width {
        for r in 0..height {
            out.extend([at(r, c), at(r + 1, c)]);
        }
    }
    out
}

/// Closed line strip around the interior, counter-clockwise from the
/// south-west corner.
fn outline_indices(width: u32, height: u32, cols: u32) -> Vec<u32> {
    let at = |r: u32, c: u32| (r + 1) * cols + (c + 1);
    let mut out = Vec::with_capacity(2 * (width + height) as usize + 1);
    out.extend((0..width).map(|c| at(0, c)));
    out.extend((0..height).map(|r| at(r, width)));
    out.extend((1..=width).rev().map(|c| at(height, c)));
    out.extend((1..=height).rev().map(|r| at(r, 0)));
    out.push(at(0, 0));
    out
}

/// Skirt vertices repeat the coordinates of the edge they hang from.
fn texcoords(width: u32, height: u32) -> Vec<f32> {
    let mut out = Vec::with_capacity(2 * (width as usize + 3) * (height as usize + 3));
    for r in 0..height + 3 {
        let t = grid_index(r, height) as f32 / height as f32;
        for c in 0..width + 3 {
            let s = grid_index(c, width) as f32 / width as f32;
            out.extend([s, t]);
        }
    }
    out
}

/// Interior sample index for a position on the skirted grid.
pub(crate) fn grid_index(i: u32, cells: u32) -> u32 {
    i.saturating_sub(1).min(cells)
}

/// Topology per `(width, height)`, shared by reference between tessellators.
#[derive(Debug, Default)]
pub struct TopologyCache {
    entries: Mutex<HashMap<(u32, u32), Arc<SharedTopology>>>,
}

impl TopologyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(&self, width: u32, height: u32) -> Arc<SharedTopology> {
        self.entries
            .lock()
            .entry((width, height))
            .or_insert_with(|| Arc::new(SharedTopology::build(width, height)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
