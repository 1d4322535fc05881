use std::collections::BTreeMap;

use tiling::tile_key::TileKey;

use crate::context::{DrawIndexed, GraphicsContext, TopologyBinding};

#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    UploadVertexBuffer {
        tile: TileKey,
        floats: usize,
    },
    BindTopology {
        cells: (u32, u32),
        strip_len: usize,
    },
    Draw(DrawIndexed),
}

/// Commands issued during one frame.
#[derive(Debug, Default)]
pub struct CommandLog {
    pub commands: Vec<GpuCommand>,
}

impl CommandLog {
    pub fn uploads(&self) -> impl Iterator<Item = TileKey> + '_ {
        self.commands.iter().filter_map(|c| match c {
            GpuCommand::UploadVertexBuffer { tile, .. } => Some(*tile),
            _ => None,
        })
    }

    pub fn draws(&self) -> impl Iterator<Item = &DrawIndexed> + '_ {
        self.commands.iter().filter_map(|c| match c {
            GpuCommand::Draw(draw) => Some(draw),
            _ => None,
        })
    }
}

/// Backend that records commands instead of talking to a device.
///
/// Keeps a copy of every resident vertex buffer so callers can inspect what
/// would be on the GPU.
#[derive(Debug, Default)]
pub struct RecordingContext {
    frame: CommandLog,
    buffers: BTreeMap<TileKey, Vec<f32>>,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the commands recorded since the last call.
    pub fn take_frame(&mut self) -> CommandLog {
        std::mem::take(&mut self.frame)
    }

    pub fn frame(&self) -> &CommandLog {
        &self.frame
    }

    pub fn resident_buffer(&self, tile: &TileKey) -> Option<&[f32]> {
        self.buffers.get(tile).map(Vec::as_slice)
    }

    pub fn resident_count(&self) -> usize {
        self.buffers.len()
    }
}

impl GraphicsContext for RecordingContext {
    fn upload_vertex_buffer(&mut self, tile: TileKey, vertices: &[f32]) {
        self.buffers.insert(tile, vertices.to_vec());
        self.frame.commands.push(GpuCommand::UploadVertexBuffer {
            tile,
            floats: vertices.len(),
        });
    }

    fn bind_shared_topology(&mut self, topology: TopologyBinding<'_>) {
        self.frame.commands.push(GpuCommand::BindTopology {
            cells: topology.cells,
            strip_len: topology.strip_indices.len(),
        });
    }

    fn draw_indexed(&mut self, draw: DrawIndexed) {
        self.frame.commands.push(GpuCommand::Draw(draw));
    }
}
