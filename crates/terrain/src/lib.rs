//! Terrain mesh assembly.
//!
//! Walks the tile quadtree each frame, picks the tiles that meet the view's
//! level-of-detail criteria and keeps a skirted vertex grid for each of them,
//! rebuilt only where elevation data changed.

pub mod config;
pub mod error;
pub mod geometry;
pub mod tessellator;
pub mod tile;
pub mod topology;

pub use config::*;
pub use error::*;
pub use geometry::*;
pub use tessellator::*;
pub use tile::*;
pub use topology::*;
