//! Quadtree addressing shared by the elevation resolver and the terrain
//! tessellator.
//!
//! Both subsystems derive tile sectors and parent/child keys exclusively
//! through this crate, so sibling tiles computed on either side always agree.

pub mod config;
pub mod level;
pub mod level_set;
pub mod tile_key;

pub use config::*;
pub use level::*;
pub use level_set::*;
pub use tile_key::*;
