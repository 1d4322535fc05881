//! Multi-resolution elevation queries over a tiled `LevelSet`.
//!
//! Reads never block: a miss answers from coarser resident data (or the
//! coverage minimum) and queues a background load for the missing tile.

pub mod config;
pub mod error;
pub mod feed;
pub mod loader;
pub mod model;
pub mod task;
pub mod tile;

pub use config::*;
pub use error::*;
pub use feed::*;
pub use loader::*;
pub use model::*;
pub use task::*;
pub use tile::*;
