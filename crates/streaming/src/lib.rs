//! Memory-bounded tile caching and deduplicated background loading.

pub mod cache;
pub mod pipeline;

pub use cache::*;
pub use pipeline::*;
