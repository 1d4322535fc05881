pub mod bounds;
pub mod math;
pub mod sector;

// Foundation crate: small, well-tested primitives only.
pub use bounds::*;
pub use sector::*;
