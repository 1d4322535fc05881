pub mod context;
pub mod recorder;

pub use context::*;
pub use recorder::*;
