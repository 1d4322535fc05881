pub mod view;
pub mod visibility;

pub use view::*;
pub use visibility::*;
