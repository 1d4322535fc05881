pub mod ellipsoid;
pub mod local;
pub mod vec;

pub use ellipsoid::*;
pub use local::*;
pub use vec::*;
