//! Dynamic containers (spec §4.1), the leaf layer everything else is built on.

pub mod fnv;
pub mod map;
pub mod set;
pub mod vec;

pub use map::OpenMap;
pub use set::OpenSet;
pub use vec::GrowVec;
