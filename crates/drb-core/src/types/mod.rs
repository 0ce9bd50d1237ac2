//! Core data types and enums shared by the session and trading layers.

pub mod enums;
pub mod trading;

pub use enums::*;
pub use trading::*;
