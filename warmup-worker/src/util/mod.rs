//! Utility modules.

pub mod address;
pub mod chance;

pub use address::normalize_address;
pub use chance::{Chance, ThreadChance};
