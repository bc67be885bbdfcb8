//! The quoting domain: offer, group, material, product and part tables,
//! and the part formula pass.

pub mod parts;
pub mod tables;

pub use parts::recompute;
