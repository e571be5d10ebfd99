//! Terrastream - streamed procedural terrain from layered buffered noise

pub mod core;
pub mod terrain;
pub mod mesh;
pub mod streaming;
pub mod gpu;
