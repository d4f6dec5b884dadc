//! Per-column physical encodings ("accessors") and their blob format.

pub mod config;
pub mod chunk;
pub mod codec;

pub use self::chunk::ChunkData;
pub use self::config::{AccessorConfig, AccessorKind};
