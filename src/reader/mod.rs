pub mod chunk_cache;
pub mod snapshot_reader;
