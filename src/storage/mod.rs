pub mod write_buffer;
pub mod blob_store;
pub mod chunk;
pub mod layout;
pub mod file_lock;
pub mod merge_policy;
