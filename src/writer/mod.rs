pub mod indexation;
pub mod compaction;

use std::sync::Arc;
use crate::accessor::chunk::ChunkData;
use crate::accessor::config::AccessorConfig;
use crate::core::error::Result;
use crate::core::types::Value;
use crate::storage::blob_store::BlobStore;
use crate::storage::chunk::Chunk;

/// Encode `values` under `config` into chunks of at most `max_rows` rows,
/// numbered from `first_row`. Chunks come back unpublished.
pub(crate) fn write_chunks(
    store: &Arc<dyn BlobStore>,
    column: &str,
    first_row: u64,
    values: &[Value],
    config: &AccessorConfig,
    max_rows: usize,
) -> Result<Vec<Arc<Chunk>>> {
    let mut chunks = Vec::with_capacity(values.len().div_ceil(max_rows.max(1)));
    let mut next_row = first_row;
    for part in values.chunks(max_rows.max(1)) {
        let data = ChunkData::encode(part, config);
        chunks.push(Chunk::write(store.clone(), column, next_row, &data)?);
        next_row += part.len() as u64;
    }
    Ok(chunks)
}
