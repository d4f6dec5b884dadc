use roaring::RoaringBitmap;
use crate::accessor::config::{AccessorConfig, AccessorKind};
use crate::core::types::Value;

/// Encoded values of one column over a contiguous row range.
///
/// The variant is the chunk's own encoding stamp; it never changes after
/// the chunk is built.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkData {
    Plain {
        values: Vec<Value>,
    },
    Sparsed {
        default: Value,
        row_count: u32,
        offsets: RoaringBitmap,   // Rows stored explicitly
        values: Vec<Value>,       // One per offset, in offset order
    },
}

impl ChunkData {
    /// Encode `values` under `config`. The config is assumed validated and
    /// `values.len()` must fit in a `u32`.
    pub fn encode(values: &[Value], config: &AccessorConfig) -> Self {
        match config {
            AccessorConfig::Plain => ChunkData::Plain {
                values: values.to_vec(),
            },
            AccessorConfig::Sparsed { default } => {
                let mut offsets = RoaringBitmap::new();
                let mut explicit = Vec::new();
                for (offset, value) in values.iter().enumerate() {
                    if value != default {
                        offsets.insert(offset as u32);
                        explicit.push(value.clone());
                    }
                }
                ChunkData::Sparsed {
                    default: default.clone(),
                    row_count: values.len() as u32,
                    offsets,
                    values: explicit,
                }
            }
        }
    }

    pub fn decode(&self) -> Vec<Value> {
        match self {
            ChunkData::Plain { values } => values.clone(),
            ChunkData::Sparsed { default, row_count, offsets, values } => {
                let mut out = vec![default.clone(); *row_count as usize];
                for (offset, value) in offsets.iter().zip(values) {
                    out[offset as usize] = value.clone();
                }
                out
            }
        }
    }

    pub fn row_count(&self) -> usize {
        match self {
            ChunkData::Plain { values } => values.len(),
            ChunkData::Sparsed { row_count, .. } => *row_count as usize,
        }
    }

    pub fn kind(&self) -> AccessorKind {
        match self {
            ChunkData::Plain { .. } => AccessorKind::Plain,
            ChunkData::Sparsed { .. } => AccessorKind::Sparsed,
        }
    }

    /// The config this chunk was built under
    pub fn stamp(&self) -> AccessorConfig {
        match self {
            ChunkData::Plain { .. } => AccessorConfig::Plain,
            ChunkData::Sparsed { default, .. } => AccessorConfig::Sparsed {
                default: default.clone(),
            },
        }
    }

    /// Number of physically stored values
    pub fn explicit_count(&self) -> usize {
        match self {
            ChunkData::Plain { values } => values.len(),
            ChunkData::Sparsed { values, .. } => values.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Value> {
        vec![
            Value::utf8("abcde"),
            Value::utf8("x"),
            Value::utf8("abcde"),
            Value::Null,
            Value::utf8("abcde"),
            Value::utf8("y"),
        ]
    }

    #[test]
    fn test_plain_stores_every_value() {
        let chunk = ChunkData::encode(&sample(), &AccessorConfig::Plain);
        assert_eq!(chunk.kind(), AccessorKind::Plain);
        assert_eq!(chunk.explicit_count(), 6);
        assert_eq!(chunk.decode(), sample());
    }

    #[test]
    fn test_sparsed_omits_defaults() {
        let config = AccessorConfig::sparsed(Value::utf8("abcde"));
        let chunk = ChunkData::encode(&sample(), &config);
        assert_eq!(chunk.kind(), AccessorKind::Sparsed);
        assert_eq!(chunk.row_count(), 6);
        assert_eq!(chunk.explicit_count(), 3);
        assert_eq!(chunk.stamp(), config);
        assert_eq!(chunk.decode(), sample());
    }

    #[test]
    fn test_sparsed_all_default_and_none_default() {
        let config = AccessorConfig::sparsed(Value::Int64(0));
        let zeros = vec![Value::Int64(0); 100];
        let chunk = ChunkData::encode(&zeros, &config);
        assert_eq!(chunk.explicit_count(), 0);
        assert_eq!(chunk.decode(), zeros);

        let ones = vec![Value::Int64(1); 10];
        let chunk = ChunkData::encode(&ones, &config);
        assert_eq!(chunk.explicit_count(), 10);
        assert_eq!(chunk.decode(), ones);
    }

    #[test]
    fn test_empty_input() {
        for config in [AccessorConfig::Plain, AccessorConfig::sparsed(Value::Bool(false))] {
            let chunk = ChunkData::encode(&[], &config);
            assert_eq!(chunk.row_count(), 0);
            assert!(chunk.decode().is_empty());
        }
    }
}
