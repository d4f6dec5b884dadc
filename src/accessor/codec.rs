use crc32fast::Hasher;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use crate::accessor::chunk::ChunkData;
use crate::accessor::config::AccessorKind;
use crate::core::error::{Error, Result};
use crate::core::types::Value;

/// Fixed-size chunk blob header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub version: u16,
    pub kind: AccessorKind,
    pub row_count: u32,
    pub body_len: u32,
    pub checksum: u32,   // CRC32 of the body
}

impl ChunkHeader {
    pub const MAGIC: [u8; 4] = *b"CSCK";
    pub const VERSION: u16 = 1;
    pub const SIZE: usize = 20;

    // [ MAGIC:4 | VERSION:2 | KIND:1 | RESERVED:1 | ROWS:4 | BODY_LEN:4 | CRC:4 ]
    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&Self::MAGIC);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.push(self.kind.code());
        out.push(0);
        out.extend_from_slice(&self.row_count.to_le_bytes());
        out.extend_from_slice(&self.body_len.to_le_bytes());
        out.extend_from_slice(&self.checksum.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::corrupted(format!(
                "chunk blob too short: {} bytes",
                buf.len()
            )));
        }
        if buf[0..4] != Self::MAGIC {
            return Err(Error::corrupted("bad chunk magic"));
        }
        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version != Self::VERSION {
            return Err(Error::corrupted(format!("unsupported chunk version {}", version)));
        }
        let kind = AccessorKind::from_code(buf[6])
            .ok_or_else(|| Error::corrupted(format!("unknown accessor code {}", buf[6])))?;
        let read_u32 = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);

        Ok(ChunkHeader {
            version,
            kind,
            row_count: read_u32(8),
            body_len: read_u32(12),
            checksum: read_u32(16),
        })
    }
}

#[derive(Serialize, Deserialize)]
struct PlainBody {
    values: Vec<Value>,
}

#[derive(Serialize, Deserialize)]
struct SparsedBody {
    default: Value,
    offsets: Vec<u8>,   // Portable RoaringBitmap serialization
    values: Vec<Value>,
}

/// Serialize a chunk into its blob form: header followed by a bincode body
pub fn encode_blob(chunk: &ChunkData) -> Result<Vec<u8>> {
    let body = match chunk {
        ChunkData::Plain { values } => bincode::serialize(&PlainBody {
            values: values.clone(),
        })?,
        ChunkData::Sparsed { default, offsets, values, .. } => {
            let mut offset_bytes = Vec::with_capacity(offsets.serialized_size());
            offsets.serialize_into(&mut offset_bytes)?;
            bincode::serialize(&SparsedBody {
                default: default.clone(),
                offsets: offset_bytes,
                values: values.clone(),
            })?
        }
    };

    let mut hasher = Hasher::new();
    hasher.update(&body);

    let header = ChunkHeader {
        version: ChunkHeader::VERSION,
        kind: chunk.kind(),
        row_count: chunk.row_count() as u32,
        body_len: body.len() as u32,
        checksum: hasher.finalize(),
    };

    let mut blob = Vec::with_capacity(ChunkHeader::SIZE + body.len());
    header.write_to(&mut blob);
    blob.extend_from_slice(&body);
    Ok(blob)
}

/// Parse and verify a chunk blob. Any structural mismatch is reported as
/// `Corrupted`; defaults are never substituted for unreadable data.
pub fn decode_blob(blob: &[u8]) -> Result<ChunkData> {
    let header = ChunkHeader::read_from(blob)?;
    let body = &blob[ChunkHeader::SIZE..];
    if body.len() != header.body_len as usize {
        return Err(Error::corrupted(format!(
            "chunk body length {} does not match header {}",
            body.len(),
            header.body_len
        )));
    }

    let mut hasher = Hasher::new();
    hasher.update(body);
    let actual = hasher.finalize();
    if actual != header.checksum {
        return Err(Error::corrupted(format!(
            "chunk checksum mismatch: expected {:08x}, got {:08x}",
            header.checksum, actual
        )));
    }

    let corrupt = |e: bincode::Error| Error::corrupted(format!("chunk body: {}", e));
    let chunk = match header.kind {
        AccessorKind::Plain => {
            let body: PlainBody = bincode::deserialize(body).map_err(corrupt)?;
            ChunkData::Plain { values: body.values }
        }
        AccessorKind::Sparsed => {
            let body: SparsedBody = bincode::deserialize(body).map_err(corrupt)?;
            let offsets = RoaringBitmap::deserialize_from(&body.offsets[..])
                .map_err(|e| Error::corrupted(format!("sparse offsets: {}", e)))?;
            if body.default.is_null() {
                return Err(Error::corrupted("sparsed chunk without default"));
            }
            if offsets.len() != body.values.len() as u64 {
                return Err(Error::corrupted(format!(
                    "sparsed chunk has {} offsets but {} values",
                    offsets.len(),
                    body.values.len()
                )));
            }
            if offsets.max().map_or(false, |max| max >= header.row_count) {
                return Err(Error::corrupted("sparse offset beyond chunk rows"));
            }
            ChunkData::Sparsed {
                default: body.default,
                row_count: header.row_count,
                offsets,
                values: body.values,
            }
        }
    };

    if chunk.row_count() != header.row_count as usize {
        return Err(Error::corrupted(format!(
            "chunk holds {} rows, header says {}",
            chunk.row_count(),
            header.row_count
        )));
    }
    Ok(chunk)
}
