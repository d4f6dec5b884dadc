pub mod core;
pub mod accessor;
pub mod storage;
pub mod schema;
pub mod mvcc;
pub mod writer;
pub mod reader;
pub mod background;
pub mod shard;
pub mod query;

pub use crate::core::config::Config;
pub use crate::core::database::Database;
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::types::{ColumnType, Row, Value};
pub use crate::accessor::{AccessorConfig, AccessorKind};
pub use crate::background::control::BackgroundKind;
pub use crate::query::ast::{Predicate, Query};
pub use crate::query::executor::QueryResult;
pub use crate::schema::schema::TableSchema;

/*
┌────────────────────────────────────────────────────────────────────────────────────────────┐
│                              COLSTORE STRUCT ARCHITECTURE                                   │
└────────────────────────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────────────── CORE LAYER ──────────────────────────────────────────┐
│                                                                                              │
│  ┌────────────────────────────────────────────────────────────────────────────────────┐    │
│  │                               struct Database                                       │    │
│  │  ┌──────────────────────────────────────────────────────────────────────────────┐ │    │
│  │  │ config: Config                       // Shards, chunk sizes, wakeup period   │ │    │
│  │  │ catalog: Catalog                     // Schemas + accessor configs           │ │    │
│  │  │ tables: RwLock<HashMap<Table>>       // Sharded tables                       │ │    │
│  │  │ layout: Option<StorageLayout>        // Chunk files on disk                  │ │    │
│  │  │ cache: Arc<ChunkCache>               // Decoded chunk LRU                    │ │    │
│  │  │ background_enabled: [AtomicBool; 2]  // Indexation / Compaction switches     │ │    │
│  │  │ wakeup_interval_ms: Arc<AtomicU64>   // Shared with every worker             │ │    │
│  │  └──────────────────────────────────────────────────────────────────────────────┘ │    │
│  └────────────────────────────────────────────────────────────────────────────────────┘    │
│                                                                                              │
│  ┌──────────────────┐  ┌──────────────────┐  ┌───────────────────────────────────────┐    │
│  │ enum Value       │  │ struct Row       │  │ struct DatabaseStats                  │    │
│  │ • Null           │  │ • values:        │  │ • shards: Vec<ShardStats>             │    │
│  │ • Bool / Int64   │  │   HashMap<String,│  │ • chunk_count                         │    │
│  │ • Utf8           │  │   Value>         │  │ • cache_stats: CacheStats             │    │
│  │ • Timestamp      │  └──────────────────┘  └───────────────────────────────────────┘    │
│  └──────────────────┘                                                                       │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌───────────────────────────────────── ACCESSOR LAYER ────────────────────────────────────────┐
│                                                                                              │
│  ┌─────────────────────────┐  ┌──────────────────────────────┐  ┌──────────────────────┐   │
│  │ enum AccessorConfig     │  │ enum ChunkData               │  │ codec                │   │
│  │ • Plain                 │  │ • Plain { values }           │  │ • ChunkHeader (20 B) │   │
│  │ • Sparsed { default }   │  │ • Sparsed { default,         │  │ • encode_blob        │   │
│  └─────────────────────────┘  │   row_count, offsets:        │  │ • decode_blob (crc)  │   │
│                               │   RoaringBitmap, values }    │  └──────────────────────┘   │
│                               └──────────────────────────────┘                              │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────────────── SHARD LAYER ──────────────────────────────────────────┐
│                                                                                              │
│  ┌────────────────────────────────────────────────────────────────────────────────────┐    │
│  │                               struct Shard                                          │    │
│  │  ┌──────────────────────────────────────────────────────────────────────────────┐ │    │
│  │  │ buffer: WriteBuffer               // Committed rows not yet indexed          │ │    │
│  │  │ versions: VersionController       // Published Snapshot of chunk lists      │ │    │
│  │  │ store: Arc<dyn BlobStore>         // Memory or file blobs                    │ │    │
│  │  │ control: BackgroundControl        // Switches, run flags, waiters            │ │    │
│  │  │ indexer: Indexer                  // Buffer -> chunks                        │ │    │
│  │  │ compactor: Compactor              // Merge + re-encode chunks                │ │    │
│  │  └──────────────────────────────────────────────────────────────────────────────┘ │    │
│  └────────────────────────────────────────────────────────────────────────────────────┘    │
│                                                                                              │
│  ┌────────────────────────┐  ┌─────────────────────────┐  ┌────────────────────────┐      │
│  │ struct Table           │  │ struct BackgroundWorker │  │ struct Snapshot        │      │
│  │ • shards: Vec<Shard>   │  │ • kind                  │  │ • columns: chunk lists │      │
│  │ • workers              │  │ • sender: Sender<Cmd>   │  │ • indexed_rows         │      │
│  │ • route(): crc32 % n   │  │ • handle: JoinHandle    │  │ • buffer_boundary      │      │
│  └────────────────────────┘  └─────────────────────────┘  └────────────────────────┘      │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────────────── QUERY LAYER ──────────────────────────────────────────┐
│                                                                                              │
│  ┌─────────────────────┐  ┌──────────────────────┐  ┌────────────────────────────┐        │
│  │ enum Query          │  │ enum Predicate       │  │ struct QueryExecutor       │        │
│  │ • Count { filter }  │  │ • Eq / NotEq         │  │ • SnapshotReader per shard │        │
│  │ • Select { columns, │  │ • IsNull / IsNotNull │  │ • primary-key dedup        │        │
│  │   filter }          │  │ • And / Or / Not     │  │ • rayon over shards        │        │
│  └─────────────────────┘  └──────────────────────┘  └────────────────────────────┘        │
└──────────────────────────────────────────────────────────────────────────────────────────────┘
*/
