//! Table store abstraction and its in-memory implementation.

mod base;
mod memory;
mod pool;

pub use base::{
    BatchOperation, DEFAULT_SEGMENT_SIZE, MAX_BATCH_OPERATIONS, Segment, StorageAccount,
    TableClient, TableQuery,
};
pub use memory::{MemoryStorageAccount, MemoryTable};
pub use pool::{MEMORY_SCHEME, MemoryConnector, StoreConnector, TableClientPool};
