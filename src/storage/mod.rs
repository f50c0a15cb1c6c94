pub mod memory;

pub use memory::{
    CommitFault, CommitRecord, MemoryStore, MemoryStoreOptions, MemoryStoreStats,
    MemoryTransaction,
};
