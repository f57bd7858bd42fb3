//! Adapters implementing the domain ports.

pub mod groq;
pub mod in_memory;
pub mod notifier;
pub mod payman;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
