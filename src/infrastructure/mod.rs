//! Adapters for the domain ports: in-memory and RocksDB stores, and the
//! in-process message broker.

pub mod broker;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
