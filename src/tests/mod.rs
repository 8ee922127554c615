// Tests module
// Scenario tests over the RocksDB engines: peer replication bookkeeping,
// LRU rotation and block reads through the public APIs.

pub mod blocks;
pub mod replication;
