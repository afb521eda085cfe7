//! Persistence module for TideKV.
//!
//! Provides AOF (Append-Only File) and RDB (Snapshot) persistence.

pub mod aof;
pub mod snapshot;
