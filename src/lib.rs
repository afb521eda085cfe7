//! TideKV: a Redis-protocol-compatible persistent key-value server with
//! asynchronous master/slave replication.

pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod network;
pub mod observability;
pub mod persistence;
pub mod replication;
pub mod resp;
pub mod server_info;
