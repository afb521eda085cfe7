//! Network module for TideKV.
//!
//! Handles client connections and the RESP wire protocol (see `crate::resp`).

pub mod connection;
