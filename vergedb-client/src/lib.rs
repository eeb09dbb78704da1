//! # vergedb-client
//!
//! Async client for VergeDB.
//!
//! This crate provides:
//! - A multiplexed RPC engine over a single WebSocket connection
//! - Correlated request/response dispatch for any number of concurrent callers
//! - Live-query subscriptions with ordered notification delivery
//! - Connection supervision: authentication, workspace selection, reconnect
//!   on unexpected close, drained shutdown

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod pool;

mod registry;

pub use client::{Client, GraphqlRequest, LiveQuery};
pub use config::Config;
pub use connection::{Connection, State};
pub use error::ClientError;

/// Re-export of the wire codec for working with raw results.
pub use vergedb_codec as codec;
