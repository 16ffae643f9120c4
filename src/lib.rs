//! Chunkwise - Chunked Sliding-Window Rate Limiting
//!
//! This crate throttles repeated actions from one identity over a rolling
//! window. Counts are bucketed into fixed-size chunks stored in a shared,
//! expiring key-value store, so every process enforcing the limit sees the
//! same state and the state vanishes on its own once an identity goes quiet.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;
