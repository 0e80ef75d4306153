//! Read-side API for Dhaka Stock Exchange market data.
//!
//! The exchange publishes prices as server-rendered HTML tables rather than a
//! data feed. This crate scrapes those pages on demand, flattens each table
//! into header-keyed records, and memoises the results in a pluggable cache
//! so the upstream site sees a bounded request rate.

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod parse;
pub mod service;

pub use cache::{CacheStore, MemoryStore, RedisStore};
pub use config::DseUrls;
pub use error::DseError;
pub use parse::{Dataset, Record};
pub use service::DseClient;
