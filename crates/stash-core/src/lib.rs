//! Stash Core
//!
//! Core domain types, traits, and error handling for Stash.
//! This crate has minimal dependencies and defines the shared vocabulary
//! used by the cache engine, its storage backends and the CLI.

pub mod cache;
pub mod error;
pub mod ids;
pub mod ports;

pub use cache::{
    ContentEncoding, DataType, EntryMetadata, HashRefEntry, HashRefs, HistoryRecord, IdRef,
    LatestPointer, Payload, StoreStrategy,
};
pub use error::{Error, Result};
pub use ids::*;
pub use ports::StorageProvider;
