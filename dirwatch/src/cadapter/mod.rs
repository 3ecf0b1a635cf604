//! Record store adapter (cAdapter)
//!
//! Submodules:
//! - `client`: the `RecordStore` trait and the value types shared by backends
//! - `reduct`: ReductStore HTTP backend built on reqwest
//! - `memory`: in-process backend for tests and dry runs
//!
//! A backend owns the remote naming and transport details; the poller only
//! sees buckets, entry names, record times and a `ChunkReader` to pull from.
pub mod client;
pub mod memory;
pub mod reduct;

pub use client::{BucketHandle, BucketSettings, QuotaType, RecordStore, RecordTime, sanitize_entry_name};
pub use memory::InMemoryRecordStore;
pub use reduct::{ReductClient, ReductConfig};
