//! Directory watcher that streams changed files into a ReductStore bucket.

pub mod cadapter;
pub mod chuck;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
