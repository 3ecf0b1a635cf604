//! Chunked payload reading (chuck)
//!
//! A changed file is never loaded whole. `reader::ChunkReader` hands out the
//! file's bytes one bounded window at a time and signals the final window, so
//! the transport can pull a record body on demand.
pub mod reader;

pub use reader::{Chunk, ChunkReader};

/// Default window size for one pulled chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;
