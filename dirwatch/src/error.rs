use std::io;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Failures raised by a record store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("storage rejected {action} with status {status}: {message}")]
    Rejected {
        action: &'static str,
        status: StatusCode,
        message: String,
    },

    #[error("invalid response for {action}: {message}")]
    Decode {
        action: &'static str,
        message: String,
    },

    #[error("reading record payload failed: {0}")]
    Io(#[from] io::Error),

    #[error("invalid client configuration: {0}")]
    Config(String),

    #[error("modification time of {0:?} is before the unix epoch")]
    TimestampBeforeEpoch(PathBuf),
}

/// Failures of one poll cycle or of one file inside it.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("failed to list watched directory {path:?}: {source}")]
    Listing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to stat {path:?}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("upload did not finish within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Upload(#[from] StoreError),
}
