//! Record store API used by the poll loop.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::chuck::ChunkReader;
use crate::error::StoreError;

pub const DEFAULT_QUOTA_SIZE: u64 = 100_000_000;

/// Eviction policy of a bucket once its quota is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QuotaType {
    None,
    /// Drop the oldest records first.
    Fifo,
}

impl FromStr for QuotaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(QuotaType::None),
            "fifo" => Ok(QuotaType::Fifo),
            _ => Err("quota type must be `none` or `fifo`".to_string()),
        }
    }
}

impl Display for QuotaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaType::None => write!(f, "none"),
            QuotaType::Fifo => write!(f, "fifo"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSettings {
    pub quota_type: QuotaType,
    pub quota_size: u64,
}

impl Default for BucketSettings {
    fn default() -> Self {
        Self {
            quota_type: QuotaType::Fifo,
            quota_size: DEFAULT_QUOTA_SIZE,
        }
    }
}

/// A bucket that is known to exist on the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketHandle {
    pub name: String,
}

/// Record timestamp: microseconds since the unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordTime(u64);

impl RecordTime {
    pub fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// `None` for times before the epoch.
    pub fn from_system_time(time: SystemTime) -> Option<Self> {
        let since = time.duration_since(UNIX_EPOCH).ok()?;
        u64::try_from(since.as_micros()).ok().map(Self)
    }

    pub fn as_micros(&self) -> u64 {
        self.0
    }
}

impl Display for RecordTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match i64::try_from(self.0)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_micros)
        {
            Some(dt) => write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::Micros, true)),
            None => write!(f, "{}us", self.0),
        }
    }
}

/// Entry names on the store cannot contain dots.
pub fn sanitize_entry_name(filename: &str) -> String {
    filename.replace('.', "_")
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Return the bucket, creating it with `settings` when it does not exist yet.
    /// An existing bucket is reused as-is.
    async fn ensure_bucket(
        &self,
        name: &str,
        settings: &BucketSettings,
    ) -> Result<BucketHandle, StoreError>;

    /// Stream one record into `entry` at `time`.
    ///
    /// The payload size announced to the store is `chunks.total_size()`; the
    /// body is pulled from `chunks` until its final chunk. Returns the number of
    /// bytes written.
    async fn write_record(
        &self,
        bucket: &BucketHandle,
        entry: &str,
        time: RecordTime,
        chunks: ChunkReader,
    ) -> Result<u64, StoreError>;

    /// Newest record time of every non-empty entry in the bucket.
    async fn latest_records(
        &self,
        bucket: &BucketHandle,
    ) -> Result<HashMap<String, RecordTime>, StoreError>;
}
