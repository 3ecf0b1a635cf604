//! In-process record store for local development and tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use bytes::BytesMut;
use reqwest::StatusCode;
use tokio::sync::Mutex;

use crate::cadapter::client::{BucketHandle, BucketSettings, QuotaType, RecordStore, RecordTime};
use crate::chuck::{ChunkReader, DEFAULT_CHUNK_SIZE};
use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub entry: String,
    pub time: RecordTime,
    pub data: Vec<u8>,
    /// Number of chunks pulled to assemble `data`.
    pub chunks: usize,
}

#[derive(Debug)]
struct MemoryBucket {
    settings: BucketSettings,
    records: Vec<StoredRecord>,
}

impl MemoryBucket {
    fn size(&self) -> u64 {
        self.records.iter().map(|r| r.data.len() as u64).sum()
    }

    // FIFO quota: drop the oldest records until the bucket fits again.
    fn enforce_quota(&mut self) {
        if self.settings.quota_type != QuotaType::Fifo {
            return;
        }
        while self.size() > self.settings.quota_size && self.records.len() > 1 {
            let oldest = self
                .records
                .iter()
                .enumerate()
                .min_by_key(|(_, r)| r.time)
                .map(|(i, _)| i);
            match oldest {
                Some(i) => {
                    self.records.remove(i);
                }
                None => break,
            }
        }
    }
}

pub struct InMemoryRecordStore {
    buckets: Mutex<HashMap<String, MemoryBucket>>,
    rejected_entries: Mutex<HashSet<String>>,
    chunk_size: usize,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl InMemoryRecordStore {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            rejected_entries: Mutex::new(HashSet::new()),
            chunk_size,
        }
    }

    /// Make every following write to `entry` fail.
    pub async fn reject_entry(&self, entry: impl Into<String>) {
        self.rejected_entries.lock().await.insert(entry.into());
    }

    pub async fn accept_entry(&self, entry: &str) {
        self.rejected_entries.lock().await.remove(entry);
    }

    /// Records of `bucket` in write order.
    pub async fn records(&self, bucket: &str) -> Vec<StoredRecord> {
        self.buckets
            .lock()
            .await
            .get(bucket)
            .map(|b| b.records.clone())
            .unwrap_or_default()
    }

    pub async fn bucket_settings(&self, bucket: &str) -> Option<BucketSettings> {
        self.buckets
            .lock()
            .await
            .get(bucket)
            .map(|b| b.settings.clone())
    }

    /// Seed a record directly, as if written by an earlier run.
    pub async fn insert_record(&self, bucket: &str, entry: &str, time: RecordTime, data: &[u8]) {
        let mut buckets = self.buckets.lock().await;
        let b = buckets
            .entry(bucket.to_string())
            .or_insert_with(|| MemoryBucket {
                settings: BucketSettings::default(),
                records: Vec::new(),
            });
        b.records.push(StoredRecord {
            entry: entry.to_string(),
            time,
            data: data.to_vec(),
            chunks: 1,
        });
    }
}

fn bucket_not_found(name: &str) -> StoreError {
    StoreError::Rejected {
        action: "bucket lookup",
        status: StatusCode::NOT_FOUND,
        message: format!("bucket {name} not found"),
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn ensure_bucket(
        &self,
        name: &str,
        settings: &BucketSettings,
    ) -> Result<BucketHandle, StoreError> {
        self.buckets
            .lock()
            .await
            .entry(name.to_string())
            .or_insert_with(|| MemoryBucket {
                settings: settings.clone(),
                records: Vec::new(),
            });
        Ok(BucketHandle {
            name: name.to_string(),
        })
    }

    async fn write_record(
        &self,
        bucket: &BucketHandle,
        entry: &str,
        time: RecordTime,
        mut chunks: ChunkReader,
    ) -> Result<u64, StoreError> {
        if self.rejected_entries.lock().await.contains(entry) {
            return Err(StoreError::Rejected {
                action: "record write",
                status: StatusCode::UNPROCESSABLE_ENTITY,
                message: format!("writes to {entry} are rejected"),
            });
        }

        // The whole payload is pulled before anything becomes visible.
        let mut data = BytesMut::with_capacity(chunks.total_size() as usize);
        let mut count = 0;
        while let Some(chunk) = chunks.next_chunk(self.chunk_size).await? {
            data.extend_from_slice(&chunk.data);
            count += 1;
            if chunk.last {
                break;
            }
        }

        let mut buckets = self.buckets.lock().await;
        let b = buckets
            .get_mut(&bucket.name)
            .ok_or_else(|| bucket_not_found(&bucket.name))?;
        if b.records.iter().any(|r| r.entry == entry && r.time == time) {
            return Err(StoreError::Rejected {
                action: "record write",
                status: StatusCode::CONFLICT,
                message: format!("a record with timestamp {time} already exists in {entry}"),
            });
        }

        let size = data.len() as u64;
        b.records.push(StoredRecord {
            entry: entry.to_string(),
            time,
            data: data.to_vec(),
            chunks: count,
        });
        b.enforce_quota();
        Ok(size)
    }

    async fn latest_records(
        &self,
        bucket: &BucketHandle,
    ) -> Result<HashMap<String, RecordTime>, StoreError> {
        let buckets = self.buckets.lock().await;
        let b = buckets
            .get(&bucket.name)
            .ok_or_else(|| bucket_not_found(&bucket.name))?;

        let mut latest: HashMap<String, RecordTime> = HashMap::new();
        for r in &b.records {
            let slot = latest.entry(r.entry.clone()).or_insert(r.time);
            if r.time > *slot {
                *slot = r.time;
            }
        }
        Ok(latest)
    }
}
