//! ReductStore backend: buckets and records over the v1 HTTP API.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Response, StatusCode, Url};
use serde::{Deserialize, Deserializer};
use tracing::{debug, info};

use crate::cadapter::client::{BucketHandle, BucketSettings, RecordStore, RecordTime};
use crate::chuck::{ChunkReader, DEFAULT_CHUNK_SIZE};
use crate::error::StoreError;

pub const DEFAULT_STORAGE_URL: &str = "http://127.0.0.1:8383";
const ERROR_HEADER: &str = "x-reduct-error";

#[derive(Debug, Clone)]
pub struct ReductConfig {
    pub url: Url,
    pub api_token: Option<String>,
    /// Size of each window pulled from the payload while a record streams.
    pub chunk_size: usize,
}

impl ReductConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            api_token: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Bucket description returned by `GET /api/v1/b/{bucket}`.
#[derive(Debug, Deserialize)]
pub struct BucketInfo {
    #[serde(default)]
    pub entries: Vec<EntryInfo>,
}

#[derive(Debug, Deserialize)]
pub struct EntryInfo {
    pub name: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub record_count: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub latest_record: u64,
}

// Older servers encode 64-bit integers as JSON strings.
fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        Num(u64),
        Str(String),
    }

    match Lenient::deserialize(deserializer)? {
        Lenient::Num(n) => Ok(n),
        Lenient::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

pub struct ReductClient {
    http: reqwest::Client,
    base: String,
    chunk_size: usize,
}

impl ReductClient {
    pub fn new(config: ReductConfig) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.api_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| StoreError::Config(format!("invalid api token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let base = config.url.as_str().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|source| StoreError::Transport {
                url: base.clone(),
                source,
            })?;

        Ok(Self {
            http,
            base,
            chunk_size: config.chunk_size,
        })
    }

    fn bucket_url(&self, bucket: &str) -> String {
        format!("{}/api/v1/b/{}", self.base, bucket)
    }

    /// Fetch bucket settings and entries, `None` when the bucket does not exist.
    pub async fn bucket_info(&self, bucket: &str) -> Result<Option<BucketInfo>, StoreError> {
        let url = self.bucket_url(bucket);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| StoreError::Transport {
                url: url.clone(),
                source,
            })?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let resp = check_response(resp, "bucket lookup").await?;
        let info = resp
            .json::<BucketInfo>()
            .await
            .map_err(|e| StoreError::Decode {
                action: "bucket lookup",
                message: e.to_string(),
            })?;
        Ok(Some(info))
    }
}

/// Turn a non-success response into `StoreError::Rejected`.
async fn check_response(resp: Response, action: &'static str) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let header = resp
        .headers()
        .get(ERROR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let message = match header {
        Some(m) => m,
        None => resp.text().await.unwrap_or_default(),
    };
    Err(StoreError::Rejected {
        action,
        status,
        message,
    })
}

#[async_trait]
impl RecordStore for ReductClient {
    async fn ensure_bucket(
        &self,
        name: &str,
        settings: &BucketSettings,
    ) -> Result<BucketHandle, StoreError> {
        let url = self.bucket_url(name);
        let resp = self
            .http
            .post(&url)
            .json(settings)
            .send()
            .await
            .map_err(|source| StoreError::Transport {
                url: url.clone(),
                source,
            })?;

        match resp.status() {
            StatusCode::CONFLICT => debug!(bucket = name, "bucket already exists, reusing it"),
            _ => {
                check_response(resp, "bucket creation").await?;
                info!(
                    bucket = name,
                    quota_type = %settings.quota_type,
                    quota_size = settings.quota_size,
                    "created bucket"
                );
            }
        }
        Ok(BucketHandle {
            name: name.to_string(),
        })
    }

    async fn write_record(
        &self,
        bucket: &BucketHandle,
        entry: &str,
        time: RecordTime,
        chunks: ChunkReader,
    ) -> Result<u64, StoreError> {
        let url = format!("{}/{}", self.bucket_url(&bucket.name), entry);
        let size = chunks.total_size();
        // The transport only reports a generic body failure; keep the read error.
        let read_error: Arc<Mutex<Option<io::Error>>> = Arc::new(Mutex::new(None));
        let slot = read_error.clone();
        let stream = chunks.into_stream(self.chunk_size).map_err(move |e| {
            let reported = io::Error::new(e.kind(), e.to_string());
            if let Ok(mut guard) = slot.lock() {
                *guard = Some(e);
            }
            reported
        });
        let body = reqwest::Body::wrap_stream(stream);

        let resp = self
            .http
            .post(&url)
            .query(&[("ts", time.as_micros())])
            .header(CONTENT_LENGTH, size)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await;
        let take_read_error = || read_error.lock().ok().and_then(|mut guard| guard.take());
        let resp = match resp {
            Ok(resp) => resp,
            Err(source) => {
                return Err(match take_read_error() {
                    Some(e) => StoreError::Io(e),
                    None => StoreError::Transport { url, source },
                });
            }
        };
        let checked = check_response(resp, "record write").await;
        if let Some(e) = take_read_error() {
            return Err(StoreError::Io(e));
        }
        checked?;
        Ok(size)
    }

    async fn latest_records(
        &self,
        bucket: &BucketHandle,
    ) -> Result<HashMap<String, RecordTime>, StoreError> {
        let info = self
            .bucket_info(&bucket.name)
            .await?
            .ok_or_else(|| StoreError::Rejected {
                action: "bucket lookup",
                status: StatusCode::NOT_FOUND,
                message: format!("bucket {} not found", bucket.name),
            })?;

        Ok(info
            .entries
            .into_iter()
            .filter(|e| e.record_count > 0)
            .map(|e| (e.name, RecordTime::from_micros(e.latest_record)))
            .collect())
    }
}
