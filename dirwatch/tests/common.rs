//! Minimal ReductStore stand-in served by axum on an ephemeral port.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header::{AUTHORIZATION, CONTENT_LENGTH};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use reqwest::Url;
use serde_json::{Value, json};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct MockRecord {
    pub entry: String,
    pub ts: u64,
    pub body: Vec<u8>,
    pub content_length: Option<u64>,
}

#[derive(Debug)]
pub struct MockBucket {
    pub settings: Value,
    pub records: Vec<MockRecord>,
}

#[derive(Default)]
pub struct MockState {
    pub buckets: Mutex<HashMap<String, MockBucket>>,
    pub failing_entries: Mutex<HashSet<String>>,
    pub token: Option<String>,
}

impl MockState {
    pub async fn records(&self, bucket: &str) -> Vec<MockRecord> {
        self.buckets
            .lock()
            .await
            .get(bucket)
            .map(|b| b.records.clone())
            .unwrap_or_default()
    }

    pub async fn fail_entry(&self, entry: &str) {
        self.failing_entries.lock().await.insert(entry.to_string());
    }
}

fn reduct_error(status: StatusCode, message: &str) -> Response {
    (status, [("x-reduct-error", message.to_string())]).into_response()
}

fn authorized(state: &MockState, headers: &HeaderMap) -> bool {
    match &state.token {
        None => true,
        Some(token) => headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == format!("Bearer {token}")),
    }
}

async fn create_bucket(
    State(state): State<Arc<MockState>>,
    Path(bucket): Path<String>,
    headers: HeaderMap,
    Json(settings): Json<Value>,
) -> Response {
    if !authorized(&state, &headers) {
        return reduct_error(StatusCode::UNAUTHORIZED, "Invalid token");
    }
    let mut buckets = state.buckets.lock().await;
    if buckets.contains_key(&bucket) {
        return reduct_error(
            StatusCode::CONFLICT,
            &format!("Bucket '{bucket}' already exists"),
        );
    }
    buckets.insert(
        bucket,
        MockBucket {
            settings,
            records: Vec::new(),
        },
    );
    StatusCode::OK.into_response()
}

async fn get_bucket(
    State(state): State<Arc<MockState>>,
    Path(bucket): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&state, &headers) {
        return reduct_error(StatusCode::UNAUTHORIZED, "Invalid token");
    }
    let buckets = state.buckets.lock().await;
    let Some(b) = buckets.get(&bucket) else {
        return reduct_error(
            StatusCode::NOT_FOUND,
            &format!("Bucket '{bucket}' is not found"),
        );
    };

    let mut entries: HashMap<&str, (u64, u64)> = HashMap::new();
    for r in &b.records {
        let slot = entries.entry(r.entry.as_str()).or_insert((0, 0));
        slot.0 += 1;
        slot.1 = slot.1.max(r.ts);
    }
    let entries: Vec<Value> = entries
        .into_iter()
        .map(|(name, (count, latest))| {
            json!({
                "name": name,
                "record_count": count,
                // older servers send 64-bit integers as strings
                "latest_record": latest.to_string(),
            })
        })
        .collect();
    Json(json!({
        "settings": b.settings,
        "info": { "name": bucket, "entry_count": entries.len() },
        "entries": entries,
    }))
    .into_response()
}

async fn write_record(
    State(state): State<Arc<MockState>>,
    Path((bucket, entry)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !authorized(&state, &headers) {
        return reduct_error(StatusCode::UNAUTHORIZED, "Invalid token");
    }
    let Some(ts) = params.get("ts").and_then(|v| v.parse::<u64>().ok()) else {
        return reduct_error(StatusCode::UNPROCESSABLE_ENTITY, "'ts' parameter is required");
    };
    if state.failing_entries.lock().await.contains(&entry) {
        return reduct_error(StatusCode::INTERNAL_SERVER_ERROR, "Quota exceeded");
    }

    let mut buckets = state.buckets.lock().await;
    let Some(b) = buckets.get_mut(&bucket) else {
        return reduct_error(
            StatusCode::NOT_FOUND,
            &format!("Bucket '{bucket}' is not found"),
        );
    };
    if b.records.iter().any(|r| r.entry == entry && r.ts == ts) {
        return reduct_error(
            StatusCode::CONFLICT,
            &format!("A record with timestamp {ts} already exists"),
        );
    }

    let content_length = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    b.records.push(MockRecord {
        entry,
        ts,
        body: body.to_vec(),
        content_length,
    });
    StatusCode::OK.into_response()
}

/// Serve the mock and return its base url.
pub async fn start(state: MockState) -> (Url, Arc<MockState>) {
    let state = Arc::new(state);
    let app = Router::new()
        .route("/api/v1/b/{bucket}", post(create_bucket).get(get_bucket))
        .route("/api/v1/b/{bucket}/{entry}", post(write_record))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (Url::parse(&format!("http://{addr}")).unwrap(), state)
}

/// Wait until `bucket` holds `count` records or `limit` elapses.
pub async fn wait_for_records(state: &MockState, bucket: &str, count: usize, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if state.records(bucket).await.len() == count {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
