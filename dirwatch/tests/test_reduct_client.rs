use dirwatch::cadapter::{
    BucketSettings, QuotaType, RecordStore, RecordTime, ReductClient, ReductConfig,
};
use dirwatch::chuck::ChunkReader;
use dirwatch::error::StoreError;
use reqwest::StatusCode;
use serde_json::json;
use tempfile::tempdir;

use crate::common::MockState;

mod common;

fn client(url: reqwest::Url, token: Option<&str>, chunk_size: usize) -> ReductClient {
    let mut config = ReductConfig::new(url);
    config.api_token = token.map(str::to_string);
    config.chunk_size = chunk_size;
    ReductClient::new(config).unwrap()
}

#[tokio::test]
async fn test_ensure_bucket_creates_then_reuses() {
    let (url, mock) = common::start(MockState::default()).await;
    let client = client(url, None, 1024);

    let settings = BucketSettings::default();
    let first = client.ensure_bucket("watched_files", &settings).await.unwrap();
    let other = BucketSettings {
        quota_type: QuotaType::None,
        quota_size: 1,
    };
    let second = client.ensure_bucket("watched_files", &other).await.unwrap();
    assert_eq!(first, second);

    let buckets = mock.buckets.lock().await;
    assert_eq!(
        buckets["watched_files"].settings,
        json!({ "quota_type": "FIFO", "quota_size": 100_000_000u64 })
    );
}

#[tokio::test]
async fn test_write_record_streams_whole_file() {
    let (url, mock) = common::start(MockState::default()).await;
    let client = client(url, None, 64 * 1024);
    let bucket = client
        .ensure_bucket("b", &BucketSettings::default())
        .await
        .unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("data.log.txt");
    let data: Vec<u8> = (0..300 * 1024).map(|i| (i % 253) as u8).collect();
    std::fs::write(&path, &data).unwrap();

    let chunks = ChunkReader::open(&path).await.unwrap();
    let written = client
        .write_record(
            &bucket,
            "data_log_txt",
            RecordTime::from_micros(1_700_000_000_000_001),
            chunks,
        )
        .await
        .unwrap();
    assert_eq!(written, data.len() as u64);

    let records = mock.records("b").await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].entry, "data_log_txt");
    assert_eq!(records[0].ts, 1_700_000_000_000_001);
    assert_eq!(records[0].content_length, Some(data.len() as u64));
    assert_eq!(records[0].body, data);
}

#[tokio::test]
async fn test_rejection_carries_server_message() {
    let (url, mock) = common::start(MockState::default()).await;
    mock.fail_entry("full").await;
    let client = client(url, None, 1024);
    let bucket = client
        .ensure_bucket("b", &BucketSettings::default())
        .await
        .unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("full");
    std::fs::write(&path, b"payload").unwrap();
    let chunks = ChunkReader::open(&path).await.unwrap();

    let err = client
        .write_record(&bucket, "full", RecordTime::from_micros(1), chunks)
        .await
        .unwrap_err();
    match err {
        StoreError::Rejected {
            status, message, ..
        } => {
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(message, "Quota exceeded");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(mock.records("b").await.is_empty());
}

#[tokio::test]
async fn test_truncated_file_aborts_record() {
    let (url, mock) = common::start(MockState::default()).await;
    let client = client(url, None, 16 * 1024);
    let bucket = client
        .ensure_bucket("b", &BucketSettings::default())
        .await
        .unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("shrinking.bin");
    std::fs::write(&path, vec![7u8; 128 * 1024]).unwrap();
    let chunks = ChunkReader::open(&path).await.unwrap();
    std::fs::OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(20 * 1024)
        .unwrap();

    let err = client
        .write_record(&bucket, "shrinking_bin", RecordTime::from_micros(5), chunks)
        .await
        .unwrap_err();
    assert!(
        matches!(err, StoreError::Io(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof),
        "unexpected error: {err}"
    );
    assert!(mock.records("b").await.is_empty());
}

#[tokio::test]
async fn test_latest_records_and_missing_bucket() {
    let (url, _mock) = common::start(MockState::default()).await;
    let client = client(url, None, 1024);
    assert!(client.bucket_info("nope").await.unwrap().is_none());

    let bucket = client
        .ensure_bucket("b", &BucketSettings::default())
        .await
        .unwrap();
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.txt");
    std::fs::write(&path, b"a").unwrap();
    for ts in [10u64, 30, 20] {
        let chunks = ChunkReader::open(&path).await.unwrap();
        client
            .write_record(&bucket, "a_txt", RecordTime::from_micros(ts), chunks)
            .await
            .unwrap();
    }

    let latest = client.latest_records(&bucket).await.unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest["a_txt"], RecordTime::from_micros(30));
}

#[tokio::test]
async fn test_api_token_is_sent() {
    let state = MockState {
        token: Some("s3cr3t".to_string()),
        ..Default::default()
    };
    let (url, _mock) = common::start(state).await;

    let anonymous = client(url.clone(), None, 1024);
    let err = anonymous
        .ensure_bucket("b", &BucketSettings::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Rejected { status, .. } if status == StatusCode::UNAUTHORIZED
    ));

    let authed = client(url, Some("s3cr3t"), 1024);
    authed
        .ensure_bucket("b", &BucketSettings::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client(
        reqwest::Url::parse(&format!("http://{addr}")).unwrap(),
        None,
        1024,
    );
    let err = client
        .ensure_bucket("b", &BucketSettings::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Transport { .. }));
}
