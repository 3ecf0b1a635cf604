//! One poll cycle: scan the watched directory and upload every changed file.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::cadapter::{BucketHandle, RecordStore, RecordTime, sanitize_entry_name};
use crate::chuck::ChunkReader;
use crate::daemon::detector::{Change, ChangedFile, WatchState, list_regular_files};
use crate::daemon::sync_loop::CycleHandler;
use crate::error::{StoreError, WatchError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Stored { bytes: u64 },
    /// Skipped: the store already holds a record at exactly the file's time.
    AlreadyStored,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub file: String,
    pub entry: String,
    /// `None` when the modification time cannot be expressed as a record time.
    pub time: Option<RecordTime>,
    pub outcome: UploadOutcome,
}

/// What a single cycle did, in upload order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub files: Vec<FileReport>,
}

impl CycleReport {
    pub fn changed(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.file.as_str()).collect()
    }

    pub fn stored(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, UploadOutcome::Stored { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, UploadOutcome::Failed { .. }))
            .count()
    }
}

pub struct DirPoller<S> {
    dir: PathBuf,
    store: Arc<S>,
    bucket: BucketHandle,
    state: WatchState,
    upload_timeout: Duration,
    known_records: HashMap<String, RecordTime>,
}

impl<S: RecordStore> DirPoller<S> {
    pub fn new(
        dir: impl Into<PathBuf>,
        store: Arc<S>,
        bucket: BucketHandle,
        upload_timeout: Duration,
    ) -> Self {
        Self {
            dir: dir.into(),
            store,
            bucket,
            state: WatchState::new(),
            upload_timeout,
            known_records: HashMap::new(),
        }
    }

    /// Load the newest record time of every entry so files already stored by a
    /// previous run are not uploaded again.
    ///
    /// The lookup only applies to the next cycle, which sees every file that
    /// existed at startup; it is dropped afterwards.
    pub async fn resume_from_store(&mut self) -> Result<usize, StoreError> {
        self.known_records = self.store.latest_records(&self.bucket).await?;
        Ok(self.known_records.len())
    }

    pub fn state(&self) -> &WatchState {
        &self.state
    }

    /// Scan once and make exactly one upload attempt per changed file.
    ///
    /// Only a failure to list the directory is returned as an error; per-file
    /// failures are logged and reported in the [`CycleReport`].
    pub async fn poll_once(&mut self) -> Result<CycleReport, WatchError> {
        let listing = list_regular_files(&self.dir)
            .await
            .map_err(|source| WatchError::Listing {
                path: self.dir.clone(),
                source,
            })?;
        let changes = self.state.detect(listing);

        let mut report = CycleReport::default();
        for changed in changes {
            let name = changed.file.name.clone();
            let entry = sanitize_entry_name(&name);
            let Some(time) = RecordTime::from_system_time(changed.file.modified) else {
                let err = StoreError::TimestampBeforeEpoch(changed.file.path.clone());
                error!("`{name}` upload failed: {err}");
                report.files.push(FileReport {
                    file: name,
                    entry,
                    time: None,
                    outcome: UploadOutcome::Failed {
                        reason: err.to_string(),
                    },
                });
                continue;
            };
            info!("`{name}` is changed. Storing as `{entry}` at {time}");

            let outcome = match self.upload(&changed, &entry, time).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("`{name}` upload failed: {e}");
                    UploadOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            match &outcome {
                UploadOutcome::Stored { bytes } => info!("`{name}` OK ({} kB)", bytes / 1024),
                UploadOutcome::AlreadyStored => {
                    info!("`{name}` already stored in `{entry}`, skipped")
                }
                UploadOutcome::Failed { .. } => {}
            }
            report.files.push(FileReport {
                file: name,
                entry,
                time: Some(time),
                outcome,
            });
        }
        self.known_records.clear();
        Ok(report)
    }

    async fn upload(
        &self,
        changed: &ChangedFile,
        entry: &str,
        time: RecordTime,
    ) -> Result<UploadOutcome, WatchError> {
        if changed.change == Change::New {
            if let Some(latest) = self.known_records.get(entry) {
                if *latest == time {
                    return Ok(UploadOutcome::AlreadyStored);
                }
            }
        }

        let path = &changed.file.path;
        let file = File::open(path).await.map_err(|source| WatchError::Open {
            path: path.clone(),
            source,
        })?;
        let size = file
            .metadata()
            .await
            .map_err(|source| WatchError::Metadata {
                path: path.clone(),
                source,
            })?
            .len();
        let chunks = ChunkReader::new(file, size, path);

        let write = self.store.write_record(&self.bucket, entry, time, chunks);
        let bytes = timeout(self.upload_timeout, write)
            .await
            .map_err(|_| WatchError::Timeout(self.upload_timeout))??;
        Ok(UploadOutcome::Stored { bytes })
    }
}

#[async_trait]
impl<S: RecordStore + 'static> CycleHandler for DirPoller<S> {
    async fn on_cycle(&mut self) {
        match self.poll_once().await {
            Ok(report) if !report.files.is_empty() => debug!(
                changed = report.files.len(),
                stored = report.stored(),
                failed = report.failed(),
                "poll cycle finished"
            ),
            Ok(_) => {}
            Err(e) => error!("Poll cycle skipped: {e}"),
        }
    }
}
