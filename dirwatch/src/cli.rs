use std::path::PathBuf;

use clap::Parser;

use crate::cadapter::QuotaType;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Storage server url
    #[arg(long, env = "DIRWATCH_STORAGE_URL", default_value = "http://127.0.0.1:8383")]
    pub url: String,

    /// Directory whose files are uploaded on change
    #[arg(short, long, env = "DIRWATCH_DIR", default_value = "./")]
    pub dir: PathBuf,

    /// Bucket receiving the records
    #[arg(short, long, env = "DIRWATCH_BUCKET", default_value = "watched_files")]
    pub bucket: String,

    /// Bucket quota in bytes
    #[arg(long, env = "DIRWATCH_QUOTA_SIZE", default_value_t = 100_000_000)]
    pub quota_size: u64,

    /// Bucket quota policy, `fifo` or `none`
    #[arg(long, env = "DIRWATCH_QUOTA_TYPE", default_value_t = QuotaType::Fifo)]
    pub quota_type: QuotaType,

    /// Delay between two scans
    #[arg(long, env = "DIRWATCH_INTERVAL_MS", default_value_t = 100)]
    pub interval_ms: u64,

    /// Bytes pulled from a file per chunk while uploading
    #[arg(long, env = "DIRWATCH_CHUNK_SIZE", default_value_t = 512 * 1024)]
    pub chunk_size: usize,

    /// Upper bound for a single record upload
    #[arg(long, env = "DIRWATCH_UPLOAD_TIMEOUT_SECS", default_value_t = 30)]
    pub upload_timeout_secs: u64,

    /// API token of the storage server
    #[arg(long, env = "DIRWATCH_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Upload every file on startup even if the bucket already holds it
    #[arg(long)]
    pub no_resume: bool,

    /// Keep records in memory instead of uploading them
    #[arg(long, env = "DIRWATCH_DRY_RUN")]
    pub dry_run: bool,
}
