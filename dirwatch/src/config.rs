use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;

use crate::cadapter::{BucketSettings, ReductConfig};
use crate::cli::Args;

/// Validated runtime settings.
#[derive(Clone, Debug)]
pub struct Config {
    pub watched_dir: PathBuf,
    pub bucket: String,
    pub bucket_settings: BucketSettings,
    pub reduct: ReductConfig,
    pub interval: Duration,
    pub upload_timeout: Duration,
    pub resume: bool,
    pub dry_run: bool,
}

impl Config {
    /// Check every argument and report all problems at once.
    pub async fn from_args(args: &Args) -> anyhow::Result<Self> {
        let mut validation_errors = Vec::new();

        match tokio::fs::metadata(&args.dir).await {
            Ok(meta) if !meta.is_dir() => validation_errors.push(format!(
                "DIRWATCH_DIR `{}` exists but is not a directory",
                args.dir.display()
            )),
            Ok(_) => {}
            Err(e) => validation_errors.push(format!(
                "DIRWATCH_DIR `{}` is not accessible: {e}",
                args.dir.display()
            )),
        }

        let url = match Url::parse(&args.url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => Some(u),
            Ok(u) => {
                validation_errors.push(format!(
                    "DIRWATCH_STORAGE_URL `{}` must use http or https, not `{}`",
                    args.url,
                    u.scheme()
                ));
                None
            }
            Err(e) => {
                validation_errors.push(format!(
                    "DIRWATCH_STORAGE_URL `{}` is not a valid url: {e}",
                    args.url
                ));
                None
            }
        };

        if args.bucket.is_empty() || args.bucket.contains(['/', '.']) {
            validation_errors.push(format!(
                "DIRWATCH_BUCKET `{}` must be a non-empty name without `/` or `.`",
                args.bucket
            ));
        }
        if args.chunk_size == 0 {
            validation_errors.push("DIRWATCH_CHUNK_SIZE must be greater than zero".to_string());
        }
        if args.interval_ms == 0 {
            validation_errors.push("DIRWATCH_INTERVAL_MS must be greater than zero".to_string());
        }
        if args.upload_timeout_secs == 0 {
            validation_errors
                .push("DIRWATCH_UPLOAD_TIMEOUT_SECS must be greater than zero".to_string());
        }

        let url = match url {
            Some(u) if validation_errors.is_empty() => u,
            _ => anyhow::bail!("{}", validation_errors.join("\n")),
        };

        Ok(Config {
            watched_dir: args.dir.clone(),
            bucket: args.bucket.clone(),
            bucket_settings: BucketSettings {
                quota_type: args.quota_type,
                quota_size: args.quota_size,
            },
            reduct: ReductConfig {
                url,
                api_token: args.api_token.clone(),
                chunk_size: args.chunk_size,
            },
            interval: Duration::from_millis(args.interval_ms),
            upload_timeout: Duration::from_secs(args.upload_timeout_secs),
            resume: !args.no_resume,
            dry_run: args.dry_run,
        })
    }
}
