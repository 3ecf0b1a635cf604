use clap::Parser;
use dirwatch::cli::Args;
use dirwatch::config::Config;
use dirwatch::daemon;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = Config::from_args(&args).await?;
    daemon::run(config).await
}
