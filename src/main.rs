use clap::Parser;
use tracing_subscriber::EnvFilter;

use s3_image_source::cli::{Cli, Command, StatusArgs, SyncArgs};
use s3_image_source::config::{self, Config};
use s3_image_source::fetch::HttpFetcher;
use s3_image_source::graph::SqliteNodeStore;
use s3_image_source::storage::S3BucketLister;
use s3_image_source::sync;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match &cli.command {
        Command::Sync(args) => args.log_level,
        Command::Status(args) => args.log_level,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_level.as_filter())),
        )
        .init();

    match cli.command {
        Command::Sync(args) => run_sync(args).await,
        Command::Status(args) => run_status(args).await,
    }
}

async fn run_sync(args: SyncArgs) -> anyhow::Result<()> {
    let config = Config::from_cli(args)?;
    tracing::debug!("Resolved configuration: {:?}", config);

    tokio::fs::create_dir_all(&config.directory).await?;
    let store = SqliteNodeStore::open(&config.state_db_path())?;
    if !config.dry_run {
        let pass = store.begin_pass()?;
        tracing::debug!("Started pass {}", pass);
    }

    let lister = S3BucketLister::connect(&config).await;
    let fetcher = HttpFetcher::new(reqwest::Client::new(), config.directory.clone());

    let report = sync::source_nodes(&config, &lister, &fetcher, &store).await?;

    if config.sweep && !config.dry_run {
        let removed = store.sweep()?;
        if removed > 0 {
            tracing::info!("Swept {} stale nodes", removed);
        }
    }

    tracing::info!("── Summary ──");
    tracing::info!(
        "  {} created, {} touched, {} skipped, {} failed",
        report.created,
        report.touched,
        report.skipped,
        report.failed
    );

    if report.failed > 0 {
        anyhow::bail!("{} entries failed during the sync pass", report.failed);
    }
    Ok(())
}

async fn run_status(args: StatusArgs) -> anyhow::Result<()> {
    let db_path = config::resolve_state_db(&args.directory, args.state_db.as_deref());

    if !db_path.exists() {
        println!("No node store found at {}", db_path.display());
        println!("Run a sync first to create it.");
        return Ok(());
    }

    let store = SqliteNodeStore::open(&db_path)?;
    let summary = store.summary()?;

    println!("Node store: {}", db_path.display());
    println!();
    println!("Nodes:");
    println!("  Assets:      {}", summary.assets);
    println!("  Directories: {}", summary.directories);
    println!("  Total:       {}", summary.total());

    Ok(())
}
