//! Drydock daemon binary.
//!
//! Wires the persistent store, the registry and code-host clients, the docs
//! build pipeline and the file store together, then runs the two perpetual
//! sync tasks until Ctrl-C or a fatal failure.

use clap::Parser;
use drydock_config::{AppConfig, Environment, FilesBackend};
use drydock_docs::{BuilderHandle, HttpDocsBuilder, PagesExtractor};
use drydock_github::{GithubClient, HostHandle};
use drydock_registry::{RegistryClient, RegistryHandle};
use drydock_storage::FilesHandle;
use drydock_storage::backend::{LocalBackend, S3Backend};
use drydock_store::{Database, Repository};
use drydock_sync::{BranchSyncScheduler, ChangeFollower, FollowerSettings, SchedulerSettings};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Daemon command line arguments.
#[derive(Parser, Debug)]
#[command(name = "drydock")]
#[command(about = "Tracks addon packages and keeps their documentation built")]
struct Args {
    /// Path to the configuration file (default: ./drydock.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    setup_tracing(args.verbose);
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{error}");
            ExitCode::FAILURE
        },
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let environment = Environment::detect();
    let config = AppConfig::load(environment, args.config.as_deref())?;
    info!(?environment, db = %config.store.db_path.display(), "starting drydock");

    if let Some(parent) = config.store.db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let db = Database::connect(&config.store.db_path).await?;
    let repo = Repository::from(&db);

    let files: FilesHandle = match config.files.backend {
        FilesBackend::Local => {
            let root = std::path::absolute(&config.files.root)?;
            Arc::new(LocalBackend::new("local", root)?)
        },
        FilesBackend::S3 => Arc::new(S3Backend::new(
            "s3",
            &config.files.s3_region,
            config.files.s3_endpoint.clone(),
            &config.files.s3_key_id,
            &config.files.s3_key_secret,
        )),
    };
    let http = reqwest::Client::builder()
        .user_agent(concat!("drydock/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let builder: BuilderHandle = Arc::new(HttpDocsBuilder::new(
        http,
        files,
        Arc::new(PagesExtractor),
        &config.files.bucket,
    ));
    let registry: RegistryHandle = Arc::new(RegistryClient::new(&config.registry.url)?);
    let host: HostHandle = Arc::new(GithubClient::new(
        &config.github.api_url,
        &config.github.raw_url,
        config.github.token.clone(),
    )?);

    let shutdown = CancellationToken::new();
    let follower = ChangeFollower::new(
        repo.clone(),
        registry.clone(),
        builder.clone(),
        FollowerSettings {
            keyword: config.registry.keyword.clone(),
            poll_interval: config.registry.poll_interval(),
            batch_limit: config.registry.batch_limit,
        },
        shutdown.clone(),
    );
    let scheduler = BranchSyncScheduler::new(
        repo,
        host,
        registry,
        builder,
        SchedulerSettings {
            min_interval: config.scheduler.min_interval(),
            startup_delay: config.scheduler.startup_delay(),
        },
        shutdown.clone(),
    );

    // Each task cancels the shared token when it exits, so a fatal failure
    // in one loop drains the other instead of leaving it running alone.
    let follower_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let result = follower.run().await;
            shutdown.cancel();
            result
        }
    });
    let scheduler_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let result = scheduler.run().await;
            shutdown.cancel();
            result
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested, draining sync tasks");
            shutdown.cancel();
        },
        _ = shutdown.cancelled() => {},
    }

    let (follower_result, scheduler_result) = tokio::join!(follower_task, scheduler_task);
    let follower_ok = check("change follower", follower_result);
    let scheduler_ok = check("branch sync scheduler", scheduler_result);
    if follower_ok && scheduler_ok {
        info!("drydock stopped cleanly");
        Ok(())
    } else {
        Err("a sync task failed".into())
    }
}

/// Log a task's outcome; `true` means it ended cleanly.
fn check(name: &str, result: Result<drydock_sync::error::Result<()>, tokio::task::JoinError>) -> bool {
    match result {
        Ok(Ok(())) => true,
        Ok(Err(error)) => {
            error!(task = name, %error, "task stopped on a fatal error");
            false
        },
        Err(join_error) => {
            error!(task = name, %join_error, "task panicked");
            false
        },
    }
}

fn setup_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_filter = if verbose { "drydock=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
