//! Catalog indexer (modcat-indexer) - Main entry point
//!
//! Rebuilds every published record from CurseForge, Modrinth and GitHub,
//! discovers new packages, and publishes approved changes to the index
//! repository as one commit.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use modcat_common::config::{ConfigResolver, LoggingConfig};
use modcat_indexer::config::{CliOverrides, IndexerConfig};
use modcat_indexer::services::{
    CrawlTarget, CredentialProvider, CurseForgeClient, DependencyResolver, GitHubBackend,
    GitHubClient, HttpFetcher, IndexRun, LoggingConflictNotifier, ManifestBuilder,
    ModrinthClient, PublishResult, PublishSettings, Publisher, RateLimitGate, Registry,
    ReviewState, RunOptions, SourceMerger, SourcePreference,
};

/// Command-line arguments for modcat-indexer
#[derive(Parser, Debug)]
#[command(name = "modcat-indexer")]
#[command(about = "Rebuilds and publishes the mod catalog index")]
#[command(version)]
struct Args {
    /// Config file (overrides MODCAT_CONFIG and the platform default)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Build and reconcile, but do not commit
    #[arg(long)]
    dry_run: bool,

    /// Only rebuild published packages
    #[arg(long)]
    skip_crawl: bool,

    /// Cap on newly discovered packages this run
    #[arg(long, env = "MODCAT_MAX_NEW")]
    max_new: Option<usize>,

    /// Prefer CurseForge metadata over Modrinth
    #[arg(long)]
    prefer_curseforge: bool,

    /// Write a config file with the current settings and exit
    #[arg(long)]
    init_config: bool,
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.level.as_str().into());

    let file_layer = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };
    let stdout_layer = file_layer.is_none().then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let resolver = ConfigResolver::new(args.config.clone());
    let toml_config = resolver.load().context("Failed to load configuration")?;
    init_tracing(&toml_config.logging)?;

    if args.init_config {
        let path = resolver
            .init(&toml_config)
            .context("Failed to write config file")?;
        info!(path = %path.display(), "Config file initialized");
        return Ok(());
    }

    let overrides = CliOverrides {
        prefer_curseforge: args.prefer_curseforge,
        dry_run: args.dry_run,
        skip_crawl: args.skip_crawl,
        max_new: args.max_new,
    };
    let config = IndexerConfig::resolve(&toml_config, &overrides)
        .context("Invalid configuration")?;

    info!(
        repository = %config.index_repository,
        workers = config.worker_count,
        dry_run = config.dry_run,
        "Starting modcat-indexer"
    );

    // Per-registry cooldowns shared by the clients and the crawler
    let curseforge_gate = Arc::new(RateLimitGate::new("curseforge"));
    let modrinth_gate = Arc::new(RateLimitGate::new("modrinth"));
    let github_gate = Arc::new(RateLimitGate::new("github"));

    let credentials = Arc::new(CredentialProvider::static_token(config.github_token.clone()));

    let curseforge: Arc<dyn Registry> = Arc::new(
        CurseForgeClient::new(config.curseforge_api_key.clone(), Arc::clone(&curseforge_gate))
            .context("Failed to initialize CurseForge client")?,
    );
    let modrinth: Arc<dyn Registry> = Arc::new(
        ModrinthClient::new(Arc::clone(&modrinth_gate))
            .context("Failed to initialize Modrinth client")?,
    );
    let mirror = Arc::new(
        GitHubClient::new(Some(Arc::clone(&credentials)), github_gate)
            .context("Failed to initialize GitHub client")?,
    );
    let fetcher = Arc::new(HttpFetcher::new().context("Failed to initialize downloader")?);

    let merger = SourceMerger::new(fetcher, Arc::new(DependencyResolver::new()));
    let builder = Arc::new(ManifestBuilder::new(
        Some(Arc::clone(&curseforge)),
        Some(Arc::clone(&modrinth)),
        Some(mirror),
        merger,
        SourcePreference::from_prefer_curseforge(config.prefer_curseforge),
    ));

    let backend = Arc::new(
        GitHubBackend::new(config.index_repository.clone(), credentials)
            .context("Failed to initialize index repository backend")?,
    );
    let publisher = Publisher::new(
        backend.clone(),
        PublishSettings {
            branch: config.publish_branch.clone(),
            merge_without_pr: config.merge_without_pr,
        },
    );

    let crawl_targets = vec![
        CrawlTarget {
            registry: modrinth,
            gate: modrinth_gate,
        },
        CrawlTarget {
            registry: curseforge,
            gate: curseforge_gate,
        },
    ];

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown(cancel.clone()));

    let run = IndexRun::new(
        backend,
        builder,
        crawl_targets,
        publisher,
        Arc::new(LoggingConflictNotifier),
        RunOptions {
            worker_count: config.worker_count,
            dry_run: config.dry_run,
            skip_crawl: config.skip_crawl,
            max_new: config.max_new,
        },
        cancel,
    );

    let report = run.execute().await.context("Index run failed")?;

    info!(
        run_id = %report.run_id,
        rebuilt = report.rebuilt_packages,
        discovered = report.discovered_packages,
        approved = report.count(ReviewState::ApprovedUpdate),
        renamed = report.count(ReviewState::ApprovedIdentifierRename),
        removed = report.count(ReviewState::MarkedForRemoval),
        conflicts = report.count(ReviewState::UpdateConflict) + report.count(ReviewState::CreationConflict),
        source_failures = report.count(ReviewState::SourceFailure),
        "Run summary"
    );

    match report.published {
        Some(PublishResult::PullRequest { number, commit }) => {
            info!(number, commit = %commit, "Opened pull request")
        }
        Some(PublishResult::Merged { commit }) => info!(commit = %commit, "Merged catalog update"),
        Some(PublishResult::NothingToPublish) => info!("Catalog already up to date"),
        None => info!("Dry run finished"),
    }

    Ok(())
}

/// Cancel the run on Ctrl+C or SIGTERM; in-flight work drains, nothing is published
async fn cancel_on_shutdown(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, cancelling run"),
        _ = terminate => info!("Received SIGTERM, cancelling run"),
    }
    cancel.cancel();
}
