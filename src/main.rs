//! Krill main entry point
//!
//! This is the command-line interface for the Krill cooperative crawler.

use anyhow::Context;
use clap::Parser;
use krill::config::{build_crawl_settings, load_config_with_hash, validate, Config};
use krill::crawler::run_crawl;
use krill::output::{dump_done, dump_keys, print_statistics};
use krill::storage::{load_settings, open_store, publish_settings, Storage};
use krill::KrillError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Krill: a cooperative, store-backed web crawler
///
/// Any number of krill processes pointed at the same store and prefix share
/// one crawl. Start one of them with --set to publish the crawl settings;
/// the others pick the published settings up from the store.
#[derive(Parser, Debug)]
#[command(name = "krill")]
#[command(version)]
#[command(about = "A cooperative, store-backed web crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Store URL (redis://host:port, sqlite://path or memory://)
    #[arg(long, value_name = "URL")]
    store: Option<String>,

    /// Key prefix separating crawls that share one store
    #[arg(long)]
    prefix: Option<String>,

    /// Base URL of the crawl
    #[arg(short, long)]
    url: Option<String>,

    /// Only follow links containing one of these keywords
    #[arg(long, value_delimiter = ',')]
    include: Option<Vec<String>>,

    /// Never follow links containing one of these keywords
    #[arg(long, value_delimiter = ',')]
    exclude: Option<Vec<String>>,

    /// Keep query parameters on discovered links
    #[arg(long)]
    query: bool,

    /// Keep fragments on discovered links
    #[arg(long)]
    hash: bool,

    /// Do not follow links found on pages
    #[arg(long)]
    no_follow: bool,

    /// Page-extraction rule file
    #[arg(long, value_name = "FILE")]
    rules: Option<PathBuf>,

    /// Treat pages where nothing was extracted as failures
    #[arg(long)]
    require_extraction: bool,

    /// Publish this process's crawl settings to the store before crawling
    #[arg(long)]
    set: bool,

    /// Number of concurrent workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Idle connections kept in the HTTP pool
    #[arg(long)]
    connections: Option<usize>,

    /// Consecutive soft rejections tolerated before aborting
    #[arg(long)]
    errors: Option<u64>,

    /// Seconds between stats lines (0 disables)
    #[arg(long, value_name = "SECS")]
    stats: Option<u64>,

    /// Route requests through this SOCKS5 proxy
    #[arg(long, value_name = "URL")]
    proxy: Option<String>,

    #[arg(long)]
    user_agent: Option<String>,

    /// Raw Cookie header sent with every request
    #[arg(long)]
    cookie: Option<String>,

    /// File of extra seed URLs, one per line
    #[arg(long, value_name = "FILE")]
    seed: Option<PathBuf>,

    /// Delete every URL of this crawl from the store and exit
    #[arg(long, conflicts_with_all = ["redo", "dump", "done"])]
    flush: bool,

    /// Move doing and trash back to todo and exit
    #[arg(long, conflicts_with_all = ["flush", "dump", "done"])]
    redo: bool,

    /// Write every known URL to FILE and exit
    #[arg(long, value_name = "FILE", conflicts_with_all = ["flush", "redo", "done"])]
    dump: Option<PathBuf>,

    /// Write the done map (URL -> extraction result) to FILE as JSON and exit
    #[arg(long, value_name = "FILE", conflicts_with_all = ["flush", "redo", "dump"])]
    done: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load config '{}'", path.display()))?;
            tracing::debug!("Configuration loaded (hash: {})", hash);
            config
        }
        None => Config::default(),
    };
    apply_overrides(&mut config, &cli);
    validate(&config).context("invalid configuration")?;

    let store = open_store(&config.store)
        .await
        .with_context(|| format!("cannot reach store '{}'", config.store.url))?;

    if cli.flush {
        store.flush_all().await.context("flush failed")?;
        println!("Flushed crawl '{}'", config.store.prefix);
    } else if cli.redo {
        let moved = store.recover_all().await.context("redo failed")?;
        println!("Moved {} URLs back to todo", moved);
    } else if let Some(path) = &cli.dump {
        let count = dump_keys(store.as_ref(), path).await?;
        println!("Wrote {} keys to '{}'", count, path.display());
    } else if let Some(path) = &cli.done {
        let count = dump_done(store.as_ref(), path).await?;
        println!("Wrote {} keys to '{}'", count, path.display());
    } else {
        handle_crawl(&config, &cli, store).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("krill=info,warn"),
            1 => EnvFilter::new("krill=debug,info"),
            2 => EnvFilter::new("krill=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Layers command-line values over the config file
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(store) = &cli.store {
        config.store.url = store.clone();
    }
    if let Some(prefix) = &cli.prefix {
        config.store.prefix = prefix.clone();
    }

    if let Some(workers) = cli.workers {
        config.crawler.workers = workers;
    }
    if let Some(connections) = cli.connections {
        config.crawler.connections = connections;
    }
    if let Some(errors) = cli.errors {
        config.crawler.max_errors = errors;
    }
    if let Some(stats) = cli.stats {
        config.crawler.stats_interval = stats;
    }

    if let Some(proxy) = &cli.proxy {
        config.http.proxy = proxy.clone();
        config.http.use_proxy = true;
    }
    if let Some(user_agent) = &cli.user_agent {
        config.http.user_agent = user_agent.clone();
    }
    if let Some(cookie) = &cli.cookie {
        config.http.cookie = cookie.clone();
    }

    let settings = &mut config.settings;
    if let Some(url) = &cli.url {
        settings.base_url = url.clone();
    }
    if let Some(include) = &cli.include {
        settings.include = include.clone();
    }
    if let Some(exclude) = &cli.exclude {
        settings.exclude = exclude.clone();
    }
    if let Some(rules) = &cli.rules {
        settings.extraction_rules = Some(rules.clone());
    }
    settings.allow_query |= cli.query;
    settings.allow_hash |= cli.hash;
    settings.require_extraction |= cli.require_extraction;
    if cli.no_follow {
        settings.follow_links = false;
    }
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, cli: &Cli, store: Arc<dyn Storage>) -> anyhow::Result<()> {
    let settings = if cli.set {
        let settings =
            build_crawl_settings(&config.settings).context("invalid crawl settings")?;
        let record = publish_settings(store.as_ref(), &settings).await?;
        tracing::info!(fingerprint = %record.fingerprint, "Published crawl settings");
        settings
    } else {
        let record = load_settings(store.as_ref())
            .await?
            .ok_or(KrillError::MissingSettings)?;
        tracing::info!(
            fingerprint = %record.fingerprint,
            saved_at = %record.saved_at,
            "Loaded published crawl settings"
        );
        record.settings
    };

    let seeds = match &cli.seed {
        Some(path) => read_seeds(path)?,
        None => Vec::new(),
    };

    match run_crawl(config, store, settings, &seeds).await {
        Ok(stats) => {
            print_statistics(&stats);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}

fn read_seeds(path: &Path) -> anyhow::Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read seed file '{}'", path.display()))?;
    Ok(text.lines().map(str::to_string).collect())
}
