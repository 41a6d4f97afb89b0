//! Loam DNS server binary: configuration, wiring, and lifecycle.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use loam_cache::{l1, LocalCache, LocalCacheConfig, RemoteCache, RemoteCacheConfig, TieredStore};
use loam_config::Config;
use loam_proto::RecordType;
use loam_resolver::{Resolver, ResolverConfig, SelectorPolicy};
use loam_server::{DnsServer, ServerConfig, ServerStats};
use loam_store::{RecordStore, RedbStore};
use loam_wildcard::{PublicSuffixList, WildcardEngine, WildcardError, WildcardPattern};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

use loam::handler::AuthorityHandler;
use loam::logging;

/// Loam - authoritative DNS with tiered record storage
#[derive(Parser, Debug)]
#[command(name = "loam")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path (YAML)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short = 'l', long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the DNS server (default)
    Run,

    /// Validate the configuration and exit
    Validate,

    /// Show version information
    Version,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = Config::load(path.map(|p| p.as_path())).with_context(|| match path {
        Some(path) => format!("failed to load configuration from {}", path.display()),
        None => "failed to load configuration".to_string(),
    })?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn init_logging(config: &Config, cli_level: Option<&str>) {
    let level = logging::parse_level(cli_level.unwrap_or(&config.logging.level));
    let format = match config.logging.format.as_str() {
        "json" => logging::LogFormat::Json,
        _ => logging::LogFormat::Text,
    };
    logging::init(level, format);
}

fn print_banner(config: &Config) {
    println!();
    println!(
        "  {} {}",
        style("Loam DNS").cyan().bold(),
        style(format!("v{}", env!("CARGO_PKG_VERSION"))).dim()
    );
    println!(
        "  {}",
        style("Authoritative DNS with tiered record storage").dim()
    );
    println!();
    println!("  {} {}", style("Port:").green(), config.dns_port);
    println!("  {} {}", style("Store:").green(), config.store.path);

    let mut tiers = Vec::new();
    if config.l1.enabled {
        tiers.push(format!("L1({})", config.l1.max_entries));
    }
    if config.l2.enabled {
        tiers.push(format!("L2({})", config.l2.address));
    }
    tiers.push("store".to_string());
    println!("  {} {}", style("Tiers:").green(), tiers.join(" -> "));
    println!("  {} {}", style("Selector:").green(), config.selector.policy);
    println!();
}

/// Builds the public suffix list from config.
fn build_psl(config: &Config) -> Result<Arc<PublicSuffixList>> {
    if config.wildcard.psl_path.is_empty() {
        return Ok(Arc::new(PublicSuffixList::builtin()));
    }
    let psl = PublicSuffixList::from_file(&config.wildcard.psl_path).with_context(|| {
        format!(
            "failed to load public suffix list from {}",
            config.wildcard.psl_path
        )
    })?;
    info!(path = %config.wildcard.psl_path, rules = psl.len(), "public suffix list loaded");
    Ok(Arc::new(psl))
}

/// Loads stored wildcard patterns into the engine.
async fn load_wildcards(engine: &WildcardEngine, store: &dyn RecordStore) -> Result<usize> {
    let records = store
        .list_wildcards()
        .await
        .context("failed to list wildcard patterns")?;

    let mut loaded = 0;
    for record in &records {
        match WildcardPattern::from_record(record, engine.psl()) {
            Ok(pattern) => match engine.insert(pattern) {
                Ok(()) => loaded += 1,
                Err(WildcardError::Duplicate { text }) => {
                    warn!(pattern = %text, id = record.id, "skipping duplicate wildcard pattern");
                }
                Err(e) => {
                    warn!(id = record.id, error = %e, "skipping invalid wildcard pattern");
                }
            },
            Err(e) => {
                warn!(id = record.id, error = %e, "skipping unparseable wildcard record");
            }
        }
    }
    Ok(loaded)
}

fn build_resolver_config(config: &Config) -> Result<ResolverConfig> {
    let policy = SelectorPolicy::from_str(&config.selector.policy)
        .map_err(|message| anyhow::anyhow!(message))?;

    let mut wildcard_types = Vec::new();
    for name in &config.wildcard.types {
        let rtype = RecordType::from_str(name)
            .with_context(|| format!("invalid wildcard type {name:?}"))?;
        wildcard_types.push(rtype);
    }

    Ok(ResolverConfig {
        policy,
        bucket_secs: config.selector.bucket_secs,
        wildcard_types,
    })
}

/// Periodically logs counters and cache hit rates.
fn spawn_stats_task(
    stats: Arc<ServerStats>,
    l1: Option<Arc<LocalCache>>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it.
        ticker.tick().await;
        loop {
            ticker.tick().await;

            let histogram: Vec<String> = stats
                .type_histogram()
                .into_iter()
                .filter(|(_, count)| *count > 0)
                .map(|(name, count)| format!("{name}={count}"))
                .collect();

            info!(
                uptime_secs = stats.uptime().as_secs(),
                received = stats.received.load(Ordering::Relaxed),
                answered = stats.answered.load(Ordering::Relaxed),
                not_found = stats.not_found.load(Ordering::Relaxed),
                errors = stats.errors.load(Ordering::Relaxed),
                types = %histogram.join(" "),
                "server statistics"
            );

            if let Some(l1) = &l1 {
                let cache = l1.stats();
                info!(
                    hits = cache.hits,
                    misses = cache.misses,
                    evictions = cache.evictions,
                    entries = cache.entries,
                    hit_rate = %format!("{:.1}%", cache.hit_rate),
                    "L1 cache statistics"
                );
            }
        }
    })
}

async fn run_server(config: Config) -> Result<()> {
    print_banner(&config);

    // Component construction, leaves first: store, caches, facade, engine,
    // resolver, orchestrator, listeners.
    let store: Arc<dyn RecordStore> =
        Arc::new(RedbStore::open(&config.store.path).context("failed to open record store")?);

    let local_cache = if config.l1.enabled {
        Some(Arc::new(LocalCache::new(&LocalCacheConfig {
            max_entries: config.l1.max_entries,
            cleanup_interval: Duration::from_secs(config.l1.cleanup_interval_secs),
        })))
    } else {
        None
    };

    let remote_cache = if config.l2.enabled {
        let cache = Arc::new(RemoteCache::new(RemoteCacheConfig {
            address: config.l2.address.clone(),
            pool_size: config.l2.pool_size,
            min_idle: config.l2.min_idle,
            dial_timeout: Duration::from_secs(config.l2.dial_timeout_secs),
            key_prefix: config.l2.key_prefix.clone(),
            ..Default::default()
        }));
        match cache.warm().await {
            Ok(dialed) => info!(address = %config.l2.address, dialed, "L2 cache connected"),
            Err(e) => warn!(address = %config.l2.address, error = %e,
                "L2 cache unreachable at startup, reads will degrade to the store"),
        }
        Some(cache)
    } else {
        None
    };

    let tiered: Arc<TieredStore> = Arc::new(TieredStore::new(
        local_cache.clone(),
        remote_cache,
        store.clone(),
    ));

    let psl = build_psl(&config)?;
    let engine = Arc::new(WildcardEngine::new(psl));
    let loaded = load_wildcards(&engine, store.as_ref()).await?;
    if loaded > 0 {
        info!(patterns = loaded, "wildcard engine loaded");
    }

    let resolver_config = build_resolver_config(&config)?;
    let resolver = Arc::new(Resolver::new(
        tiered.clone() as Arc<dyn RecordStore>,
        Some(engine),
        &resolver_config,
    ));

    let stats = Arc::new(ServerStats::new());
    let handler = Arc::new(AuthorityHandler::new(
        resolver,
        stats.clone(),
        Duration::from_secs(config.udp_timeout_secs),
        config.max_concurrent,
    ));

    let server_config = ServerConfig {
        listen: format!("0.0.0.0:{}", config.dns_port)
            .parse()
            .context("invalid listen address")?,
        udp_timeout: Duration::from_secs(config.udp_timeout_secs),
        tcp_timeout: Duration::from_secs(config.tcp_timeout_secs),
        shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
    };
    let server = DnsServer::new(server_config, handler);

    // Background tasks.
    let mut background = Vec::new();
    if let Some(cache) = &local_cache {
        if config.l1.cleanup_interval_secs > 0 {
            background.push(l1::spawn_sweeper(
                cache.clone(),
                Duration::from_secs(config.l1.cleanup_interval_secs),
            ));
        }
    }
    if config.stats_interval_secs > 0 {
        background.push(spawn_stats_task(
            stats.clone(),
            local_cache.clone(),
            Duration::from_secs(config.stats_interval_secs),
        ));
    }

    // Signal handling.
    let shutdown = async {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("failed to register SIGTERM handler")?;
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .context("failed to register SIGINT handler")?;
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
        Ok::<_, anyhow::Error>(())
    };

    info!(port = config.dns_port, "loam DNS server started");

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(error = %e, "server error");
                return Err(e.into());
            }
        }
        result = shutdown => {
            result?;
        }
    }

    // Drain in-flight requests, then stop background work. The cache pool
    // and store close on drop, listeners first.
    info!("shutting down");
    server.shutdown();
    let drain = Duration::from_secs(config.shutdown_timeout_secs.min(5));
    tokio::time::sleep(drain).await;
    for task in background {
        task.abort();
    }
    drop(tiered);
    info!("loam DNS server stopped");
    Ok(())
}

fn print_version() {
    println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
}

fn validate_config(path: Option<&PathBuf>) -> Result<()> {
    let config = load_config(path)?;
    println!(
        "{} listeners on port {}, store at {}",
        style("Configuration is valid:").green().bold(),
        config.dns_port,
        config.store.path
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            print_version();
            Ok(())
        }
        Some(Commands::Validate) => validate_config(cli.config.as_ref()),
        Some(Commands::Run) | None => {
            let config = load_config(cli.config.as_ref())?;
            init_logging(&config, cli.log_level.as_deref());
            run_server(config).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["loam"]).unwrap();
        assert!(cli.config.is_none());
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["loam", "-c", "/etc/loam/config.yaml", "validate"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/loam/config.yaml")));
        assert!(matches!(cli.command, Some(Commands::Validate)));

        let cli = Cli::try_parse_from(["loam", "run", "-l", "debug"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Run)));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_build_resolver_config() {
        let config = Config::default();
        let resolver_config = build_resolver_config(&config).unwrap();
        assert_eq!(resolver_config.policy, SelectorPolicy::RoundRobin);
        assert!(resolver_config.wildcard_types.contains(&RecordType::A));

        let mut bad = Config::default();
        bad.wildcard.types = vec!["BOGUS".to_string()];
        assert!(build_resolver_config(&bad).is_err());
    }
}
