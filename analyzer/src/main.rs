//! `position-analyzer`: analyze every position of a set of games with a
//! pool of chess engines and keep the results in a persistent cache.

mod cache;
mod config;
mod input;
mod pipeline;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use chess::PositionKey;
use clap::{Args, Parser, Subcommand};
use engine::{AnalysisClient, RemoteClient, RemoteConfig, StockfishConfig, StockfishEngine};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cache::{ResultCache, SqliteResultCache};
use config::PipelineConfig;
use pipeline::{spawn_signal_listener, Coordinator, RunReport, ShutdownTrigger};

#[derive(Parser)]
#[command(name = "position-analyzer", about = "Batch chess position analysis with a result cache")]
struct Cli {
    /// Also write a daily-rolling log file into this directory.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze positions and store the results in the cache.
    Analyze(AnalyzeArgs),
    /// Print the unique normalized positions of PGN files, one per line.
    Extract {
        /// PGN files to read.
        #[arg(long, required = true)]
        pgn: Vec<PathBuf>,
    },
}

#[derive(Args)]
struct AnalyzeArgs {
    /// PGN files; every position after a mainline move is analyzed.
    #[arg(long)]
    pgn: Vec<PathBuf>,

    /// Files with one FEN per line.
    #[arg(long)]
    positions: Vec<PathBuf>,

    /// Cache database. Defaults to `cache.db` in the data directory.
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Target search depth.
    #[arg(long, default_value_t = 1)]
    depth: u32,

    /// First depth of the iterative deepening sequence.
    #[arg(long, default_value_t = 1)]
    min_depth: u32,

    /// Number of workers, each with its own engine.
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Commit the cache after this many new results.
    #[arg(long, default_value_t = 10)]
    flush_every: usize,

    /// Commit the cache at least this often (seconds).
    #[arg(long, default_value_t = 60)]
    flush_interval: u64,

    /// Log progress after this many results.
    #[arg(long, default_value_t = 10)]
    progress_every: usize,

    /// Log progress at least this often (seconds).
    #[arg(long, default_value_t = 60)]
    progress_interval: u64,

    /// Seconds to wait for workers to stop before killing them.
    #[arg(long, default_value_t = 10)]
    shutdown_grace: u64,

    /// Seed for the work order; random when omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// UCI engine executable. Searched in common locations when omitted.
    #[arg(long, env = "POSITION_ANALYZER_ENGINE")]
    engine: Option<PathBuf>,

    /// Engine hash table size in MB.
    #[arg(long, default_value_t = 1024)]
    hash_mb: u32,

    /// Engine search threads.
    #[arg(long, default_value_t = 1)]
    threads: u32,

    /// Use an HTTP analysis service instead of a local engine.
    #[arg(long, env = "POSITION_ANALYZER_SERVER_URL")]
    server_url: Option<String>,

    /// Give up on a single engine call after this many seconds.
    #[arg(long)]
    item_timeout: Option<u64>,
}

impl AnalyzeArgs {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            target_depth: self.depth,
            min_depth: self.min_depth,
            worker_count: self.workers,
            flush_every: self.flush_every,
            flush_interval: Duration::from_secs(self.flush_interval),
            progress_every: self.progress_every,
            progress_interval: Duration::from_secs(self.progress_interval),
            shutdown_grace: Duration::from_secs(self.shutdown_grace),
            shuffle_seed: self.seed,
        }
    }

    fn item_timeout(&self) -> Option<Duration> {
        self.item_timeout.map(Duration::from_secs)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match init_tracing(cli.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to set up logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Analyze(args) => analyze(args).await,
        Commands::Extract { pgn } => extract(&pgn).map(|()| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let file_appender = tracing_appender::rolling::daily(dir, "position-analyzer");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    Ok(guard)
}

fn extract(pgn: &[PathBuf]) -> anyhow::Result<()> {
    let mut keys = Vec::new();
    for path in pgn {
        keys.extend(input::load_pgn_positions(path)?);
    }
    let mut unique: Vec<PositionKey> = input::unique_positions(keys).into_iter().collect();
    unique.sort();
    tracing::info!(unique = unique.len(), "Extracted positions");
    for key in unique {
        println!("{key}");
    }
    Ok(())
}

fn load_inputs(args: &AnalyzeArgs) -> anyhow::Result<HashSet<PositionKey>> {
    if args.pgn.is_empty() && args.positions.is_empty() {
        anyhow::bail!("nothing to analyze: pass --pgn and/or --positions");
    }
    let mut keys = Vec::new();
    for path in &args.pgn {
        keys.extend(input::load_pgn_positions(path)?);
    }
    for path in &args.positions {
        keys.extend(input::load_position_list(path)?);
    }
    let total = keys.len();
    let unique = input::unique_positions(keys);
    tracing::info!(total, unique = unique.len(), "Inputs loaded");
    Ok(unique)
}

async fn analyze(args: AnalyzeArgs) -> anyhow::Result<ExitCode> {
    let keys = load_inputs(&args)?;
    let pipeline_config = args.pipeline_config();
    pipeline_config.validate(pipeline_config.worker_count)?;
    let worker_count = pipeline_config.worker_count;

    let cache_path = args.cache.clone().unwrap_or_else(config::default_cache_path);
    let cache = SqliteResultCache::open(&cache_path)
        .await
        .with_context(|| format!("opening cache {}", cache_path.display()))?;

    let trigger = ShutdownTrigger::new();
    let listener = spawn_signal_listener(trigger.clone());
    let mut coordinator = Coordinator::new(cache, pipeline_config, trigger);

    let report = match &args.server_url {
        Some(url) => {
            let clients = remote_clients(url, &args, worker_count)?;
            run_pipeline(&mut coordinator, keys, clients).await?
        }
        None => {
            let clients = spawn_engines(&args, worker_count).await?;
            run_pipeline(&mut coordinator, keys, clients).await?
        }
    };

    listener.abort();
    let cached = coordinator.cache().committed_len().await?;
    coordinator.into_cache().close().await;

    tracing::info!(
        completed = report.stats.completed,
        failed = report.stats.failed,
        satisfied = report.stats.satisfied,
        commits = report.stats.commits,
        cached,
        slowest_secs = report.stats.slowest_item.as_secs_f64(),
        "Analysis finished"
    );

    Ok(match report.interrupted {
        Some(signal) => ExitCode::from(signal.exit_code()),
        None => ExitCode::SUCCESS,
    })
}

async fn run_pipeline<A: AnalysisClient>(
    coordinator: &mut Coordinator<SqliteResultCache>,
    keys: HashSet<PositionKey>,
    clients: Vec<A>,
) -> anyhow::Result<RunReport> {
    coordinator.run(keys, clients).await.context("analysis pipeline failed")
}

async fn spawn_engines(args: &AnalyzeArgs, count: usize) -> anyhow::Result<Vec<StockfishEngine>> {
    let mut engines = Vec::with_capacity(count);
    for worker_id in 0..count {
        let config = StockfishConfig {
            path: args.engine.clone(),
            threads: Some(args.threads),
            hash_mb: Some(args.hash_mb),
            search_timeout: args.item_timeout(),
            label: Some(format!("stockfish-{worker_id}")),
        };
        let engine = StockfishEngine::spawn_with_config(config)
            .await
            .with_context(|| format!("starting engine for worker {worker_id}"))?;
        engines.push(engine);
    }
    Ok(engines)
}

fn remote_clients(url: &str, args: &AnalyzeArgs, count: usize) -> anyhow::Result<Vec<RemoteClient>> {
    (0..count)
        .map(|worker_id| {
            let config = RemoteConfig {
                url: url.to_string(),
                timeout: args.item_timeout(),
                label: Some(format!("remote-{worker_id}")),
            };
            RemoteClient::new(config).context("building HTTP client")
        })
        .collect()
}
