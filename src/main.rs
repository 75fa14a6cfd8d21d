// src/main.rs

//! chanvault: imageboard thread archiver CLI.
//!
//! Resolves the board working set once, then polls catalogs, reconciles
//! them against the on-disk archive and fetches what changed, forever,
//! at no more than one request per `--request-time-limit` seconds.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use chanvault::config::Config;
use chanvault::pipeline::{run_crawl, shutdown};

#[derive(Parser, Debug)]
#[command(
    name = "chanvault",
    version,
    about = "Archives imageboard discussion threads to a local file tree"
)]
struct Cli {
    /// Load settings from a TOML config file; CLI flags override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Board codes to crawl, e.g. `-b a c g sci`. Empty means all boards.
    #[arg(short, long, num_args = 0..)]
    boards: Vec<String>,

    /// Treat the board list as an exclusion list.
    #[arg(short, long)]
    exclude: bool,

    /// Minimum seconds between any two requests (hard floor: 1).
    #[arg(long)]
    request_time_limit: Option<f64>,

    /// Root directory for the archive tree.
    #[arg(long)]
    output_path: Option<PathBuf>,

    /// Seconds to sleep between crawl cycles.
    #[arg(long)]
    cycle_interval: Option<u64>,

    /// Only log warnings and errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    /// Build the effective configuration: file first, flags on top.
    fn into_config(self) -> chanvault::error::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if !self.boards.is_empty() {
            config.boards = self.boards;
        }
        if self.exclude {
            config.exclude = true;
        }
        if let Some(limit) = self.request_time_limit {
            config.request_time_limit = limit;
        }
        if let Some(path) = self.output_path {
            config.output_path = path;
        }
        if let Some(secs) = self.cycle_interval {
            config.cycle_interval_secs = secs;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let (handle, signal) = shutdown::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupt received, finishing up");
            handle.trigger();
        }
    });

    match run_crawl(&config, signal).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
