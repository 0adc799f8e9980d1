//! certkeeper command line
//!
//! `certkeeper [global flags] <validate|discover|maintain>`
//!
//! Exits 0 when the run completed and the dataset was replaced, 1 on any fatal
//! error (the dataset is then left untouched).

use std::path::PathBuf;
use std::time::Duration;

use certkeeper::config::PathsConfig;
use certkeeper::{Config, Error, Pipeline, RunMode};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "certkeeper", version, about = "Maintain the free certifications dataset")]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true, env = "CERTKEEPER_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the dataset files (default layout under it)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Concurrent URL checks
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Retries for transient failures
    #[arg(long, global = true)]
    retries: Option<u32>,

    /// Requests per second per host (0 disables rate limiting)
    #[arg(long, global = true)]
    host_rps: Option<f64>,

    /// Consecutive dead checks before an entry is removed
    #[arg(long, global = true)]
    dead_threshold: Option<u32>,

    /// Overall run deadline in seconds
    #[arg(long, global = true)]
    deadline_secs: Option<u64>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check every URL and persist status counters; never removes or adds entries
    Validate,
    /// Scrape sources and merge new entries
    Discover,
    /// Validate, remove confirmed-dead entries, discover and merge
    Maintain,
}

impl Command {
    fn mode(&self) -> RunMode {
        match self {
            Command::Validate => RunMode::Validate,
            Command::Discover => RunMode::Discover,
            Command::Maintain => RunMode::Maintain,
        }
    }
}

impl Cli {
    /// Build the run configuration: file, then environment, then flags
    fn into_config(self) -> certkeeper::Result<(Config, RunMode)> {
        let mut config = Config::load(self.config.as_deref())?;
        config.apply_env()?;

        if let Some(dir) = self.data_dir {
            config.paths = PathsConfig::under(&dir);
        }
        if let Some(concurrency) = self.concurrency {
            config.validator.concurrency = concurrency;
        }
        if let Some(secs) = self.timeout_secs {
            config.validator.request_timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = self.retries {
            config.retry.max_retries = retries;
        }
        if let Some(rps) = self.host_rps {
            config.host_limit.requests_per_second = rps;
        }
        if let Some(threshold) = self.dead_threshold {
            config.removal.dead_threshold = threshold;
        }
        if let Some(secs) = self.deadline_secs {
            config.run_deadline = Duration::from_secs(secs);
        }
        Ok((config, self.command.mode()))
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    if let Err(error) = run(cli).await {
        tracing::error!(error = %error, "Run failed");
        eprintln!("certkeeper error: {error}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> certkeeper::Result<()> {
    let (config, mode) = cli.into_config()?;
    let pipeline = Pipeline::new(config)?;

    // Dropping the run future on Ctrl-C abandons it before anything is committed
    let report = tokio::select! {
        report = pipeline.run(mode) => report?,
        _ = tokio::signal::ctrl_c() => {
            return Err(Error::Other("interrupted; dataset left untouched".to_string()));
        }
    };

    println!("{}", report.summary_line());
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("certkeeper=info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        eprintln!("failed to initialize logging: {e}");
    }
}
