//! tla-explore CLI
//!
//! Runs the exploration engine on built-in models.
//!
//! # Commands
//!
//! - `tla-explore grid --max-x 500 --max-y 500` - explore a counter grid
//! - `tla-explore grid --max-sum 40` - same, checking `x + y <= 40`
//!
//! Logging is controlled with `RUST_LOG`, e.g. `RUST_LOG=tla_explore=debug`.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tla_explore::grid::CounterGrid;
use tla_explore::trace_file::replay;
use tla_explore::{ExploreConfig, ExploreResult, Explorer, Outcome, PageSizing};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tla-explore")]
#[command(about = "Parallel breadth-first state exploration with a disk-backed frontier")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Explore a two-counter grid
    Grid {
        #[arg(long, default_value_t = 200)]
        max_x: u32,
        #[arg(long, default_value_t = 200)]
        max_y: u32,
        /// Check the invariant x + y <= MAX_SUM
        #[arg(long)]
        max_sum: Option<u32>,
        #[command(flatten)]
        runtime: RuntimeArgs,
    },
}

#[derive(Args, Clone, Debug)]
struct RuntimeArgs {
    /// Worker threads (0 = one per core)
    #[arg(short, long)]
    workers: Option<usize>,
    /// States per page (default: grows with the frontier)
    #[arg(long)]
    page_size: Option<usize>,
    /// Pages kept in memory before spilling to disk
    #[arg(long)]
    in_memory_pages: Option<u64>,
    /// Directory for page files and trace logs
    #[arg(long)]
    disk_dir: Option<PathBuf>,
    /// States a worker keeps locally before sharing
    #[arg(long)]
    local_backlog: Option<usize>,
    /// Milliseconds between polls for a spilled page
    #[arg(long, default_value_t = 50)]
    poll_ms: u64,
    /// Keep page files and trace logs after the run
    #[arg(long)]
    keep_files: bool,
}

impl RuntimeArgs {
    fn to_config(&self, spec_name: &str) -> ExploreResult<ExploreConfig> {
        let mut config = ExploreConfig::default().with_env_overrides()?;
        config.spec_name = spec_name.to_string();
        config.disk_dir = self.disk_dir.clone().unwrap_or_else(|| {
            std::env::temp_dir().join(format!("tla-explore-{}", std::process::id()))
        });
        config.poll_interval = Duration::from_millis(self.poll_ms);
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(size) = self.page_size {
            config.page_sizing = PageSizing::Fixed(size);
        }
        if let Some(pages) = self.in_memory_pages {
            config.in_memory_pages = pages;
        }
        if let Some(backlog) = self.local_backlog {
            config.local_backlog = backlog;
        }
        Ok(config)
    }
}

fn run_grid(model: CounterGrid, runtime: &RuntimeArgs) -> ExploreResult<bool> {
    let config = runtime.to_config("CounterGrid")?;
    let disk_dir = config.disk_dir.clone();
    let explorer = Explorer::new(config);

    let started = Instant::now();
    let result = explorer.check(model.initial_states(), &model);
    if !runtime.keep_files {
        // A directory we picked ourselves goes entirely; in a user-supplied
        // one only this run's subdirectory is ours.
        let scratch = match (&result, runtime.disk_dir.is_some()) {
            (_, false) => Some(disk_dir.as_path()),
            (Ok(outcome), true) => Some(outcome.run_dir()),
            (Err(_), true) => None,
        };
        if let Some(dir) = scratch {
            if let Err(e) = std::fs::remove_dir_all(dir) {
                warn!(dir = %dir.display(), error = %e, "could not remove run files");
            }
        }
    }
    let outcome = result?;
    let elapsed = started.elapsed();

    println!("{}", outcome.stats());
    println!("Finished in {:.2}s", elapsed.as_secs_f64());
    match outcome {
        Outcome::Complete { .. } => {
            println!("Model checking completed. No error has been found.");
            Ok(true)
        }
        Outcome::Error { cause, trace, .. } => {
            println!("Error: {}", cause);
            println!("The behavior up to this point is:");
            for (i, state) in replay(&model.initial_states(), &model, &trace)?
                .iter()
                .enumerate()
            {
                println!("State {}: x = {}, y = {}", i + 1, state.x, state.y);
            }
            Ok(false)
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Grid {
            max_x,
            max_y,
            max_sum,
            runtime,
        } => {
            let mut model = CounterGrid::new(max_x, max_y);
            if let Some(max_sum) = max_sum {
                model = model.with_max_sum(max_sum);
            }
            run_grid(model, &runtime)
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(12),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(255)
        }
    }
}
