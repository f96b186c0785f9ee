//! handoff CLI: runs the demo jobs against the work queue.

use handoff::config::{Config, FetchManifest};
use handoff::engine::{BoundedWorkQueue, CompletionSink, QueueStats, SinkState};
use handoff::job::{ComputeJob, FetchJob, JobRunner};
use handoff::service::{HttpFetcher, LogRenderer, SystemClock, format_timestamp};
use handoff::telemetry::{TelemetryConfig, init_telemetry};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "handoff", about = "Bounded work queue with completion hand-off")]
struct Cli {
    /// Print the sink journal as JSON when done
    #[arg(long, global = true)]
    json: bool,
    /// Override the concurrency bound
    #[arg(long, global = true)]
    max_concurrency: Option<usize>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the long calculation in the background
    Compute {
        /// Number of additions
        #[arg(long)]
        iterations: Option<u64>,
    },
    /// Download a batch of resources in parallel
    Fetch {
        /// TOML manifest listing identifiers
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// Identifiers to fetch (overrides the manifest)
        identifiers: Vec<String>,
    },
    /// Fetch and compute together while tapping the counter
    Demo {
        /// How many times to increment the counter while jobs run
        #[arg(long, default_value_t = 25)]
        taps: u64,
        /// Number of additions for the calculation
        #[arg(long)]
        iterations: Option<u64>,
        /// TOML manifest listing identifiers
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(max) = cli.max_concurrency {
        config.max_concurrency = max;
    }

    let _guard = init_telemetry(TelemetryConfig::from_config("handoff", &config))?;

    let (sink, sink_task) = CompletionSink::spawn(
        SinkState::new(Box::new(LogRenderer::new()), Arc::new(SystemClock))
            .with_journal_capacity(config.journal_capacity),
    );
    let queue = BoundedWorkQueue::new(config.queue(), sink.clone())?;
    let runner = JobRunner::new(queue);

    match cli.command {
        Command::Compute { iterations } => {
            let iterations = iterations.unwrap_or(config.compute_iterations);
            cmd_compute(&runner, iterations).await?;
        }
        Command::Fetch {
            manifest,
            identifiers,
        } => {
            let job = fetch_job(manifest, identifiers)?;
            cmd_fetch(&runner, job).await?;
        }
        Command::Demo {
            taps,
            iterations,
            manifest,
        } => {
            let iterations = iterations.unwrap_or(config.compute_iterations);
            let job = fetch_job(manifest, Vec::new())?;
            cmd_demo(&runner, job, iterations, taps).await?;
        }
    }

    let stats = runner.queue().stats();
    sink.shutdown()?;
    let state = sink_task.await?;
    print_report(&state, &stats, cli.json)
}

fn fetch_job(manifest: Option<PathBuf>, identifiers: Vec<String>) -> anyhow::Result<FetchJob> {
    let manifest = match manifest {
        Some(path) => FetchManifest::load(&path)?,
        None => FetchManifest::default(),
    };
    let identifiers = if identifiers.is_empty() {
        manifest.identifiers.clone()
    } else {
        identifiers
    };
    let fetcher = Arc::new(HttpFetcher::current()?);
    let mut job = FetchJob::new(identifiers, fetcher);
    if let Some(placeholder) = manifest.placeholder_bytes()? {
        job = job.with_placeholder(placeholder);
    }
    Ok(job)
}

async fn cmd_compute(runner: &JobRunner, iterations: u64) -> anyhow::Result<()> {
    let ticket = runner.launch(Arc::new(ComputeJob::new(iterations)))?;
    ticket.finished().await?;
    Ok(())
}

async fn cmd_fetch(runner: &JobRunner, job: FetchJob) -> anyhow::Result<()> {
    let ticket = runner.launch(Arc::new(job))?;
    let summary = ticket.finished().await?;
    println!(
        "Fetched:    {}/{} ({} failed)",
        summary.succeeded, summary.total, summary.failed
    );
    Ok(())
}

async fn cmd_demo(
    runner: &JobRunner,
    job: FetchJob,
    iterations: u64,
    taps: u64,
) -> anyhow::Result<()> {
    let fetch = runner.launch(Arc::new(job))?;
    let compute = runner.launch(Arc::new(ComputeJob::new(iterations)))?;

    // The sink keeps taking taps while both jobs run.
    let sink = runner.queue().sink();
    for _ in 0..taps {
        sink.increment_shared_counter()?;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let (fetch, compute) = tokio::join!(fetch.finished(), compute.finished());
    let fetch = fetch?;
    compute?;
    println!(
        "Fetched:    {}/{} ({} failed)",
        fetch.succeeded, fetch.total, fetch.failed
    );
    Ok(())
}

fn print_report(state: &SinkState, stats: &QueueStats, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(state.events())?);
        return Ok(());
    }

    let progress = state.progress();
    println!("Counter:    {}", state.counter());
    println!(
        "Progress:   {}/{} ({:.0}%)",
        progress.counter,
        progress.total,
        progress.fraction() * 100.0
    );
    println!("Rendered:   {}", state.last_rendered().unwrap_or("-"));
    println!(
        "Compute:    {}",
        state
            .last_compute()
            .map(|v| v.to_string())
            .unwrap_or("-".to_string())
    );
    if let Some(started) = state.fetch_started_at() {
        println!("Started:    {}", format_timestamp(&started));
    }
    if let Some(finished) = state.fetch_finished_at() {
        println!("Finished:   {}", format_timestamp(&finished));
    }
    let journal = state.journal();
    println!(
        "Events:     {} kept, {} evicted",
        journal.len(),
        journal.evicted()
    );
    println!(
        "Queue:      {} dispatched, {} ok, {} failed, peak {}/{}",
        stats.dispatched, stats.succeeded, stats.failed, stats.peak_active, stats.max_concurrency
    );
    Ok(())
}
