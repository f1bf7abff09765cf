//! # obs-runner
//!
//! Main entry point for the rate observer.
//!
//! Loads a JSON configuration file, builds the enabled ingestion sources, and
//! drives each of them on its own fixed interval. Observations land in a
//! Prometheus registry served on `metrics.listen`.
//!
//! # Usage
//!
//! ```bash
//! obs-runner config.json --log-level info
//! obs-runner config.json --once --dry-run
//! ```

mod metrics_server;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use futures_util::future::join_all;
use obs_core::FeedError;
use obs_core::cancel::{CancelSignal, Cancellation};
use obs_core::logging::{LogOptions, init_logging};
use obs_core::sink::{MemorySink, MetricSink, PrometheusSink};
use obs_feed::{CycleReport, Source};
use prometheus::Registry;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Rate observer: BestChange snapshot and Binance P2P quote ingestion.
#[derive(Parser)]
#[command(name = "obs-runner", about = "Exchange rate observer")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output. Overrides `logging.log_path`.
    #[arg(long)]
    log_dir: Option<String>,

    /// Run one cycle per source, then exit.
    #[arg(long)]
    once: bool,

    /// Record into memory and log a summary instead of serving metrics.
    #[arg(long)]
    dry_run: bool,
}

/// Where observations go.
enum Output {
    Prometheus(Arc<PrometheusSink>),
    Memory(Arc<MemorySink>),
}

impl Output {
    fn sink(&self) -> Arc<dyn MetricSink> {
        match self {
            Self::Prometheus(sink) => sink.clone(),
            Self::Memory(sink) => sink.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration (logging settings live in it)
    let config = obs_core::config::load_config(&cli.config)?;

    // 2. Initialize logging
    let log_dir = cli.log_dir.clone().or_else(|| config.logging.log_path.clone());
    init_logging(&LogOptions {
        level: &cli.log_level,
        dir: log_dir.as_deref(),
        module_name: &config.logging.module_name,
        json: config.logging.json,
    });
    info!("obs-runner starting, config={}, log_level={}", cli.config.display(), cli.log_level);

    // 3. Sink and sources
    let output = if cli.dry_run {
        Output::Memory(Arc::new(MemorySink::new()))
    } else {
        Output::Prometheus(Arc::new(PrometheusSink::new(Registry::new())?))
    };
    let sources = obs_feed::registry::create_sources(&config, output.sink())?;
    if sources.is_empty() {
        warn!("no source enabled, nothing to do");
        return Ok(());
    }
    info!("{} source(s) enabled", sources.len());

    let cancel = Cancellation::new();

    // 4. Metrics endpoint
    let server = match &output {
        Output::Prometheus(sink) if !cli.once => {
            let addr: SocketAddr =
                config.metrics.listen.parse().with_context(|| format!("metrics.listen '{}'", config.metrics.listen))?;
            Some(tokio::spawn(metrics_server::serve(addr, sink.clone(), cancel.signal())))
        }
        _ => None,
    };

    // 5. Run the sources until Ctrl+C (or one round with --once)
    let once = cli.once;
    let runs = join_all(sources.iter().map(|source| {
        let source = source.clone();
        let signal = cancel.signal();
        tokio::spawn(async move {
            if once {
                run_cycle(source.as_ref(), &signal).await;
            } else {
                source_loop(source, signal).await;
            }
        })
    }));
    tokio::pin!(runs);

    let finished = tokio::select! {
        results = &mut runs => Some(results),
        res = tokio::signal::ctrl_c() => {
            res.context("listening for Ctrl+C")?;
            info!("shutdown signal received");
            None
        }
    };
    cancel.cancel();
    let results = match finished {
        Some(results) => results,
        None => runs.await,
    };
    for res in results {
        if let Err(e) = res {
            error!("source task failed: {e}");
        }
    }

    if let Some(server) = server {
        match server.await {
            Ok(Err(e)) => error!("metrics server failed: {e:#}"),
            Err(e) => error!("metrics server task failed: {e}"),
            Ok(Ok(())) => {}
        }
    }

    if let Output::Memory(sink) = &output {
        info!("dry run: {} observation(s) across {} series", sink.len(), sink.distinct_series());
        for obs in sink.observations().iter().take(20) {
            info!("  {} {} = {}", obs.series, obs.labels, obs.value);
        }
    }

    info!("obs-runner stopped");
    Ok(())
}

/// Drive one source on its interval until `signal` fires. Cycles of one
/// source never overlap; ticks missed while a cycle runs are skipped.
async fn source_loop(source: Arc<dyn Source>, signal: CancelSignal) {
    let mut ticker = tokio::time::interval(source.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = signal.cancelled() => break,
            _ = ticker.tick() => {}
        }
        run_cycle(source.as_ref(), &signal).await;
    }
    info!("[{}] loop stopped", source.name());
}

/// Run one cycle and log its outcome. A failed cycle never stops the loop.
async fn run_cycle(source: &dyn Source, signal: &CancelSignal) -> Option<CycleReport> {
    let started = Instant::now();
    match source.run_cycle(signal.clone()).await {
        Ok(report) => {
            debug!("[{}] cycle finished in {:?}: {report:?}", source.name(), started.elapsed());
            Some(report)
        }
        Err(FeedError::Cancelled) => {
            info!("[{}] cycle cancelled", source.name());
            None
        }
        Err(e) => {
            error!("[{}] cycle failed after {:?}: {e}", source.name(), started.elapsed());
            None
        }
    }
}
