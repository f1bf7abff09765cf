//! # obs-feed
//!
//! Ingestion sources for the rate observer.
//!
//! ## Architecture
//!
//! Each source implements [`Source`]: one call to [`Source::run_cycle`] is one
//! complete fetch → parse → (join) → normalize → observe run. Sources keep no
//! state between cycles; the runner schedules them on a fixed interval.
//!
//! - [`bestchange`] — bulk snapshot archive, three tables fetched under a
//!   fail-fast task group and joined
//! - [`binance`] — P2P quote search, one best-effort task per query
//! - [`registry`] — builds the enabled sources from config

pub mod bestchange;
pub mod binance;
pub mod registry;

#[cfg(test)]
mod test_http;

use std::time::Duration;

use async_trait::async_trait;
use obs_core::FeedError;
use obs_core::cancel::CancelSignal;
use obs_core::task_group::GroupReport;

/// Counters of one finished cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Task outcomes of the cycle's group.
    pub tasks: GroupReport,
    /// Records (joined rates or quote entries) that reached the sink.
    pub observed: usize,
    /// Individual values written to the sink.
    pub values: usize,
    /// Records dropped after parsing (join misses, undecodable entries).
    pub dropped: usize,
    /// Malformed raw lines skipped by the table parser.
    pub skipped_lines: usize,
}

/// Trait implemented by every ingestion source.
///
/// `Send + Sync` because the runner drives each source from its own task.
#[async_trait]
pub trait Source: Send + Sync {
    /// Human-readable source name, also the metric namespace.
    fn name(&self) -> &str;
    /// How often the runner should start a cycle.
    fn interval(&self) -> Duration;
    /// Run one ingestion cycle. `signal` is the process-level cancellation.
    async fn run_cycle(&self, signal: CancelSignal) -> Result<CycleReport, FeedError>;
}

/// Map a `reqwest` error to a transport error with context.
pub(crate) fn transport(context: &str, e: reqwest::Error) -> FeedError {
    if e.is_timeout() {
        FeedError::Transport(format!("{context}: timed out"))
    } else {
        FeedError::Transport(format!("{context}: {e}"))
    }
}
