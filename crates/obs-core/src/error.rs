//! Typed error definitions for the rate observer.
//!
//! [`FeedError`] classifies every failure by how far it is allowed to
//! propagate: a transport or decode error fails one task (or one record), a
//! join miss drops one record, and a cycle abort discards a whole cycle. All
//! variants implement `std::error::Error` via `thiserror`, so they integrate
//! with `anyhow::Result` at the binary boundary.

use thiserror::Error;

/// Which foreign key failed to resolve during a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKey {
    Exchanger,
    SourceCurrency,
    TargetCurrency,
}

impl std::fmt::Display for JoinKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exchanger => write!(f, "exchanger"),
            Self::SourceCurrency => write!(f, "source currency"),
            Self::TargetCurrency => write!(f, "target currency"),
        }
    }
}

/// Domain-specific errors for the rate observer.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Network, HTTP status, or file I/O failure. Fails only the owning task.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed response body, line, or numeric field.
    #[error("decode error: {0}")]
    Decode(String),

    /// Unresolved foreign key. The record is dropped and counted.
    #[error("join miss: unknown {kind} id {id}")]
    JoinMiss { kind: JoinKey, id: i64 },

    /// A fail-fast dependency failed; the whole cycle was discarded.
    #[error("cycle aborted for {source_name}: {reason}")]
    CycleAbort {
        source_name: String,
        #[source]
        reason: Box<FeedError>,
    },

    /// The surrounding cancellation signal fired before the work completed.
    #[error("cancelled")]
    Cancelled,

    /// A spawned task panicked, or a rendezvous slot was left empty.
    #[error("task error: {0}")]
    Task(String),

    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// Metric registration or observation error.
    #[error("sink error: {0}")]
    Sink(String),
}

impl FeedError {
    /// Wrap `self` as the reason a fail-fast cycle of `source_name` aborted.
    pub fn abort(self, source_name: &str) -> Self {
        match self {
            Self::Cancelled => Self::Cancelled,
            reason => Self::CycleAbort { source_name: source_name.to_string(), reason: Box::new(reason) },
        }
    }
}

impl From<std::io::Error> for FeedError {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<prometheus::Error> for FeedError {
    fn from(e: prometheus::Error) -> Self {
        Self::Sink(e.to_string())
    }
}
