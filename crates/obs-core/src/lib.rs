//! # obs-core
//!
//! Core crate for the rate observer, providing:
//!
//! - **Types** (`types`) — raw snapshot records, joined rates, market quotes, label tuples
//! - **Configuration** (`config`) — JSON config deserialization and validation
//! - **Error types** (`error`) — domain-specific `FeedError` via thiserror
//! - **Cancellation** (`cancel`) — watch-channel based cancellation signal
//! - **Task group** (`task_group`) — fail-fast / best-effort concurrent fan-out
//! - **Labels** (`label`) — transliteration + metric-safe label normalization
//! - **Sink** (`sink`) — metric sink trait, Prometheus and in-memory sinks
//! - **Logging** (`logging`) — tracing-based structured logging

pub mod cancel;
pub mod config;
pub mod error;
pub mod label;
pub mod logging;
pub mod sink;
pub mod task_group;
pub mod types;

// Re-export types at crate root for convenience.
pub use error::FeedError;
pub use types::*;
