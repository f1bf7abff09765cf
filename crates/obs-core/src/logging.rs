//! Logging initialization using the `tracing` ecosystem.
//!
//! Console output is human-readable by default or one JSON object per line
//! (`logging.json` in config) for log shippers. An optional directory adds a
//! daily-rotating plain-text file via `tracing-appender`. The level comes from
//! `RUST_LOG` when set, otherwise from the CLI.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Options for [`init_logging`].
#[derive(Debug, Clone)]
pub struct LogOptions<'a> {
    /// Default level if `RUST_LOG` is not set (e.g. `"info"`).
    pub level: &'a str,
    /// Optional directory for daily-rotating log files.
    pub dir: Option<&'a str>,
    /// Log file prefix.
    pub module_name: &'a str,
    /// Emit JSON lines on the console.
    pub json: bool,
}

/// Initialize the global tracing subscriber. Call once at program start.
pub fn init_logging(opts: &LogOptions<'_>) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(opts.level));

    let file_layer = opts.dir.map(|dir| {
        let appender = tracing_appender::rolling::daily(dir, opts.module_name);
        fmt::layer().with_writer(appender).with_ansi(false).with_target(true)
    });

    let registry = tracing_subscriber::registry().with(env_filter).with(file_layer);

    if opts.json {
        registry.with(fmt::layer().json().with_current_span(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true).with_ansi(true)).init();
    }
}
