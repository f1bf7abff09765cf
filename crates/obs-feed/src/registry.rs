//! Source registry: builds the enabled sources from config.

use std::sync::Arc;

use anyhow::{Context, Result};
use obs_core::config::AppConfig;
use obs_core::sink::MetricSink;
use tracing::info;

use crate::Source;

/// Create every source whose `enabled` flag is set. All sources write to the
/// same `sink`.
pub fn create_sources(config: &AppConfig, sink: Arc<dyn MetricSink>) -> Result<Vec<Arc<dyn Source>>> {
    let mut sources: Vec<Arc<dyn Source>> = Vec::new();

    if config.binance.enabled {
        let binance = crate::binance::build(&config.binance, sink.clone()).context("building binance source")?;
        info!("[registry] binance: {} queries every {:?}", binance.queries().len(), config.binance.interval());
        sources.push(Arc::new(binance));
    }

    if config.bestchange.enabled {
        let bestchange =
            crate::bestchange::build(&config.bestchange, sink.clone()).context("building bestchange source")?;
        info!("[registry] bestchange: every {:?}", config.bestchange.interval());
        sources.push(Arc::new(bestchange));
    }

    Ok(sources)
}

#[cfg(test)]
mod tests {
    use obs_core::sink::MemorySink;

    use super::*;

    #[test]
    fn only_enabled_sources_are_built() {
        let sink: Arc<dyn MetricSink> = Arc::new(MemorySink::new());

        let none = create_sources(&AppConfig::default(), sink.clone()).unwrap();
        assert!(none.is_empty());

        let mut config = AppConfig::default();
        config.bestchange.enabled = true;
        config.bestchange.snapshot_dir = Some(std::env::temp_dir());
        let one = create_sources(&config, sink.clone()).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].name(), "bestchange");

        config.binance.enabled = true;
        let both = create_sources(&config, sink).unwrap();
        let names: Vec<&str> = both.iter().map(|s| s.name()).collect();
        assert_eq!(names, ["binance", "bestchange"]);
    }
}
