//! Metric sinks.
//!
//! The sink is the only component with state that outlives a cycle. It is
//! constructed once by the runner and handed to every source as an
//! `Arc<dyn MetricSink>`; there is no process-wide registry.
//!
//! - [`PrometheusSink`] — one `HistogramVec` per series in an owned
//!   [`prometheus::Registry`], created on first use.
//! - [`MemorySink`] — keeps every observation in memory (tests, dry runs).
//!
//! Series cardinality grows with the upstream name sets (exchangers,
//! currencies, asset/fiat pairs) and is deliberately not capped.

use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use prometheus::{Encoder, HistogramOpts, HistogramVec, Registry, TextEncoder};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::error::FeedError;
use crate::types::LabelTuple;

/// Static description of one observed series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeriesSpec {
    pub namespace: &'static str,
    pub name: &'static str,
    pub help: &'static str,
    pub labels: &'static [&'static str],
}

impl SeriesSpec {
    /// Fully-qualified metric name, `{namespace}_{name}`.
    pub fn full_name(&self) -> String {
        format!("{}_{}", self.namespace, self.name)
    }
}

/// Destination of observations. Must accept concurrent writes.
pub trait MetricSink: Send + Sync {
    /// Append `value` to the distribution keyed by `(series, labels)`,
    /// creating the series on first use.
    fn record(&self, series: &SeriesSpec, labels: &LabelTuple, value: f64) -> Result<(), FeedError>;
}

fn check_arity(series: &SeriesSpec, labels: &LabelTuple) -> Result<(), FeedError> {
    if labels.len() != series.labels.len() {
        return Err(FeedError::Sink(format!(
            "{} expects {} label(s), got {}",
            series.full_name(),
            series.labels.len(),
            labels.len()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// SeriesObserver
// ---------------------------------------------------------------------------

/// Records decimal values into one series of a sink.
#[derive(Clone)]
pub struct SeriesObserver {
    sink: Arc<dyn MetricSink>,
    series: SeriesSpec,
}

impl SeriesObserver {
    pub fn new(sink: Arc<dyn MetricSink>, series: SeriesSpec) -> Self {
        Self { sink, series }
    }

    pub fn series(&self) -> &SeriesSpec {
        &self.series
    }

    pub fn record(&self, labels: &LabelTuple, value: Decimal) -> Result<(), FeedError> {
        let value = value
            .to_f64()
            .ok_or_else(|| FeedError::Decode(format!("{value} does not fit in f64")))?;
        self.sink.record(&self.series, labels, value)
    }
}

// ---------------------------------------------------------------------------
// PrometheusSink
// ---------------------------------------------------------------------------

/// Sink backed by an owned Prometheus registry.
pub struct PrometheusSink {
    registry: Registry,
    buckets: Vec<f64>,
    vecs: Mutex<AHashMap<String, HistogramVec>>,
}

impl PrometheusSink {
    /// Create a sink over `registry`.
    ///
    /// Values span many orders of magnitude (rates, prices, quantities), so
    /// buckets are exponential from 1e-4 by a factor of 4 (20 buckets).
    pub fn new(registry: Registry) -> Result<Self, FeedError> {
        let buckets = prometheus::exponential_buckets(1e-4, 4.0, 20)?;
        Ok(Self { registry, buckets, vecs: Mutex::new(AHashMap::new()) })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String, FeedError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| FeedError::Sink(e.to_string()))
    }

    fn histogram_vec(&self, series: &SeriesSpec) -> Result<HistogramVec, FeedError> {
        let key = series.full_name();
        let mut vecs = self.vecs.lock().map_err(|_| FeedError::Sink("series map poisoned".into()))?;
        if let Some(vec) = vecs.get(&key) {
            return Ok(vec.clone());
        }

        let opts = HistogramOpts::new(series.name, series.help)
            .namespace(series.namespace)
            .buckets(self.buckets.clone());
        let vec = HistogramVec::new(opts, series.labels)?;
        self.registry.register(Box::new(vec.clone()))?;
        vecs.insert(key, vec.clone());
        Ok(vec)
    }
}

impl MetricSink for PrometheusSink {
    fn record(&self, series: &SeriesSpec, labels: &LabelTuple, value: f64) -> Result<(), FeedError> {
        check_arity(series, labels)?;
        let vec = self.histogram_vec(series)?;
        vec.get_metric_with_label_values(&labels.as_strs())?.observe(value);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

/// One recorded observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub series: String,
    pub labels: LabelTuple,
    pub value: f64,
}

/// Sink that keeps observations in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    observations: Mutex<Vec<Observation>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far, in recording order.
    pub fn observations(&self) -> Vec<Observation> {
        self.observations.lock().map(|o| o.clone()).unwrap_or_default()
    }

    /// Observations of one series (by full name).
    pub fn series(&self, full_name: &str) -> Vec<Observation> {
        self.observations().into_iter().filter(|o| o.series == full_name).collect()
    }

    pub fn len(&self) -> usize {
        self.observations.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct `(series, labels)` keys.
    pub fn distinct_series(&self) -> usize {
        let mut keys: Vec<(String, LabelTuple)> =
            self.observations().into_iter().map(|o| (o.series, o.labels)).collect();
        keys.sort();
        keys.dedup();
        keys.len()
    }
}

impl MetricSink for MemorySink {
    fn record(&self, series: &SeriesSpec, labels: &LabelTuple, value: f64) -> Result<(), FeedError> {
        check_arity(series, labels)?;
        let mut observations =
            self.observations.lock().map_err(|_| FeedError::Sink("memory sink poisoned".into()))?;
        observations.push(Observation { series: series.full_name(), labels: labels.clone(), value });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    const RATE: SeriesSpec = SeriesSpec {
        namespace: "bestchange",
        name: "exchangeRate",
        help: "exchange rate",
        labels: &["exchanger", "source", "target"],
    };

    #[test]
    fn prometheus_sink_creates_series_on_first_use() {
        let sink = PrometheusSink::new(Registry::new()).unwrap();
        let labels = LabelTuple::from(["FastEx", "USD", "RUB"]);
        sink.record(&RATE, &labels, 95.3).unwrap();
        sink.record(&RATE, &labels, 96.0).unwrap();

        let families = sink.registry().gather();
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].get_name(), "bestchange_exchangeRate");
        let metric = &families[0].get_metric()[0];
        assert_eq!(metric.get_histogram().get_sample_count(), 2);

        let text = sink.encode_text().unwrap();
        assert!(text.contains(r#"exchanger="FastEx""#));
    }

    #[test]
    fn label_arity_is_checked() {
        let sink = PrometheusSink::new(Registry::new()).unwrap();
        let err = sink.record(&RATE, &LabelTuple::from(["FastEx"]), 1.0).unwrap_err();
        assert!(matches!(err, FeedError::Sink(_)));

        let mem = MemorySink::new();
        assert!(mem.record(&RATE, &LabelTuple::from(["a", "b"]), 1.0).is_err());
        assert!(mem.is_empty());
    }

    #[test]
    fn observer_converts_decimals() {
        let mem = Arc::new(MemorySink::new());
        let observer = SeriesObserver::new(mem.clone(), RATE);
        observer.record(&LabelTuple::from(["FastEx", "USD", "RUB"]), dec!(95.3)).unwrap();

        let recorded = mem.series("bestchange_exchangeRate");
        assert_eq!(recorded.len(), 1);
        assert!((recorded[0].value - 95.3).abs() < 1e-9);
        assert_eq!(observer.series().name, "exchangeRate");
    }

    #[test]
    fn memory_sink_counts_distinct_series() {
        let mem = MemorySink::new();
        mem.record(&RATE, &LabelTuple::from(["a", "USD", "RUB"]), 1.0).unwrap();
        mem.record(&RATE, &LabelTuple::from(["a", "USD", "RUB"]), 2.0).unwrap();
        mem.record(&RATE, &LabelTuple::from(["b", "USD", "RUB"]), 3.0).unwrap();
        assert_eq!(mem.len(), 3);
        assert_eq!(mem.distinct_series(), 2);
    }
}
