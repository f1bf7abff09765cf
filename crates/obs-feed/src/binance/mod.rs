//! Binance P2P quote source.
//!
//! One query per `fiat × asset × trade_type`. Each query is an independent
//! task of a best-effort [`TaskGroup`]: a failed request or unreadable body
//! drops only that query's quotes, the rest of the batch is still observed.
//!
//! Every quote entry yields three values, one per series:
//! `binance_price`, `binance_tradableQuantity`, `binance_commissionRate`,
//! labelled `(tradeType, asset, fiat)`.

pub mod client;
pub mod json_parser;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use obs_core::cancel::CancelSignal;
use obs_core::config::BinanceConfig;
use obs_core::label::LabelNormalizer;
use obs_core::sink::{MetricSink, SeriesObserver, SeriesSpec};
use obs_core::task_group::TaskGroup;
use obs_core::{FeedError, MarketQuote, QuoteQuery};
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use self::client::{HttpQuoteApi, QuoteApi};
use crate::{CycleReport, Source};

pub const NAME: &str = "binance";

const LABELS: &[&str] = &["tradeType", "asset", "fiat"];

pub const PRICE: SeriesSpec =
    SeriesSpec { namespace: NAME, name: "price", help: "P2P advertisement price", labels: LABELS };
pub const TRADABLE_QUANTITY: SeriesSpec =
    SeriesSpec { namespace: NAME, name: "tradableQuantity", help: "P2P advertisement tradable quantity", labels: LABELS };
pub const COMMISSION_RATE: SeriesSpec =
    SeriesSpec { namespace: NAME, name: "commissionRate", help: "P2P advertisement commission rate", labels: LABELS };

/// Expand the config into one query per `fiat × asset × trade_type`.
pub fn build_queries(cfg: &BinanceConfig) -> Vec<QuoteQuery> {
    let mut queries = Vec::with_capacity(cfg.fiats.len() * cfg.assets.len() * cfg.trade_types.len());
    for fiat in &cfg.fiats {
        for asset in &cfg.assets {
            for &trade_type in &cfg.trade_types {
                queries.push(QuoteQuery {
                    asset: asset.clone(),
                    fiat: fiat.clone(),
                    merchant_check: cfg.merchant_check,
                    page: cfg.page,
                    publisher_type: None,
                    rows: cfg.rows,
                    trade_type,
                });
            }
        }
    }
    queries
}

/// The three per-quote series.
#[derive(Clone)]
struct QuoteSeries {
    price: SeriesObserver,
    tradable_quantity: SeriesObserver,
    commission_rate: SeriesObserver,
}

impl QuoteSeries {
    fn new(sink: &Arc<dyn MetricSink>) -> Self {
        Self {
            price: SeriesObserver::new(sink.clone(), PRICE),
            tradable_quantity: SeriesObserver::new(sink.clone(), TRADABLE_QUANTITY),
            commission_rate: SeriesObserver::new(sink.clone(), COMMISSION_RATE),
        }
    }

    /// Record one quote. Returns the number of values written.
    fn record(&self, normalizer: &LabelNormalizer, quote: &MarketQuote) -> usize {
        let labels = normalizer.tuple(&[quote.trade_type.as_str(), quote.asset.as_str(), quote.fiat.as_str()]);
        let values = [
            (&self.price, quote.price),
            (&self.tradable_quantity, quote.tradable_quantity),
            (&self.commission_rate, quote.commission_rate),
        ];

        let mut written = 0;
        for (observer, value) in values {
            match observer.record(&labels, value) {
                Ok(()) => written += 1,
                Err(e) => warn!("[binance] {} {labels}: {e}", observer.series().full_name()),
            }
        }
        written
    }
}

/// Per-cycle counters shared by the query tasks.
#[derive(Default)]
struct Counters {
    observed: AtomicUsize,
    values: AtomicUsize,
    dropped: AtomicUsize,
}

/// The Binance source.
pub struct Binance {
    api: Arc<dyn QuoteApi>,
    queries: Vec<QuoteQuery>,
    normalizer: LabelNormalizer,
    series: QuoteSeries,
    interval: Duration,
}

/// Build the source with the HTTP client from config.
pub fn build(cfg: &BinanceConfig, sink: Arc<dyn MetricSink>) -> Result<Binance, FeedError> {
    let api = HttpQuoteApi::new(cfg.address.clone(), cfg.timeout())?;
    Ok(Binance::new(Arc::new(api), cfg, LabelNormalizer::default(), sink))
}

impl Binance {
    pub fn new(
        api: Arc<dyn QuoteApi>,
        cfg: &BinanceConfig,
        normalizer: LabelNormalizer,
        sink: Arc<dyn MetricSink>,
    ) -> Self {
        Self { api, queries: build_queries(cfg), normalizer, series: QuoteSeries::new(&sink), interval: cfg.interval() }
    }

    pub fn queries(&self) -> &[QuoteQuery] {
        &self.queries
    }

    async fn cycle(&self, signal: CancelSignal) -> Result<CycleReport, FeedError> {
        let mut group = TaskGroup::best_effort(NAME, signal);
        let counters = Arc::new(Counters::default());

        for query in &self.queries {
            let api = self.api.clone();
            let query = query.clone();
            let normalizer = self.normalizer.clone();
            let series = self.series.clone();
            let counters = counters.clone();

            group.spawn(query.label(), async move {
                let body = api.search(&query).await?;
                let batch = json_parser::parse_response(&body, &query)?;

                let mut observed = 0;
                let mut values = 0;
                for quote in &batch.quotes {
                    let written = series.record(&normalizer, quote);
                    if written > 0 {
                        observed += 1;
                    }
                    values += written;
                }
                counters.observed.fetch_add(observed, Ordering::Relaxed);
                counters.values.fetch_add(values, Ordering::Relaxed);
                counters.dropped.fetch_add(batch.skipped, Ordering::Relaxed);
                Ok(())
            });
        }

        let tasks = group.wait().await?;
        let report = CycleReport {
            tasks,
            observed: counters.observed.load(Ordering::Relaxed),
            values: counters.values.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            skipped_lines: 0,
        };

        info!(
            "[binance] cycle done: {}/{} queries ok, {} quotes observed, {} values",
            tasks.succeeded, tasks.spawned, report.observed, report.values
        );
        Ok(report)
    }
}

#[async_trait]
impl Source for Binance {
    fn name(&self) -> &str {
        NAME
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_cycle(&self, signal: CancelSignal) -> Result<CycleReport, FeedError> {
        let span = info_span!("cycle", source = NAME, id = %Uuid::new_v4());
        self.cycle(signal).instrument(span).await
    }
}
