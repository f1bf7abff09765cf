//! BestChange bulk snapshot source.
//!
//! One cycle:
//! 1. [`SnapshotSource::prepare`] makes the archive available (download + unpack)
//! 2. the currency, exchanger and rate tables are loaded and parsed by three
//!    tasks of a fail-fast [`TaskGroup`]; any failure aborts the cycle
//! 3. the three tables are bundled into one [`Snapshot`] and [`join::join`]ed
//! 4. names are normalized into `(exchanger, source, target)` labels and the
//!    rates are observed
//!
//! Nothing is observed from a cycle whose tables did not all load.

pub mod fetch;
pub mod join;
pub mod parser;

use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use async_trait::async_trait;
use obs_core::cancel::CancelSignal;
use obs_core::config::{BestchangeConfig, RateSeriesMode, TableLayouts, TextEncoding};
use obs_core::label::LabelNormalizer;
use obs_core::sink::{MetricSink, SeriesObserver, SeriesSpec};
use obs_core::task_group::{GroupReport, Slot, TaskGroup, rendezvous};
use obs_core::{ExchangeRate, FeedError, IdNameTable, LabelTuple, ParseStats, RateTable, Snapshot, TableKind};
use rust_decimal::Decimal;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use self::fetch::{DirectorySource, HttpArchiveSource, SnapshotSource};
use crate::{CycleReport, Source};

pub const NAME: &str = "bestchange";

const LABELS: &[&str] = &["exchanger", "source", "target"];

pub const EXCHANGE_RATE: SeriesSpec =
    SeriesSpec { namespace: NAME, name: "exchangeRate", help: "BestChange give rate per exchanger and pair", labels: LABELS };
pub const GIVE_RATE: SeriesSpec =
    SeriesSpec { namespace: NAME, name: "giveRate", help: "BestChange give rate per exchanger and pair", labels: LABELS };
pub const GET_RATE: SeriesSpec =
    SeriesSpec { namespace: NAME, name: "getRate", help: "BestChange get rate per exchanger and pair", labels: LABELS };

/// A parsed table that reports its own parse statistics.
trait ParsedTable {
    fn stats(&self) -> ParseStats;
}

impl ParsedTable for IdNameTable {
    fn stats(&self) -> ParseStats {
        self.stats
    }
}

impl ParsedTable for RateTable {
    fn stats(&self) -> ParseStats {
        self.stats
    }
}

/// One published series and the rate field it observes.
struct RateSeries {
    observer: SeriesObserver,
    field: fn(&ExchangeRate) -> Decimal,
}

fn rate_series(mode: RateSeriesMode, sink: &Arc<dyn MetricSink>) -> Vec<RateSeries> {
    match mode {
        RateSeriesMode::Give => {
            vec![RateSeries { observer: SeriesObserver::new(sink.clone(), EXCHANGE_RATE), field: |r| r.give_rate }]
        }
        RateSeriesMode::Split => vec![
            RateSeries { observer: SeriesObserver::new(sink.clone(), GIVE_RATE), field: |r| r.give_rate },
            RateSeries { observer: SeriesObserver::new(sink.clone(), GET_RATE), field: |r| r.get_rate },
        ],
    }
}

/// The BestChange source.
pub struct Bestchange {
    source: Arc<dyn SnapshotSource>,
    encoding: TextEncoding,
    layouts: TableLayouts,
    normalizer: LabelNormalizer,
    series: Vec<RateSeries>,
    interval: Duration,
}

/// Build the source from config: a local directory when `snapshot_dir` is
/// set, the HTTP archive otherwise.
pub fn build(cfg: &BestchangeConfig, sink: Arc<dyn MetricSink>) -> Result<Bestchange, FeedError> {
    let source: Arc<dyn SnapshotSource> = match &cfg.snapshot_dir {
        Some(dir) => {
            info!("[bestchange] reading snapshots from {}", dir.display());
            Arc::new(DirectorySource::new(dir.clone(), cfg.files.clone()))
        }
        None => Arc::new(HttpArchiveSource::new(
            cfg.api_url.clone(),
            cfg.work_dir.clone(),
            cfg.files.clone(),
            cfg.timeout(),
        )?),
    };
    Ok(Bestchange::new(source, cfg, LabelNormalizer::default(), sink))
}

impl Bestchange {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        cfg: &BestchangeConfig,
        normalizer: LabelNormalizer,
        sink: Arc<dyn MetricSink>,
    ) -> Self {
        Self {
            source,
            encoding: cfg.encoding,
            layouts: cfg.layout,
            normalizer,
            series: rate_series(cfg.rate_series, &sink),
            interval: cfg.interval(),
        }
    }

    /// Spawn one load + decode + parse task and return the slot its table
    /// lands in. A table without a single valid row fails the task.
    fn spawn_table<T, P>(&self, group: &mut TaskGroup, kind: TableKind, parse: P) -> Slot<T>
    where
        T: ParsedTable + Send + 'static,
        P: FnOnce(&str) -> T + Send + 'static,
    {
        let (tx, slot) = rendezvous();
        let source = self.source.clone();
        let encoding = self.encoding;

        group.spawn(kind.to_string(), async move {
            let bytes = source.load(kind).await?;
            let table = parse(&parser::decode(&bytes, encoding));
            let stats = table.stats();
            if stats.parsed == 0 {
                return Err(FeedError::Decode(format!(
                    "{kind} table has no valid rows ({} line(s), {} skipped)",
                    stats.lines, stats.skipped
                )));
            }
            debug!("[bestchange] {kind}: {} parsed, {} skipped", stats.parsed, stats.skipped);
            tx.deliver(table);
            Ok(())
        });

        slot
    }

    /// Load the three tables of the prepared archive concurrently.
    async fn fetch_snapshot(&self, signal: &CancelSignal) -> Result<(Snapshot, GroupReport), FeedError> {
        let mut group = TaskGroup::fail_fast(NAME, signal.clone());
        let layouts = self.layouts;

        let currencies = self.spawn_table(&mut group, TableKind::Currencies, move |text| {
            parser::parse_currencies(text, layouts.currencies)
        });
        let exchangers = self.spawn_table(&mut group, TableKind::Exchangers, move |text| {
            parser::parse_exchangers(text, layouts.exchangers)
        });
        let rates =
            self.spawn_table(&mut group, TableKind::Rates, move |text| parser::parse_rates(text, layouts.rates));

        let report = group.wait().await?;
        let snapshot = Snapshot { currencies: currencies.take()?, exchangers: exchangers.take()?, rates: rates.take()? };
        Ok((snapshot, report))
    }

    async fn cycle(&self, signal: CancelSignal) -> Result<CycleReport, FeedError> {
        signal.run(self.source.prepare()).await.map_err(|e| e.abort(NAME))?;
        let (snapshot, tasks) = self.fetch_snapshot(&signal).await.map_err(|e| e.abort(NAME))?;

        let skipped_lines = snapshot.skipped_lines();
        if skipped_lines > 0 {
            warn!(
                "[bestchange] skipped {skipped_lines} malformed line(s) (currencies {}, exchangers {}, rates {})",
                snapshot.currencies.stats.skipped, snapshot.exchangers.stats.skipped, snapshot.rates.stats.skipped
            );
        }

        let outcome = join::join(&snapshot);
        let (observed, values) = self.observe(&outcome.rates);

        info!(
            "[bestchange] cycle done: {observed}/{} rates observed, {} dropped, {values} values",
            snapshot.rates.len(),
            outcome.dropped
        );
        Ok(CycleReport { tasks, observed, values, dropped: outcome.dropped, skipped_lines })
    }

    /// Record every joined rate. Returns `(rates observed, values written)`.
    fn observe(&self, rates: &[ExchangeRate]) -> (usize, usize) {
        // exchanger and currency names repeat across thousands of rates
        let mut names: AHashMap<&str, String> = AHashMap::new();
        let mut observed = 0;
        let mut values = 0;

        for rate in rates {
            let labels = LabelTuple::new(vec![
                normalized(&mut names, &self.normalizer, &rate.exchanger_name),
                normalized(&mut names, &self.normalizer, &rate.source_currency_name),
                normalized(&mut names, &self.normalizer, &rate.target_currency_name),
            ]);

            let mut written = 0;
            for series in &self.series {
                match series.observer.record(&labels, (series.field)(rate)) {
                    Ok(()) => written += 1,
                    Err(e) => warn!("[bestchange] {} {labels}: {e}", series.observer.series().full_name()),
                }
            }
            if written > 0 {
                observed += 1;
            }
            values += written;
        }

        (observed, values)
    }
}

fn normalized<'a>(cache: &mut AHashMap<&'a str, String>, normalizer: &LabelNormalizer, name: &'a str) -> String {
    cache.entry(name).or_insert_with(|| normalizer.normalize(name)).clone()
}

#[async_trait]
impl Source for Bestchange {
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

#[cfg(test)]
mod tests {
    use obs_core::cancel::Cancellation;
    use obs_core::sink::MemorySink;

    use super::*;

    /// In-memory snapshot. `None` tables fail to load; `stall` never returns.
    #[derive(Default)]
    struct FakeSnapshot {
        currencies: Option<Vec<u8>>,
        exchangers: Option<Vec<u8>>,
        rates: Option<Vec<u8>>,
        stall: Option<TableKind>,
    }

    impl FakeSnapshot {
        fn new(currencies: &str, exchangers: &str, rates: &str) -> Self {
            Self {
                currencies: Some(currencies.as_bytes().to_vec()),
                exchangers: Some(exchangers.as_bytes().to_vec()),
                rates: Some(rates.as_bytes().to_vec()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl SnapshotSource for FakeSnapshot {
        async fn prepare(&self) -> Result<(), FeedError> {
            Ok(())
        }

        async fn load(&self, table: TableKind) -> Result<Vec<u8>, FeedError> {
            if self.stall == Some(table) {
                std::future::pending::<()>().await;
            }
            let bytes = match table {
                TableKind::Currencies => &self.currencies,
                TableKind::Exchangers => &self.exchangers,
                TableKind::Rates => &self.rates,
            };
            bytes.clone().ok_or_else(|| FeedError::Transport(format!("{table}: connection reset")))
        }
    }

    const CURRENCIES: &str = "1;10;USD\n2;20;RUB\n";
    const EXCHANGERS: &str = "10;FastEx\n";

    fn source(fake: FakeSnapshot, mode: RateSeriesMode) -> (Bestchange, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let cfg = BestchangeConfig { rate_series: mode, ..Default::default() };
        let bc = Bestchange::new(Arc::new(fake), &cfg, LabelNormalizer::default(), sink.clone());
        (bc, sink)
    }

    #[tokio::test]
    async fn end_to_end_rate_is_observed() {
        let (bc, sink) = source(FakeSnapshot::new(CURRENCIES, EXCHANGERS, "1;2;10;1.0;95.3\n"), RateSeriesMode::Give);

        let report = bc.run_cycle(CancelSignal::never()).await.unwrap();
        assert_eq!(report.observed, 1);
        assert_eq!(report.values, 1);
        assert_eq!(report.dropped, 0);
        assert_eq!(report.tasks, GroupReport { spawned: 3, succeeded: 3, failed: 0 });

        let recorded = sink.series("bestchange_exchangeRate");
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].labels, LabelTuple::from(["FastEx", "USD", "RUB"]));
        assert!((recorded[0].value - 1.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn unknown_exchanger_is_dropped() {
        let (bc, sink) = source(FakeSnapshot::new(CURRENCIES, EXCHANGERS, "1;2;999;1.0;95.3\n"), RateSeriesMode::Give);

        let report = bc.run_cycle(CancelSignal::never()).await.unwrap();
        assert_eq!(report.dropped, 1);
        assert_eq!(report.observed, 0);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn one_failed_table_aborts_the_cycle() {
        let fake = FakeSnapshot { exchangers: None, ..FakeSnapshot::new(CURRENCIES, EXCHANGERS, "1;2;10;1;95.3\n") };
        let (bc, sink) = source(fake, RateSeriesMode::Give);

        let err = bc.run_cycle(CancelSignal::never()).await.unwrap_err();
        match err {
            FeedError::CycleAbort { source_name, reason } => {
                assert_eq!(source_name, "bestchange");
                assert!(matches!(*reason, FeedError::Transport(_)));
            }
            other => panic!("expected CycleAbort, got {other:?}"),
        }
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn failure_does_not_wait_for_stalled_table() {
        let fake = FakeSnapshot {
            currencies: Some(b"garbage\n".to_vec()),
            stall: Some(TableKind::Rates),
            ..FakeSnapshot::new(CURRENCIES, EXCHANGERS, "")
        };
        let (bc, sink) = source(fake, RateSeriesMode::Give);

        let res = tokio::time::timeout(Duration::from_secs(2), bc.run_cycle(CancelSignal::never())).await.unwrap();
        let Err(FeedError::CycleAbort { reason, .. }) = res else { panic!("expected CycleAbort") };
        assert!(matches!(*reason, FeedError::Decode(_)));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn split_mode_publishes_both_rates() {
        let rates = "1;2;10;1;95.3\n2;1;10;96.1;1\n";
        let (bc, sink) = source(FakeSnapshot::new(CURRENCIES, EXCHANGERS, rates), RateSeriesMode::Split);

        let report = bc.run_cycle(CancelSignal::never()).await.unwrap();
        assert_eq!(report.observed, 2);
        assert_eq!(report.values, 4);

        let get = sink.series("bestchange_getRate");
        assert_eq!(get.len(), 2);
        assert!((get[0].value - 95.3).abs() < 1e-9);
        assert_eq!(get[1].labels, LabelTuple::from(["FastEx", "RUB", "USD"]));
        assert_eq!(sink.series("bestchange_giveRate").len(), 2);
        assert!(sink.series("bestchange_exchangeRate").is_empty());
    }

    #[tokio::test]
    async fn skipped_lines_are_reported() {
        let rates = "1;2;10;1;95.3\n1;2;10;oops;1\n1;2\n";
        let (bc, _sink) = source(FakeSnapshot::new(CURRENCIES, EXCHANGERS, rates), RateSeriesMode::Give);

        let report = bc.run_cycle(CancelSignal::never()).await.unwrap();
        assert_eq!(report.skipped_lines, 2);
        assert_eq!(report.observed, 1);
    }

    #[tokio::test]
    async fn cyrillic_names_become_latin_labels() {
        let (exchangers, _, _) = encoding_rs::WINDOWS_1251.encode("10;Сбер Обмен\n");
        let fake = FakeSnapshot {
            exchangers: Some(exchangers.into_owned()),
            ..FakeSnapshot::new(CURRENCIES, "", "1;2;10;1;95.3\n")
        };
        let (bc, sink) = source(fake, RateSeriesMode::Give);

        bc.run_cycle(CancelSignal::never()).await.unwrap();
        let recorded = sink.observations();
        assert_eq!(recorded[0].labels, LabelTuple::from(["Sber_Obmen", "USD", "RUB"]));
    }

    #[tokio::test]
    async fn parent_cancel_returns_cancelled() {
        let fake = FakeSnapshot { stall: Some(TableKind::Rates), ..FakeSnapshot::new(CURRENCIES, EXCHANGERS, "") };
        let (bc, sink) = source(fake, RateSeriesMode::Give);
        let parent = Cancellation::new();
        let signal = parent.signal();

        let cycle = tokio::spawn(async move { bc.run_cycle(signal).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        parent.cancel();

        let res = tokio::time::timeout(Duration::from_secs(2), cycle).await.unwrap().unwrap();
        assert!(matches!(res, Err(FeedError::Cancelled)));
        assert!(sink.is_empty());
    }

    #[test]
    fn exposes_name_and_interval() {
        let (bc, _) = source(FakeSnapshot::default(), RateSeriesMode::Give);
        assert_eq!(bc.name(), "bestchange");
        assert_eq!(bc.interval(), Duration::from_secs(60));
    }
}
