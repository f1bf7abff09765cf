//! Configuration parsing for the rate observer.
//!
//! All settings come from a single JSON file. Every key except the per-source
//! `enabled` flags has a default, so a minimal config only switches sources
//! on.
//!
//! # Example config
//!
//! ```json
//! {
//!   "logging": { "module_name": "rate-observer", "log_path": "/var/log/obs" },
//!   "metrics": { "listen": "0.0.0.0:9090" },
//!   "binance": {
//!     "enabled": true,
//!     "assets": ["USDT", "BTC"],
//!     "fiats": ["RUB"],
//!     "interval_secs": 60
//!   },
//!   "bestchange": {
//!     "enabled": true,
//!     "work_dir": "/tmp/bestchange",
//!     "rate_series": "split"
//!   }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::error::FeedError;
use crate::types::TradeType;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    pub binance: BinanceConfig,
    pub bestchange: BestchangeConfig,
}

impl AppConfig {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), FeedError> {
        self.metrics
            .listen
            .parse::<std::net::SocketAddr>()
            .map_err(|e| FeedError::Config(format!("metrics.listen '{}': {e}", self.metrics.listen)))?;
        if self.binance.enabled {
            self.binance.validate()?;
        }
        if self.bestchange.enabled {
            self.bestchange.validate()?;
        }
        Ok(())
    }
}

/// Logging metadata block.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Used as the log file prefix.
    pub module_name: String,
    /// Directory for daily-rotating log files. Console only when absent.
    pub log_path: Option<String>,
    /// JSON lines on the console instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { module_name: "rate-observer".into(), log_path: None, json: false }
    }
}

/// Metrics exposition endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Socket address serving `/metrics` and `/health`.
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { listen: "0.0.0.0:9090".into() }
    }
}

// ---------------------------------------------------------------------------
// Binance P2P quote source
// ---------------------------------------------------------------------------

/// Binance P2P advertisement search.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BinanceConfig {
    pub enabled: bool,
    /// Search endpoint (POST).
    pub address: String,
    pub assets: Vec<String>,
    pub fiats: Vec<String>,
    pub trade_types: Vec<TradeType>,
    pub merchant_check: bool,
    pub page: u32,
    pub rows: u32,
    pub interval_secs: u64,
    /// Client-level deadline for each request.
    pub timeout_secs: u64,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "https://p2p.binance.com/bapi/c2c/v2/friendly/c2c/adv/search".into(),
            assets: vec!["USDT".into()],
            fiats: vec!["RUB".into()],
            trade_types: vec![TradeType::Buy, TradeType::Sell],
            merchant_check: true,
            page: 1,
            rows: 20,
            interval_secs: 60,
            timeout_secs: 15,
        }
    }
}

impl BinanceConfig {
    fn validate(&self) -> Result<(), FeedError> {
        validate_url("binance.address", &self.address)?;
        if self.assets.is_empty() || self.fiats.is_empty() || self.trade_types.is_empty() {
            return Err(FeedError::Config("binance needs at least one asset, fiat and trade type".into()));
        }
        if self.rows == 0 || self.page == 0 {
            return Err(FeedError::Config("binance.page and binance.rows must be positive".into()));
        }
        validate_timing("binance", self.interval_secs, self.timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// BestChange bulk snapshot source
// ---------------------------------------------------------------------------

/// How BestChange rates are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateSeriesMode {
    /// One series, `exchangeRate`, observing the give rate.
    #[default]
    Give,
    /// Two series, `giveRate` and `getRate`.
    Split,
}

/// Text encoding of the snapshot files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum TextEncoding {
    #[default]
    #[serde(rename = "windows-1251", alias = "cp1251")]
    Windows1251,
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
}

/// File names of the three tables inside the archive.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnapshotFiles {
    pub currencies: String,
    pub exchangers: String,
    pub rates: String,
}

impl Default for SnapshotFiles {
    fn default() -> Self {
        Self { currencies: "bm_cy.dat".into(), exchangers: "bm_exch.dat".into(), rates: "bm_rates.dat".into() }
    }
}

/// Column positions of an id→name table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct IdNameLayout {
    pub id: usize,
    pub name: usize,
}

impl IdNameLayout {
    pub fn min_columns(&self) -> usize {
        self.id.max(self.name) + 1
    }
}

/// Column positions of the rate table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RateLayout {
    pub source: usize,
    pub target: usize,
    pub exchanger: usize,
    pub give: usize,
    pub get: usize,
}

impl Default for RateLayout {
    fn default() -> Self {
        Self { source: 0, target: 1, exchanger: 2, give: 3, get: 4 }
    }
}

impl RateLayout {
    pub fn min_columns(&self) -> usize {
        [self.source, self.target, self.exchanger, self.give, self.get].into_iter().max().unwrap_or(0) + 1
    }
}

/// Column layouts of the three tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TableLayouts {
    pub currencies: IdNameLayout,
    pub exchangers: IdNameLayout,
    pub rates: RateLayout,
}

impl Default for TableLayouts {
    fn default() -> Self {
        Self {
            currencies: IdNameLayout { id: 0, name: 2 },
            exchangers: IdNameLayout { id: 0, name: 1 },
            rates: RateLayout::default(),
        }
    }
}

/// BestChange snapshot archive.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BestchangeConfig {
    pub enabled: bool,
    /// Archive URL.
    pub api_url: String,
    /// Where the archive is unpacked each cycle.
    pub work_dir: PathBuf,
    /// Read an already-unpacked directory instead of downloading.
    pub snapshot_dir: Option<PathBuf>,
    pub encoding: TextEncoding,
    pub rate_series: RateSeriesMode,
    pub files: SnapshotFiles,
    pub layout: TableLayouts,
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for BestchangeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "http://api.bestchange.ru/info.zip".into(),
            work_dir: std::env::temp_dir().join("bestchange"),
            snapshot_dir: None,
            encoding: TextEncoding::default(),
            rate_series: RateSeriesMode::default(),
            files: SnapshotFiles::default(),
            layout: TableLayouts::default(),
            interval_secs: 60,
            timeout_secs: 15,
        }
    }
}

impl BestchangeConfig {
    fn validate(&self) -> Result<(), FeedError> {
        if self.snapshot_dir.is_none() {
            validate_url("bestchange.api_url", &self.api_url)?;
        }
        let files = [&self.files.currencies, &self.files.exchangers, &self.files.rates];
        if files.iter().any(|f| f.trim().is_empty()) {
            return Err(FeedError::Config("bestchange.files entries must not be empty".into()));
        }
        validate_timing("bestchange", self.interval_secs, self.timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn validate_url(key: &str, value: &str) -> Result<(), FeedError> {
    let url = url::Url::parse(value).map_err(|e| FeedError::Config(format!("{key} '{value}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(FeedError::Config(format!("{key} must be http(s), got '{}'", url.scheme())));
    }
    Ok(())
}

fn validate_timing(source: &str, interval_secs: u64, timeout_secs: u64) -> Result<(), FeedError> {
    if interval_secs == 0 || timeout_secs == 0 {
        return Err(FeedError::Config(format!("{source}: interval_secs and timeout_secs must be positive")));
    }
    Ok(())
}

/// Load, parse and validate a JSON config file.
pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    let config: AppConfig =
        serde_json::from_str(&content).with_context(|| format!("parsing config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}
