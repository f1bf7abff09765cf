//! P2P search response parser.
//!
//! The body is `{"data": [{"adv": {...}}, ...]}` with string-encoded decimals.
//! An unreadable body fails the whole query; an entry with a missing or
//! non-decimal field is skipped and counted.

use obs_core::{FeedError, MarketQuote, QuoteQuery, TradeType};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::bestchange::parser::parse_decimal;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct AdvEntry {
    adv: Adv,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Adv {
    trade_type: Option<String>,
    asset: Option<String>,
    fiat_unit: Option<String>,
    price: Option<String>,
    tradable_quantity: Option<String>,
    commission_rate: Option<String>,
}

/// Quotes parsed from one response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuoteBatch {
    pub quotes: Vec<MarketQuote>,
    /// Entries that could not be turned into a quote.
    pub skipped: usize,
}

/// Parse a search response for `query`. Label fields missing from an entry
/// fall back to the query's values.
pub fn parse_response(body: &[u8], query: &QuoteQuery) -> Result<QuoteBatch, FeedError> {
    let resp: SearchResponse = serde_json::from_slice(body)
        .map_err(|e| FeedError::Decode(format!("{}: unreadable body: {e}", query.label())))?;

    let mut batch = QuoteBatch::default();
    for (i, entry) in resp.data.unwrap_or_default().into_iter().enumerate() {
        match parse_entry(entry, query) {
            Ok(quote) => batch.quotes.push(quote),
            Err(reason) => {
                batch.skipped += 1;
                debug!("[binance] {} entry {i} skipped: {reason}", query.label());
            }
        }
    }
    Ok(batch)
}

fn parse_entry(entry: serde_json::Value, query: &QuoteQuery) -> Result<MarketQuote, String> {
    let AdvEntry { adv } = serde_json::from_value(entry).map_err(|e| e.to_string())?;

    let trade_type = match adv.trade_type.as_deref() {
        Some(s) => s.parse::<TradeType>()?,
        None => query.trade_type,
    };

    Ok(MarketQuote {
        trade_type,
        asset: adv.asset.unwrap_or_else(|| query.asset.clone()),
        fiat: adv.fiat_unit.unwrap_or_else(|| query.fiat.clone()),
        price: decimal_field(adv.price.as_deref(), "price")?,
        tradable_quantity: decimal_field(adv.tradable_quantity.as_deref(), "tradableQuantity")?,
        commission_rate: decimal_field(adv.commission_rate.as_deref(), "commissionRate")?,
    })
}

fn decimal_field(raw: Option<&str>, field: &str) -> Result<Decimal, String> {
    let raw = raw.ok_or_else(|| format!("missing {field}"))?;
    parse_decimal(raw).ok_or_else(|| format!("{field} '{raw}' is not a decimal"))
}
