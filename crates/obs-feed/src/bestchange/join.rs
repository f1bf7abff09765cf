//! Foreign-key resolution of one snapshot.
//!
//! [`join`] is pure: the same snapshot always yields the same output, in rate
//! table order. A rate whose exchanger or either currency is unknown is
//! dropped and counted; a missing reference never fails the cycle.

use obs_core::error::JoinKey;
use obs_core::{ExchangeRate, FeedError, IdNameTable, RawExchangeRate, Snapshot};
use tracing::debug;

/// Result of joining one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinOutcome {
    pub rates: Vec<ExchangeRate>,
    pub dropped: usize,
}

/// Resolve every rate of `snapshot` against its own currency and exchanger
/// tables.
///
/// Invariant: `outcome.rates.len() + outcome.dropped == snapshot.rates.len()`.
pub fn join(snapshot: &Snapshot) -> JoinOutcome {
    let mut outcome = JoinOutcome { rates: Vec::with_capacity(snapshot.rates.len()), dropped: 0 };

    for raw in &snapshot.rates.rates {
        match resolve(raw, &snapshot.exchangers, &snapshot.currencies) {
            Ok(rate) => outcome.rates.push(rate),
            Err(miss) => {
                outcome.dropped += 1;
                debug!("[bestchange] rate dropped: {miss}");
            }
        }
    }

    outcome
}

fn resolve(
    raw: &RawExchangeRate,
    exchangers: &IdNameTable,
    currencies: &IdNameTable,
) -> Result<ExchangeRate, FeedError> {
    let lookup = |table: &IdNameTable, id: i64, kind: JoinKey| {
        table.get(id).map(str::to_string).ok_or(FeedError::JoinMiss { kind, id })
    };

    Ok(ExchangeRate {
        exchanger_name: lookup(exchangers, raw.exchanger_id, JoinKey::Exchanger)?,
        source_currency_name: lookup(currencies, raw.source_currency_id, JoinKey::SourceCurrency)?,
        target_currency_name: lookup(currencies, raw.target_currency_id, JoinKey::TargetCurrency)?,
        give_rate: raw.give_rate,
        get_rate: raw.get_rate,
    })
}
