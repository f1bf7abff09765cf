//! Bulk snapshot records: raw tables as parsed, and joined exchange rates.
//!
//! A [`Snapshot`] bundles the three tables of one fetch cycle. It is the only
//! input the joiner accepts, so a fresh rate table can never be joined
//! against a stale currency or exchanger mapping.

use ahash::AHashMap;
use rust_decimal::Decimal;

/// Per-file parse statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    /// Non-blank lines seen.
    pub lines: usize,
    /// Lines that produced a record.
    pub parsed: usize,
    /// Malformed (or duplicate-id) lines that were skipped.
    pub skipped: usize,
}

/// One row of the currency table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCurrency {
    pub id: i64,
    pub name: String,
}

/// One row of the exchanger table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExchanger {
    pub id: i64,
    pub name: String,
}

/// One row of the rate table, still referencing ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExchangeRate {
    pub exchanger_id: i64,
    pub source_currency_id: i64,
    pub target_currency_id: i64,
    pub give_rate: Decimal,
    pub get_rate: Decimal,
}

/// An exchange rate with every id resolved to a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeRate {
    pub exchanger_name: String,
    pub source_currency_name: String,
    pub target_currency_name: String,
    pub give_rate: Decimal,
    pub get_rate: Decimal,
}

/// An `id -> name` mapping (currencies or exchangers).
#[derive(Debug, Clone, Default)]
pub struct IdNameTable {
    names: AHashMap<i64, String>,
    pub stats: ParseStats,
}

impl IdNameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a mapping. Returns `false` (and keeps the existing name) if the
    /// id is already present.
    pub fn insert(&mut self, id: i64, name: String) -> bool {
        match self.names.entry(id) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(name);
                true
            }
        }
    }

    pub fn get(&self, id: i64) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Rows are inserted in order; a repeated id keeps the first name and is
/// counted as skipped.
impl FromIterator<(i64, String)> for IdNameTable {
    fn from_iter<I: IntoIterator<Item = (i64, String)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (id, name) in iter {
            if table.insert(id, name) {
                table.stats.parsed += 1;
            } else {
                table.stats.skipped += 1;
            }
        }
        table
    }
}

impl From<Vec<RawCurrency>> for IdNameTable {
    fn from(rows: Vec<RawCurrency>) -> Self {
        rows.into_iter().map(|c| (c.id, c.name)).collect()
    }
}

impl From<Vec<RawExchanger>> for IdNameTable {
    fn from(rows: Vec<RawExchanger>) -> Self {
        rows.into_iter().map(|e| (e.id, e.name)).collect()
    }
}

/// The rate table in file order.
#[derive(Debug, Clone, Default)]
pub struct RateTable {
    pub rates: Vec<RawExchangeRate>,
    pub stats: ParseStats,
}

impl RateTable {
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

impl From<Vec<RawExchangeRate>> for RateTable {
    fn from(rates: Vec<RawExchangeRate>) -> Self {
        let stats = ParseStats { parsed: rates.len(), ..ParseStats::default() };
        Self { rates, stats }
    }
}

/// The three tables of one snapshot cycle.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub currencies: IdNameTable,
    pub exchangers: IdNameTable,
    pub rates: RateTable,
}

impl Snapshot {
    /// Total skipped lines across the three files.
    pub fn skipped_lines(&self) -> usize {
        self.currencies.stats.skipped + self.exchangers.stats.skipped + self.rates.stats.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_id_keeps_first() {
        let mut t = IdNameTable::new();
        assert!(t.insert(1, "USD".into()));
        assert!(!t.insert(1, "EUR".into()));
        assert_eq!(t.get(1), Some("USD"));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn from_raw_rows_counts_duplicates() {
        let t: IdNameTable = vec![
            RawCurrency { id: 1, name: "USD".into() },
            RawCurrency { id: 2, name: "RUB".into() },
            RawCurrency { id: 1, name: "EUR".into() },
        ]
        .into();
        assert_eq!(t.get(1), Some("USD"));
        assert_eq!(t.get(2), Some("RUB"));
        assert_eq!(t.get(3), None);
        assert_eq!(t.stats, ParseStats { lines: 0, parsed: 2, skipped: 1 });
    }

    #[test]
    fn skipped_lines_sums_tables() {
        let mut s = Snapshot::default();
        s.currencies.stats.skipped = 1;
        s.exchangers.stats.skipped = 2;
        s.rates.stats.skipped = 3;
        assert_eq!(s.skipped_lines(), 6);
    }
}
