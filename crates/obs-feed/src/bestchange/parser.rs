//! BestChange snapshot table parser.
//!
//! The files are `;`-separated lines in a fixed legacy layout (windows-1251
//! by default). A malformed line is skipped and counted in the table's
//! [`ParseStats`]; it never aborts the rest of the file. Blank lines are
//! ignored and not counted.

use std::borrow::Cow;
use std::str::FromStr;

use encoding_rs::WINDOWS_1251;
use obs_core::config::{IdNameLayout, RateLayout, TextEncoding};
use obs_core::{IdNameTable, ParseStats, RateTable, RawCurrency, RawExchangeRate, RawExchanger};
use rust_decimal::Decimal;
use tracing::debug;

const SEPARATOR: char = ';';

/// Decode raw file bytes. Undecodable bytes become U+FFFD.
pub fn decode(bytes: &[u8], encoding: TextEncoding) -> Cow<'_, str> {
    match encoding {
        TextEncoding::Windows1251 => WINDOWS_1251.decode_without_bom_handling(bytes).0,
        TextEncoding::Utf8 => String::from_utf8_lossy(bytes),
    }
}

/// Parse the currency table into an `id -> name` mapping.
pub fn parse_currencies(text: &str, layout: IdNameLayout) -> IdNameTable {
    let (rows, lines) = parse_rows(text, "currencies", |cols| {
        let (id, name) = id_name(cols, layout)?;
        Ok(RawCurrency { id, name })
    });
    with_line_stats(IdNameTable::from(rows), "currencies", lines)
}

/// Parse the exchanger table into an `id -> name` mapping.
pub fn parse_exchangers(text: &str, layout: IdNameLayout) -> IdNameTable {
    let (rows, lines) = parse_rows(text, "exchangers", |cols| {
        let (id, name) = id_name(cols, layout)?;
        Ok(RawExchanger { id, name })
    });
    with_line_stats(IdNameTable::from(rows), "exchangers", lines)
}

/// Parse the rate table, keeping file order.
pub fn parse_rates(text: &str, layout: RateLayout) -> RateTable {
    let (rows, lines) = parse_rows(text, "rates", |cols| rate(cols, layout));
    let mut table = RateTable::from(rows);
    merge_line_stats(&mut table.stats, lines);
    table
}

/// Parse every data line with `parse`. Returns the parsed rows and the
/// line-level stats (`lines` seen, malformed lines `skipped`).
fn parse_rows<R>(
    text: &str,
    table_name: &str,
    parse: impl Fn(&[&str]) -> Result<R, String>,
) -> (Vec<R>, ParseStats) {
    let mut rows = Vec::new();
    let mut stats = ParseStats::default();

    for (lineno, line) in data_lines(text) {
        stats.lines += 1;
        let cols: Vec<&str> = line.split(SEPARATOR).collect();
        match parse(&cols) {
            Ok(row) => rows.push(row),
            Err(reason) => {
                stats.skipped += 1;
                debug!("[bestchange] {table_name} line {lineno} skipped: {reason}");
            }
        }
    }
    (rows, stats)
}

fn with_line_stats(mut table: IdNameTable, table_name: &str, lines: ParseStats) -> IdNameTable {
    if table.stats.skipped > 0 {
        debug!("[bestchange] {table_name}: {} duplicate id(s) skipped", table.stats.skipped);
    }
    merge_line_stats(&mut table.stats, lines);
    table
}

/// Fold line-level stats into the stats a table collected from its rows.
fn merge_line_stats(stats: &mut ParseStats, lines: ParseStats) {
    stats.lines = lines.lines;
    stats.skipped += lines.skipped;
}

/// Non-blank lines with their 1-based line numbers.
fn data_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines().enumerate().map(|(i, l)| (i + 1, l)).filter(|(_, l)| !l.trim().is_empty())
}

fn column<'a>(cols: &[&'a str], idx: usize, what: &str) -> Result<&'a str, String> {
    cols.get(idx).map(|c| c.trim()).ok_or_else(|| format!("missing {what} column {idx} ({} present)", cols.len()))
}

fn parse_id(cols: &[&str], idx: usize, what: &str) -> Result<i64, String> {
    let raw = column(cols, idx, what)?;
    raw.parse::<i64>().map_err(|_| format!("{what} '{raw}' is not an integer"))
}

fn parse_rate_value(cols: &[&str], idx: usize, what: &str) -> Result<Decimal, String> {
    let raw = column(cols, idx, what)?;
    parse_decimal(raw).ok_or_else(|| format!("{what} '{raw}' is not a decimal"))
}

fn check_width(cols: &[&str], min: usize) -> Result<(), String> {
    if cols.len() < min {
        return Err(format!("expected at least {min} columns, got {}", cols.len()));
    }
    Ok(())
}

fn id_name(cols: &[&str], layout: IdNameLayout) -> Result<(i64, String), String> {
    check_width(cols, layout.min_columns())?;
    let id = parse_id(cols, layout.id, "id")?;
    let name = column(cols, layout.name, "name")?;
    if name.is_empty() {
        return Err(format!("empty name for id {id}"));
    }
    Ok((id, name.to_string()))
}

fn rate(cols: &[&str], layout: RateLayout) -> Result<RawExchangeRate, String> {
    check_width(cols, layout.min_columns())?;
    Ok(RawExchangeRate {
        source_currency_id: parse_id(cols, layout.source, "source id")?,
        target_currency_id: parse_id(cols, layout.target, "target id")?,
        exchanger_id: parse_id(cols, layout.exchanger, "exchanger id")?,
        give_rate: parse_rate_value(cols, layout.give, "give rate")?,
        get_rate: parse_rate_value(cols, layout.get, "get rate")?,
    })
}

/// Parse a decimal that may use scientific notation (e.g. `7.314e-05`).
pub fn parse_decimal(s: &str) -> Option<Decimal> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    Decimal::from_str(s).ok().or_else(|| Decimal::from_scientific(s).ok())
}

#[cfg(test)]
mod tests {
    use obs_core::config::TableLayouts;
    use rust_decimal_macros::dec;

    use super::*;

    fn layouts() -> TableLayouts {
        TableLayouts::default()
    }

    #[test]
    fn parses_currencies() {
        let text = "1;10;USD;0;1\r\n2;20;RUB;0;1\r\n\r\n3;30;;0;1\nx;40;EUR\n5;50\n";
        let t = parse_currencies(text, layouts().currencies);
        assert_eq!(t.get(1), Some("USD"));
        assert_eq!(t.get(2), Some("RUB"));
        assert_eq!(t.len(), 2);
        assert_eq!(t.stats, ParseStats { lines: 5, parsed: 2, skipped: 3 });
    }

    #[test]
    fn duplicate_currency_id_is_skipped() {
        let text = "1;10;USD\n1;11;EUR\n";
        let t = parse_currencies(text, layouts().currencies);
        assert_eq!(t.get(1), Some("USD"));
        assert_eq!(t.stats.skipped, 1);
    }

    #[test]
    fn parses_exchangers() {
        let text = "10;FastEx;1;0\n11;Обменник 24;1;0\n";
        let t = parse_exchangers(text, layouts().exchangers);
        assert_eq!(t.get(10), Some("FastEx"));
        assert_eq!(t.get(11), Some("Обменник 24"));
        assert_eq!(t.stats.skipped, 0);
    }

    #[test]
    fn parses_rates_in_order() {
        let text = "1;2;10;1;95.3;5000;0.1\n2;1;10;96.1;1;200\n1;2;11;abc;1\n1;2\n2;1;11;7.314e-05;1\n";
        let t = parse_rates(text, layouts().rates);
        assert_eq!(t.stats, ParseStats { lines: 5, parsed: 3, skipped: 2 });
        assert_eq!(
            t.rates[0],
            RawExchangeRate {
                exchanger_id: 10,
                source_currency_id: 1,
                target_currency_id: 2,
                give_rate: dec!(1),
                get_rate: dec!(95.3),
            }
        );
        assert_eq!(t.rates[1].source_currency_id, 2);
        assert_eq!(t.rates[2].give_rate, dec!(0.00007314));
    }

    #[test]
    fn custom_layout() {
        let layout = RateLayout { source: 4, target: 3, exchanger: 0, give: 1, get: 2 };
        let t = parse_rates("10;1;95.3;2;1\n", layout);
        assert_eq!(t.rates[0].exchanger_id, 10);
        assert_eq!(t.rates[0].source_currency_id, 1);
        assert_eq!(t.rates[0].target_currency_id, 2);
    }

    #[test]
    fn decodes_windows_1251() {
        // "Сбер" in windows-1251
        let bytes = [b'1', b';', b'1', b';', 0xD1, 0xE1, 0xE5, 0xF0, b'\n'];
        let text = decode(&bytes, TextEncoding::Windows1251);
        let t = parse_currencies(&text, layouts().currencies);
        assert_eq!(t.get(1), Some("Сбер"));
    }

    #[test]
    fn decodes_utf8_lossy() {
        let text = decode("1;1;USD\n".as_bytes(), TextEncoding::Utf8);
        assert_eq!(text, "1;1;USD\n");
        let text = decode(&[b'a', 0xFF], TextEncoding::Utf8);
        assert_eq!(text, "a\u{FFFD}");
    }

    #[test]
    fn decimal_forms() {
        assert_eq!(parse_decimal(" 95.3 "), Some(dec!(95.3)));
        assert_eq!(parse_decimal("1e3"), Some(dec!(1000)));
        assert_eq!(parse_decimal("-0.5"), Some(dec!(-0.5)));
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("NaN"), None);
        assert_eq!(parse_decimal("1,5"), None);
    }

    #[test]
    fn empty_input() {
        let t = parse_rates("", layouts().rates);
        assert!(t.is_empty());
        assert_eq!(t.stats, ParseStats::default());
    }
}
