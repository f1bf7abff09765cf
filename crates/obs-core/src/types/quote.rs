//! P2P quote API types: the outbound query and the parsed quote entries.

use rust_decimal::Decimal;
use serde::Serialize;

use super::enums::TradeType;

/// One advertisement search, keyed by `(asset, fiat, trade_type)`.
///
/// Serializes to the upstream request body. `publisherType` is always sent
/// as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteQuery {
    pub asset: String,
    pub fiat: String,
    pub merchant_check: bool,
    pub page: u32,
    pub publisher_type: Option<String>,
    pub rows: u32,
    pub trade_type: TradeType,
}

impl QuoteQuery {
    /// Short human-readable key, used as task label in logs.
    pub fn label(&self) -> String {
        format!("{}/{}/{}", self.trade_type, self.asset, self.fiat)
    }
}

/// One entry (one book level) of a quote response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketQuote {
    pub trade_type: TradeType,
    pub asset: String,
    pub fiat: String,
    pub price: Decimal,
    pub tradable_quantity: Decimal,
    pub commission_rate: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_body_shape() {
        let q = QuoteQuery {
            asset: "USDT".into(),
            fiat: "RUB".into(),
            merchant_check: true,
            page: 1,
            publisher_type: None,
            rows: 20,
            trade_type: TradeType::Sell,
        };
        let v = serde_json::to_value(&q).unwrap();
        assert_eq!(v["asset"], "USDT");
        assert_eq!(v["merchantCheck"], true);
        assert_eq!(v["tradeType"], "SELL");
        assert!(v["publisherType"].is_null());
        assert_eq!(q.label(), "SELL/USDT/RUB");
    }
}
