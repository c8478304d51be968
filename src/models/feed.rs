//! Price feed response models.
//!
//! The batch market list and the per-symbol ticker come from different
//! providers with different shapes. Both are validated here and turned into
//! [`Asset`] values or rejected; nothing downstream sees a missing price.

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;

use super::Asset;
use crate::{ConvexError, Result};

/// One entry of the batch market list.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketCoin {
    pub id: String,
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub current_price: Option<Decimal>,
    #[serde(default)]
    pub price_change_percentage_24h: Option<Decimal>,
    #[serde(default)]
    pub market_cap: Option<Decimal>,
    #[serde(default)]
    pub total_volume: Option<Decimal>,
}

impl MarketCoin {
    /// Normalizes the entry, or returns `None` when it carries no usable price.
    pub fn into_asset(self) -> Option<Asset> {
        let price = self.current_price.filter(|p| *p >= Decimal::ZERO)?;
        Some(Asset {
            id: self.id,
            symbol: self.symbol.to_uppercase(),
            name: self.name,
            unit_price: price,
            price_change_24h: self.price_change_percentage_24h.unwrap_or_default(),
            market_cap: self.market_cap,
            total_volume: self.total_volume,
            image: self.image,
        })
    }
}

/// Per-symbol ticker price, e.g. `{"symbol":"BTCUSDT","price":"60000.00"}`.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerPrice {
    #[serde(default)]
    pub symbol: String,
    pub price: Decimal,
}

/// Per-symbol 24h statistics, e.g. `{"priceChangePercent":"-1.25"}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerStats {
    pub price_change_percent: Decimal,
    #[serde(default)]
    pub last_price: Option<Decimal>,
}

/// Parses a batch market list body.
///
/// The body must be a JSON array. Entries that do not deserialize or carry
/// no price are dropped with a warning; the rest are returned in feed order.
///
/// # Errors
///
/// Returns [`ConvexError::MalformedPayload`] if the body is not an array.
pub fn parse_market_list(body: serde_json::Value) -> Result<Vec<Asset>> {
    let serde_json::Value::Array(entries) = body else {
        return Err(ConvexError::MalformedPayload(
            "market list is not a JSON array".to_string(),
        ));
    };

    let mut assets = Vec::with_capacity(entries.len());
    for entry in entries {
        match serde_json::from_value::<MarketCoin>(entry) {
            Ok(coin) => {
                let id = coin.id.clone();
                match coin.into_asset() {
                    Some(asset) => assets.push(asset),
                    None => warn!(id = %id, "dropping market entry without a price"),
                }
            }
            Err(e) => warn!(error = %e, "dropping malformed market entry"),
        }
    }
    Ok(assets)
}

/// Builds the ticker pair name the per-symbol endpoint expects.
pub fn ticker_pair(symbol: &str) -> String {
    format!("{}USDT", symbol.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn parses_full_entry() {
        let body = json!([{
            "id": "bitcoin",
            "symbol": "btc",
            "name": "Bitcoin",
            "image": "https://img.example.com/btc.png",
            "current_price": 60000.5,
            "price_change_percentage_24h": -1.25,
            "market_cap": 1200000000000u64,
            "total_volume": 35000000000u64
        }]);
        let assets = parse_market_list(body).unwrap();
        assert_eq!(assets.len(), 1);
        let btc = &assets[0];
        assert_eq!(btc.symbol, "BTC");
        assert_eq!(btc.unit_price, dec!(60000.5));
        assert_eq!(btc.price_change_24h, dec!(-1.25));
        assert_eq!(btc.market_cap, Some(dec!(1200000000000)));
    }

    #[test]
    fn missing_optional_fields_default() {
        let body = json!([{ "id": "tether", "symbol": "usdt", "name": "Tether", "current_price": 1 }]);
        let assets = parse_market_list(body).unwrap();
        assert_eq!(assets[0].price_change_24h, Decimal::ZERO);
        assert_eq!(assets[0].market_cap, None);
        assert_eq!(assets[0].total_volume, None);
    }

    #[test]
    fn null_change_defaults_to_zero() {
        let body = json!([{
            "id": "solana", "symbol": "sol", "name": "Solana",
            "current_price": 150, "price_change_percentage_24h": null
        }]);
        let assets = parse_market_list(body).unwrap();
        assert_eq!(assets[0].price_change_24h, Decimal::ZERO);
    }

    #[test]
    fn drops_entries_without_price_or_shape() {
        let body = json!([
            { "id": "a", "symbol": "a", "name": "A" },
            { "id": "b", "symbol": "b", "name": "B", "current_price": null },
            { "symbol": "c" },
            { "id": "d", "symbol": "d", "name": "D", "current_price": 2 }
        ]);
        let assets = parse_market_list(body).unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].id, "d");
    }

    #[test]
    fn rejects_non_array_body() {
        let err = parse_market_list(json!({ "status": "rate limited" })).unwrap_err();
        assert!(matches!(err, ConvexError::MalformedPayload(_)));
    }

    #[test]
    fn ticker_price_parses_string_decimal() {
        let tick: TickerPrice =
            serde_json::from_str(r#"{"symbol":"BTCUSDT","price":"60000.01"}"#).unwrap();
        assert_eq!(tick.price, dec!(60000.01));
    }

    #[test]
    fn ticker_stats_parses_change() {
        let stats: TickerStats = serde_json::from_str(r#"{"priceChangePercent":"-2.5"}"#).unwrap();
        assert_eq!(stats.price_change_percent, dec!(-2.5));
        assert_eq!(stats.last_price, None);
    }

    #[test]
    fn ticker_pair_uses_usdt_quote() {
        assert_eq!(ticker_pair("eth"), "ETHUSDT");
    }
}
