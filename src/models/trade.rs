//! Trade submission request bodies.
//!
//! Every body carries asset identifiers, amounts in asset-native units (or
//! base currency for buys) and the price snapshot the client saw when it
//! submitted. The snapshot is informational; the backend re-prices at
//! execution time.

use rust_decimal::Decimal;
use serde::Serialize;

/// `POST /buy` body: spend `amount_usd` of cash on `coin_id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuyRequest {
    pub coin_id: String,
    pub amount_usd: Decimal,
    pub price_usd: Decimal,
}

/// `POST /sell` body: sell `amount` units of `coin_id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SellRequest {
    pub coin_id: String,
    pub amount: Decimal,
    pub price_usd: Decimal,
}

/// One source leg of a multi-asset conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FromCoin {
    pub coin_id: String,
    pub amount: Decimal,
    pub price_usd: Decimal,
}

/// One target leg of a conversion; `weight` is the share of the total, in percent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToCoin {
    pub coin_id: String,
    pub weight: Decimal,
}

/// `POST /convert` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvertRequest {
    pub from_coins: Vec<FromCoin>,
    pub to_coins: Vec<ToCoin>,
    /// Target asset price at submission time.
    pub price_usd: Decimal,
}

impl ConvertRequest {
    /// Builds a conversion into a single target that receives the full total.
    pub fn single_target(
        from_coins: Vec<FromCoin>,
        target_id: impl Into<String>,
        target_price: Decimal,
    ) -> Self {
        Self {
            from_coins,
            to_coins: vec![ToCoin {
                coin_id: target_id.into(),
                weight: Decimal::ONE_HUNDRED,
            }],
            price_usd: target_price,
        }
    }

    /// Number of source legs.
    pub fn leg_count(&self) -> usize {
        self.from_coins.len()
    }
}
