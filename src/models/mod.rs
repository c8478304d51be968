//! Shared models for assets, holdings and the backend/feed wire formats.
//!
//! [`Asset`] and [`Holding`] are the normalized domain types every other
//! module works with. The submodules hold the raw request and response
//! shapes exchanged with the price feeds and the exchange backend.

pub mod feed;
pub mod rates;
pub mod response;
pub mod staking;
pub mod trade;
pub mod user;

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Bearer token that does not leak its value through `Debug`.
#[derive(Clone)]
pub struct BearerToken(Zeroizing<String>);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Zeroizing::new(token.into()))
    }

    /// Returns the raw token for use in an `Authorization` header.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken([REDACTED])")
    }
}

/// A tradable unit with its current price in the base currency (USD).
///
/// Immutable per fetch cycle; a new price list replaces the old one
/// wholesale. Copies held in different lists are reconciled by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// Stable identifier, e.g. `"bitcoin"`.
    pub id: String,
    /// Ticker in upper case, e.g. `"BTC"`.
    pub symbol: String,
    pub name: String,
    /// Price of one unit in the base currency.
    pub unit_price: Decimal,
    /// 24h price change in percent; zero when the feed omits it.
    #[serde(default)]
    pub price_change_24h: Decimal,
    #[serde(default)]
    pub market_cap: Option<Decimal>,
    #[serde(default)]
    pub total_volume: Option<Decimal>,
    #[serde(default)]
    pub image: Option<String>,
}

impl Asset {
    /// Builds an asset with only the required fields set.
    pub fn new(
        id: impl Into<String>,
        symbol: impl Into<String>,
        name: impl Into<String>,
        unit_price: Decimal,
    ) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into().to_uppercase(),
            name: name.into(),
            unit_price,
            price_change_24h: Decimal::ZERO,
            market_cap: None,
            total_volume: None,
            image: None,
        }
    }

    /// Returns `true` if `other` names the same asset, by id or by ticker.
    pub fn same_as(&self, other: &Asset) -> bool {
        self.id == other.id || self.symbol.eq_ignore_ascii_case(&other.symbol)
    }

    /// Returns `true` when the price is usable as a divisor.
    pub fn has_price(&self) -> bool {
        self.unit_price > Decimal::ZERO
    }
}

/// The user's owned quantity of one asset, as last reported by the backend.
///
/// A read-only cached copy: it becomes stale as soon as a trade is
/// submitted and must be refreshed rather than decremented locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub asset_id: String,
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    pub amount: Decimal,
}

impl Holding {
    pub fn new(asset_id: impl Into<String>, symbol: impl Into<String>, amount: Decimal) -> Self {
        Self {
            asset_id: asset_id.into(),
            symbol: symbol.into().to_uppercase(),
            name: String::new(),
            amount,
        }
    }

    /// Returns `true` if this holding is of `asset`, matched by id then ticker.
    pub fn is_of(&self, asset: &Asset) -> bool {
        self.asset_id == asset.id || self.symbol.eq_ignore_ascii_case(&asset.symbol)
    }
}
