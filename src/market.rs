//! Market board: the latest price list with search, sorting and
//! portfolio reconciliation.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use tracing::debug;

use crate::models::{Asset, Holding};
use crate::primitives::percent_change;

/// Column to sort the market list by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    MarketCap,
    Price,
    Change24h,
    Volume,
    Name,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

/// A holding joined to its market entry.
#[derive(Debug, Clone, PartialEq)]
pub struct HeldAsset {
    pub holding: Holding,
    /// Market entry, if the feed lists the asset.
    pub asset: Option<Asset>,
    /// Current value in the base currency; `None` when unpriced.
    pub value: Option<Decimal>,
}

impl HeldAsset {
    pub fn is_priced(&self) -> bool {
        self.value.is_some()
    }
}

/// Price movement of one asset between two market snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceDelta {
    pub asset_id: String,
    pub previous: Decimal,
    pub current: Decimal,
    /// `None` when the previous price was zero.
    pub percent: Option<Decimal>,
}

/// The latest market list.
#[derive(Debug, Clone, Default)]
pub struct MarketBoard {
    assets: Vec<Asset>,
}

impl MarketBoard {
    pub fn new(assets: Vec<Asset>) -> Self {
        Self { assets }
    }

    /// Swaps in a fresh list.
    pub fn replace(&mut self, assets: Vec<Asset>) {
        debug!(count = assets.len(), "market list replaced");
        self.assets = assets;
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.id == id)
    }

    pub fn by_symbol(&self, symbol: &str) -> Option<&Asset> {
        self.assets
            .iter()
            .find(|a| a.symbol.eq_ignore_ascii_case(symbol))
    }

    /// Assets whose symbol or name contains `query`, ignoring case.
    ///
    /// A blank query matches everything.
    pub fn search(&self, query: &str) -> Vec<&Asset> {
        let needle = query.trim().to_lowercase();
        self.assets
            .iter()
            .filter(|a| {
                needle.is_empty()
                    || a.symbol.to_lowercase().contains(&needle)
                    || a.name.to_lowercase().contains(&needle)
            })
            .collect()
    }

    /// Assets ordered by `key`. Missing values sort last in either direction.
    pub fn sorted(&self, key: SortKey, direction: SortDirection) -> Vec<&Asset> {
        let mut view: Vec<&Asset> = self.assets.iter().collect();
        view.sort_by(|a, b| match key {
            SortKey::Name => {
                let ord = a.name.to_lowercase().cmp(&b.name.to_lowercase());
                directed(ord, direction)
            }
            _ => compare_optional(sort_value(a, key), sort_value(b, key), direction),
        });
        view
    }

    /// Joins `holdings` to market entries by id, then by ticker.
    ///
    /// Holdings the market does not list are kept, unpriced.
    pub fn reconcile(&self, holdings: &[Holding]) -> Vec<HeldAsset> {
        holdings
            .iter()
            .map(|holding| {
                let asset = self
                    .get(&holding.asset_id)
                    .or_else(|| self.by_symbol(&holding.symbol))
                    .cloned();
                let value = asset
                    .as_ref()
                    .filter(|a| a.has_price())
                    .map(|a| holding.amount.saturating_mul(a.unit_price));
                HeldAsset {
                    holding: holding.clone(),
                    asset,
                    value,
                }
            })
            .collect()
    }

    /// Total base-currency value of the priced holdings, saturating at
    /// [`Decimal::MAX`].
    pub fn portfolio_value(&self, holdings: &[Holding]) -> Decimal {
        self.reconcile(holdings)
            .iter()
            .filter_map(|h| h.value)
            .fold(Decimal::ZERO, Decimal::saturating_add)
    }

    /// Price changes against an earlier board, for assets present in both.
    pub fn price_deltas(&self, previous: &MarketBoard) -> Vec<PriceDelta> {
        self.assets
            .iter()
            .filter_map(|current| {
                let before = previous.get(&current.id)?;
                Some(PriceDelta {
                    asset_id: current.id.clone(),
                    previous: before.unit_price,
                    current: current.unit_price,
                    percent: percent_change(before.unit_price, current.unit_price),
                })
            })
            .collect()
    }
}

fn sort_value(asset: &Asset, key: SortKey) -> Option<Decimal> {
    match key {
        SortKey::MarketCap => asset.market_cap,
        SortKey::Price => asset.has_price().then_some(asset.unit_price),
        SortKey::Change24h => Some(asset.price_change_24h),
        SortKey::Volume => asset.total_volume,
        SortKey::Name => None,
    }
}

fn directed(ord: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Ascending => ord,
        SortDirection::Descending => ord.reverse(),
    }
}

fn compare_optional(a: Option<Decimal>, b: Option<Decimal>, direction: SortDirection) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => directed(a.cmp(&b), direction),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
