//! Balance provider: the user's holdings and cash as last read from the backend.
//!
//! The client keeps no ledger of its own. After every confirmed trade, stake
//! or withdrawal the snapshot is marked stale and must be re-read; a local
//! optimistic debit only changes what is shown until that read lands.

use std::future::Future;

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::Result;
use crate::models::user::UserProfile;
use crate::models::{Asset, Holding};

/// Authenticated read access to the user's profile.
pub trait AccountSource: Send + Sync {
    fn fetch_profile(&self) -> impl Future<Output = Result<UserProfile>> + Send;
}

impl<T: AccountSource> AccountSource for std::sync::Arc<T> {
    fn fetch_profile(&self) -> impl Future<Output = Result<UserProfile>> + Send {
        (**self).fetch_profile()
    }
}

/// One read of the user's balances.
#[derive(Debug, Clone, PartialEq)]
pub struct Balances {
    /// Cash in the base currency.
    pub cash: Decimal,
    pub holdings: Vec<Holding>,
    /// User's preferred display currency, if the profile names one.
    pub currency: Option<String>,
    /// `false` once a submission or optimistic debit has made it out of date.
    pub authoritative: bool,
}

impl Balances {
    /// Held amount of `asset`; zero if not held.
    pub fn amount_of(&self, asset: &Asset) -> Decimal {
        self.holdings
            .iter()
            .find(|h| h.is_of(asset))
            .map(|h| h.amount)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Caches the latest balance read and refreshes it on demand.
#[derive(Debug)]
pub struct BalanceProvider<S> {
    source: S,
    snapshot: Option<Balances>,
}

impl<S: AccountSource> BalanceProvider<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            snapshot: None,
        }
    }

    /// Re-reads balances from the backend, replacing any local adjustments.
    pub async fn refresh(&mut self) -> Result<&Balances> {
        let profile = self.source.fetch_profile().await?;
        let balances = Balances {
            cash: profile.cash_balance(),
            holdings: profile.holdings(),
            currency: profile.currency.clone().map(|c| c.to_uppercase()),
            authoritative: true,
        };
        info!(
            holdings = balances.holdings.len(),
            cash = %balances.cash,
            "balances refreshed"
        );
        Ok(&*self.snapshot.insert(balances))
    }

    /// Fresh holdings read.
    pub async fn get_holdings(&mut self) -> Result<Vec<Holding>> {
        Ok(self.refresh().await?.holdings.clone())
    }

    /// Fresh cash balance read, in the base currency.
    pub async fn get_cash_balance(&mut self) -> Result<Decimal> {
        Ok(self.refresh().await?.cash)
    }

    /// Last read, if any, without touching the network.
    pub fn cached(&self) -> Option<&Balances> {
        self.snapshot.as_ref()
    }

    /// Returns `true` if there is no snapshot or it is not authoritative.
    pub fn needs_refresh(&self) -> bool {
        self.snapshot.as_ref().is_none_or(|b| !b.authoritative)
    }

    /// Flags the snapshot as out of date, e.g. after a confirmed submission.
    pub fn mark_stale(&mut self) {
        if let Some(snapshot) = &mut self.snapshot {
            snapshot.authoritative = false;
        }
    }

    /// Shows `amount` of `asset_id` as already spent until the next refresh.
    ///
    /// Never goes below zero. Cosmetic only.
    pub fn debit_optimistic(&mut self, asset_id: &str, amount: Decimal) {
        let Some(snapshot) = &mut self.snapshot else {
            return;
        };
        if let Some(holding) = snapshot.holdings.iter_mut().find(|h| h.asset_id == asset_id) {
            holding.amount = (holding.amount - amount).max(Decimal::ZERO);
            snapshot.authoritative = false;
            debug!(asset_id, %amount, "optimistic debit applied");
        }
    }

    /// Shows `amount` of cash as already spent until the next refresh.
    pub fn debit_cash_optimistic(&mut self, amount: Decimal) {
        if let Some(snapshot) = &mut self.snapshot {
            snapshot.cash = (snapshot.cash - amount).max(Decimal::ZERO);
            snapshot.authoritative = false;
        }
    }
}
