//! Single-source trade quote calculators: buy, sell and stake.
//!
//! Each calculator holds one raw input and the balances it is checked
//! against, and derives an advisory counter-amount. As with conversions,
//! the backend re-prices at commit time.

use std::fmt;

use rust_decimal::Decimal;

use crate::convert::{LineStatus, line_status};
use crate::models::Asset;
use crate::models::staking::{StakeRequest, StakingPlan};
use crate::models::trade::{BuyRequest, SellRequest};
use crate::primitives::parse_amount;
use crate::rates::RateTable;

const DAYS_PER_YEAR: Decimal = Decimal::from_parts(365, 0, 0, false, 0);

/// Why a single-source quote cannot be submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeBlocker {
    NothingEntered,
    ExceedsBalance { available: Decimal },
    BelowMinimum { minimum: Decimal },
    PriceUnavailable { symbol: String },
}

impl fmt::Display for TradeBlocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeBlocker::NothingEntered => write!(f, "enter an amount"),
            TradeBlocker::ExceedsBalance { available } => {
                write!(f, "insufficient balance, available: {}", available.normalize())
            }
            TradeBlocker::BelowMinimum { minimum } => {
                write!(f, "minimum amount is {}", minimum.normalize())
            }
            TradeBlocker::PriceUnavailable { symbol } => write!(f, "price unavailable for {symbol}"),
        }
    }
}

/// Amount `percent` of `max`, clamped to 0..=100 percent.
fn fraction_of(max: Decimal, percent: Decimal) -> Decimal {
    max * (percent.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED) / Decimal::ONE_HUNDRED)
}

/// Caps raw input at `max`, replacing it with `max` when exceeded.
fn capped(raw: &str, max: Decimal) -> String {
    if parse_amount(raw) > max {
        max.normalize().to_string()
    } else {
        raw.to_string()
    }
}

/// Buy `asset` with cash, entering the spend in the display currency.
#[derive(Debug, Clone)]
pub struct BuyCalculator {
    asset: Asset,
    cash_balance: Decimal,
    rates: RateTable,
    display_currency: String,
    entered: String,
}

/// Derived state of a [`BuyCalculator`].
#[derive(Debug, Clone, PartialEq)]
pub struct BuyQuote {
    /// Spend in the display currency, as entered.
    pub spend_display: Decimal,
    /// Spend converted to the base currency.
    pub spend_base: Decimal,
    /// Units of the asset received; `None` without a price.
    pub receive_amount: Option<Decimal>,
    pub blockers: Vec<TradeBlocker>,
}

impl BuyQuote {
    pub fn can_submit(&self) -> bool {
        self.blockers.is_empty()
    }
}

impl BuyCalculator {
    pub fn new(
        asset: Asset,
        cash_balance: Decimal,
        rates: RateTable,
        display_currency: impl Into<String>,
    ) -> Self {
        Self {
            asset,
            cash_balance,
            rates,
            display_currency: display_currency.into().to_uppercase(),
            entered: String::new(),
        }
    }

    pub fn entered(&self) -> &str {
        &self.entered
    }

    /// Cash balance expressed in the display currency.
    pub fn max_input(&self) -> Decimal {
        self.rates.from_base(self.cash_balance, &self.display_currency)
    }

    /// Records input, capped at [`max_input`](Self::max_input).
    pub fn set_amount(&mut self, raw: &str) {
        self.entered = capped(raw, self.max_input());
    }

    pub fn fill_fraction(&mut self, percent: Decimal) {
        self.entered = fraction_of(self.max_input(), percent).normalize().to_string();
    }

    /// Replaces the cash balance after a refresh.
    pub fn update_balance(&mut self, cash_balance: Decimal) {
        self.cash_balance = cash_balance;
    }

    pub fn update_price(&mut self, price: Decimal) {
        self.asset.unit_price = price;
    }

    pub fn quote(&self) -> BuyQuote {
        let spend_display = parse_amount(&self.entered);
        let spend_base = self.rates.to_base(spend_display, &self.display_currency);
        let mut blockers = Vec::new();

        if spend_display <= Decimal::ZERO {
            blockers.push(TradeBlocker::NothingEntered);
        }
        // Compared in display units, so a MAX fill never fails on the
        // round trip through the rate.
        if spend_display > self.max_input() {
            blockers.push(TradeBlocker::ExceedsBalance {
                available: self.cash_balance,
            });
        }

        let receive_amount = if self.asset.has_price() {
            spend_base.checked_div(self.asset.unit_price)
        } else {
            blockers.push(TradeBlocker::PriceUnavailable {
                symbol: self.asset.symbol.clone(),
            });
            None
        };

        BuyQuote {
            spend_display,
            spend_base,
            receive_amount,
            blockers,
        }
    }

    /// Builds the buy request with the price fetched at submit time.
    pub fn build_request(&self, fresh_price: Decimal) -> BuyRequest {
        let quote = self.quote();
        BuyRequest {
            coin_id: self.asset.id.clone(),
            amount_usd: quote.spend_base.round_dp(2),
            price_usd: fresh_price,
        }
    }

    pub fn asset(&self) -> &Asset {
        &self.asset
    }
}

/// Sell units of a held asset for cash.
#[derive(Debug, Clone)]
pub struct SellCalculator {
    asset: Asset,
    holding: Decimal,
    entered: String,
}

/// Derived state of a [`SellCalculator`].
#[derive(Debug, Clone, PartialEq)]
pub struct SellQuote {
    pub amount: Decimal,
    pub status: LineStatus,
    /// Proceeds in the base currency; `None` without a price.
    pub proceeds_base: Option<Decimal>,
    /// Proceeds in the display currency; `None` without a price.
    pub proceeds_display: Option<Decimal>,
    pub blockers: Vec<TradeBlocker>,
}

impl SellQuote {
    pub fn can_submit(&self) -> bool {
        self.blockers.is_empty()
    }
}

impl SellCalculator {
    pub fn new(asset: Asset, holding: Decimal) -> Self {
        Self {
            asset,
            holding,
            entered: String::new(),
        }
    }

    pub fn entered(&self) -> &str {
        &self.entered
    }

    pub fn max_input(&self) -> Decimal {
        self.holding
    }

    /// Records input, capped at the held amount.
    pub fn set_amount(&mut self, raw: &str) {
        self.entered = capped(raw, self.holding);
    }

    pub fn fill_fraction(&mut self, percent: Decimal) {
        self.entered = fraction_of(self.holding, percent).normalize().to_string();
    }

    pub fn update_holding(&mut self, holding: Decimal) {
        self.holding = holding;
    }

    pub fn update_price(&mut self, price: Decimal) {
        self.asset.unit_price = price;
    }

    pub fn quote(&self, rates: &RateTable, display_currency: &str) -> SellQuote {
        let amount = parse_amount(&self.entered);
        let status = line_status(amount, self.holding);
        let mut blockers = Vec::new();

        match &status {
            LineStatus::Empty => blockers.push(TradeBlocker::NothingEntered),
            LineStatus::Insufficient { available, .. } => {
                blockers.push(TradeBlocker::ExceedsBalance {
                    available: *available,
                });
            }
            LineStatus::Valid => {}
        }

        let proceeds_base = if self.asset.has_price() {
            Some(amount * self.asset.unit_price)
        } else {
            blockers.push(TradeBlocker::PriceUnavailable {
                symbol: self.asset.symbol.clone(),
            });
            None
        };

        SellQuote {
            amount,
            status,
            proceeds_base,
            proceeds_display: proceeds_base.map(|p| rates.from_base(p, display_currency)),
            blockers,
        }
    }

    pub fn build_request(&self, fresh_price: Decimal) -> SellRequest {
        SellRequest {
            coin_id: self.asset.id.clone(),
            amount: parse_amount(&self.entered),
            price_usd: fresh_price,
        }
    }

    pub fn asset(&self) -> &Asset {
        &self.asset
    }
}

/// Stake units of a held asset under a plan.
#[derive(Debug, Clone)]
pub struct StakeCalculator {
    plan: StakingPlan,
    holding: Decimal,
    entered: String,
}

/// Derived state of a [`StakeCalculator`]. Rewards are illustrative only;
/// accrual is computed by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct StakeQuote {
    pub amount: Decimal,
    pub annual_reward: Decimal,
    /// Reward over the plan's lock period; equals `annual_reward` for
    /// flexible plans.
    pub period_reward: Decimal,
    pub blockers: Vec<TradeBlocker>,
}

impl StakeQuote {
    pub fn can_submit(&self) -> bool {
        self.blockers.is_empty()
    }
}

impl StakeCalculator {
    pub fn new(plan: StakingPlan, holding: Decimal) -> Self {
        Self {
            plan,
            holding,
            entered: String::new(),
        }
    }

    pub fn plan(&self) -> &StakingPlan {
        &self.plan
    }

    pub fn entered(&self) -> &str {
        &self.entered
    }

    pub fn max_input(&self) -> Decimal {
        self.holding
    }

    pub fn set_amount(&mut self, raw: &str) {
        self.entered = capped(raw, self.holding);
    }

    pub fn fill_fraction(&mut self, percent: Decimal) {
        self.entered = fraction_of(self.holding, percent).normalize().to_string();
    }

    pub fn update_holding(&mut self, holding: Decimal) {
        self.holding = holding;
    }

    pub fn quote(&self) -> StakeQuote {
        let amount = parse_amount(&self.entered);
        let mut blockers = Vec::new();

        if amount <= Decimal::ZERO {
            blockers.push(TradeBlocker::NothingEntered);
        } else if amount < self.plan.min_amount {
            blockers.push(TradeBlocker::BelowMinimum {
                minimum: self.plan.min_amount,
            });
        }
        if amount > self.holding {
            blockers.push(TradeBlocker::ExceedsBalance {
                available: self.holding,
            });
        }

        let annual_reward = amount * self.plan.annual_rate / Decimal::ONE_HUNDRED;
        let period_reward = if self.plan.lock_days == 0 {
            annual_reward
        } else {
            annual_reward * Decimal::from(self.plan.lock_days) / DAYS_PER_YEAR
        };

        StakeQuote {
            amount,
            annual_reward,
            period_reward,
            blockers,
        }
    }

    pub fn build_request(&self) -> StakeRequest {
        StakeRequest {
            crypto_currency: self.plan.crypto_currency.clone(),
            amount: parse_amount(&self.entered),
            plan_id: self.plan.id,
        }
    }
}
