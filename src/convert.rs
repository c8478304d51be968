//! Multi-asset conversion engine.
//!
//! A [`ConversionForm`] holds one to [`MAX_LINES`] source lines and at most
//! one target asset. [`ConversionForm::quote`] derives a [`Quote`]
//! synchronously from the current inputs; it is cheap enough to rerun on
//! every keystroke and is never stored.
//!
//! The quote's target estimate is advisory. On submit the form re-prices
//! every source line and the target against the feed and sends those
//! fresher prices with the raw amounts; the backend settles at its own
//! price, which may differ from both.

use std::fmt;

use futures_util::future::try_join_all;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::models::trade::{ConvertRequest, FromCoin};
use crate::models::{Asset, Holding};
use crate::prices::{PriceFeed, PriceSource};
use crate::primitives::parse_amount;
use crate::rates::RateTable;
use crate::sequence::Latest;

/// Largest number of source lines in one conversion.
pub const MAX_LINES: usize = 5;

/// Reason a form edit was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    TooManyLines { max: usize },
    DuplicateLine { symbol: String },
    /// The asset is both a source line and the target.
    SameAsTarget { symbol: String },
    /// The only remaining line cannot be removed; use [`ConversionForm::reset`].
    LastLine,
    UnknownLine { asset_id: String },
    /// The quote has blockers; see [`Quote::blockers`].
    NotSubmittable { reason: String },
}

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyLines { max } => {
                write!(f, "at most {max} source assets can be converted at once")
            }
            Self::DuplicateLine { symbol } => write!(f, "{symbol} is already a source"),
            Self::SameAsTarget { symbol } => {
                write!(f, "{symbol} cannot be both converted and received")
            }
            Self::LastLine => write!(f, "at least one source asset is required"),
            Self::UnknownLine { asset_id } => write!(f, "no source line for {asset_id}"),
            Self::NotSubmittable { reason } => {
                write!(f, "conversion cannot be submitted: {reason}")
            }
        }
    }
}

impl std::error::Error for FormError {}

/// Validity of one source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineStatus {
    /// Nothing entered yet. Not an error.
    Empty,
    Valid,
    /// More entered than held.
    Insufficient { available: Decimal, deficit: Decimal },
}

impl LineStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Insufficient { .. })
    }

    /// Inline feedback for the line, if it has any.
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Insufficient { available, .. } => {
                Some(format!("insufficient balance, available: {}", available.normalize()))
            }
            _ => None,
        }
    }
}

/// One (asset, entered amount) row of the form.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionLine {
    pub asset: Asset,
    /// Raw user input, kept as typed.
    pub entered: String,
    /// Held amount of `asset` as of the last balance refresh.
    pub available: Decimal,
}

impl ConversionLine {
    pub fn new(asset: Asset, available: Decimal) -> Self {
        Self {
            asset,
            entered: String::new(),
            available,
        }
    }

    pub fn amount(&self) -> Decimal {
        parse_amount(&self.entered)
    }

    /// Value of the entered amount in the base currency, `None` when it
    /// does not fit in a [`Decimal`].
    pub fn value_base(&self) -> Option<Decimal> {
        self.amount().checked_mul(self.asset.unit_price)
    }

    pub fn status(&self) -> LineStatus {
        let amount = self.amount();
        match self.value_base() {
            Some(_) => line_status(amount, self.available),
            // No holding is worth more than Decimal::MAX.
            None => LineStatus::Insufficient {
                available: self.available,
                deficit: amount.saturating_sub(self.available),
            },
        }
    }
}

/// Classifies an amount against the held quantity.
pub fn line_status(amount: Decimal, available: Decimal) -> LineStatus {
    if amount <= Decimal::ZERO {
        LineStatus::Empty
    } else if amount > available {
        LineStatus::Insufficient {
            available,
            deficit: amount - available,
        }
    } else {
        LineStatus::Valid
    }
}

/// Per-line slice of a [`Quote`].
#[derive(Debug, Clone, PartialEq)]
pub struct LineQuote {
    pub asset_id: String,
    pub symbol: String,
    pub amount: Decimal,
    /// Saturates at [`Decimal::MAX`].
    pub value_base: Decimal,
    pub status: LineStatus,
}

/// Informational exchange rate between a source and the target.
///
/// Not used for settlement.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossRate {
    pub from: String,
    pub to: String,
    /// Target units per source unit.
    pub forward: Decimal,
    /// Source units per target unit.
    pub reverse: Decimal,
}

/// Why a quote cannot be submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteBlocker {
    NoTarget,
    TargetPriceUnavailable { symbol: String },
    SourcePriceUnavailable { symbol: String },
    NothingEntered,
    InvalidLine { symbol: String },
    TotalTooLarge,
}

impl fmt::Display for QuoteBlocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTarget => write!(f, "select an asset to receive"),
            Self::TargetPriceUnavailable { symbol } | Self::SourcePriceUnavailable { symbol } => {
                write!(f, "price unavailable for {symbol}")
            }
            Self::NothingEntered => write!(f, "enter an amount"),
            Self::InvalidLine { symbol } => write!(f, "insufficient {symbol} balance"),
            Self::TotalTooLarge => write!(f, "total value is too large"),
        }
    }
}

/// Derived, never-persisted result of the engine over the current inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub lines: Vec<LineQuote>,
    pub total_source_value_base: Decimal,
    /// `None` when no target is selected or its price is unavailable.
    pub target_amount_estimate: Option<Decimal>,
    pub cross_rates: Vec<CrossRate>,
    pub display_currency: String,
    pub total_in_display_currency: Decimal,
    pub blockers: Vec<QuoteBlocker>,
}

impl Quote {
    pub fn can_submit(&self) -> bool {
        self.blockers.is_empty()
    }
}

/// State of the multi-source convert form.
#[derive(Debug, Clone)]
pub struct ConversionForm {
    lines: Vec<ConversionLine>,
    target: Option<Asset>,
    target_price: Latest<Decimal>,
}

impl ConversionForm {
    /// Creates a form with a single, empty source line.
    pub fn new(first: Asset, available: Decimal) -> Self {
        Self {
            lines: vec![ConversionLine::new(first, available)],
            target: None,
            target_price: Latest::new(),
        }
    }

    pub fn lines(&self) -> &[ConversionLine] {
        &self.lines
    }

    pub fn target(&self) -> Option<&Asset> {
        self.target.as_ref()
    }

    /// Adds a source line for `asset`.
    ///
    /// # Errors
    ///
    /// Refuses a sixth line, a second line for the same asset, and the
    /// currently selected target.
    pub fn add_line(&mut self, asset: Asset, available: Decimal) -> Result<(), FormError> {
        if self.lines.len() >= MAX_LINES {
            return Err(FormError::TooManyLines { max: MAX_LINES });
        }
        if self.lines.iter().any(|l| l.asset.same_as(&asset)) {
            return Err(FormError::DuplicateLine {
                symbol: asset.symbol,
            });
        }
        if self.target.as_ref().is_some_and(|t| t.same_as(&asset)) {
            return Err(FormError::SameAsTarget {
                symbol: asset.symbol,
            });
        }
        self.lines.push(ConversionLine::new(asset, available));
        Ok(())
    }

    /// Removes the line for `asset_id`.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::LastLine`] when it is the only line.
    pub fn remove_line(&mut self, asset_id: &str) -> Result<ConversionLine, FormError> {
        let index = self.index_of(asset_id)?;
        if self.lines.len() == 1 {
            return Err(FormError::LastLine);
        }
        Ok(self.lines.remove(index))
    }

    /// Clears every amount and drops all lines but the first.
    pub fn reset(&mut self) {
        self.lines.truncate(1);
        for line in &mut self.lines {
            line.entered.clear();
        }
    }

    /// Records raw input for a line.
    pub fn set_amount(&mut self, asset_id: &str, raw: &str) -> Result<(), FormError> {
        let index = self.index_of(asset_id)?;
        self.lines[index].entered = raw.to_string();
        Ok(())
    }

    /// Fills a line with `percent` of its holding (100 for "MAX").
    pub fn fill_fraction(&mut self, asset_id: &str, percent: Decimal) -> Result<(), FormError> {
        let index = self.index_of(asset_id)?;
        let line = &mut self.lines[index];
        let percent = percent.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
        let amount = line.available * (percent / Decimal::ONE_HUNDRED);
        line.entered = amount.normalize().to_string();
        Ok(())
    }

    /// Selects the asset to receive.
    ///
    /// Clears any pending target price lookup.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::SameAsTarget`] if the asset is already a source.
    pub fn set_target(&mut self, asset: Asset) -> Result<(), FormError> {
        if self.lines.iter().any(|l| l.asset.same_as(&asset)) {
            return Err(FormError::SameAsTarget {
                symbol: asset.symbol,
            });
        }
        self.target_price.clear();
        self.target = Some(asset);
        Ok(())
    }

    pub fn clear_target(&mut self) {
        self.target_price.clear();
        self.target = None;
    }

    /// Starts a target price lookup and returns its token.
    pub fn begin_target_price(&mut self) -> u64 {
        self.target_price.begin()
    }

    /// Applies a looked-up target price if `token` is still the newest.
    ///
    /// Returns `false` for a superseded response, which is dropped.
    pub fn apply_target_price(&mut self, token: u64, price: Decimal) -> bool {
        if !self.target_price.apply(token, price) {
            return false;
        }
        if let Some(target) = &mut self.target {
            target.unit_price = price;
        }
        true
    }

    /// Resolves the target price against `prices`, discarding the answer if a
    /// newer lookup or target change happened meanwhile.
    pub async fn refresh_target_price<F: PriceFeed>(
        &mut self,
        prices: &PriceSource<F>,
    ) -> crate::Result<bool> {
        let Some(symbol) = self.target.as_ref().map(|t| t.symbol.clone()) else {
            return Ok(false);
        };
        let token = self.begin_target_price();
        let price = prices.get_unit_price(&symbol).await?;
        Ok(self.apply_target_price(token, price))
    }

    /// Replaces unit prices from a fresh market list, matched by id.
    pub fn update_prices(&mut self, market: &[Asset]) {
        let lookup = |asset: &Asset| market.iter().find(|m| m.id == asset.id).map(|m| m.unit_price);
        for line in &mut self.lines {
            if let Some(price) = lookup(&line.asset) {
                line.asset.unit_price = price;
            }
        }
        if let Some(target) = &mut self.target
            && let Some(price) = lookup(target)
        {
            target.unit_price = price;
        }
    }

    /// Replaces held amounts from a fresh balance read. Assets no longer
    /// held drop to zero.
    pub fn update_holdings(&mut self, holdings: &[Holding]) {
        for line in &mut self.lines {
            line.available = holdings
                .iter()
                .find(|h| h.is_of(&line.asset))
                .map(|h| h.amount)
                .unwrap_or(Decimal::ZERO);
        }
    }

    /// Computes the quote for the current inputs.
    pub fn quote(&self, rates: &RateTable, display_currency: &str) -> Quote {
        let mut blockers = Vec::new();

        let lines: Vec<LineQuote> = self
            .lines
            .iter()
            .map(|line| LineQuote {
                asset_id: line.asset.id.clone(),
                symbol: line.asset.symbol.clone(),
                amount: line.amount(),
                value_base: line.value_base().unwrap_or(Decimal::MAX),
                status: line.status(),
            })
            .collect();

        let total_source_value_base = match lines
            .iter()
            .try_fold(Decimal::ZERO, |acc, l| acc.checked_add(l.value_base))
        {
            Some(total) => total,
            None => {
                debug!("source total overflowed");
                blockers.push(QuoteBlocker::TotalTooLarge);
                Decimal::MAX
            }
        };

        for (line, quoted) in self.lines.iter().zip(&lines) {
            if quoted.amount > Decimal::ZERO && !line.asset.has_price() {
                blockers.push(QuoteBlocker::SourcePriceUnavailable {
                    symbol: quoted.symbol.clone(),
                });
            }
            if quoted.status.is_error() {
                blockers.push(QuoteBlocker::InvalidLine {
                    symbol: quoted.symbol.clone(),
                });
            }
        }

        let mut target_amount_estimate = None;
        let mut cross_rates = Vec::new();
        match &self.target {
            None => blockers.push(QuoteBlocker::NoTarget),
            Some(target) if !target.has_price() => {
                blockers.push(QuoteBlocker::TargetPriceUnavailable {
                    symbol: target.symbol.clone(),
                });
            }
            Some(target) => {
                target_amount_estimate = total_source_value_base.checked_div(target.unit_price);
                cross_rates = self
                    .lines
                    .iter()
                    .filter_map(|line| cross_rate(&line.asset, target))
                    .collect();
            }
        }

        if total_source_value_base <= Decimal::ZERO {
            blockers.push(QuoteBlocker::NothingEntered);
        }

        Quote {
            lines,
            total_source_value_base,
            target_amount_estimate,
            cross_rates,
            display_currency: display_currency.to_uppercase(),
            total_in_display_currency: rates.from_base(total_source_value_base, display_currency),
            blockers,
        }
    }

    /// Builds the conversion request, re-pricing every asset at submit time.
    ///
    /// Lines with nothing entered are left out. Prices are fetched
    /// concurrently, one lookup per source line plus one for the target.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::NotSubmittable`] if the current quote has
    /// blockers, or [`ConvexError::PriceUnavailable`](crate::ConvexError::PriceUnavailable)
    /// if any fresh price cannot be fetched.
    pub async fn prepare_submission<F: PriceFeed>(
        &self,
        prices: &PriceSource<F>,
        rates: &RateTable,
    ) -> crate::Result<ConvertRequest> {
        let quote = self.quote(rates, crate::rates::BASE_CURRENCY);
        let Some(target) = self.target.as_ref().filter(|_| quote.can_submit()) else {
            let reason = quote
                .blockers
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(FormError::NotSubmittable { reason }.into());
        };

        let legs: Vec<&ConversionLine> = self
            .lines
            .iter()
            .filter(|l| l.amount() > Decimal::ZERO)
            .collect();

        let (fresh, target_price) = futures_util::try_join!(
            try_join_all(legs.iter().map(|l| prices.get_unit_price(&l.asset.symbol))),
            prices.get_unit_price(&target.symbol),
        )?;

        let from_coins: Vec<FromCoin> = legs
            .iter()
            .zip(fresh)
            .map(|(line, price)| {
                if price != line.asset.unit_price {
                    debug!(
                        symbol = %line.asset.symbol,
                        quoted = %line.asset.unit_price,
                        fresh = %price,
                        "price moved since quote"
                    );
                }
                FromCoin {
                    coin_id: line.asset.id.clone(),
                    amount: line.amount(),
                    price_usd: price,
                }
            })
            .collect();

        info!(
            legs = from_coins.len(),
            target = %target.symbol,
            "prepared conversion"
        );
        Ok(ConvertRequest::single_target(
            from_coins,
            target.id.clone(),
            target_price,
        ))
    }

    /// The line behind `from_coins[leg]` of the request built by
    /// [`prepare_submission`](Self::prepare_submission).
    pub fn submitted_line(&self, leg: usize) -> Option<&ConversionLine> {
        self.lines.iter().filter(|l| l.amount() > Decimal::ZERO).nth(leg)
    }

    fn index_of(&self, asset_id: &str) -> Result<usize, FormError> {
        self.lines
            .iter()
            .position(|l| l.asset.id == asset_id)
            .ok_or_else(|| FormError::UnknownLine {
                asset_id: asset_id.to_string(),
            })
    }
}

/// Both directions of the source/target price ratio, if both are priced.
pub fn cross_rate(source: &Asset, target: &Asset) -> Option<CrossRate> {
    if !source.has_price() || !target.has_price() {
        return None;
    }
    let forward = source.unit_price.checked_div(target.unit_price)?;
    let reverse = target.unit_price.checked_div(source.unit_price)?;
    Some(CrossRate {
        from: source.symbol.clone(),
        to: target.symbol.clone(),
        forward,
        reverse,
    })
}
