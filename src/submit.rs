//! Submission adapter: turns validated forms into backend requests.
//!
//! Every flow re-prices at submit time and sends the raw amounts with the
//! fresh price snapshot. The backend's answer is relayed as-is; nothing is
//! retried. One [`Submitter`] allows a single submission in flight at a
//! time, so a double click cannot post the same trade twice.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tracing::{info, warn};

use crate::calculators::{BuyCalculator, SellCalculator, StakeCalculator, TradeBlocker};
use crate::convert::{ConversionForm, FormError};
use crate::models::response::ApiError;
use crate::models::staking::StakeRequest;
use crate::models::trade::{BuyRequest, ConvertRequest, SellRequest};
use crate::prices::{PriceFeed, PriceSource};
use crate::rates::RateTable;
use crate::{ConvexError, Result};

/// One request to the trade or staking API.
#[derive(Debug, Clone, PartialEq)]
pub enum TradeSubmission {
    Buy(BuyRequest),
    Sell(SellRequest),
    Convert(ConvertRequest),
    Stake(StakeRequest),
    Unstake { stake_id: u64 },
    CancelStake { stake_id: u64 },
}

impl TradeSubmission {
    /// Route relative to the backend base URL.
    pub fn path(&self) -> String {
        match self {
            TradeSubmission::Buy(_) => "buy".to_string(),
            TradeSubmission::Sell(_) => "sell".to_string(),
            TradeSubmission::Convert(_) => "convert".to_string(),
            TradeSubmission::Stake(_) => "stake".to_string(),
            TradeSubmission::Unstake { stake_id } => format!("unstake/{stake_id}"),
            TradeSubmission::CancelStake { stake_id } => format!("cancel/{stake_id}"),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TradeSubmission::Buy(_) => "buy",
            TradeSubmission::Sell(_) => "sell",
            TradeSubmission::Convert(_) => "convert",
            TradeSubmission::Stake(_) => "stake",
            TradeSubmission::Unstake { .. } => "unstake",
            TradeSubmission::CancelStake { .. } => "cancel",
        }
    }

    /// JSON body. Unstake and cancel carry the id in the path only.
    pub fn body(&self) -> Result<Value> {
        Ok(match self {
            TradeSubmission::Buy(req) => serde_json::to_value(req)?,
            TradeSubmission::Sell(req) => serde_json::to_value(req)?,
            TradeSubmission::Convert(req) => serde_json::to_value(req)?,
            TradeSubmission::Stake(req) => serde_json::to_value(req)?,
            TradeSubmission::Unstake { .. } | TradeSubmission::CancelStake { .. } => {
                Value::Object(serde_json::Map::new())
            }
        })
    }
}

/// Posts submissions to the backend.
pub trait TradeBackend: Send + Sync {
    fn post_submission(
        &self,
        submission: &TradeSubmission,
    ) -> impl Future<Output = Result<Value>> + Send;
}

impl<T: TradeBackend> TradeBackend for std::sync::Arc<T> {
    fn post_submission(
        &self,
        submission: &TradeSubmission,
    ) -> impl Future<Output = Result<Value>> + Send {
        (**self).post_submission(submission)
    }
}

/// Held while a submission is in flight; releases the slot on drop.
#[derive(Debug)]
pub struct SubmitGuard<'a> {
    in_flight: &'a AtomicBool,
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

/// Submits trades for one form, one at a time.
#[derive(Debug)]
pub struct Submitter<B> {
    backend: B,
    in_flight: AtomicBool,
}

impl<B: TradeBackend> Submitter<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns `true` while a submission holds the slot.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Claims the submission slot.
    ///
    /// # Errors
    ///
    /// Returns [`ConvexError::SubmissionInFlight`] if another submission
    /// has not finished yet.
    pub fn begin(&self) -> Result<SubmitGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ConvexError::SubmissionInFlight)?;
        Ok(SubmitGuard {
            in_flight: &self.in_flight,
        })
    }

    /// Posts a ready-made submission.
    pub async fn submit(&self, submission: TradeSubmission) -> Result<Value> {
        let _guard = self.begin()?;
        self.post(&submission).await
    }

    /// Re-prices every line and the target, then posts the conversion.
    pub async fn submit_conversion<F: PriceFeed>(
        &self,
        form: &ConversionForm,
        prices: &PriceSource<F>,
        rates: &RateTable,
    ) -> Result<Value> {
        let _guard = self.begin()?;
        let request = form.prepare_submission(prices, rates).await?;
        self.post(&TradeSubmission::Convert(request)).await
    }

    pub async fn submit_buy<F: PriceFeed>(
        &self,
        calculator: &BuyCalculator,
        prices: &PriceSource<F>,
    ) -> Result<Value> {
        let _guard = self.begin()?;
        ensure_submittable(&calculator.quote().blockers)?;
        let price = prices.get_unit_price(&calculator.asset().symbol).await?;
        self.post(&TradeSubmission::Buy(calculator.build_request(price))).await
    }

    pub async fn submit_sell<F: PriceFeed>(
        &self,
        calculator: &SellCalculator,
        prices: &PriceSource<F>,
        rates: &RateTable,
    ) -> Result<Value> {
        let _guard = self.begin()?;
        let quote = calculator.quote(rates, crate::rates::BASE_CURRENCY);
        ensure_submittable(&quote.blockers)?;
        let price = prices.get_unit_price(&calculator.asset().symbol).await?;
        self.post(&TradeSubmission::Sell(calculator.build_request(price))).await
    }

    pub async fn submit_stake(&self, calculator: &StakeCalculator) -> Result<Value> {
        let _guard = self.begin()?;
        ensure_submittable(&calculator.quote().blockers)?;
        self.post(&TradeSubmission::Stake(calculator.build_request())).await
    }

    /// Ends an active stake early.
    pub async fn unstake(&self, stake_id: u64) -> Result<Value> {
        self.submit(TradeSubmission::Unstake { stake_id }).await
    }

    /// Cancels a stake that has not started earning yet.
    pub async fn cancel_stake(&self, stake_id: u64) -> Result<Value> {
        self.submit(TradeSubmission::CancelStake { stake_id }).await
    }

    async fn post(&self, submission: &TradeSubmission) -> Result<Value> {
        match self.backend.post_submission(submission).await {
            Ok(body) => {
                info!(kind = submission.kind(), "submission confirmed");
                Ok(body)
            }
            Err(e) => {
                warn!(kind = submission.kind(), error = %e, "submission failed");
                Err(e)
            }
        }
    }
}

fn ensure_submittable(blockers: &[TradeBlocker]) -> Result<()> {
    if blockers.is_empty() {
        return Ok(());
    }
    let reason = blockers
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    Err(FormError::NotSubmittable { reason }.into())
}

/// Input a backend validation message belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormField {
    Amount,
    Asset,
    Target,
    Plan,
    /// `from_coins[n]` of a conversion; see
    /// [`ConversionForm::submitted_line`].
    Line(usize),
    /// Not tied to one input.
    Form,
}

impl FormField {
    /// Maps a backend error key such as `amount_usd` or `from_coins.1.amount`.
    pub fn from_key(key: &str) -> Self {
        let mut parts = key.split(['.', '[', ']']).filter(|p| !p.is_empty());
        match parts.next() {
            Some("amount" | "amount_usd") => FormField::Amount,
            Some("coin_id" | "crypto_currency") => FormField::Asset,
            Some("to_coins") => FormField::Target,
            Some("plan_id") => FormField::Plan,
            Some("from_coins") => match parts.next().and_then(|n| n.parse().ok()) {
                Some(leg) => FormField::Line(leg),
                None => FormField::Form,
            },
            _ => FormField::Form,
        }
    }
}

/// Per-input messages from a rejected submission, first message per key.
pub fn field_errors(error: &ApiError) -> Vec<(FormField, String)> {
    error
        .field_errors
        .iter()
        .filter_map(|(key, messages)| {
            messages
                .first()
                .map(|msg| (FormField::from_key(key), msg.clone()))
        })
        .collect()
}
