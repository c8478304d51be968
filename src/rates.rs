//! Fiat exchange rates from the base currency (USD) to display currencies.
//!
//! [`ExchangeRates`] is an explicitly scoped cache: one instance per session,
//! shared by reference. It fetches the rate table once, keeps it fresh for a
//! configurable TTL measured on an injected [`Clock`], and installs a static
//! fallback table when the very first fetch fails. A failed refresh of an
//! expired table keeps serving the expired table.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::Result;
use crate::models::rates::RatesResponse;

/// The reference currency every asset price is quoted in.
pub const BASE_CURRENCY: &str = "USD";

/// Rates used when the feed cannot be reached: units per 1 USD.
const FALLBACK_RATES: [(&str, Decimal); 9] = [
    ("USD", Decimal::ONE),
    ("RUB", Decimal::from_parts(90, 0, 0, false, 0)),
    ("EUR", Decimal::from_parts(92, 0, 0, false, 2)),
    ("KZT", Decimal::from_parts(450, 0, 0, false, 0)),
    ("GBP", Decimal::from_parts(79, 0, 0, false, 2)),
    ("UAH", Decimal::from_parts(41, 0, 0, false, 0)),
    ("TRY", Decimal::from_parts(32, 0, 0, false, 0)),
    ("CNY", Decimal::from_parts(72, 0, 0, false, 1)),
    ("JPY", Decimal::from_parts(150, 0, 0, false, 0)),
];

/// Source of "now" for TTL checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock [`Clock`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A [`Clock`] that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: StdMutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: StdMutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<C: Clock> Clock for std::sync::Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Something that can produce a fresh rate table.
pub trait RateSource: Send + Sync {
    fn fetch_rates(&self) -> impl Future<Output = Result<HashMap<String, Decimal>>> + Send;
}

impl<T: RateSource> RateSource for std::sync::Arc<T> {
    fn fetch_rates(&self) -> impl Future<Output = Result<HashMap<String, Decimal>>> + Send {
        (**self).fetch_rates()
    }
}

/// [`RateSource`] backed by an HTTP endpoint returning `{rates: {...}}`.
#[derive(Debug, Clone)]
pub struct HttpRateSource {
    client: reqwest::Client,
    url: String,
}

impl HttpRateSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl RateSource for HttpRateSource {
    async fn fetch_rates(&self) -> Result<HashMap<String, Decimal>> {
        debug!(url = %self.url, "fetching exchange rates");
        let response = self.client.get(&self.url).send().await?;
        let body: RatesResponse = response.error_for_status()?.json().await?;
        body.into_table()
    }
}

/// Immutable rate table: units of each currency per 1 unit of base.
#[derive(Debug, Clone, PartialEq)]
pub struct RateTable {
    rates: HashMap<String, Decimal>,
}

impl RateTable {
    pub fn new(rates: HashMap<String, Decimal>) -> Self {
        Self { rates }
    }

    /// The built-in fallback table.
    pub fn fallback() -> Self {
        Self::new(
            FALLBACK_RATES
                .iter()
                .map(|(code, rate)| ((*code).to_string(), *rate))
                .collect(),
        )
    }

    /// Identity table containing only the base currency.
    pub fn identity() -> Self {
        Self::new(HashMap::new())
    }

    /// Units of `code` per 1 USD.
    ///
    /// The base currency is always `1`. Unknown or non-positive entries also
    /// yield `1`, so amounts are shown unconverted rather than as garbage.
    pub fn rate(&self, code: &str) -> Decimal {
        if code.eq_ignore_ascii_case(BASE_CURRENCY) {
            return Decimal::ONE;
        }
        match self.rates.get(&code.to_uppercase()) {
            Some(rate) if *rate > Decimal::ZERO => *rate,
            _ => {
                debug!(currency = code, "no exchange rate, showing base amounts");
                Decimal::ONE
            }
        }
    }

    /// Whether the table has a real rate for `code`.
    pub fn supports(&self, code: &str) -> bool {
        code.eq_ignore_ascii_case(BASE_CURRENCY) || self.rates.contains_key(&code.to_uppercase())
    }

    /// Converts a base-currency amount into `code`, saturating at
    /// [`Decimal::MAX`].
    pub fn from_base(&self, amount: Decimal, code: &str) -> Decimal {
        amount.saturating_mul(self.rate(code))
    }

    /// Converts an amount in `code` back to the base currency.
    pub fn to_base(&self, amount: Decimal, code: &str) -> Decimal {
        // `rate` never returns zero.
        amount.checked_div(self.rate(code)).unwrap_or(Decimal::MAX)
    }
}

/// Observable state of the rate cache.
#[derive(Debug, Clone, PartialEq)]
pub enum RateStatus {
    /// No fetch attempted yet this session.
    Unfetched,
    /// Fetched from the feed and within the TTL.
    Fresh { fetched_at: Instant },
    /// Fetched from the feed but past the TTL; refreshed on next use.
    Stale,
    /// The first fetch failed; the static table serves the rest of the session.
    Fallback,
}

#[derive(Debug)]
enum CacheState {
    Unfetched,
    Loaded { table: RateTable, fetched_at: Instant },
    Fallback(RateTable),
}

/// Session-scoped exchange rate cache.
pub struct ExchangeRates<S, C = SystemClock> {
    source: S,
    clock: C,
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl<S: RateSource> ExchangeRates<S, SystemClock> {
    /// Creates a cache over `source` using the wall clock.
    pub fn new(source: S, ttl: Duration) -> Self {
        Self::with_clock(source, SystemClock, ttl)
    }
}

impl<S: RateSource, C: Clock> ExchangeRates<S, C> {
    pub fn with_clock(source: S, clock: C, ttl: Duration) -> Self {
        Self {
            source,
            clock,
            ttl,
            state: Mutex::new(CacheState::Unfetched),
        }
    }

    /// Units of `code` per 1 USD. `USD` is answered without touching the cache.
    pub async fn get_rate(&self, code: &str) -> Decimal {
        if code.eq_ignore_ascii_case(BASE_CURRENCY) {
            return Decimal::ONE;
        }
        self.table().await.rate(code)
    }

    /// Returns the current table, fetching or refreshing it if needed.
    ///
    /// Concurrent callers wait on the same fetch rather than issuing their own.
    pub async fn table(&self) -> RateTable {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        match &*state {
            CacheState::Loaded { table, fetched_at }
                if now.duration_since(*fetched_at) < self.ttl =>
            {
                return table.clone();
            }
            CacheState::Fallback(table) => return table.clone(),
            _ => {}
        }

        match self.source.fetch_rates().await {
            Ok(rates) => {
                info!(currencies = rates.len(), "exchange rates loaded");
                let table = RateTable::new(rates);
                *state = CacheState::Loaded {
                    table: table.clone(),
                    fetched_at: now,
                };
                table
            }
            Err(e) => {
                if let CacheState::Loaded { table, .. } = &*state {
                    warn!(error = %e, "exchange rate refresh failed, keeping expired rates");
                    return table.clone();
                }
                warn!(error = %e, "exchange rate fetch failed, using static fallback rates");
                let table = RateTable::fallback();
                *state = CacheState::Fallback(table.clone());
                table
            }
        }
    }

    /// Current cache status without triggering a fetch.
    pub async fn status(&self) -> RateStatus {
        let state = self.state.lock().await;
        match &*state {
            CacheState::Unfetched => RateStatus::Unfetched,
            CacheState::Loaded { fetched_at, .. }
                if self.clock.now().duration_since(*fetched_at) < self.ttl =>
            {
                RateStatus::Fresh {
                    fetched_at: *fetched_at,
                }
            }
            CacheState::Loaded { .. } => RateStatus::Stale,
            CacheState::Fallback(_) => RateStatus::Fallback,
        }
    }

    /// Forgets everything; the next lookup fetches again.
    pub async fn reset(&self) {
        *self.state.lock().await = CacheState::Unfetched;
    }
}
