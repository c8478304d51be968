//! Shared test utilities: in-memory feeds and backends.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;

use convex::balance::AccountSource;
use convex::models::Asset;
use convex::models::response::ApiError;
use convex::models::user::UserProfile;
use convex::prices::PriceFeed;
use convex::rates::RateSource;
use convex::submit::{TradeBackend, TradeSubmission};
use convex::{ConvexError, Result};

pub const MARKETS_JSON: &str = include_str!("../fixtures/markets.json");
pub const USER_JSON: &str = include_str!("../fixtures/user.json");
pub const RATES_JSON: &str = include_str!("../fixtures/rates.json");
pub const STAKES_JSON: &str = include_str!("../fixtures/stakes.json");
pub const CONVERT_ERROR_JSON: &str = include_str!("../fixtures/convert_error.json");

pub fn btc() -> Asset {
    Asset::new("bitcoin", "BTC", "Bitcoin", dec!(60000))
}

pub fn eth() -> Asset {
    Asset::new("ethereum", "ETH", "Ethereum", dec!(3000))
}

pub fn usdc() -> Asset {
    Asset::new("usd-coin", "USDC", "USD Coin", dec!(1))
}

/// Price feed with a fixed market list and per-symbol ticker prices.
///
/// Ticker prices can be changed between calls to simulate a moving market.
pub struct StaticFeed {
    market: Vec<Asset>,
    tickers: Mutex<HashMap<String, Decimal>>,
    pub ticker_calls: AtomicUsize,
}

impl StaticFeed {
    pub fn new(market: Vec<Asset>) -> Self {
        let tickers = market
            .iter()
            .map(|a| (a.symbol.clone(), a.unit_price))
            .collect();
        Self {
            market,
            tickers: Mutex::new(tickers),
            ticker_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_ticker(&self, symbol: &str, price: Decimal) {
        self.tickers.lock().unwrap().insert(symbol.to_string(), price);
    }

    pub fn remove_ticker(&self, symbol: &str) {
        self.tickers.lock().unwrap().remove(symbol);
    }
}

impl PriceFeed for StaticFeed {
    async fn market_list(&self) -> Result<Vec<Asset>> {
        Ok(self.market.clone())
    }

    async fn ticker_price(&self, symbol: &str) -> Result<Decimal> {
        self.ticker_calls.fetch_add(1, Ordering::SeqCst);
        self.tickers
            .lock()
            .unwrap()
            .get(&symbol.to_uppercase())
            .copied()
            .ok_or_else(|| ConvexError::PriceUnavailable {
                symbol: symbol.to_uppercase(),
            })
    }

    async fn ticker_change(&self, _symbol: &str) -> Result<Decimal> {
        Ok(Decimal::ZERO)
    }
}

/// Rate source that either serves a fixed table or always fails.
pub struct StaticRates {
    table: Option<HashMap<String, Decimal>>,
    pub calls: AtomicUsize,
}

impl StaticRates {
    pub fn serving(pairs: &[(&str, Decimal)]) -> Self {
        Self {
            table: Some(pairs.iter().map(|(c, r)| (c.to_string(), *r)).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            table: None,
            calls: AtomicUsize::new(0),
        }
    }
}

impl RateSource for StaticRates {
    async fn fetch_rates(&self) -> Result<HashMap<String, Decimal>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.table
            .clone()
            .ok_or_else(|| ConvexError::MalformedPayload("rate feed down".to_string()))
    }
}

/// Account source serving profiles from a queue; the last one repeats.
pub struct QueuedAccount {
    profiles: Mutex<Vec<String>>,
}

impl QueuedAccount {
    pub fn new(profiles: &[&str]) -> Self {
        Self {
            profiles: Mutex::new(profiles.iter().map(|p| p.to_string()).collect()),
        }
    }
}

impl AccountSource for QueuedAccount {
    async fn fetch_profile(&self) -> Result<UserProfile> {
        let mut profiles = self.profiles.lock().unwrap();
        let json = if profiles.len() > 1 {
            profiles.remove(0)
        } else {
            profiles[0].clone()
        };
        Ok(serde_json::from_str(&json)?)
    }
}

/// Trade backend that records every submission and answers from a script.
#[derive(Default)]
pub struct RecordingBackend {
    pub posted: Mutex<Vec<TradeSubmission>>,
    pub reject_with: Option<(u16, String)>,
}

impl RecordingBackend {
    pub fn rejecting(status: u16, body: &str) -> Self {
        Self {
            posted: Mutex::new(Vec::new()),
            reject_with: Some((status, body.to_string())),
        }
    }

    pub fn posted(&self) -> Vec<TradeSubmission> {
        self.posted.lock().unwrap().clone()
    }
}

impl TradeBackend for RecordingBackend {
    async fn post_submission(&self, submission: &TradeSubmission) -> Result<Value> {
        self.posted.lock().unwrap().push(submission.clone());
        match &self.reject_with {
            Some((status, body)) => Err(ConvexError::Api(ApiError::from_body(*status, body))),
            None => Ok(serde_json::json!({ "status": "success", "kind": submission.kind() })),
        }
    }
}
