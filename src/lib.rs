//! Conversion exchange client library.
//!
//! Live trade quotes over an exchange backend: price and exchange-rate
//! adapters, the user's balances, the multi-asset conversion engine, the
//! buy/sell/stake calculators, and submission of the resulting trades.
//! Every quote is advisory; the backend re-prices at settlement.

pub mod backend;
pub mod balance;
pub mod calculators;
pub mod config;
pub mod convert;
pub mod credentials;
pub mod error;
pub mod market;
pub mod models;
pub mod poller;
pub mod prices;
pub mod primitives;
pub mod rates;
pub mod sequence;
pub mod submit;

pub use error::{ConvexError, Result};
