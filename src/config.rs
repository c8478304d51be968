//! Application configuration loaded from environment variables.
//!
//! Every endpoint has a default so the client runs against a local backend
//! and public price feeds with no setup:
//! - `CONVEX_API_URL`: exchange backend base URL
//! - `CONVEX_PRICE_FEED_URL`: batch market price list
//! - `CONVEX_TICKER_URL`: per-symbol ticker price
//! - `CONVEX_TICKER_STATS_URL`: per-symbol 24h statistics
//! - `CONVEX_RATES_URL`: fiat exchange rates with USD as base
//!
//! Optional values:
//! - `CONVEX_API_TOKEN`: bearer token for the authenticated backend routes
//! - `CONVEX_DISPLAY_CURRENCY`: currency shown on screen (default `USD`)
//! - `CONVEX_RATE_TTL_SECS`: how long fetched rates stay fresh
//! - `CONVEX_POLL_INTERVAL_SECS`: price polling period

use std::time::Duration;

use crate::models::BearerToken;

const DEFAULT_API_URL: &str = "http://localhost:8000/api";
const DEFAULT_PRICE_FEED_URL: &str = "https://api.coingecko.com/api/v3/coins/markets";
const DEFAULT_TICKER_URL: &str = "https://api.binance.com/api/v3/ticker/price";
const DEFAULT_TICKER_STATS_URL: &str = "https://api.binance.com/api/v3/ticker/24hr";
const DEFAULT_RATES_URL: &str = "https://open.er-api.com/v6/latest/USD";
const DEFAULT_DISPLAY_CURRENCY: &str = "USD";
const DEFAULT_RATE_TTL_SECS: u64 = 60 * 60;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Top-level application configuration.
#[derive(Debug)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub feeds: FeedConfig,
    pub display_currency: String,
}

/// Exchange backend connection values.
#[derive(Debug)]
pub struct BackendConfig {
    pub api_url: String,
    pub token: Option<BearerToken>,
}

/// Third-party price and rate feed values.
#[derive(Debug)]
pub struct FeedConfig {
    pub price_feed_url: String,
    pub ticker_url: String,
    pub ticker_stats_url: String,
    pub rates_url: String,
    pub rate_ttl: Duration,
    pub poll_interval: Duration,
}

/// Loads the application configuration from environment variables.
///
/// # Errors
///
/// Returns [`ConvexError::Config`](crate::ConvexError::Config) if a
/// duration variable is not a whole number of seconds, or if the poll
/// interval is zero.
pub fn fetch_config() -> crate::Result<AppConfig> {
    let api_url = non_empty_var("CONVEX_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let token = non_empty_var("CONVEX_API_TOKEN").map(BearerToken::new);

    let price_feed_url = non_empty_var("CONVEX_PRICE_FEED_URL")
        .unwrap_or_else(|| DEFAULT_PRICE_FEED_URL.to_string());
    let ticker_url =
        non_empty_var("CONVEX_TICKER_URL").unwrap_or_else(|| DEFAULT_TICKER_URL.to_string());
    let ticker_stats_url = non_empty_var("CONVEX_TICKER_STATS_URL")
        .unwrap_or_else(|| DEFAULT_TICKER_STATS_URL.to_string());
    let rates_url =
        non_empty_var("CONVEX_RATES_URL").unwrap_or_else(|| DEFAULT_RATES_URL.to_string());

    let display_currency = non_empty_var("CONVEX_DISPLAY_CURRENCY")
        .unwrap_or_else(|| DEFAULT_DISPLAY_CURRENCY.to_string())
        .to_uppercase();

    let rate_ttl = secs_var("CONVEX_RATE_TTL_SECS", DEFAULT_RATE_TTL_SECS)?;
    let poll_interval = secs_var("CONVEX_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?;
    if poll_interval.is_zero() {
        return Err(crate::ConvexError::Config(
            "CONVEX_POLL_INTERVAL_SECS must be greater than zero".to_string(),
        ));
    }

    Ok(AppConfig {
        backend: BackendConfig { api_url, token },
        feeds: FeedConfig {
            price_feed_url,
            ticker_url,
            ticker_stats_url,
            rates_url,
            rate_ttl,
            poll_interval,
        },
        display_currency,
    })
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn secs_var(name: &str, default: u64) -> crate::Result<Duration> {
    match non_empty_var(name) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| crate::ConvexError::Config(format!("{name}={raw:?} is invalid: {e}"))),
        None => Ok(Duration::from_secs(default)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_VARS: [&str; 9] = [
        "CONVEX_API_URL",
        "CONVEX_PRICE_FEED_URL",
        "CONVEX_TICKER_URL",
        "CONVEX_TICKER_STATS_URL",
        "CONVEX_RATES_URL",
        "CONVEX_API_TOKEN",
        "CONVEX_DISPLAY_CURRENCY",
        "CONVEX_RATE_TTL_SECS",
        "CONVEX_POLL_INTERVAL_SECS",
    ];

    /// Serializes the tests in this module; they share process env.
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    /// Temporarily sets env vars, runs `f`, then restores originals.
    ///
    /// Every variable not listed in `vars` is cleared for the duration, so
    /// each test sees a known environment.
    fn with_env<F: FnOnce()>(vars: &[(&str, Option<&str>)], f: F) {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let originals: Vec<(&str, Option<String>)> = ALL_VARS
            .iter()
            .map(|k| (*k, std::env::var(k).ok()))
            .collect();

        for k in ALL_VARS {
            let value = vars.iter().find(|(name, _)| *name == k).and_then(|(_, v)| *v);
            // SAFETY: ENV_LOCK is held and nothing else in the crate reads these vars.
            unsafe {
                match value {
                    Some(val) => std::env::set_var(k, val),
                    None => std::env::remove_var(k),
                }
            }
        }

        f();

        for (k, original) in originals {
            // SAFETY: restoring original values, ENV_LOCK still held.
            unsafe {
                match original {
                    Some(val) => std::env::set_var(k, val),
                    None => std::env::remove_var(k),
                }
            }
        }
    }

    #[test]
    fn defaults_without_env_vars() {
        with_env(&[], || {
            let config = fetch_config().unwrap();
            assert_eq!(config.backend.api_url, DEFAULT_API_URL);
            assert!(config.backend.token.is_none());
            assert_eq!(config.feeds.price_feed_url, DEFAULT_PRICE_FEED_URL);
            assert_eq!(config.feeds.ticker_stats_url, DEFAULT_TICKER_STATS_URL);
            assert_eq!(config.feeds.rates_url, DEFAULT_RATES_URL);
            assert_eq!(config.display_currency, "USD");
            assert_eq!(config.feeds.rate_ttl, Duration::from_secs(3600));
            assert_eq!(config.feeds.poll_interval, Duration::from_secs(30));
        });
    }

    #[test]
    fn loads_token_and_currency() {
        with_env(
            &[
                ("CONVEX_API_TOKEN", Some("tok-123")),
                ("CONVEX_DISPLAY_CURRENCY", Some("kzt")),
            ],
            || {
                let config = fetch_config().unwrap();
                assert_eq!(config.backend.token.unwrap().expose(), "tok-123");
                assert_eq!(config.display_currency, "KZT");
            },
        );
    }

    #[test]
    fn custom_endpoints() {
        with_env(
            &[
                ("CONVEX_API_URL", Some("https://exchange.example.com/api")),
                ("CONVEX_RATES_URL", Some("https://rates.example.com")),
            ],
            || {
                let config = fetch_config().unwrap();
                assert_eq!(config.backend.api_url, "https://exchange.example.com/api");
                assert_eq!(config.feeds.rates_url, "https://rates.example.com");
            },
        );
    }

    #[test]
    fn rejects_non_numeric_ttl() {
        with_env(&[("CONVEX_RATE_TTL_SECS", Some("an hour"))], || {
            let err = fetch_config().unwrap_err();
            assert!(err.to_string().contains("CONVEX_RATE_TTL_SECS"));
        });
    }

    #[test]
    fn rejects_zero_poll_interval() {
        with_env(&[("CONVEX_POLL_INTERVAL_SECS", Some("0"))], || {
            let err = fetch_config().unwrap_err();
            assert!(err.to_string().contains("greater than zero"));
        });
    }

    #[test]
    fn empty_values_treated_as_absent() {
        with_env(
            &[
                ("CONVEX_API_URL", Some("")),
                ("CONVEX_API_TOKEN", Some("  ")),
                ("CONVEX_DISPLAY_CURRENCY", Some("")),
            ],
            || {
                let config = fetch_config().unwrap();
                assert_eq!(config.backend.api_url, DEFAULT_API_URL);
                assert!(config.backend.token.is_none());
                assert_eq!(config.display_currency, "USD");
            },
        );
    }
}
