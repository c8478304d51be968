//! Price source adapter.
//!
//! Wraps the two external price feeds behind [`PriceFeed`]: a batch market
//! list (prices plus 24h stats for many assets) and a per-symbol ticker.
//! [`PriceSource`] layers lookup and the single fallback attempt on top.
//!
//! Ticker prices are quoted against USDT and taken as USD.

use std::future::Future;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::models::Asset;
use crate::models::feed::{TickerPrice, TickerStats, parse_market_list, ticker_pair};
use crate::{ConvexError, Result};

/// Tickers pegged to the base currency; never looked up on the ticker feed.
const STABLECOINS: [&str; 4] = ["USDT", "USDC", "DAI", "BUSD"];

/// Raw access to the external price feeds.
pub trait PriceFeed: Send + Sync {
    /// Fetches the batch market list.
    fn market_list(&self) -> impl Future<Output = Result<Vec<Asset>>> + Send;

    /// Fetches the current price of one ticker.
    fn ticker_price(&self, symbol: &str) -> impl Future<Output = Result<Decimal>> + Send;

    /// Fetches the 24h price change of one ticker, in percent.
    fn ticker_change(&self, symbol: &str) -> impl Future<Output = Result<Decimal>> + Send;
}

impl<T: PriceFeed> PriceFeed for std::sync::Arc<T> {
    fn market_list(&self) -> impl Future<Output = Result<Vec<Asset>>> + Send {
        (**self).market_list()
    }

    fn ticker_price(&self, symbol: &str) -> impl Future<Output = Result<Decimal>> + Send {
        (**self).ticker_price(symbol)
    }

    fn ticker_change(&self, symbol: &str) -> impl Future<Output = Result<Decimal>> + Send {
        (**self).ticker_change(symbol)
    }
}

/// [`PriceFeed`] over the public HTTP endpoints.
#[derive(Debug, Clone)]
pub struct HttpPriceFeed {
    client: reqwest::Client,
    markets_url: String,
    ticker_url: String,
    stats_url: String,
}

impl HttpPriceFeed {
    pub fn new(
        client: reqwest::Client,
        markets_url: impl Into<String>,
        ticker_url: impl Into<String>,
        stats_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            markets_url: markets_url.into(),
            ticker_url: ticker_url.into(),
            stats_url: stats_url.into(),
        }
    }

    /// Builds the feed from the loaded configuration.
    pub fn from_config(client: reqwest::Client, feeds: &crate::config::FeedConfig) -> Self {
        Self::new(
            client,
            &feeds.price_feed_url,
            &feeds.ticker_url,
            &feeds.ticker_stats_url,
        )
    }
}

impl PriceFeed for HttpPriceFeed {
    async fn market_list(&self) -> Result<Vec<Asset>> {
        debug!(url = %self.markets_url, "fetching market list");
        let response = self
            .client
            .get(&self.markets_url)
            .query(&[
                ("vs_currency", "usd"),
                ("order", "market_cap_desc"),
                ("per_page", "250"),
                ("page", "1"),
            ])
            .send()
            .await?;
        let body: serde_json::Value = response.error_for_status()?.json().await?;
        parse_market_list(body)
    }

    async fn ticker_price(&self, symbol: &str) -> Result<Decimal> {
        if is_stablecoin(symbol) {
            return Ok(Decimal::ONE);
        }
        let response = self
            .client
            .get(&self.ticker_url)
            .query(&[("symbol", ticker_pair(symbol))])
            .send()
            .await?;
        let tick: TickerPrice = response.error_for_status()?.json().await?;
        Ok(tick.price)
    }

    async fn ticker_change(&self, symbol: &str) -> Result<Decimal> {
        if is_stablecoin(symbol) {
            return Ok(Decimal::ZERO);
        }
        let response = self
            .client
            .get(&self.stats_url)
            .query(&[("symbol", ticker_pair(symbol))])
            .send()
            .await?;
        let stats: TickerStats = response.error_for_status()?.json().await?;
        Ok(stats.price_change_percent)
    }
}

fn is_stablecoin(symbol: &str) -> bool {
    STABLECOINS.iter().any(|s| s.eq_ignore_ascii_case(symbol))
}

/// Price lookups over a [`PriceFeed`].
#[derive(Debug, Clone)]
pub struct PriceSource<F> {
    feed: F,
}

impl<F: PriceFeed> PriceSource<F> {
    pub fn new(feed: F) -> Self {
        Self { feed }
    }

    /// The underlying feed.
    pub fn feed(&self) -> &F {
        &self.feed
    }

    /// Latest prices for all assets, or for the given tickers only.
    ///
    /// Requested tickers the feed does not know are silently absent from the
    /// result; callers needing a specific price use [`get_unit_price`].
    ///
    /// [`get_unit_price`]: Self::get_unit_price
    pub async fn get_current_prices(&self, symbols: Option<&[&str]>) -> Result<Vec<Asset>> {
        let assets = self.feed.market_list().await?;
        Ok(match symbols {
            Some(wanted) => assets
                .into_iter()
                .filter(|a| wanted.iter().any(|s| s.eq_ignore_ascii_case(&a.symbol)))
                .collect(),
            None => assets,
        })
    }

    /// Current unit price of one ticker in the base currency.
    ///
    /// Tries the per-symbol ticker first and falls back to the batch list
    /// once. A zero or negative price counts as no price.
    ///
    /// # Errors
    ///
    /// Returns [`ConvexError::PriceUnavailable`] when neither feed has a
    /// usable price.
    pub async fn get_unit_price(&self, symbol: &str) -> Result<Decimal> {
        match self.feed.ticker_price(symbol).await {
            Ok(price) if price > Decimal::ZERO => return Ok(price),
            Ok(price) => debug!(symbol, %price, "ticker returned non-positive price"),
            Err(e) => debug!(symbol, error = %e, "ticker lookup failed, trying market list"),
        }

        match self.feed.market_list().await {
            Ok(assets) => assets
                .into_iter()
                .find(|a| a.symbol.eq_ignore_ascii_case(symbol) && a.has_price())
                .map(|a| a.unit_price)
                .ok_or_else(|| unavailable(symbol)),
            Err(e) => {
                warn!(symbol, error = %e, "no price from either feed");
                Err(unavailable(symbol))
            }
        }
    }

    /// 24h change for one ticker; zero when the feed has none.
    pub async fn get_change_24h(&self, symbol: &str) -> Decimal {
        match self.feed.ticker_change(symbol).await {
            Ok(change) => change,
            Err(e) => {
                debug!(symbol, error = %e, "no 24h change available");
                Decimal::ZERO
            }
        }
    }
}

fn unavailable(symbol: &str) -> ConvexError {
    ConvexError::PriceUnavailable {
        symbol: symbol.to_uppercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rust_decimal_macros::dec;

    /// Feed with a fixed market list and an optional ticker.
    struct FakeFeed {
        market: Option<Vec<Asset>>,
        ticker: Option<Decimal>,
        market_calls: AtomicUsize,
    }

    impl FakeFeed {
        fn new(market: Option<Vec<Asset>>, ticker: Option<Decimal>) -> Self {
            Self {
                market,
                ticker,
                market_calls: AtomicUsize::new(0),
            }
        }
    }

    impl PriceFeed for FakeFeed {
        async fn market_list(&self) -> Result<Vec<Asset>> {
            self.market_calls.fetch_add(1, Ordering::SeqCst);
            self.market
                .clone()
                .ok_or_else(|| ConvexError::MalformedPayload("down".into()))
        }

        async fn ticker_price(&self, symbol: &str) -> Result<Decimal> {
            self.ticker.ok_or_else(|| unavailable(symbol))
        }

        async fn ticker_change(&self, symbol: &str) -> Result<Decimal> {
            Err(unavailable(symbol))
        }
    }

    fn market() -> Vec<Asset> {
        vec![
            Asset::new("bitcoin", "BTC", "Bitcoin", dec!(60000)),
            Asset::new("ethereum", "ETH", "Ethereum", dec!(3000)),
            Asset::new("dead", "DEAD", "Dead", Decimal::ZERO),
        ]
    }

    #[tokio::test]
    async fn ticker_price_wins_without_batch_call() {
        let source = PriceSource::new(FakeFeed::new(Some(market()), Some(dec!(61000))));
        assert_eq!(source.get_unit_price("BTC").await.unwrap(), dec!(61000));
        assert_eq!(source.feed().market_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn falls_back_to_batch_once() {
        let source = PriceSource::new(FakeFeed::new(Some(market()), None));
        assert_eq!(source.get_unit_price("eth").await.unwrap(), dec!(3000));
        assert_eq!(source.feed().market_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_everywhere_is_price_unavailable() {
        let source = PriceSource::new(FakeFeed::new(Some(market()), None));
        let err = source.get_unit_price("DOGE").await.unwrap_err();
        assert!(err.is_price_unavailable());
        assert_eq!(err.to_string(), "price unavailable for DOGE");
    }

    #[tokio::test]
    async fn zero_price_is_not_a_price() {
        let source = PriceSource::new(FakeFeed::new(Some(market()), Some(Decimal::ZERO)));
        assert!(source.get_unit_price("DEAD").await.unwrap_err().is_price_unavailable());
    }

    #[tokio::test]
    async fn both_feeds_down_is_price_unavailable() {
        let source = PriceSource::new(FakeFeed::new(None, None));
        assert!(source.get_unit_price("BTC").await.unwrap_err().is_price_unavailable());
    }

    #[tokio::test]
    async fn filters_requested_symbols() {
        let source = PriceSource::new(FakeFeed::new(Some(market()), None));
        let assets = source.get_current_prices(Some(&["btc", "XRP"])).await.unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].id, "bitcoin");

        let all = source.get_current_prices(None).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn missing_change_is_zero() {
        let source = PriceSource::new(FakeFeed::new(None, None));
        assert_eq!(source.get_change_24h("BTC").await, Decimal::ZERO);
    }

    #[test]
    fn stablecoins_recognized() {
        assert!(is_stablecoin("usdt"));
        assert!(!is_stablecoin("BTC"));
    }
}
