//! Market board, rate cache and poller behavior over in-memory feeds.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use convex::market::{MarketBoard, SortDirection, SortKey};
use convex::models::feed::parse_market_list;
use convex::models::user::UserProfile;
use convex::poller::spawn_price_poller;
use convex::rates::{ExchangeRates, ManualClock, RateStatus};

use common::{StaticFeed, StaticRates, btc, eth};

fn fixture_board() -> MarketBoard {
    let body = serde_json::from_str(common::MARKETS_JSON).unwrap();
    MarketBoard::new(parse_market_list(body).unwrap())
}

#[test]
fn test_holdings_reconciled_against_market() {
    let board = fixture_board();
    let profile: UserProfile = serde_json::from_str(common::USER_JSON).unwrap();
    let holdings = profile.holdings();

    let rows = board.reconcile(&holdings);
    assert_eq!(rows[0].value, Some(dec!(30000)));
    // Numeric backend id, matched by ticker instead.
    assert_eq!(rows[1].asset.as_ref().map(|a| a.id.as_str()), Some("ethereum"));
    assert_eq!(rows[1].value, Some(dec!(9000)));
    assert_eq!(board.portfolio_value(&holdings), dec!(39000));
}

#[test]
fn test_top_by_market_cap() {
    let board = fixture_board();
    let top: Vec<&str> = board
        .sorted(SortKey::MarketCap, SortDirection::Descending)
        .iter()
        .map(|a| a.symbol.as_str())
        .collect();
    assert_eq!(top, vec!["BTC", "ETH", "USDC"]);
}

#[tokio::test]
async fn test_fallback_rates_for_session() {
    let source = Arc::new(StaticRates::failing());
    let rates = ExchangeRates::new(Arc::clone(&source), Duration::from_secs(3600));

    for code in ["RUB", "EUR", "KZT"] {
        let rate = rates.get_rate(code).await;
        assert!(rate > Decimal::ZERO, "{code} rate {rate}");
    }
    assert_eq!(rates.get_rate("KZT").await, dec!(450));
    assert_eq!(rates.get_rate("USD").await, Decimal::ONE);
    assert_eq!(rates.get_rate("XYZ").await, Decimal::ONE);
    assert_eq!(rates.status().await, RateStatus::Fallback);
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rates_refetched_after_ttl() {
    let source = Arc::new(StaticRates::serving(&[("EUR", dec!(0.9))]));
    let clock = Arc::new(ManualClock::new());
    let rates = ExchangeRates::with_clock(
        Arc::clone(&source),
        Arc::clone(&clock),
        Duration::from_secs(60),
    );

    assert_eq!(rates.get_rate("EUR").await, dec!(0.9));
    assert_eq!(rates.get_rate("EUR").await, dec!(0.9));
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);

    clock.advance(Duration::from_secs(61));
    assert_eq!(rates.status().await, RateStatus::Stale);
    rates.get_rate("EUR").await;
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);

    rates.reset().await;
    assert_eq!(rates.status().await, RateStatus::Unfetched);
}

#[tokio::test]
async fn test_poller_feeds_board() {
    let (mut updates, handle) =
        spawn_price_poller(StaticFeed::new(vec![btc(), eth()]), Duration::from_millis(25));

    tokio::time::timeout(Duration::from_secs(2), updates.changed())
        .await
        .expect("no price snapshot")
        .unwrap();
    let snapshot = updates.borrow_and_update().clone().unwrap();

    let mut board = MarketBoard::default();
    board.replace(snapshot.assets.clone());
    assert_eq!(board.len(), 2);
    assert_eq!(board.by_symbol("eth").unwrap().unit_price, dec!(3000));

    drop(updates);
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("poller kept running")
        .unwrap();
}
