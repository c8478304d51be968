use std::time::Duration;

use tracing::{info, warn};

use convex::ConvexError;
use convex::backend::BackendClient;
use convex::balance::BalanceProvider;
use convex::config::{AppConfig, fetch_config};
use convex::credentials::populate_env_from_keychain;
use convex::market::{MarketBoard, SortDirection, SortKey};
use convex::poller::spawn_price_poller;
use convex::prices::{HttpPriceFeed, PriceSource};
use convex::primitives::{format_number, format_percent, format_price};
use convex::rates::{ExchangeRates, HttpRateSource, RateTable};

const TOP_ASSETS: usize = 10;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

fn main() -> Result<(), ConvexError> {
    // Initialize tracing subscriber for logging output.
    tracing_subscriber::fmt::init();

    // Runs before the runtime exists, while this is the only thread.
    populate_env_from_keychain();
    let app_config = fetch_config()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(app_config))
}

async fn run(app_config: AppConfig) -> Result<(), ConvexError> {
    let currency = app_config.display_currency.as_str();

    let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
    let prices = PriceSource::new(HttpPriceFeed::from_config(client.clone(), &app_config.feeds));
    let rates = ExchangeRates::new(
        HttpRateSource::new(client.clone(), &app_config.feeds.rates_url),
        app_config.feeds.rate_ttl,
    );

    let mut board = MarketBoard::new(prices.get_current_prices(None).await?);
    let table = rates.table().await;

    println!("{:<8} {:>20} {:>9} {:>12}", "ASSET", format!("PRICE ({currency})"), "24H", "MCAP");
    for asset in board
        .sorted(SortKey::MarketCap, SortDirection::Descending)
        .into_iter()
        .take(TOP_ASSETS)
    {
        let market_cap = asset
            .market_cap
            .map(|cap| format_number(table.from_base(cap, currency)))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<8} {:>20} {:>9} {:>12}",
            asset.symbol,
            format_price(table.from_base(asset.unit_price, currency)),
            format_percent(asset.price_change_24h),
            market_cap,
        );
    }

    let backend = BackendClient::from_config(client.clone(), &app_config.backend);
    if backend.is_authenticated() {
        print_holdings(backend, &board, &table, currency).await?;
    }

    let (mut updates, poller) = spawn_price_poller(
        HttpPriceFeed::from_config(client, &app_config.feeds),
        app_config.feeds.poll_interval,
    );
    info!("watching prices, press Ctrl-C to stop");
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let Some(snapshot) = updates.borrow_and_update().clone() else {
                    continue;
                };
                let next = MarketBoard::new(snapshot.assets.clone());
                for delta in next.price_deltas(&board) {
                    if delta.previous == delta.current {
                        continue;
                    }
                    let symbol = next.get(&delta.asset_id).map_or("?", |a| a.symbol.as_str());
                    println!(
                        "{:<8} {:>20} {:>9}",
                        symbol,
                        format_price(table.from_base(delta.current, currency)),
                        delta.percent.map(format_percent).unwrap_or_else(|| "-".to_string()),
                    );
                }
                board = next;
            }
        }
    }

    drop(updates);
    if let Err(e) = poller.await {
        warn!(error = %e, "price poller ended abnormally");
    }
    Ok(())
}

async fn print_holdings(
    backend: BackendClient,
    board: &MarketBoard,
    table: &RateTable,
    currency: &str,
) -> Result<(), ConvexError> {
    let mut balances = BalanceProvider::new(backend);
    let snapshot = balances.refresh().await?.clone();

    println!();
    println!("{:<8} {:>20} {:>20}", "HOLDING", "AMOUNT", format!("VALUE ({currency})"));
    for row in board.reconcile(&snapshot.holdings) {
        let value = row
            .value
            .map(|v| format_price(table.from_base(v, currency)))
            .unwrap_or_else(|| "price unavailable".to_string());
        println!(
            "{:<8} {:>20} {:>20}",
            row.holding.symbol,
            row.holding.amount.normalize(),
            value
        );
    }

    let total = board.portfolio_value(&snapshot.holdings);
    println!("portfolio: {} {currency}", format_price(table.from_base(total, currency)));
    println!("cash: {} {currency}", format_price(table.from_base(snapshot.cash, currency)));

    Ok(())
}
