//! Background price polling.
//!
//! Fetches run on a fixed interval and may overlap when the feed is slow.
//! Every fetch takes a sequence token when it starts, and a result is
//! published only if it is newer than the snapshot already out, so a slow
//! response never replaces a fresher one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::models::Asset;
use crate::prices::PriceFeed;
use crate::sequence::RequestSequencer;

const FIELD: &str = "market-list";

/// A fetch still pending after this many intervals is abandoned.
const FETCH_TIMEOUT_TICKS: u32 = 3;

/// One published market list.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSnapshot {
    /// Sequence token of the fetch that produced it.
    pub seq: u64,
    pub assets: Vec<Asset>,
}

/// Receiving end of the poller. `None` until the first successful fetch.
pub type PriceUpdates = watch::Receiver<Option<Arc<PriceSnapshot>>>;

/// Starts polling `feed` every `interval`.
///
/// The first fetch starts immediately. Failed fetches are logged and the
/// previous snapshot stays published. A fetch still pending after three
/// intervals is dropped, so a hung feed cannot pile up requests. The task
/// ends once every [`PriceUpdates`] receiver has been dropped.
pub fn spawn_price_poller<F>(feed: F, interval: Duration) -> (PriceUpdates, JoinHandle<()>)
where
    F: PriceFeed + 'static,
{
    let (tx, rx) = watch::channel(None);
    let feed = Arc::new(feed);
    let handle = tokio::spawn(run(feed, interval, tx));
    (rx, handle)
}

async fn run<F>(feed: Arc<F>, interval: Duration, tx: watch::Sender<Option<Arc<PriceSnapshot>>>)
where
    F: PriceFeed + 'static,
{
    info!(interval_secs = interval.as_secs_f64(), "price poller started");
    let sequencer = RequestSequencer::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let fetch_timeout = interval.saturating_mul(FETCH_TIMEOUT_TICKS);
    let mut fetches = JoinSet::new();

    loop {
        tokio::select! {
            _ = tx.closed() => break,
            _ = ticker.tick() => {
                let seq = sequencer.issue(FIELD).seq();
                let feed = Arc::clone(&feed);
                fetches.spawn(async move {
                    (seq, tokio::time::timeout(fetch_timeout, feed.market_list()).await)
                });
            }
            Some(joined) = fetches.join_next() => match joined {
                Ok((seq, Ok(Ok(assets)))) => publish(&tx, seq, assets),
                Ok((seq, Ok(Err(e)))) => warn!(seq, error = %e, "price poll failed, keeping last snapshot"),
                Ok((seq, Err(_))) => warn!(
                    seq,
                    timeout_ms = fetch_timeout.as_millis() as u64,
                    "price poll timed out, keeping last snapshot"
                ),
                Err(e) => warn!(error = %e, "price poll task failed"),
            },
        }
    }

    info!("price poller stopped, no receivers left");
}

fn publish(tx: &watch::Sender<Option<Arc<PriceSnapshot>>>, seq: u64, assets: Vec<Asset>) {
    let count = assets.len();
    let replaced = tx.send_if_modified(|current| {
        if current.as_ref().is_some_and(|s| s.seq >= seq) {
            return false;
        }
        *current = Some(Arc::new(PriceSnapshot { seq, assets }));
        true
    });
    if replaced {
        debug!(seq, count, "published price snapshot");
    } else {
        debug!(seq, "dropping price snapshot older than the published one");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use crate::{ConvexError, Result};

    /// First call is slow and returns an old price; later calls are fast.
    struct SlowFirstFeed {
        calls: AtomicUsize,
        fail_first: bool,
    }

    impl SlowFirstFeed {
        fn new(fail_first: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_first,
            }
        }
    }

    impl PriceFeed for SlowFirstFeed {
        async fn market_list(&self) -> Result<Vec<Asset>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                if self.fail_first {
                    return Err(ConvexError::MalformedPayload("feed down".into()));
                }
                tokio::time::sleep(Duration::from_millis(300)).await;
                return Ok(vec![Asset::new("bitcoin", "BTC", "Bitcoin", dec!(50000))]);
            }
            Ok(vec![Asset::new("bitcoin", "BTC", "Bitcoin", dec!(60000))])
        }

        async fn ticker_price(&self, _symbol: &str) -> Result<Decimal> {
            Ok(Decimal::ZERO)
        }

        async fn ticker_change(&self, _symbol: &str) -> Result<Decimal> {
            Ok(Decimal::ZERO)
        }
    }

    /// Never answers; counts how many calls are still pending.
    #[derive(Default)]
    struct HangingFeed {
        pending: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    struct PendingCall(Arc<AtomicUsize>);

    impl Drop for PendingCall {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl PriceFeed for HangingFeed {
        async fn market_list(&self) -> Result<Vec<Asset>> {
            let now = self.pending.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let _call = PendingCall(Arc::clone(&self.pending));
            std::future::pending::<()>().await;
            Ok(Vec::new())
        }

        async fn ticker_price(&self, _symbol: &str) -> Result<Decimal> {
            Ok(Decimal::ZERO)
        }

        async fn ticker_change(&self, _symbol: &str) -> Result<Decimal> {
            Ok(Decimal::ZERO)
        }
    }

    async fn next_snapshot(rx: &mut PriceUpdates) -> Arc<PriceSnapshot> {
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("no snapshot in time")
            .unwrap();
        rx.borrow_and_update().clone().unwrap()
    }

    #[tokio::test]
    async fn slow_old_fetch_never_overwrites_newer() {
        let (mut rx, _handle) =
            spawn_price_poller(SlowFirstFeed::new(false), Duration::from_millis(20));

        let first = next_snapshot(&mut rx).await;
        assert_eq!(first.assets[0].unit_price, dec!(60000));
        assert!(first.seq > 1);

        tokio::time::sleep(Duration::from_millis(500)).await;
        let current = rx.borrow().clone().unwrap();
        assert_eq!(current.assets[0].unit_price, dec!(60000));
        assert!(current.seq >= first.seq);
    }

    #[tokio::test]
    async fn failed_fetch_is_not_published() {
        let (mut rx, _handle) =
            spawn_price_poller(SlowFirstFeed::new(true), Duration::from_millis(20));
        let snapshot = next_snapshot(&mut rx).await;
        assert_eq!(snapshot.assets.len(), 1);
        assert!(snapshot.seq >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_fetches_are_abandoned() {
        let feed = HangingFeed::default();
        let pending = Arc::clone(&feed.pending);
        let peak = Arc::clone(&feed.peak);
        let (rx, handle) = spawn_price_poller(feed, Duration::from_millis(100));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.borrow().is_none());
        assert!(peak.load(Ordering::SeqCst) <= FETCH_TIMEOUT_TICKS as usize + 1);

        assert!(pending.load(Ordering::SeqCst) <= FETCH_TIMEOUT_TICKS as usize + 1);

        drop(rx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn stops_when_receivers_dropped() {
        let (rx, handle) = spawn_price_poller(SlowFirstFeed::new(true), Duration::from_millis(20));
        drop(rx);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("poller did not stop")
            .unwrap();
    }
}
