use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::balance::BalanceReader;
use crate::relay::RelayMessage;

/// Time between balance reads
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Periodically reads a platform balance and hands readings to the relay
pub struct Poller {
    reader: Arc<BalanceReader>,
    interval: Duration,
    /// Flips to `true` when the pipeline shuts down
    shutdown: watch::Receiver<bool>,
}

impl Poller {
    /// Create a new poller
    pub fn new(reader: BalanceReader, interval: Duration, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            reader: Arc::new(reader),
            interval,
            shutdown,
        }
    }

    /// Start polling in a background task
    pub fn start(self, tx: mpsc::Sender<RelayMessage>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(tx).await;
        })
    }

    /// Run the polling loop.
    ///
    /// The first read happens immediately, then once per interval. Misses
    /// are silent and retried on the next tick without backoff. Captures
    /// run on the blocking pool so a stalled page source cannot hold up
    /// shutdown or other tasks.
    async fn run(mut self, tx: mpsc::Sender<RelayMessage>) {
        let platform = self.reader.platform().to_string();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(platform = %platform, interval_ms = self.interval.as_millis() as u64, "poller started");

        'poll: loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let reader = Arc::clone(&self.reader);
            let mut read = tokio::task::spawn_blocking(move || reader.read());
            let outcome = loop {
                tokio::select! {
                    outcome = &mut read => break outcome,
                    changed = self.shutdown.changed() => {
                        if changed.is_err() || *self.shutdown.borrow() {
                            tracing::debug!(platform = %platform, "shutdown during capture");
                            break 'poll;
                        }
                    }
                }
            };

            let reading = match outcome {
                Ok(Some(reading)) => reading,
                Ok(None) => {
                    tracing::trace!(platform = %platform, "no reading this tick");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(platform = %platform, "balance read task failed: {}", e);
                    continue;
                }
            };

            tracing::debug!(platform = %platform, value = reading.value, "balance read");

            // Never wait on the relay
            match tx.try_send(RelayMessage::update(reading)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(platform = %platform, "relay backlog full, reading dropped");
                }
                Err(TrySendError::Closed(_)) => break, // Relay gone
            }
        }

        tracing::info!(platform = %platform, "poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::{parse_selectors, Reading};
    use crate::page::{HttpPage, PageSource, StaticPage};
    use crate::relay::channel;
    use tokio::time::Instant;

    fn poller_over(page: Arc<dyn PageSource>, shutdown: watch::Receiver<bool>) -> Poller {
        let reader = BalanceReader::new(
            "chaturbate",
            parse_selectors(&[".token-balance"]).unwrap(),
            page,
        );
        Poller::new(reader, DEFAULT_POLL_INTERVAL, shutdown)
    }

    fn poller(page: Arc<StaticPage>, shutdown: watch::Receiver<bool>) -> Poller {
        poller_over(page, shutdown)
    }

    fn reading_of(msg: RelayMessage) -> Reading {
        match msg {
            RelayMessage::TelemetryUpdate { reading, reply } => {
                assert!(reply.is_none());
                reading
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_one_reading_per_tick() {
        let page = Arc::new(StaticPage::new(r#"<span class="token-balance">1,500</span>"#));
        let (_stop_tx, stop_rx) = watch::channel(false);
        let (tx, mut rx) = channel(32);
        let start = Instant::now();
        let handle = poller(page, stop_rx).start(tx);

        const TICKS: usize = 4;
        let mut arrivals = Vec::new();
        let mut readings = Vec::new();
        for _ in 0..TICKS {
            let msg = rx.recv().await.expect("reading");
            arrivals.push(Instant::now() - start);
            readings.push(reading_of(msg));
        }

        // Immediate first tick, then one per interval
        let expected: Vec<Duration> = (0..TICKS as u32).map(|i| DEFAULT_POLL_INTERVAL * i).collect();
        assert_eq!(arrivals, expected);

        assert!(readings.iter().all(|r| r.value == 1500.0 && r.platform == "chaturbate"));
        assert!(readings
            .windows(2)
            .all(|pair| pair[0].captured_at <= pair[1].captured_at));

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_misses_emit_nothing() {
        let page = Arc::new(StaticPage::new("<p>maintenance</p>"));
        let (_stop_tx, stop_rx) = watch::channel(false);
        let (tx, mut rx) = channel(32);
        let start = Instant::now();
        let _handle = poller(page.clone(), stop_rx).start(tx);

        // Three silent ticks (0s, 5s, 10s), balance appears before the fourth
        tokio::time::sleep(Duration::from_millis(12_000)).await;
        assert!(rx.try_recv().is_err());

        page.set(r#"<div class="token-balance">7</div>"#);
        let reading = reading_of(rx.recv().await.unwrap());
        assert_eq!(reading.value, 7.0);
        assert_eq!(Instant::now() - start, Duration::from_millis(15_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_channel_drops_without_blocking() {
        let page = Arc::new(StaticPage::new(r#"<i class="token-balance">1</i>"#));
        let (_stop_tx, stop_rx) = watch::channel(false);
        let (tx, mut rx) = channel(1);
        let handle = poller(page, stop_rx).start(tx);

        // Nobody drains for three ticks; only the first reading fits
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert!(!handle.is_finished());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_poller() {
        let page = Arc::new(StaticPage::new(r#"<i class="token-balance">1</i>"#));
        let (stop_tx, stop_rx) = watch::channel(false);
        let (tx, mut rx) = channel(8);
        let handle = poller(page, stop_rx).start(tx);

        assert!(rx.recv().await.is_some());
        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        // Sender dropped with the poller
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_channel_stops_poller() {
        let page = Arc::new(StaticPage::new(r#"<i class="token-balance">1</i>"#));
        let (_stop_tx, stop_rx) = watch::channel(false);
        let (tx, rx) = channel(8);
        drop(rx);

        poller(page, stop_rx).start(tx).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_while_capture_stalls() {
        // Connection is accepted by the kernel backlog but never answered
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        let page = Arc::new(HttpPage::new(url, Duration::from_secs(3)));

        let (stop_tx, stop_rx) = watch::channel(false);
        let (tx, mut rx) = channel(8);
        let handle = poller_over(page, stop_rx).start(tx);

        tokio::time::sleep(Duration::from_millis(200)).await;
        stop_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("poller should stop while the capture is still pending")
            .unwrap();
        assert!(rx.recv().await.is_none());
    }
}
