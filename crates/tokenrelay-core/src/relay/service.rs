use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use super::{Relay, RelayMessage};

/// Drains a reader's channel and forwards every reading it receives.
///
/// Each reading gets its own task, so several forwards can be in flight
/// and finish out of order. When every sender is gone the service waits
/// for in-flight forwards and exits.
pub struct RelayService {
    relay: Arc<Relay>,
}

impl RelayService {
    pub fn new(relay: Relay) -> Self {
        Self {
            relay: Arc::new(relay),
        }
    }

    /// Start the service in a background task
    pub fn start(self, rx: mpsc::Receiver<RelayMessage>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(rx).await;
        })
    }

    async fn run(self, mut rx: mpsc::Receiver<RelayMessage>) {
        let mut in_flight = JoinSet::new();

        while let Some(message) = rx.recv().await {
            match message {
                RelayMessage::TelemetryUpdate { reading, reply } => {
                    let relay = Arc::clone(&self.relay);
                    in_flight.spawn(async move {
                        let result = relay.forward(&reading).await;
                        match &result.error {
                            None => tracing::info!(
                                platform = %reading.platform,
                                value = reading.value,
                                endpoint = %relay.endpoint(),
                                "telemetry forwarded"
                            ),
                            Some(error) => tracing::warn!(
                                platform = %reading.platform,
                                value = reading.value,
                                endpoint = %relay.endpoint(),
                                %error,
                                "telemetry forward failed"
                            ),
                        }
                        if let Some(reply) = reply {
                            // Nobody listening is fine
                            let _ = reply.send(result);
                        }
                    });
                }
            }

            // Reap finished forwards so the set does not grow unbounded
            while in_flight.try_join_next().is_some() {}
        }

        while in_flight.join_next().await.is_some() {}
        tracing::debug!(endpoint = %self.relay.endpoint(), "relay service stopped");
    }
}
