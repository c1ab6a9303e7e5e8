//! Telemetry relay: forwards readings to the ingest endpoint

mod payload;
mod service;
mod transport;
mod types;

pub use payload::build_payload;
pub use service::RelayService;
pub use transport::{Transport, UreqTransport};
pub use types::{ForwardResult, PayloadShape, RelayError};

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::balance::Reading;
use crate::store::{resolve_room_id, ConfigStore};

/// Default capacity of the reader -> relay channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Message sent from a reader to its relay service
#[derive(Debug)]
pub enum RelayMessage {
    /// A new balance reading to forward
    TelemetryUpdate {
        reading: Reading,
        /// Receives the outcome when set; readers normally leave it empty
        reply: Option<oneshot::Sender<ForwardResult>>,
    },
}

impl RelayMessage {
    /// Fire-and-forget update
    pub fn update(reading: Reading) -> Self {
        RelayMessage::TelemetryUpdate {
            reading,
            reply: None,
        }
    }

    /// Update whose result is delivered on the returned receiver
    pub fn update_with_reply(reading: Reading) -> (Self, oneshot::Receiver<ForwardResult>) {
        let (tx, rx) = oneshot::channel();
        (
            RelayMessage::TelemetryUpdate {
                reading,
                reply: Some(tx),
            },
            rx,
        )
    }
}

/// Create the bounded reader -> relay channel
pub fn channel(capacity: usize) -> (mpsc::Sender<RelayMessage>, mpsc::Receiver<RelayMessage>) {
    mpsc::channel(capacity.max(1))
}

/// Forwards single readings to one ingest endpoint
pub struct Relay {
    store: Arc<dyn ConfigStore>,
    transport: Arc<dyn Transport>,
    endpoint: String,
    shape: PayloadShape,
}

impl Relay {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        transport: Arc<dyn Transport>,
        endpoint: impl Into<String>,
        shape: PayloadShape,
    ) -> Self {
        Self {
            store,
            transport,
            endpoint: endpoint.into(),
            shape,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn shape(&self) -> PayloadShape {
        self.shape
    }

    /// Forward one reading and report the outcome.
    ///
    /// Never fails: configuration and network errors are folded into the
    /// returned [`ForwardResult`].
    pub async fn forward(&self, reading: &Reading) -> ForwardResult {
        self.try_forward(reading).await.into()
    }

    /// Forward one reading, keeping the typed error
    pub async fn try_forward(&self, reading: &Reading) -> Result<(), RelayError> {
        // Re-read on every forward so operator changes apply immediately
        let room_id = resolve_room_id(self.store.as_ref())
            .map_err(|e| RelayError::StoreUnavailable(format!("{:#}", e)))?
            .ok_or(RelayError::ConfigurationMissing)?;

        let body = build_payload(self.shape, &room_id, reading, Utc::now());
        let transport = Arc::clone(&self.transport);
        let endpoint = self.endpoint.clone();

        let status = tokio::task::spawn_blocking(move || transport.post_json(&endpoint, &body))
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?
            .map_err(|e| RelayError::Transport(format!("{:#}", e)))?;

        if !(200..300).contains(&status) {
            return Err(RelayError::HttpStatus(status));
        }

        Ok(())
    }
}
