//! Wires readers, relays and the shared store together

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use tokenrelay_core::balance::BalanceReader;
use tokenrelay_core::monitor::Poller;
use tokenrelay_core::page::{FilePage, HttpPage, PageSource};
use tokenrelay_core::relay::{self, Relay, RelayService, Transport, UreqTransport};
use tokenrelay_core::store::{ConfigStore, FileStore};

use crate::config::{PlatformSettings, Settings, SourceSettings};

/// Open the operator store configured in settings
pub fn open_store(settings: &Settings) -> Result<FileStore> {
    match settings.store_path {
        Some(ref path) => Ok(FileStore::new(path.clone())),
        None => FileStore::default_location(),
    }
}

/// Build the page source a platform is captured from.
///
/// HTTP fetches are bounded by the poll interval so one stalled page
/// cannot outlive the next tick.
pub fn page_source(settings: &Settings, platform: &PlatformSettings) -> Result<Arc<dyn PageSource>> {
    match platform.source {
        Some(SourceSettings::File { ref path }) => Ok(Arc::new(FilePage::new(path.clone()))),
        Some(SourceSettings::Http { ref url }) => Ok(Arc::new(HttpPage::new(
            url.clone(),
            Duration::from_millis(settings.poll_interval_ms),
        ))),
        None => bail!(
            "Platform '{}' has no page source; add `source` to its [[platforms]] entry",
            platform.id
        ),
    }
}

/// Build a reader for one platform
pub fn reader(settings: &Settings, platform: &PlatformSettings) -> Result<BalanceReader> {
    let descriptor = platform.descriptor(&settings.relay)?;
    let source = page_source(settings, platform)?;
    Ok(BalanceReader::new(descriptor.id, descriptor.selectors, source))
}

/// Running reader/relay pairs
pub struct Pipeline {
    shutdown: watch::Sender<bool>,
    pollers: Vec<JoinHandle<()>>,
    relays: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Start one reader/relay pair per selected platform.
    ///
    /// `only` restricts the run to the named platforms; empty means every
    /// platform in the settings.
    pub fn start(
        settings: &Settings,
        only: &[String],
        store: Arc<dyn ConfigStore>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let selected = select_platforms(settings, only)?;
        let interval = Duration::from_millis(settings.poll_interval_ms);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let mut pollers = Vec::new();
        let mut relays = Vec::new();

        for platform in &selected {
            let descriptor = platform
                .descriptor(&settings.relay)
                .with_context(|| format!("Failed to configure platform '{}'", platform.id))?;
            let source = page_source(settings, platform)?;

            tracing::info!(
                platform = %descriptor.id,
                source = %source.describe(),
                endpoint = %descriptor.endpoint,
                payload = descriptor.shape.as_str(),
                "starting platform"
            );

            let (tx, rx) = relay::channel(settings.channel_capacity);
            let relay = Relay::new(
                Arc::clone(&store),
                Arc::clone(&transport),
                descriptor.endpoint.clone(),
                descriptor.shape,
            );
            relays.push(RelayService::new(relay).start(rx));

            let reader = BalanceReader::new(descriptor.id, descriptor.selectors, source);
            pollers.push(Poller::new(reader, interval, shutdown_rx.clone()).start(tx));
        }

        Ok(Self {
            shutdown,
            pollers,
            relays,
        })
    }

    /// Start with the default HTTP transport and the configured file store
    pub fn start_default(settings: &Settings, only: &[String]) -> Result<Self> {
        let store = open_store(settings)?;
        tracing::debug!(path = ?store.path(), "using store");
        Self::start(settings, only, Arc::new(store), Arc::new(UreqTransport::new()))
    }

    /// Number of platforms running
    pub fn len(&self) -> usize {
        self.pollers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pollers.is_empty()
    }

    /// Stop polling and wait for in-flight forwards to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.pollers {
            if let Err(e) = handle.await {
                tracing::warn!("poller task failed: {}", e);
            }
        }
        // Pollers dropped their senders, so relay services drain and exit
        for handle in self.relays {
            if let Err(e) = handle.await {
                tracing::warn!("relay service task failed: {}", e);
            }
        }
    }
}

fn select_platforms(settings: &Settings, only: &[String]) -> Result<Vec<PlatformSettings>> {
    if only.is_empty() {
        if settings.platforms.is_empty() {
            bail!("No platforms configured; add [[platforms]] entries to the config file");
        }
        return Ok(settings.platforms.clone());
    }

    only.iter()
        .map(|id| {
            settings
                .platform(id)
                .with_context(|| format!("Unknown platform: {}", id))
        })
        .collect()
}
