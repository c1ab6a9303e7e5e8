use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use tokenrelay_core::monitor::DEFAULT_POLL_INTERVAL;
use tokenrelay_core::platform::{self, PlatformDescriptor};
use tokenrelay_core::relay::{PayloadShape, DEFAULT_CHANNEL_CAPACITY};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Token balance telemetry relay")]
pub struct Config {
    /// Enable debug mode
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the room id store file
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Polling interval in milliseconds
    #[arg(short = 'i', long, global = true)]
    pub poll_interval: Option<u64>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Poll platform pages and relay balances until interrupted
    Run {
        /// Only run these platforms (default: all configured)
        #[arg(short, long = "platform")]
        platforms: Vec<String>,
    },
    /// Read one platform's balance once and print it
    Probe {
        /// Platform identifier
        platform: String,
    },
    /// Inspect or change the operator settings store
    #[command(subcommand)]
    Store(StoreCommand),
}

/// Store subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum StoreCommand {
    /// Print a stored value
    Get { key: String },
    /// Set a stored value (surrounding whitespace is trimmed)
    Set { key: String, value: String },
    /// Show whether a room id is configured
    Status,
}

impl Config {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Application settings (from config file)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Polling interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Readings buffered between a reader and its relay
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Room id store file (default: `<config_dir>/tokenrelay/store.json`)
    #[serde(default)]
    pub store_path: Option<PathBuf>,

    /// Defaults for platforms that do not set their own relay target
    #[serde(default)]
    pub relay: RelaySettings,

    /// Platforms to poll
    #[serde(default)]
    pub platforms: Vec<PlatformSettings>,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

/// Relay target used when a platform has neither its own nor a built-in one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    /// Ingest endpoint URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Payload shape
    #[serde(default)]
    pub payload: PayloadShape,
}

fn default_endpoint() -> String {
    "http://localhost:8080/api/tracking/telemetry".to_string()
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            payload: PayloadShape::default(),
        }
    }
}

/// Where a platform page is captured from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSettings {
    /// Page saved to a local file
    File { path: PathBuf },
    /// Page fetched over HTTP
    Http { url: String },
}

/// One platform to poll
///
/// Unset fields fall back to the built-in descriptor for `id`, then to
/// the `[relay]` defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformSettings {
    /// Platform identifier
    pub id: String,

    /// Page source
    #[serde(default)]
    pub source: Option<SourceSettings>,

    /// Balance selectors, highest priority first
    #[serde(default)]
    pub selectors: Option<Vec<String>>,

    /// Ingest endpoint override
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Payload shape override
    #[serde(default)]
    pub payload: Option<PayloadShape>,
}

impl PlatformSettings {
    /// Resolve into a full descriptor
    pub fn descriptor(&self, relay: &RelaySettings) -> Result<PlatformDescriptor> {
        let builtin = platform::builtin(&self.id);

        let selectors: Vec<String> = match (&self.selectors, &builtin) {
            (Some(own), _) => own.clone(),
            (None, Some(b)) => b.selectors.iter().map(|s| s.as_str().to_string()).collect(),
            (None, None) => bail!(
                "Platform '{}' is not built in and has no selectors configured",
                self.id
            ),
        };
        if selectors.is_empty() {
            bail!("Platform '{}' has an empty selector list", self.id);
        }

        let endpoint = self
            .endpoint
            .clone()
            .or_else(|| builtin.as_ref().map(|b| b.endpoint.clone()))
            .unwrap_or_else(|| relay.endpoint.clone());
        let shape = self
            .payload
            .or_else(|| builtin.as_ref().map(|b| b.shape))
            .unwrap_or(relay.payload);

        PlatformDescriptor::new(self.id.as_str(), selectors.as_slice(), endpoint, shape)
            .with_context(|| format!("Invalid selector for platform '{}'", self.id))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            channel_capacity: default_channel_capacity(),
            store_path: None,
            relay: RelaySettings::default(),
            platforms: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from config file or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        // An explicit path must exist
        if let Some(p) = path {
            let content = std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read config file: {:?}", p))?;
            return toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", p));
        }

        let default_paths = [
            dirs::config_dir().map(|p| p.join("tokenrelay/config.toml")),
            dirs::home_dir().map(|p| p.join(".config/tokenrelay/config.toml")),
            dirs::home_dir().map(|p| p.join(".tokenrelay.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {:?}", path))?;
                return toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {:?}", path));
            }
        }

        Ok(Self::default())
    }

    /// Merge CLI config into settings (CLI takes precedence)
    pub fn merge_cli(&mut self, cli: &Config) {
        if let Some(poll_interval) = cli.poll_interval {
            self.poll_interval_ms = poll_interval;
        }
        if let Some(ref store) = cli.store {
            self.store_path = Some(store.clone());
        }
    }

    /// Validate and normalize settings values
    ///
    /// Keeps the poll interval and channel capacity above sane minimums.
    pub fn validate(&mut self) {
        const MIN_POLL_INTERVAL: u64 = 100;

        if self.poll_interval_ms < MIN_POLL_INTERVAL {
            self.poll_interval_ms = MIN_POLL_INTERVAL;
        }
        if self.channel_capacity == 0 {
            self.channel_capacity = 1;
        }
    }

    /// Find a platform's settings; built-in platforms work without an entry
    pub fn platform(&self, id: &str) -> Option<PlatformSettings> {
        self.platforms
            .iter()
            .find(|p| p.id.eq_ignore_ascii_case(id))
            .cloned()
            .or_else(|| {
                platform::builtin(id).map(|b| PlatformSettings {
                    id: b.id,
                    source: None,
                    selectors: None,
                    endpoint: None,
                    payload: None,
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.poll_interval_ms, 5000);
        assert_eq!(settings.channel_capacity, 32);
        assert_eq!(settings.relay.payload, PayloadShape::Aggregated);
        assert!(settings.platforms.is_empty());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            poll_interval_ms = 2000

            [relay]
            endpoint = "http://ingest.local/telemetry"
            payload = "flat"

            [[platforms]]
            id = "chaturbate"
            source = { kind = "file", path = "/tmp/chaturbate.html" }

            [[platforms]]
            id = "stripchat"
            selectors = [".balance-value", "[data-test=\"balance\"]"]
            source = { kind = "http", url = "http://127.0.0.1:9222/page" }
        "#;

        let settings: Settings = toml::from_str(toml).expect("Should parse TOML");
        assert_eq!(settings.poll_interval_ms, 2000);
        assert_eq!(settings.relay.payload, PayloadShape::Flat);
        assert_eq!(settings.platforms.len(), 2);
        assert_eq!(
            settings.platforms[0].source,
            Some(SourceSettings::File {
                path: PathBuf::from("/tmp/chaturbate.html")
            })
        );
        assert_eq!(
            settings.platforms[1].source,
            Some(SourceSettings::Http {
                url: "http://127.0.0.1:9222/page".to_string()
            })
        );
    }

    #[test]
    fn test_builtin_descriptor_defaults() {
        let relay = RelaySettings::default();
        let settings = PlatformSettings {
            id: "camsoda".to_string(),
            source: None,
            selectors: None,
            endpoint: None,
            payload: None,
        };
        let descriptor = settings.descriptor(&relay).unwrap();
        assert_eq!(descriptor.shape, PayloadShape::Flat);
        assert_eq!(descriptor.endpoint, "http://localhost:3000/api/tracking/telemetry");
        assert_eq!(descriptor.selectors[1].as_str(), ".credits-balance");
    }

    #[test]
    fn test_overrides_win_over_builtin() {
        let relay = RelaySettings::default();
        let settings = PlatformSettings {
            id: "chaturbate".to_string(),
            source: None,
            selectors: Some(vec!["#wallet".to_string()]),
            endpoint: Some("http://other/ingest".to_string()),
            payload: Some(PayloadShape::Flat),
        };
        let descriptor = settings.descriptor(&relay).unwrap();
        assert_eq!(descriptor.selectors.len(), 1);
        assert_eq!(descriptor.endpoint, "http://other/ingest");
        assert_eq!(descriptor.shape, PayloadShape::Flat);
    }

    #[test]
    fn test_custom_platform_uses_relay_defaults() {
        let relay = RelaySettings {
            endpoint: "http://ingest.local/t".to_string(),
            payload: PayloadShape::Flat,
        };
        let settings = PlatformSettings {
            id: "stripchat".to_string(),
            source: None,
            selectors: Some(vec![".balance".to_string()]),
            endpoint: None,
            payload: None,
        };
        let descriptor = settings.descriptor(&relay).unwrap();
        assert_eq!(descriptor.endpoint, "http://ingest.local/t");
        assert_eq!(descriptor.shape, PayloadShape::Flat);
    }

    #[test]
    fn test_custom_platform_needs_selectors() {
        let settings = PlatformSettings {
            id: "stripchat".to_string(),
            source: None,
            selectors: None,
            endpoint: None,
            payload: None,
        };
        assert!(settings.descriptor(&RelaySettings::default()).is_err());
    }

    #[test]
    fn test_invalid_selector_is_reported() {
        let settings = PlatformSettings {
            id: "stripchat".to_string(),
            source: None,
            selectors: Some(vec!["div > span".to_string()]),
            endpoint: None,
            payload: None,
        };
        let err = settings.descriptor(&RelaySettings::default()).unwrap_err();
        assert!(format!("{:#}", err).contains("stripchat"));
    }

    #[test]
    fn test_validate_clamps() {
        let mut settings = Settings {
            poll_interval_ms: 0,
            channel_capacity: 0,
            ..Settings::default()
        };
        settings.validate();
        assert_eq!(settings.poll_interval_ms, 100);
        assert_eq!(settings.channel_capacity, 1);
    }

    #[test]
    fn test_merge_cli() {
        let cli = Config::parse_from([
            "tokenrelay",
            "-i",
            "750",
            "--store",
            "/tmp/store.json",
            "run",
            "--platform",
            "camsoda",
        ]);
        let mut settings = Settings::default();
        settings.merge_cli(&cli);
        assert_eq!(settings.poll_interval_ms, 750);
        assert_eq!(settings.store_path, Some(PathBuf::from("/tmp/store.json")));
        match cli.command {
            Command::Run { platforms } => assert_eq!(platforms, vec!["camsoda".to_string()]),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_platform_lookup_falls_back_to_builtin() {
        let settings = Settings::default();
        assert_eq!(settings.platform("chaturbate").unwrap().id, "chaturbate");
        assert!(settings.platform("unknown").is_none());
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "poll_interval_ms = 1234\n").unwrap();
        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.poll_interval_ms, 1234);

        let missing = dir.path().join("missing.toml");
        assert!(Settings::load(Some(&missing)).is_err());
    }
}
