mod markup;
mod parser;
mod selector;

pub use markup::Document;
pub use parser::parse_tokens;
pub use selector::{parse_selectors, AttrMatch, Selector, SelectorError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::page::PageSource;

/// One sampled balance value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Platform identifier (e.g. "chaturbate")
    pub platform: String,
    /// Parsed balance, finite and non-negative
    pub value: f64,
    /// When the balance was read
    pub captured_at: DateTime<Utc>,
}

impl Reading {
    /// Create a reading stamped with the current time
    pub fn now(platform: impl Into<String>, value: f64) -> Self {
        Self {
            platform: platform.into(),
            value,
            captured_at: Utc::now(),
        }
    }
}

/// Reads a platform's balance from its page
pub struct BalanceReader {
    platform: String,
    selectors: Vec<Selector>,
    source: Arc<dyn PageSource>,
}

impl BalanceReader {
    /// Create a reader evaluating `selectors` in priority order
    pub fn new(
        platform: impl Into<String>,
        selectors: Vec<Selector>,
        source: Arc<dyn PageSource>,
    ) -> Self {
        Self {
            platform: platform.into(),
            selectors,
            source,
        }
    }

    /// Platform identifier stamped on readings
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Capture the page and read the balance.
    ///
    /// Returns `None` when the page could not be captured or no selector
    /// yields a number; both are retried on the next tick.
    pub fn read(&self) -> Option<Reading> {
        let markup = match self.source.capture() {
            Ok(markup) => markup,
            Err(e) => {
                tracing::debug!(
                    platform = %self.platform,
                    source = %self.source.describe(),
                    "page capture failed: {:#}",
                    e
                );
                return None;
            }
        };

        let value = self.extract(&markup)?;
        Some(Reading::now(self.platform.clone(), value))
    }

    /// Find the balance in already captured markup
    pub fn extract(&self, markup: &str) -> Option<f64> {
        let doc = Document::parse(markup);

        for selector in &self.selectors {
            // Only the first element per selector counts, as with querySelector
            let Some(text) = doc.first_text(selector) else {
                continue;
            };
            if let Some(value) = parse_tokens(&text) {
                tracing::trace!(platform = %self.platform, %selector, value, "balance matched");
                return Some(value);
            }
        }

        tracing::debug!(platform = %self.platform, "no balance found on page");
        None
    }
}
