use anyhow::Result;
use serde_json::Value;

/// Outbound HTTP used by the relay
///
/// Implementations are blocking; the relay runs them off the async workers.
pub trait Transport: Send + Sync {
    /// POST `body` as JSON to `url` and return the response status.
    ///
    /// Non-2xx statuses are returned as `Ok`; only failures to get any
    /// response at all are errors.
    fn post_json(&self, url: &str, body: &Value) -> Result<u16>;
}

/// Transport backed by a ureq agent
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        // Status codes are mapped by the relay, not surfaced as ureq errors
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn post_json(&self, url: &str, body: &Value) -> Result<u16> {
        let response = self
            .agent
            .post(url)
            .header("Content-Type", "application/json")
            .send_json(body)?;
        Ok(response.status().as_u16())
    }
}
