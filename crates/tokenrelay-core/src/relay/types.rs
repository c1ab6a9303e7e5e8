use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error taxonomy for one forward attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// No room id configured; no request was made
    #[error("room_id not configured")]
    ConfigurationMissing,

    /// The store could not be read; treated like a missing room id
    #[error("room_id not configured (store unavailable: {0})")]
    StoreUnavailable(String),

    /// The endpoint answered with a non-2xx status
    #[error("HTTP {0}")]
    HttpStatus(u16),

    /// The request never produced a response
    #[error("transport error: {0}")]
    Transport(String),
}

impl RelayError {
    /// Whether the request was attempted (network class errors)
    pub fn is_network(&self) -> bool {
        matches!(self, RelayError::HttpStatus(_) | RelayError::Transport(_))
    }

    /// HTTP status, when the endpoint responded
    pub fn status(&self) -> Option<u16> {
        match self {
            RelayError::HttpStatus(status) => Some(*status),
            _ => None,
        }
    }
}

/// Outcome reported back for each forward
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl ForwardResult {
    pub fn success() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
        }
    }
}

impl From<Result<(), RelayError>> for ForwardResult {
    fn from(result: Result<(), RelayError>) -> Self {
        match result {
            Ok(()) => Self::success(),
            Err(e) => Self::failure(e.to_string()),
        }
    }
}

/// Wire shape of the ingest payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadShape {
    /// `{ room_id, platforms: { <platform>: <value> } }`
    #[default]
    Aggregated,
    /// `{ room_id, platform, tokens_count, tips_count, viewers_count, timestamp }`
    Flat,
}

impl PayloadShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadShape::Aggregated => "aggregated",
            PayloadShape::Flat => "flat",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(RelayError::ConfigurationMissing.to_string(), "room_id not configured");
        assert!(RelayError::StoreUnavailable("denied".into())
            .to_string()
            .contains("not configured"));
        assert_eq!(RelayError::HttpStatus(500).to_string(), "HTTP 500");
        assert!(RelayError::HttpStatus(502).is_network());
        assert!(!RelayError::ConfigurationMissing.is_network());
        assert_eq!(RelayError::HttpStatus(404).status(), Some(404));
    }

    #[test]
    fn test_forward_result_serialization() {
        let ok = serde_json::to_string(&ForwardResult::success()).unwrap();
        assert_eq!(ok, r#"{"ok":true}"#);

        let failed: ForwardResult = Err(RelayError::HttpStatus(503)).into();
        let json = serde_json::to_string(&failed).unwrap();
        assert_eq!(json, r#"{"ok":false,"error":"HTTP 503"}"#);
    }

    #[test]
    fn test_payload_shape_names() {
        let shape: PayloadShape = serde_json::from_str(r#""flat""#).unwrap();
        assert_eq!(shape, PayloadShape::Flat);
        assert_eq!(PayloadShape::default().as_str(), "aggregated");
    }
}
