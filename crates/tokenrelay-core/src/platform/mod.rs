//! Per-platform reader/relay parameters

use crate::balance::{parse_selectors, Selector, SelectorError};
use crate::relay::PayloadShape;

/// Everything that differs between platforms
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformDescriptor {
    /// Identifier stamped on readings and payloads
    pub id: String,
    /// Candidate balance selectors, highest priority first
    pub selectors: Vec<Selector>,
    /// Ingest endpoint receiving this platform's readings
    pub endpoint: String,
    /// Payload wire shape expected by the endpoint
    pub shape: PayloadShape,
}

impl PlatformDescriptor {
    pub fn new<S: AsRef<str>>(
        id: impl Into<String>,
        selectors: &[S],
        endpoint: impl Into<String>,
        shape: PayloadShape,
    ) -> Result<Self, SelectorError> {
        Ok(Self {
            id: id.into(),
            selectors: parse_selectors(selectors)?,
            endpoint: endpoint.into(),
            shape,
        })
    }
}

struct Builtin {
    id: &'static str,
    selectors: &'static [&'static str],
    endpoint: &'static str,
    shape: PayloadShape,
}

const BUILTINS: &[Builtin] = &[
    Builtin {
        id: "chaturbate",
        selectors: &[
            ".token-balance",
            ".js-token-balance",
            r#"[data-role="token-balance"]"#,
        ],
        endpoint: "http://localhost:8080/api/tracking/telemetry",
        shape: PayloadShape::Aggregated,
    },
    Builtin {
        id: "camsoda",
        selectors: &[
            ".token-balance",
            ".credits-balance",
            r#"[data-role="token-balance"]"#,
        ],
        endpoint: "http://localhost:3000/api/tracking/telemetry",
        shape: PayloadShape::Flat,
    },
];

/// Identifiers of the built-in platforms
pub fn builtin_ids() -> impl Iterator<Item = &'static str> {
    BUILTINS.iter().map(|b| b.id)
}

/// Built-in descriptor for a known platform
pub fn builtin(id: &str) -> Option<PlatformDescriptor> {
    let b = BUILTINS.iter().find(|b| b.id.eq_ignore_ascii_case(id))?;
    // Built-in selectors are known to parse
    PlatformDescriptor::new(b.id, b.selectors, b.endpoint, b.shape).ok()
}
