use once_cell::sync::Lazy;
use regex::Regex;

/// Everything that is not part of a plain decimal number
static NON_NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^0-9.]").expect("Invalid NON_NUMERIC regex"));

/// Longest leading decimal literal (`12`, `12.`, `12.5`, `.5`)
static LEADING_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d+\.?\d*|\.\d+)").expect("Invalid LEADING_NUMBER regex"));

/// Parse a token balance out of free-form element text.
///
/// Every character other than an ASCII digit or `.` is dropped first, so
/// thousands separators collapse (`"1,234.5"` becomes `1234.5`). The
/// longest leading decimal literal of what remains is parsed; trailing
/// garbage such as a second decimal point is ignored (`"12.5.3"` is
/// `12.5`). Returns `None` when nothing numeric remains or the value is
/// not finite.
pub fn parse_tokens(text: &str) -> Option<f64> {
    if text.trim().is_empty() {
        return None;
    }

    let clean = NON_NUMERIC.replace_all(text, "");
    let literal = LEADING_NUMBER.find(&clean)?;
    let value: f64 = literal.as_str().parse().ok()?;

    value.is_finite().then_some(value)
}
