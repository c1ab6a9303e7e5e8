use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use super::PayloadShape;
use crate::balance::Reading;

/// Largest integer a JSON number carries exactly
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Build the ingest body for one reading
pub fn build_payload(
    shape: PayloadShape,
    room_id: &str,
    reading: &Reading,
    sent_at: DateTime<Utc>,
) -> Value {
    let value = json_number(reading.value);
    match shape {
        PayloadShape::Aggregated => {
            let mut platforms = Map::new();
            platforms.insert(reading.platform.clone(), value);
            json!({
                "room_id": room_id,
                "platforms": platforms,
            })
        }
        PayloadShape::Flat => json!({
            "room_id": room_id,
            "platform": reading.platform,
            "tokens_count": value,
            "tips_count": 0,
            "viewers_count": 0,
            "timestamp": sent_at.timestamp(),
        }),
    }
}

/// Whole balances go out as integers (`42`, not `42.0`)
fn json_number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() <= MAX_SAFE_INTEGER {
        json!(value as i64)
    } else {
        json!(value)
    }
}
