use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use hg_core::EventTime;

const NANOS_PER_MILLI: i64 = 1_000_000;

/// Event time of a JSON field: an RFC 3339 string or integer epoch
/// milliseconds.
pub fn parse_event_time(value: &Value) -> Result<EventTime> {
    match value {
        Value::String(s) => {
            let dt = DateTime::parse_from_rfc3339(s)
                .map_err(|e| anyhow!("invalid RFC 3339 timestamp {s:?}: {e}"))?;
            dt.timestamp_nanos_opt()
                .ok_or_else(|| anyhow!("timestamp {s:?} out of range"))
        }
        Value::Number(n) => {
            let millis = n
                .as_i64()
                .ok_or_else(|| anyhow!("epoch milliseconds must be an integer, got {n}"))?;
            millis
                .checked_mul(NANOS_PER_MILLI)
                .ok_or_else(|| anyhow!("epoch milliseconds {millis} out of range"))
        }
        other => bail!("unsupported timestamp value {other}"),
    }
}

/// RFC 3339 rendering of an event time, UTC.
pub fn format_event_time(ts: EventTime) -> String {
    DateTime::<Utc>::from_timestamp_nanos(ts).to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Grouping key of a JSON field. Strings are taken verbatim, numbers and
/// booleans in their JSON spelling.
pub fn key_of(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => bail!("unsupported key value {other}"),
    }
}

/// Composite key and event time of one JSON-lines record: one key part per
/// entry of `key_fields`, in that order.
pub fn parse_keyed(
    line: &str,
    key_fields: &[String],
    time_field: &str,
) -> Result<(Vec<String>, EventTime)> {
    if key_fields.is_empty() {
        bail!("at least one key field is required");
    }
    let record: Value = serde_json::from_str(line)?;
    let key = key_fields
        .iter()
        .map(|field| {
            record
                .get(field)
                .ok_or_else(|| anyhow!("missing key field {field:?}"))
                .and_then(key_of)
        })
        .collect::<Result<Vec<_>>>()?;
    let ts = record
        .get(time_field)
        .ok_or_else(|| anyhow!("missing time field {time_field:?}"))?;
    Ok((key, parse_event_time(ts)?))
}
