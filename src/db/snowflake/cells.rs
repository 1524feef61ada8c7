//! Conversion of raw result cells into JSON values.
//!
//! The session API returns every cell as a string (or null); the column's
//! `rowtype` says how to read it. Values that cannot be read as their declared
//! type are passed through as strings.

use super::wire::RowType;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, SecondsFormat};
use serde_json::{Number, Value};

const NANOS_PER_SECOND: u32 = 1_000_000_000;

/// Days from 0001-01-01 (CE) to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;

/// Timestamp offsets are sent as minutes shifted by this amount to keep them positive.
const TZ_OFFSET_BIAS_MINUTES: i32 = 1440;

/// Converts one raw cell according to its column type.
pub fn convert_cell(raw: Option<&str>, column: &RowType) -> Value {
    let Some(raw) = raw else {
        return Value::Null;
    };

    let converted = match column.data_type.to_ascii_lowercase().as_str() {
        "fixed" => convert_fixed(raw, column.scale.unwrap_or(0)),
        "real" => convert_float(raw),
        "boolean" => convert_boolean(raw),
        "date" => convert_date(raw),
        "time" => convert_time(raw),
        "timestamp_ntz" | "timestamp_ltz" => convert_timestamp(raw),
        "timestamp_tz" => convert_timestamp_tz(raw),
        "variant" | "object" | "array" => serde_json::from_str(raw).ok(),
        _ => None,
    };

    converted.unwrap_or_else(|| Value::String(raw.to_string()))
}

fn convert_fixed(raw: &str, scale: i64) -> Option<Value> {
    if scale == 0 {
        if let Ok(int) = raw.parse::<i64>() {
            return Some(Value::Number(int.into()));
        }
    }
    convert_float(raw)
}

fn convert_float(raw: &str) -> Option<Value> {
    let float = raw.parse::<f64>().ok()?;
    Number::from_f64(float).map(Value::Number)
}

fn convert_boolean(raw: &str) -> Option<Value> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" => Some(Value::Bool(true)),
        "0" | "false" => Some(Value::Bool(false)),
        _ => None,
    }
}

fn convert_date(raw: &str) -> Option<Value> {
    let days = raw.parse::<i64>().ok()?;
    let days_from_ce = i32::try_from(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?).ok()?;
    let date = NaiveDate::from_num_days_from_ce_opt(days_from_ce)?;
    Some(Value::String(date.format("%Y-%m-%d").to_string()))
}

fn convert_time(raw: &str) -> Option<Value> {
    let (secs, nanos) = parse_epoch(raw)?;
    let secs = u32::try_from(secs).ok()?;
    let time = NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)?;
    Some(Value::String(time.format("%H:%M:%S%.f").to_string()))
}

fn convert_timestamp(raw: &str) -> Option<Value> {
    let (secs, nanos) = parse_epoch(raw)?;
    let timestamp = DateTime::from_timestamp(secs, nanos)?;
    Some(Value::String(
        timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
    ))
}

fn convert_timestamp_tz(raw: &str) -> Option<Value> {
    let (epoch, offset) = raw.split_once(' ')?;
    let (secs, nanos) = parse_epoch(epoch)?;
    let offset_minutes = offset
        .trim()
        .parse::<i32>()
        .ok()?
        .checked_sub(TZ_OFFSET_BIAS_MINUTES)?;
    let offset = FixedOffset::east_opt(offset_minutes.checked_mul(60)?)?;
    let timestamp = DateTime::from_timestamp(secs, nanos)?.with_timezone(&offset);
    Some(Value::String(
        timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, false),
    ))
}

/// Parses `seconds[.fraction]` into whole seconds and a non-negative nanosecond part.
fn parse_epoch(raw: &str) -> Option<(i64, u32)> {
    let raw = raw.trim();
    let (whole, fraction) = raw.split_once('.').unwrap_or((raw, ""));
    let secs = whole.parse::<i64>().ok()?;

    if !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let digits: String = fraction.chars().chain("000000000".chars()).take(9).collect();
    let nanos = digits.parse::<u32>().ok()?;

    if raw.starts_with('-') && nanos > 0 {
        Some((secs.checked_sub(1)?, NANOS_PER_SECOND - nanos))
    } else {
        Some((secs, nanos))
    }
}
