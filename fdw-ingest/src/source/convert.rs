//! Field conversions for CSV text
//!
//! Empty fields are NULL. A non-empty field that does not parse is reported
//! as `Unparseable` so the caller can mark the record malformed.

use chrono::NaiveDate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unparseable;

pub fn optional_text(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn optional_float(value: &str) -> Result<Option<f64>, Unparseable> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    match value.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() => Ok(Some(parsed)),
        _ => Err(Unparseable),
    }
}

/// Integers may arrive as `"123.0"` from spreadsheet exports
pub fn optional_int(value: &str) -> Result<Option<i64>, Unparseable> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    if let Ok(parsed) = value.parse::<i64>() {
        return Ok(Some(parsed));
    }
    match value.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() && parsed.fract() == 0.0 && parsed.abs() < i64::MAX as f64 => {
            Ok(Some(parsed as i64))
        }
        _ => Err(Unparseable),
    }
}

/// `0/1` or `0.0/1.0`; anything else reads as false
pub fn flag(value: &str) -> bool {
    value
        .trim()
        .parse::<f64>()
        .map(|parsed| parsed.trunc() != 0.0 && parsed.is_finite())
        .unwrap_or(false)
}

/// Normalize a flight date to `YYYY-MM-DD`.
///
/// Accepts ISO dates and the `M/D/YYYY [time]` form of older BTS downloads.
/// Anything else is returned trimmed and unchanged so it fails the date
/// dimension lookup with its original text.
pub fn normalize_date(value: &str) -> String {
    let value = value.trim();
    parse_date(value)
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| value.to_string())
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    let date_part = value.split_whitespace().next()?;
    NaiveDate::parse_from_str(date_part, "%m/%d/%Y").ok()
}
