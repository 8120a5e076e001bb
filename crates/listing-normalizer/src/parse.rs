//! Locale-tolerant parsing of scraped field values.
//! Stateless functions, no knowledge of record layout.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Parse a human-formatted number such as `"USD 1.200.000"`, `"U$S 95,500.50"` or `"65 m²"`.
///
/// The number is the first run of digits, separators and spaces; a leading
/// currency label is skipped and everything from the first character after
/// the run (a unit such as `m²`, `mts2` or `metros2`) is dropped.
/// Separator rules:
/// - both `.` and `,` present: the last one is the decimal separator
/// - one kind, repeated: thousands separator
/// - one kind, once: thousands separator when exactly three digits follow, else decimal
pub fn parse_locale_number(raw: &str) -> Option<f64> {
    let start = raw.find(|c: char| c.is_ascii_digit())?;
    let negative = raw[..start].trim_end().ends_with('-');
    let run: String = raw[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, '.' | ',') || c.is_whitespace())
        .filter(|c| !c.is_whitespace())
        .collect();
    let run = run.trim_end_matches(['.', ',']);

    let value = resolve_separators(run)?.parse::<f64>().ok()?;
    let value = if negative { -value } else { value };
    Some(value).filter(|v| v.is_finite())
}

fn resolve_separators(s: &str) -> Option<String> {
    let dots = s.matches('.').count();
    let commas = s.matches(',').count();

    match (dots, commas) {
        (0, 0) => Some(s.to_string()),
        (_, 0) => Some(single_separator(s, '.')),
        (0, _) => Some(single_separator(s, ',')),
        _ => {
            let last_dot = s.rfind('.')?;
            let last_comma = s.rfind(',')?;
            let (thousands, decimal) = if last_dot > last_comma { (',', '.') } else { ('.', ',') };
            if s.matches(decimal).count() > 1 {
                return None;
            }
            Some(s.replace(thousands, "").replace(decimal, "."))
        }
    }
}

fn single_separator(s: &str, sep: char) -> String {
    if s.matches(sep).count() > 1 {
        return s.replace(sep, "");
    }
    match s.split_once(sep) {
        Some((_, frac)) if frac.len() == 3 => s.replace(sep, ""),
        _ => s.replace(sep, "."),
    }
}

/// Numeric view of a JSON value: numbers as-is, strings through `parse_locale_number`.
pub fn value_as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_locale_number(s),
        _ => None,
    }
}

/// Non-negative whole count (bedrooms, bathrooms).
pub fn value_as_count(value: &Value) -> Option<u32> {
    let n = value_as_number(value)?;
    if n < 0.0 || n.fract() != 0.0 || n > u32::MAX as f64 {
        return None;
    }
    Some(n as u32)
}

/// Parse a listing timestamp: RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]`, `YYYY-MM-DD`,
/// or Unix seconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => Utc.timestamp_opt(n.as_i64()?, 0).single(),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                    return Some(naive.and_utc());
                }
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        }
        _ => None,
    }
}
