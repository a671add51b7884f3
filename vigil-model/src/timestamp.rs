//! Lenient timestamp parsing for service-provided times.
//!
//! The service emits naive ISO-8601 strings (no offset) in UTC; RFC 3339
//! values are accepted as well.

use chrono::{DateTime, NaiveDateTime, Utc};

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

pub fn parse_service_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    let parsed = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc());

    if parsed.is_none() {
        tracing::debug!(value = raw, "dropping unparsable service timestamp");
    }
    parsed
}
