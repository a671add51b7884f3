//! Tolerant field decoders for scan snapshots.
//!
//! The service is not strict about JSON types: counters show up as floats or
//! strings, lists as `null`, and individual findings with wrong-typed fields.
//! None of that may make a whole snapshot undecodable, so these helpers fall
//! back to a default and leave judging the content to the report aggregator.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::vulnerability::RawVulnerability;

/// `null` decodes as the field's default.
pub fn null_as_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

/// Signed counter sent as an integer, a float, a numeric string or `null`.
/// Anything else reads as zero.
pub fn integer<'de, D>(de: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(to_integer(&Value::deserialize(de)?).unwrap_or(0))
}

/// Crawl depth echoed back by the service; dropped when it does not fit.
pub fn depth<'de, D>(de: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(to_integer(&Value::deserialize(de)?).and_then(|n| u8::try_from(n).ok()))
}

/// Optional string; non-string values are dropped.
pub fn text<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(de)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

/// Severity summary map. Entries whose count is not numeric are skipped.
pub fn summary<'de, D>(de: D) -> Result<Option<BTreeMap<String, i64>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Object(map) = Value::deserialize(de)? else {
        return Ok(None);
    };
    Ok(Some(
        map.iter()
            .filter_map(|(key, value)| to_integer(value).map(|n| (key.clone(), n)))
            .collect(),
    ))
}

/// Findings list decoded record by record.
///
/// A record that does not decode is kept as an undecodable placeholder so
/// its position is still reported. A non-list value becomes one such record.
pub fn findings<'de, D>(de: D) -> Result<Vec<RawVulnerability>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(de)? {
        Value::Null => Vec::new(),
        Value::Array(records) => records
            .into_iter()
            .map(RawVulnerability::from_value)
            .collect(),
        other => vec![RawVulnerability::undecodable(format!(
            "expected a list of findings, got {}",
            kind(&other)
        ))],
    })
}

fn to_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|_| i64::MAX))
            .or_else(|| n.as_f64().and_then(round)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(round))
        }
        _ => None,
    }
}

fn round(value: f64) -> Option<i64> {
    value.is_finite().then(|| value.round() as i64)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counters_accept_floats_and_strings() {
        assert_eq!(to_integer(&json!(42.6)), Some(43));
        assert_eq!(to_integer(&json!("17")), Some(17));
        assert_eq!(to_integer(&json!(" 3.2 ")), Some(3));
        assert_eq!(to_integer(&json!(-4)), Some(-4));
        assert_eq!(to_integer(&json!(true)), None);
        assert_eq!(to_integer(&json!("lots")), None);
    }

    #[test]
    fn huge_unsigned_counters_saturate() {
        assert_eq!(to_integer(&json!(u64::MAX)), Some(i64::MAX));
    }
}
