use std::time::Duration;

/// Parse a human duration such as `2s`, `1500ms` or `30min`.
///
/// A bare integer is read as milliseconds, matching the `*_ms` fields of the
/// config file.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let trimmed = raw.trim();
    if let Ok(ms) = trimmed.parse::<u64>() {
        return Ok(Duration::from_millis(ms));
    }
    humantime::parse_duration(trimmed).map_err(|err| err.to_string())
}

/// Like [`parse_duration`], but `off`, `none` and `unlimited` disable the
/// limit.
pub fn parse_optional_duration(raw: &str) -> Result<Option<Duration>, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "off" | "none" | "unlimited" => Ok(None),
        _ => parse_duration(raw).map(Some),
    }
}

pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
