//! Poll-interval duration parsing (`"30s"`, `"5m"`, `"2h"`, bare `"300"`).

use once_cell::sync::Lazy;
use regex::Regex;

pub const DEFAULT_POLL_INTERVAL_SECONDS: f64 = 300.0;

static POLL_INTERVAL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+)\s*([smhSMH]?)\s*$").expect("pattern is valid"));

/// Parse a duration string into seconds. Accepts an optional trailing
/// `s`/`m`/`h` unit (case-insensitive); a bare number is seconds.
pub fn parse_duration_to_seconds(raw: &str) -> Option<f64> {
    let captures = POLL_INTERVAL_PATTERN.captures(raw)?;
    let amount: f64 = captures.get(1)?.as_str().parse().ok()?;
    let unit = captures.get(2).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
    let seconds = match unit.as_str() {
        "" | "s" => amount,
        "m" => amount * 60.0,
        "h" => amount * 3600.0,
        _ => return None,
    };
    Some(seconds)
}

/// Resolve the effective poll interval for a chain: its own `poll_interval`
/// if set and valid, else the global default, else the hardcoded fallback —
/// logging a warning whenever a configured value can't be parsed.
pub fn determine_poll_interval_seconds(per_chain: Option<&str>, default_interval: &str) -> f64 {
    if let Some(raw) = per_chain {
        match parse_duration_to_seconds(raw) {
            Some(seconds) => return seconds,
            None => {
                tracing::warn!(raw, "invalid per-chain poll_interval, falling back to default");
            }
        }
    }

    match parse_duration_to_seconds(default_interval) {
        Some(seconds) => seconds,
        None => {
            tracing::warn!(
                raw = default_interval,
                "invalid POLL_DEFAULT_INTERVAL, falling back to hardcoded default"
            );
            DEFAULT_POLL_INTERVAL_SECONDS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_seconds() {
        assert_eq!(parse_duration_to_seconds("300"), Some(300.0));
    }

    #[test]
    fn parses_minutes_and_hours() {
        assert_eq!(parse_duration_to_seconds("5m"), Some(300.0));
        assert_eq!(parse_duration_to_seconds("2h"), Some(7200.0));
        assert_eq!(parse_duration_to_seconds("2H"), Some(7200.0));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_duration_to_seconds("abc"), None);
        assert_eq!(parse_duration_to_seconds("5x"), None);
    }

    #[test]
    fn falls_back_through_the_chain() {
        assert_eq!(determine_poll_interval_seconds(Some("bad"), "10m"), 600.0);
        assert_eq!(determine_poll_interval_seconds(None, "bad"), DEFAULT_POLL_INTERVAL_SECONDS);
        assert_eq!(determine_poll_interval_seconds(Some("30s"), "10m"), 30.0);
    }
}
