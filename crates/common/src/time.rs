//! Time handling: strict upstream timestamp parsing and the single
//! humanization point. Everything internal is UTC.

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;

/// Fallback display zone when the configured one does not parse.
pub const DEFAULT_DISPLAY_TZ: Tz = chrono_tz::Asia::Shanghai;

/// Parse an upstream timestamp. Accepts RFC3339 with an offset or the
/// `...Z` form. Anything else is rejected so the caller can drop the value
/// rather than substituting "now".
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // Some endpoints emit second-precision Z timestamps that chrono's
    // rfc3339 parser already covers, but be permissive about a bare
    // "YYYY-MM-DDTHH:MM:SSZ" without fractional seconds.
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%SZ")
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn display_zone(name: &str) -> Tz {
    name.parse().unwrap_or(DEFAULT_DISPLAY_TZ)
}

/// Humanize a UTC instant in the given display zone.
pub fn format_display(dt: DateTime<Utc>, tz: Tz) -> String {
    dt.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn format_display_date(dt: DateTime<Utc>, tz: Tz) -> String {
    dt.with_timezone(&tz).format("%Y-%m-%d").to_string()
}
