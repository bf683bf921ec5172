use std::time::Duration;

/// Expiry scheduler tick (defaults, can be overridden via env vars)
pub const DEFAULT_EXPIRY_CHECK_SECONDS: u64 = 30;

/// Upper bound on a single room gateway call
pub const DEFAULT_GATEWAY_TIMEOUT_SECONDS: u64 = 10;

/// Issuer recorded on bans adopted from a room's own outcast list
pub const IMPORTED_ISSUER: &str = "imported";

/// Supported tempban units, finest first
const DURATION_UNITS: &[(char, u64)] = &[
    ('m', 60),
    ('h', 60 * 60),
    ('d', 24 * 60 * 60),
    ('w', 7 * 24 * 60 * 60),
];

/// Parse a tempban duration such as `10m`, `2h`, `1d` or `1w`
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let last = s.chars().last()?;
    let unit = last.to_ascii_lowercase();
    let value: u64 = s[..s.len() - last.len_utf8()].parse().ok()?;
    if value == 0 {
        return None;
    }
    let (_, secs) = DURATION_UNITS.iter().find(|(u, _)| *u == unit)?;
    value.checked_mul(*secs).map(Duration::from_secs)
}

/// Compact remaining-time display, e.g. `1d 2h 5m`
pub fn human_time(seconds: i64) -> String {
    if seconds <= 0 {
        return "expired".to_string();
    }
    let (m, s) = (seconds / 60, seconds % 60);
    let (h, m) = (m / 60, m % 60);
    let (d, h) = (h / 24, h % 24);

    let mut parts = Vec::new();
    if d > 0 {
        parts.push(format!("{}d", d));
    }
    if h > 0 {
        parts.push(format!("{}h", h));
    }
    if m > 0 {
        parts.push(format!("{}m", m));
    }
    if s > 0 {
        parts.push(format!("{}s", s));
    }
    parts.join(" ")
}
