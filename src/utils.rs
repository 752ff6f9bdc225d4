use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};

/// Parse an ISO 8601 timestamp as reported by Neviweb (e.g. `2026-02-09T02:00:00.000Z`).
///
/// Fractional seconds are dropped before parsing. A trailing `Z` and explicit
/// offsets are honoured; a timestamp with no offset is read as UTC.
pub fn parse_iso_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let trimmed = raw.trim();
    let normalized = strip_fractional_seconds(trimmed);
    let normalized = match normalized.strip_suffix('Z') {
        Some(rest) => format!("{}+00:00", rest),
        None => normalized,
    };

    if let Ok(ts) = DateTime::parse_from_rfc3339(&normalized) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid timestamp {:?}: {}", raw, e))
}

fn strip_fractional_seconds(s: &str) -> String {
    let Some(dot) = s.find('.') else {
        return s.to_string();
    };
    let fraction = &s[dot + 1..];
    let digits = fraction.chars().take_while(|c| c.is_ascii_digit()).count();
    format!("{}{}", &s[..dot], &fraction[digits..])
}

/// Start of the UTC day containing `ts`.
pub fn utc_midnight(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Round half away from zero to `decimals` places.
///
/// Energy totals are whole Wh / 1000, already exact at 3 places, so ties
/// never arise and half-to-even would give the same result.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Lowercase, ASCII-alphanumeric slug joined by underscores ("Bathroom Floor" -> "bathroom_floor").
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    if out.is_empty() { "unnamed".to_string() } else { out }
}
