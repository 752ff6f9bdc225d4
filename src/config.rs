//! Minimal runtime configuration helpers.
//! Everything comes from the environment (optionally seeded from a `.env` file).

use std::time::Duration;

pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 540;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub username: String,
    pub password: String,
    /// Location names to poll. Empty means every location on the account.
    pub networks: Vec<String>,
    /// Polling cadence for all sensors.
    pub scan_interval: Duration,
    pub http_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let required = |key: &str| match get(key) {
            Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
            _ => Err(format!("Missing {}", key)),
        };
        let username = required("NEVIWEB_USERNAME")?;
        let password = required("NEVIWEB_PASSWORD")?;

        let networks = ["NEVIWEB_NETWORK", "NEVIWEB_NETWORK2"]
            .iter()
            .filter_map(|k| get(*k))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();

        let secs = |key: &str, default: u64| -> Result<Duration, String> {
            match get(key) {
                Some(v) if !v.trim().is_empty() => v
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|n| *n > 0)
                    .map(Duration::from_secs)
                    .ok_or_else(|| format!("{} must be a positive number of seconds", key)),
                _ => Ok(Duration::from_secs(default)),
            }
        };

        Ok(Config {
            username,
            password,
            networks,
            scan_interval: secs("NEVIWEB_SCAN_INTERVAL_SECS", DEFAULT_SCAN_INTERVAL_SECS)?,
            http_timeout: secs("NEVIWEB_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?,
        })
    }
}
