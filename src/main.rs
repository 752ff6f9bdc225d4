pub mod models {
    pub mod neviweb;
}

pub mod client;
pub mod config;
pub mod notify;
pub mod quota;
pub mod sensors;
pub mod utils;
pub mod services {
    pub mod discovery;
    pub mod platform;
    pub mod realtime;
}

use crate::client::{NeviwebApi, NeviwebClient};
use crate::config::Config;
use crate::notify::ChannelNotifier;
use crate::quota::{RequestCounter, RequestQuotaSource};
use crate::services::platform::Platform;
use crate::services::{discovery, realtime};
use chrono::Utc;
use log::{error, info};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::rc::Rc;

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    env_file: Option<PathBuf>,
    /// `(entity_id, mode)` for a one-shot `set_neviweb_status` call.
    set_status: Option<(String, String)>,
}

pub fn run(set_status: Option<(String, String)>) -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (scan_interval={}s, http_timeout={}s, networks={})",
        cfg.scan_interval.as_secs(),
        cfg.http_timeout.as_secs(),
        if cfg.networks.is_empty() {
            "all".to_string()
        } else {
            cfg.networks.join(", ")
        }
    );

    // 2) Log in
    let requests = Rc::new(RequestCounter::new(Utc::now()));
    let client = Rc::new(
        NeviwebClient::new(&cfg.username, &cfg.password, cfg.http_timeout, requests.clone())
            .map_err(|e| format!("Neviweb login failed: {}", e))?,
    );

    // 3) Discover thermostats
    let devices = discovery::discover_devices(&client, &cfg.networks)?;
    info!("Discovered {} supported thermostat(s)", devices.len());

    // 4) Build entities; notifications are drained on their own thread
    let (notifier, rx) = ChannelNotifier::new();
    notify::spawn_log_worker(rx).map_err(|e| format!("failed to start notification worker: {}", e))?;
    let api: Rc<dyn NeviwebApi> = client;
    let quota: Rc<dyn RequestQuotaSource> = requests;
    let mut platform = Platform::new(discovery::build_entities(
        api,
        &devices,
        quota,
        Box::new(notifier),
        Utc::now(),
    ));

    // 5) One-shot service call, or the polling loop
    if let Some((entity_id, mode)) = set_status {
        let handled = platform
            .set_neviweb_status(&entity_id, &mode, Utc::now())
            .map_err(|e| format!("set_neviweb_status failed: {}", e))?;
        if handled {
            info!("Set {} to {}", entity_id, mode);
        } else {
            info!("No status entity {}; nothing changed", entity_id);
        }
        return Ok(());
    }

    info!(
        "Starting polling loop: entities={}, interval={}s",
        platform.entities().len(),
        cfg.scan_interval.as_secs()
    );
    realtime::run_loop(&mut platform, cfg.scan_interval)
}

fn parse_args(args: impl IntoIterator<Item = OsString>) -> Result<CliArgs, String> {
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let arg = arg.into_string().map_err(|_| "argument contains invalid UTF-8".to_string())?;
        let (flag, inline) = match arg.split_once('=') {
            Some((f, v)) if f.starts_with("--") => (f.to_string(), Some(v.to_string())),
            _ => (arg, None),
        };
        let mut value = |name: &str| -> Result<String, String> {
            let v = match inline.clone() {
                Some(v) => v,
                None => args
                    .next()
                    .and_then(|v| v.into_string().ok())
                    .ok_or_else(|| format!("`{}` requires a value", name))?,
            };
            if v.is_empty() {
                return Err(format!("`{}` requires a value", name));
            }
            Ok(v)
        };

        match flag.as_str() {
            "--env-file" => {
                if parsed.env_file.is_some() {
                    return Err("`--env-file` provided more than once".to_string());
                }
                parsed.env_file = Some(PathBuf::from(value("--env-file")?));
            }
            "--set-status" => {
                let target = value("--set-status")?;
                let (entity_id, mode) = target
                    .split_once(':')
                    .filter(|(e, m)| !e.is_empty() && !m.is_empty())
                    .ok_or_else(|| "`--set-status` expects ENTITY_ID:MODE".to_string())?;
                parsed.set_status = Some((entity_id.to_string(), mode.to_string()));
            }
            "--" => break,
            other => return Err(format!("unrecognised argument: {}", other)),
        }
    }
    Ok(parsed)
}

/// Load `KEY=VALUE` lines into the process environment. Variables already set win.
fn load_env_file(path: &Path) -> Result<(), String> {
    let content = std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    for (index, line) in content.lines().enumerate() {
        match parse_env_assignment(line) {
            Ok(Some((key, value))) => {
                if std::env::var_os(&key).is_none() {
                    // Updating process-level environment variables is unsafe on some targets.
                    unsafe {
                        std::env::set_var(key, value);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => return Err(format!("{}:{}: {}", path.display(), index + 1, e)),
        }
    }
    Ok(())
}

fn parse_env_assignment(line: &str) -> Result<Option<(String, String)>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let trimmed = trimmed.strip_prefix("export ").map(str::trim_start).unwrap_or(trimmed);

    let (key, raw) = trimmed
        .split_once('=')
        .ok_or_else(|| "missing '=' in assignment".to_string())?;
    let key = key.trim();
    if key.is_empty() || key.chars().any(char::is_whitespace) {
        return Err(format!("invalid environment variable name: {:?}", key));
    }

    let raw = raw.trim();
    let value = match raw.chars().next() {
        Some(q @ ('"' | '\'')) => {
            let inner = &raw[1..];
            let end = inner.find(q).ok_or_else(|| format!("unterminated {} quote", q))?;
            let rest = inner[end + 1..].trim();
            if !rest.is_empty() && !rest.starts_with('#') {
                return Err("unexpected characters after closing quote".to_string());
            }
            inner[..end].to_string()
        }
        _ => raw.split('#').next().unwrap_or_default().trim_end().to_string(),
    };
    Ok(Some((key.to_string(), value)))
}

fn main() {
    let args = match parse_args(std::env::args_os().skip(1)) {
        Ok(a) => a,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(2);
        }
    };

    let env_file = match &args.env_file {
        Some(path) if !path.is_file() => {
            eprintln!("fatal: env file not found: {}", path.display());
            std::process::exit(1);
        }
        Some(path) => Some(path.clone()),
        None => Some(PathBuf::from(".env")).filter(|p| p.is_file()),
    };
    if let Some(path) = &env_file {
        if let Err(err) = load_env_file(path) {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    }

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(path) = &env_file {
        info!("Environment loaded from {}", path.display());
    }
    info!(
        "neviweb-sensors {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(args.set_status) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
