//! Blocking HTTP client for the Neviweb (GT125 gateway) API.
//!
//! - Uses `ureq` (no async); one session id shared by all calls.
//! - Every request is counted on the shared [`RequestCounter`].
//! - An expired session triggers one re-login and one retry.

use chrono::Utc;
use http::StatusCode;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use crate::models::neviweb::*;
use crate::quota::RequestCounter;

const BASE_URL: &str = "https://neviweb.com/api";
const LOGIN_INTERFACE: &str = "neviweb";
const SESSION_EXPIRED_CODE: &str = "USRSESSEXP";

#[derive(Debug)]
pub enum NeviwebClientError {
    MissingSession,
    SessionExpired,
    Transport(String),
    Http { status: u16, message: String },
    Json(serde_path_to_error::Error<serde_json::Error>),
    Api { code: String },
    Auth(String),
}

impl core::fmt::Display for NeviwebClientError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            NeviwebClientError::MissingSession => write!(f, "no session; login first"),
            NeviwebClientError::SessionExpired => write!(f, "session expired"),
            NeviwebClientError::Transport(s) => write!(f, "transport error: {}", s),
            NeviwebClientError::Http { status, message } => write!(f, "http {}: {}", status, message),
            NeviwebClientError::Json(e) => write!(f, "json error at {}: {}", e.path(), e.inner()),
            NeviwebClientError::Api { code } => write!(f, "api error code {}", code),
            NeviwebClientError::Auth(e) => write!(f, "auth error: {}", e),
        }
    }
}

impl std::error::Error for NeviwebClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NeviwebClientError::Json(e) => Some(e.inner()),
            _ => None,
        }
    }
}

impl From<serde_path_to_error::Error<serde_json::Error>> for NeviwebClientError {
    fn from(value: serde_path_to_error::Error<serde_json::Error>) -> Self {
        NeviwebClientError::Json(value)
    }
}

/// The calls the sensors need. Implemented by [`NeviwebClient`] and by test fakes.
pub trait NeviwebApi {
    fn get_device_status(&self, device_id: DeviceId) -> Result<DeviceStatus, NeviwebClientError>;

    fn get_neviweb_status(&self, location_id: LocationId) -> Result<LocationStatus, NeviwebClientError>;

    /// Hourly energy usage (Wh) for the window the API keeps, oldest first. Empty when none.
    fn get_device_hourly_stats(&self, device_id: DeviceId) -> Result<Vec<HourlyStatEntry>, NeviwebClientError>;

    fn set_neviweb_status(&self, location_id: LocationId, mode: OccupancyMode) -> Result<(), NeviwebClientError>;
}

#[derive(Debug)]
struct SessionState {
    session_id: Option<String>,
    account_id: Option<AccountId>,
    username: String,
    password: String,
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Get,
    Put,
}

pub struct NeviwebClient {
    agent: ureq::Agent,
    base_url: String,
    session: RefCell<SessionState>,
    requests: Rc<RequestCounter>,
}

impl NeviwebClient {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
        requests: Rc<RequestCounter>,
    ) -> Result<Self, NeviwebClientError> {
        Self::with_base_url(BASE_URL, username, password, timeout, requests)
    }

    pub(crate) fn with_base_url(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
        requests: Rc<RequestCounter>,
    ) -> Result<Self, NeviwebClientError> {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();

        let client = NeviwebClient {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session: RefCell::new(SessionState {
                session_id: None,
                account_id: None,
                username: username.into(),
                password: password.into(),
            }),
            requests,
        };
        client.login()?;
        Ok(client)
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    pub fn login(&self) -> Result<(), NeviwebClientError> {
        let (username, password) = {
            let s = self.session.borrow();
            (s.username.clone(), s.password.clone())
        };
        let payload = LoginRequest {
            username: &username,
            password: &password,
            interface: LOGIN_INTERFACE,
            stay_connected: 1,
        };

        self.requests.record(Utc::now());
        let mut resp = self
            .agent
            .post(&self.url("/login"))
            .header("Accept", "application/json")
            .send_json(&payload)
            .map_err(|e| NeviwebClientError::Transport(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .body_mut()
            .read_to_string()
            .map_err(|e| NeviwebClientError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(NeviwebClientError::Auth(format!("http {}: {}", status.as_u16(), body)));
        }
        if let Some(code) = api_error_code(&body) {
            return Err(NeviwebClientError::Auth(format!("login rejected with code {}", code)));
        }

        let login: LoginResponse = decode(&body)?;
        let mut s = self.session.borrow_mut();
        s.session_id = Some(login.session);
        s.account_id = Some(login.account.id);
        info!("Logged in to Neviweb (account {})", login.account.id.0);
        Ok(())
    }

    /// One attempt, no retry. Returns the raw body of a successful call.
    fn execute(&self, method: Method, path: &str, body: Option<&serde_json::Value>) -> Result<String, NeviwebClientError> {
        let url = self.url(path);
        let session = self
            .session
            .borrow()
            .session_id
            .clone()
            .ok_or(NeviwebClientError::MissingSession)?;

        self.requests.record(Utc::now());
        let result = match method {
            Method::Get => self
                .agent
                .get(&url)
                .header("Accept", "application/json")
                .header("Session-Id", session.as_str())
                .call(),
            Method::Put => {
                let req = self
                    .agent
                    .put(&url)
                    .header("Accept", "application/json")
                    .header("Session-Id", session.as_str());
                match body {
                    Some(b) => req.send_json(b),
                    None => req.send_empty(),
                }
            }
        };

        let mut resp = result.map_err(|e| NeviwebClientError::Transport(e.to_string()))?;
        let status = resp.status();
        let text = resp
            .body_mut()
            .read_to_string()
            .map_err(|e| NeviwebClientError::Transport(e.to_string()))?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(NeviwebClientError::SessionExpired);
        }
        if !status.is_success() {
            return Err(NeviwebClientError::Http {
                status: status.as_u16(),
                message: text,
            });
        }
        match api_error_code(&text) {
            Some(code) if code == SESSION_EXPIRED_CODE => Err(NeviwebClientError::SessionExpired),
            Some(code) => Err(NeviwebClientError::Api { code }),
            None => Ok(text),
        }
    }

    fn request(&self, method: Method, path: &str, body: Option<&serde_json::Value>) -> Result<String, NeviwebClientError> {
        match self.execute(method, path, body) {
            Err(NeviwebClientError::SessionExpired) => {
                warn!("Neviweb session expired; logging in again");
                self.login()?;
                self.execute(method, path, body)
            }
            other => other,
        }
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, NeviwebClientError> {
        let body = self.request(Method::Get, path, None)?;
        debug!("GET {} -> {} bytes", path, body.len());
        decode(&body)
    }

    pub fn account_id(&self) -> Result<AccountId, NeviwebClientError> {
        self.session.borrow().account_id.ok_or(NeviwebClientError::MissingSession)
    }

    pub fn get_locations(&self) -> Result<Vec<Location>, NeviwebClientError> {
        let account = self.account_id()?;
        self.get_json(&format!("/locations?account$id={}", account.0))
    }

    pub fn get_devices(&self, location_id: LocationId) -> Result<Vec<GatewayDevice>, NeviwebClientError> {
        self.get_json(&format!("/devices?location$id={}", location_id.0))
    }
}

impl NeviwebApi for NeviwebClient {
    fn get_device_status(&self, device_id: DeviceId) -> Result<DeviceStatus, NeviwebClientError> {
        self.get_json(&format!("/device/{}/status", device_id.0))
    }

    fn get_neviweb_status(&self, location_id: LocationId) -> Result<LocationStatus, NeviwebClientError> {
        self.get_json(&format!("/location/{}", location_id.0))
    }

    fn get_device_hourly_stats(&self, device_id: DeviceId) -> Result<Vec<HourlyStatEntry>, NeviwebClientError> {
        let resp: HourlyStatsResponse = self.get_json(&format!("/device/{}/energy/hourly", device_id.0))?;
        Ok(resp.history.unwrap_or_default())
    }

    fn set_neviweb_status(&self, location_id: LocationId, mode: OccupancyMode) -> Result<(), NeviwebClientError> {
        let body = serde_json::json!({ "mode": mode.as_str() });
        self.request(Method::Put, &format!("/location/{}/mode", location_id.0), Some(&body))?;
        info!("Set location {} occupancy mode to {}", location_id.0, mode);
        Ok(())
    }
}

fn api_error_code(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|env| env.error)
        .map(|e| e.code)
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, NeviwebClientError> {
    let de = &mut serde_json::Deserializer::from_str(body);
    Ok(serde_path_to_error::deserialize(de)?)
}
