//! ThinQ Connect HTTP client
//!
//! One request per call, no retries and no caching. Status codes are mapped
//! onto the core error taxonomy:
//!
//! | status      | meaning                                   |
//! |-------------|-------------------------------------------|
//! | 416         | device powered off / offline (soft)       |
//! | 401, 403    | `Error::Auth`                             |
//! | 429, 5xx    | `Error::Transport` (retry next tick)      |
//! | other ≠ 2xx | `Error::Transport`                        |

use crate::profile::DeviceProfile;
use hapsync_core::{Error, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Status the ThinQ API answers with when a device is not reachable
const STATUS_DEVICE_OFFLINE: u16 = 416;

/// Longest response excerpt kept in error messages
const ERROR_BODY_EXCERPT: usize = 200;

/// Connection settings for the ThinQ API
#[derive(Clone)]
pub struct ThinqSettings {
    pub base_url: String,
    /// ⚠️ NEVER log this value
    pub access_token: String,
    pub message_id: String,
    pub client_id: String,
    pub country: String,
    /// ⚠️ NEVER log this value
    pub api_key: String,
}

impl std::fmt::Debug for ThinqSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThinqSettings")
            .field("base_url", &self.base_url)
            .field("access_token", &"<REDACTED>")
            .field("message_id", &self.message_id)
            .field("client_id", &self.client_id)
            .field("country", &self.country)
            .field("api_key", &"<REDACTED>")
            .finish()
    }
}

/// Body of a successful request, or the soft "device offline" answer
#[derive(Debug)]
enum ApiReply {
    Body(Value),
    DeviceOffline,
}

/// HTTP client for the LG ThinQ Connect API
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the token or API key.
pub struct ThinqClient {
    settings: ThinqSettings,
    client: reqwest::Client,
}

impl std::fmt::Debug for ThinqClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThinqClient")
            .field("settings", &self.settings)
            .finish()
    }
}

impl ThinqClient {
    /// Create a new client
    ///
    /// Fails with `Error::Config` if the token is empty or the HTTP client
    /// cannot be built.
    pub fn new(settings: ThinqSettings) -> Result<Self> {
        if settings.access_token.is_empty() {
            return Err(Error::config("ThinQ access token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { settings, client })
    }

    /// List every device of the account (raw `response` array)
    ///
    /// ```http
    /// GET /devices
    /// ```
    pub async fn list_devices(&self) -> Result<Vec<Value>> {
        match self.request(reqwest::Method::GET, "/devices", None).await? {
            ApiReply::Body(body) => match body.get("response") {
                Some(Value::Array(items)) => Ok(items.clone()),
                _ => Err(Error::malformed("device list has no response array", &body)),
            },
            ApiReply::DeviceOffline => Err(Error::transport("device list answered 416")),
        }
    }

    /// Read the raw state snapshot of a device
    ///
    /// # Returns
    ///
    /// - `Ok(Some(snapshot))`: First element of the `response` array
    /// - `Ok(None)`: The device is offline
    ///
    /// ```http
    /// GET /devices/:device_id/state
    /// ```
    pub async fn device_state(&self, device_id: &str) -> Result<Option<Value>> {
        let endpoint = format!("/devices/{}/state", device_id);
        match self.request(reqwest::Method::GET, &endpoint, None).await? {
            ApiReply::Body(body) => {
                let snapshot = body
                    .get("response")
                    .and_then(Value::as_array)
                    .and_then(|items| items.first())
                    .cloned()
                    .ok_or_else(|| Error::malformed("state has no response[0]", &body))?;
                Ok(Some(snapshot))
            }
            ApiReply::DeviceOffline => Ok(None),
        }
    }

    /// Read the capability profile of a device
    ///
    /// A reply without a `response` object yields an empty profile.
    ///
    /// ```http
    /// GET /devices/:device_id/profile
    /// ```
    pub async fn device_profile(&self, device_id: &str) -> Result<DeviceProfile> {
        let endpoint = format!("/devices/{}/profile", device_id);
        match self.request(reqwest::Method::GET, &endpoint, None).await? {
            ApiReply::Body(body) => match body.get("response") {
                Some(response) => DeviceProfile::from_json(response),
                None => Ok(DeviceProfile::default()),
            },
            ApiReply::DeviceOffline => Err(Error::unreachable(device_id)),
        }
    }

    /// Send an encoded control payload
    ///
    /// # Returns
    ///
    /// `true` only when the API answers with an empty `response` object
    ///
    /// ```http
    /// POST /devices/:device_id/control
    /// ```
    pub async fn control(&self, device_id: &str, payload: &Value) -> Result<bool> {
        let endpoint = format!("/devices/{}/control", device_id);
        match self
            .request(reqwest::Method::POST, &endpoint, Some(payload))
            .await?
        {
            ApiReply::Body(body) => {
                let accepted = matches!(body.get("response"), Some(Value::Object(map)) if map.is_empty());
                if !accepted {
                    debug!("Control for {} not accepted: {}", device_id, excerpt(&body.to_string()));
                }
                Ok(accepted)
            }
            ApiReply::DeviceOffline => {
                warn!("Command not delivered, device {} is offline", device_id);
                Ok(false)
            }
        }
    }

    async fn request(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        payload: Option<&Value>,
    ) -> Result<ApiReply> {
        let url = format!("{}{}", self.settings.base_url.trim_end_matches('/'), endpoint);
        debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(&self.settings.access_token)
            .header("x-message-id", &self.settings.message_id)
            .header("x-country", &self.settings.country)
            .header("x-client-id", &self.settings.client_id)
            .header("x-api-key", &self.settings.api_key);
        if let Some(payload) = payload {
            request = request.json(payload);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status.as_u16() == STATUS_DEVICE_OFFLINE {
            debug!("{} answered 416 (device offline)", url);
            return Ok(ApiReply::DeviceOffline);
        }

        let text = response
            .text()
            .await
            .map_err(|e| Error::transport(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(status_error(status.as_u16(), &text));
        }

        serde_json::from_str(&text)
            .map(ApiReply::Body)
            .map_err(|e| {
                Error::malformed(
                    format!("Failed to parse response: {}", e),
                    &Value::String(text),
                )
            })
    }
}

/// Map a non-success status onto the error taxonomy
fn status_error(status: u16, body: &str) -> Error {
    match status {
        401 | 403 => Error::auth(format!(
            "Invalid access token or insufficient permissions. Status: {}",
            status
        )),
        429 => Error::transport(format!("Rate limit exceeded. Status: {}", status)),
        500..=599 => Error::transport(format!(
            "ThinQ server error (transient): {} - {}",
            status,
            excerpt(body)
        )),
        _ => Error::transport(format!("Request failed: {} - {}", status, excerpt(body))),
    }
}

fn excerpt(text: &str) -> String {
    match text.char_indices().nth(ERROR_BODY_EXCERPT) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
