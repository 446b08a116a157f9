use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

const VALIDATE_PATH: &str = "/api/licenses/validate";

/// Body of a validation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRequest {
    pub license_key: String,
    pub plugin_id: String,
    pub machine_id: String,
}

/// The authority's answer when it could be reached and understood.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorityVerdict {
    pub valid: bool,
    pub message: Option<String>,
    /// Full response document, handed back to callers on success.
    pub payload: Value,
}

impl AuthorityVerdict {
    /// Interpret a response document. `None` when it carries no boolean `valid`.
    pub fn from_payload(payload: Value) -> Option<Self> {
        let valid = payload.get("valid")?.as_bool()?;
        let message = payload
            .get("message")
            .or_else(|| payload.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(Self {
            valid,
            message,
            payload,
        })
    }
}

#[derive(Error, Debug)]
pub enum AuthorityError {
    #[error("request timed out")]
    Timeout,

    #[error("{0}")]
    Transport(String),

    #[error("unexpected response (HTTP {status}): {detail}")]
    UnexpectedResponse { status: u16, detail: String },
}

/// Remote service that decides whether a license key is valid.
#[async_trait]
pub trait LicenseAuthority: Send + Sync {
    async fn validate(&self, request: &ValidationRequest) -> Result<AuthorityVerdict, AuthorityError>;
}

/// [`LicenseAuthority`] backed by the license manager's HTTP API.
pub struct HttpLicenseAuthority {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLicenseAuthority {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AuthorityError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("corebridge-ping/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuthorityError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, VALIDATE_PATH)
    }
}

#[async_trait]
impl LicenseAuthority for HttpLicenseAuthority {
    async fn validate(&self, request: &ValidationRequest) -> Result<AuthorityVerdict, AuthorityError> {
        let response = self
            .client
            .post(self.endpoint())
            .json(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_reqwest_error)?;

        // Rejections usually arrive as 4xx with a JSON body; decode regardless of status.
        let verdict = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(AuthorityVerdict::from_payload);

        match verdict {
            Some(verdict) => Ok(verdict),
            None => Err(AuthorityError::UnexpectedResponse {
                status: status.as_u16(),
                detail: truncate(&body, 200),
            }),
        }
    }
}

fn map_reqwest_error(err: reqwest::Error) -> AuthorityError {
    if err.is_timeout() {
        AuthorityError::Timeout
    } else {
        AuthorityError::Transport(err.to_string())
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
