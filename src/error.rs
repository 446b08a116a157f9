use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::gate::CONFIGURE_PATH;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Invalid domain or IP address format")]
    InvalidTarget(String),

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("{0}")]
    LicenseRejected(String),

    #[error("License required")]
    LicenseRequired { status: String },

    #[error("Internal server error")]
    Internal(String),
}

impl PluginError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidTarget(_) | Self::MissingField(_) | Self::LicenseRejected(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::LicenseRequired { .. } => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON body shared by every failing response.
#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    configure: Option<&'static str>,
}

impl ErrorBody {
    fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            message: None,
            status: None,
            configure: None,
        }
    }
}

impl IntoResponse for PluginError {
    fn into_response(self) -> Response {
        let code = self.status_code();
        let body = match &self {
            Self::LicenseRequired { status } => ErrorBody {
                message: Some(format!(
                    "A valid license is required. Configure one via POST {}",
                    CONFIGURE_PATH
                )),
                status: Some(status.clone()),
                configure: Some(CONFIGURE_PATH),
                ..ErrorBody::new(self.to_string())
            },
            // Internal details go to the log, not to the client.
            Self::Internal(detail) => {
                tracing::error!("Request failed: {}", detail);
                ErrorBody::new(self.to_string())
            }
            Self::InvalidTarget(_) | Self::MissingField(_) | Self::LicenseRejected(_) => {
                ErrorBody::new(self.to_string())
            }
        };

        (code, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, PluginError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_bad_request() {
        assert_eq!(
            PluginError::InvalidTarget("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PluginError::MissingField("Domain").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PluginError::LicenseRejected("expired".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn license_required_is_forbidden() {
        let err = PluginError::LicenseRequired {
            status: "required".into(),
        };
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn missing_field_message_names_the_field() {
        assert_eq!(
            PluginError::MissingField("License key").to_string(),
            "License key is required"
        );
    }

    #[test]
    fn internal_errors_are_generic() {
        let err = PluginError::Internal("lock poisoned".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Internal server error");
    }
}
