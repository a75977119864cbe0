//! Relay error types and the OpenAI-style error envelope.

use crate::types::{ErrorBody, ErrorEnvelope};
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

/// `type` tag carried by every error envelope.
pub const ERROR_TYPE: &str = "invalid_request_error";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{message}")]
    Upstream { status: u16, message: String },

    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("translation error: {0}")]
    Translation(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("Endpoint {0} not found")]
    NotFound(String),
}

impl RelayError {
    /// Numeric code for the envelope: the upstream status when known, 500 otherwise.
    pub fn code(&self) -> u16 {
        match self {
            Self::Upstream { status, .. } => *status,
            Self::Transport(e) => e.status().map(|s| s.as_u16()).unwrap_or(500),
            Self::Translation(_) => 500,
            Self::InvalidRequest(_) => 400,
            Self::NotFound(_) => 404,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorBody {
                message: self.to_string(),
                kind: ERROR_TYPE.to_string(),
                code: self.code(),
            },
        }
    }
}

impl ResponseError for RelayError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self.envelope())
    }
}

/// Reduce an upstream error body to a message.
///
/// OpenAI-compatible providers answer with `{"error": {"message": ...}}` or
/// `{"message": ...}`; anything else is returned as raw text.
pub fn upstream_error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|v| {
        v.get("error")
            .and_then(|e| e.get("message").or(Some(e)))
            .or_else(|| v.get("message"))
            .or_else(|| v.get("detail"))
            .and_then(|m| m.as_str())
            .map(|s| s.to_string())
    });

    match message {
        Some(m) if !m.is_empty() => m,
        _ if body.trim().is_empty() => "upstream returned an empty error body".to_string(),
        _ => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_status_is_mirrored() {
        let err = RelayError::Upstream {
            status: 429,
            message: "slow down".to_string(),
        };
        assert_eq!(err.code(), 429);
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);

        let env = err.envelope();
        assert_eq!(env.error.message, "slow down");
        assert_eq!(env.error.kind, "invalid_request_error");
        assert_eq!(env.error.code, 429);
    }

    #[test]
    fn test_default_code_is_500() {
        let err = RelayError::Translation("missing choices".to_string());
        assert_eq!(err.code(), 500);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_not_found_message() {
        let err = RelayError::NotFound("/v1/embeddings".to_string());
        assert_eq!(err.to_string(), "Endpoint /v1/embeddings not found");
        assert_eq!(err.code(), 404);
    }

    #[test]
    fn test_upstream_error_message_extraction() {
        assert_eq!(
            upstream_error_message(r#"{"error":{"message":"bad key","type":"auth"}}"#),
            "bad key"
        );
        assert_eq!(upstream_error_message(r#"{"error":"plain"}"#), "plain");
        assert_eq!(upstream_error_message(r#"{"detail":"Not Found"}"#), "Not Found");
        assert_eq!(upstream_error_message("gateway timeout\n"), "gateway timeout");
        assert_eq!(
            upstream_error_message(""),
            "upstream returned an empty error body"
        );
    }
}
