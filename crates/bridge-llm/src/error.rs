use bridge_core::HttpError;
use http::StatusCode;
use thiserror::Error;

use crate::protocol::openai::{ErrorCode, OpenAiErrorDetail, OpenAiErrorResponse};

/// Errors that can occur while translating or forwarding a request
#[derive(Debug, Error)]
pub enum LlmError {
    /// Malformed request, unparseable content or tool arguments, failed image fetch
    #[error("{0}")]
    InvalidRequest(String),

    /// Operation not available for the resolved model
    #[error("{0}")]
    Unsupported(String),

    /// No backend credential in the request
    #[error("missing API key: provide it as 'Authorization: Bearer <key>'")]
    MissingCredential,

    /// Model absent from the listing
    #[error("the model '{model}' does not exist")]
    ModelNotFound { model: String },

    /// Backend answered with a non-success status
    #[error("backend returned {status}: {message}")]
    Backend {
        status: StatusCode,
        /// Vendor status string such as `RESOURCE_EXHAUSTED`
        reason: Option<String>,
        message: String,
    },

    /// Backend could not be reached or its response could not be read
    #[error("backend request failed: {0}")]
    Transport(String),

    /// Backend stream broke after it started
    #[error("stream error: {0}")]
    Streaming(String),

    /// Caller went away or the server is shutting down
    #[error("request was canceled")]
    Cancelled,

    /// Error that already carries its outward status and body
    #[error("{}", body.error.message)]
    Outward { status: StatusCode, body: OpenAiErrorResponse },

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<reqwest::Error> for LlmError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

impl LlmError {
    /// Short label used for logs and metrics
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::Unsupported(_) => "unsupported_operation",
            Self::MissingCredential => "missing_credential",
            Self::ModelNotFound { .. } => "model_not_found",
            Self::Backend { status, .. } if status.as_u16() == 429 => "rate_limited",
            Self::Backend { .. } => "backend",
            Self::Transport(_) => "transport",
            Self::Streaming(_) => "streaming",
            Self::Cancelled => "cancelled",
            Self::Outward { .. } => "outward",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the backend reported a quota or rate limit
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::Backend { status, .. } | Self::Outward { status, .. } => *status == StatusCode::TOO_MANY_REQUESTS,
            _ => false,
        }
    }
}

impl HttpError for LlmError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::Unsupported(_) => StatusCode::BAD_REQUEST,
            Self::MissingCredential => StatusCode::UNAUTHORIZED,
            Self::ModelNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Backend { status, .. } | Self::Outward { status, .. } => *status,
            Self::Cancelled => StatusCode::REQUEST_TIMEOUT,
            Self::Transport(_) | Self::Streaming(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::InvalidRequest(_) | Self::Unsupported(_) | Self::ModelNotFound { .. } => "invalid_request_error",
            Self::MissingCredential => "authentication_error",
            Self::Backend { status, .. } if *status == StatusCode::TOO_MANY_REQUESTS => "rate_limit_error",
            Self::Backend { status, .. } if status.is_client_error() => "invalid_request_error",
            Self::Outward { body, .. } => &body.error.error_type,
            Self::Cancelled => "canceled_error",
            Self::Backend { .. } | Self::Transport(_) | Self::Streaming(_) | Self::Internal(_) => "server_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Backend { status, .. } if *status == StatusCode::TOO_MANY_REQUESTS => {
                "Rate limit exceeded".to_owned()
            }
            Self::Backend { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    fn error_code(&self) -> Option<&str> {
        match self {
            Self::InvalidRequest(_) => Some("invalid_request"),
            Self::Unsupported(_) => Some("unsupported_operation"),
            Self::MissingCredential => Some("invalid_api_key"),
            Self::ModelNotFound { .. } => Some("model_not_found"),
            Self::Backend { status, .. } if *status == StatusCode::TOO_MANY_REQUESTS => Some("rate_limit_exceeded"),
            Self::Backend { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }
}

/// Classify an error into an outward status and `OpenAI`-shaped body
///
/// Already-outward errors pass through unchanged, so mapping is idempotent.
/// Backend 429s become a rate-limit body whatever the vendor said; other
/// backend statuses keep the vendor message. Everything else is a 500.
pub fn map_error(error: &LlmError) -> (StatusCode, OpenAiErrorResponse) {
    if let LlmError::Outward { status, body } = error {
        return (*status, body.clone());
    }

    let status = error.status_code();
    let body = OpenAiErrorResponse {
        error: OpenAiErrorDetail {
            message: error.client_message(),
            error_type: error.error_type().to_owned(),
            param: None,
            code: error.error_code().map(|code| ErrorCode::Text(code.to_owned())),
        },
    };

    (status, body)
}

/// Body of the error chunk written into a broken stream
///
/// Codes are numeric: 408 when cancelled, 429 when rate limited, 500 otherwise.
pub fn stream_error_body(error: &LlmError) -> OpenAiErrorResponse {
    let (code, error_type, message) = match error {
        LlmError::Cancelled => (408, "canceled_error", "Request was canceled".to_owned()),
        e if e.is_rate_limited() => (429, "rate_limit_error", "Rate limit exceeded".to_owned()),
        e => (500, "internal_server_error", e.to_string()),
    };

    OpenAiErrorResponse {
        error: OpenAiErrorDetail {
            message,
            error_type: error_type.to_owned(),
            param: None,
            code: Some(ErrorCode::Status(code)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(status: u16, message: &str) -> LlmError {
        LlmError::Backend {
            status: StatusCode::from_u16(status).unwrap(),
            reason: Some("RESOURCE_EXHAUSTED".to_owned()),
            message: message.to_owned(),
        }
    }

    #[test]
    fn backend_429_becomes_rate_limit_regardless_of_message() {
        let (status, body) = map_error(&backend(429, "Quota exceeded for aiplatform.googleapis.com"));

        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        insta::assert_json_snapshot!(body, @r#"
        {
          "error": {
            "message": "Rate limit exceeded",
            "type": "rate_limit_error",
            "code": "rate_limit_exceeded"
          }
        }
        "#);
    }

    #[test]
    fn other_backend_status_keeps_vendor_message() {
        let error = LlmError::Backend {
            status: StatusCode::BAD_REQUEST,
            reason: Some("INVALID_ARGUMENT".to_owned()),
            message: "API key not valid".to_owned(),
        };
        let (status, body) = map_error(&error);

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error.message, "API key not valid");
        assert_eq!(body.error.error_type, "invalid_request_error");
        assert_eq!(body.error.code, Some(ErrorCode::Text("INVALID_ARGUMENT".to_owned())));
    }

    #[test]
    fn unclassified_errors_are_500_with_raw_text() {
        let (status, body) = map_error(&LlmError::Transport("connection reset".to_owned()));

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error.error_type, "server_error");
        assert!(body.error.message.contains("connection reset"));
    }

    #[test]
    fn validation_errors_are_client_errors() {
        let (status, body) = map_error(&LlmError::InvalidRequest("bad tool id".to_owned()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error.code, Some(ErrorCode::Text("invalid_request".to_owned())));

        let (status, body) = map_error(&LlmError::Unsupported("embedding model".to_owned()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error.code, Some(ErrorCode::Text("unsupported_operation".to_owned())));

        let (status, _) = map_error(&LlmError::MissingCredential);
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn mapping_is_idempotent() {
        let errors = [
            backend(429, "slow down"),
            backend(503, "overloaded"),
            LlmError::InvalidRequest("nope".to_owned()),
            LlmError::ModelNotFound {
                model: "gpt-5".to_owned(),
            },
            LlmError::Internal(anyhow::anyhow!("boom")),
        ];

        for error in &errors {
            let (status, body) = map_error(error);
            let remapped = map_error(&LlmError::Outward {
                status,
                body: body.clone(),
            });
            assert_eq!(remapped, (status, body));
        }
    }

    #[test]
    fn stream_error_classification() {
        assert_eq!(stream_error_body(&LlmError::Cancelled).error.code, Some(ErrorCode::Status(408)));
        assert_eq!(
            stream_error_body(&backend(429, "quota")).error.error_type,
            "rate_limit_error"
        );

        let generic = stream_error_body(&LlmError::Streaming("eof".to_owned()));
        assert_eq!(generic.error.code, Some(ErrorCode::Status(500)));
        assert_eq!(generic.error.error_type, "internal_server_error");
        assert!(generic.error.message.contains("eof"));
    }
}
