// Structured error kinds, mapped to the HTTP error envelope in one place.
//
// Every failure carries a kind at the point it happens; the HTTP layer never
// inspects message strings to pick a status code. Responses use the envelope
// `{"detail":[{"loc":[...],"msg":"...","type":"..."}]}`. Server-side failures
// (backend, timeout, missing output) are logged with their full detail but the
// response body only carries a short generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{msg}")]
    Validation { loc: Vec<String>, msg: String },
    #[error("request limit exceeded, retry later")]
    RateLimited,
    #[error("unknown speaker id {0}")]
    UnknownSpeaker(i64),
    #[error("backend invocation failed: {0}")]
    Backend(String),
    #[error("external call exceeded {0:?}")]
    Timeout(Duration),
    #[error("synthesis engine unreachable: {0}")]
    EngineUnreachable(String),
    #[error("synthesis reported success but produced no output file")]
    NoOutput,
    #[error("configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn validation(loc: &[&str], msg: impl Into<String>) -> Self {
        AppError::Validation {
            loc: loc.iter().map(|s| s.to_string()).collect(),
            msg: msg.into(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } | AppError::UnknownSpeaker(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Backend(_)
            | AppError::Timeout(_)
            | AppError::EngineUnreachable(_)
            | AppError::NoOutput
            | AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "value_error",
            AppError::RateLimited => "rate_limit",
            AppError::UnknownSpeaker(_) => "value_error.speaker",
            AppError::Backend(_) => "backend_error",
            AppError::Timeout(_) => "timeout_error",
            AppError::EngineUnreachable(_) => "engine_unreachable",
            AppError::NoOutput => "no_output",
            AppError::Config(_) => "config_error",
        }
    }

    fn loc(&self) -> Vec<String> {
        match self {
            AppError::Validation { loc, .. } => loc.clone(),
            AppError::UnknownSpeaker(_) => vec!["query".into(), "speaker".into()],
            _ => Vec::new(),
        }
    }

    /// Message exposed on the wire. Client-caused errors keep their detail;
    /// server-side failures collapse to a short fixed message so backend paths
    /// and stderr never leak into responses.
    fn public_msg(&self) -> String {
        match self {
            AppError::Validation { msg, .. } => msg.clone(),
            AppError::RateLimited => self.to_string(),
            AppError::UnknownSpeaker(id) => format!("unknown speaker id {}", id),
            AppError::Backend(_) => "synthesis backend failed".into(),
            AppError::Timeout(_) => "synthesis timed out".into(),
            AppError::EngineUnreachable(_) => "synthesis engine unreachable".into(),
            AppError::NoOutput => "synthesis produced no output".into(),
            AppError::Config(_) => "server configuration error".into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub loc: Vec<String>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub detail: Vec<ErrorDetail>,
}

impl From<&AppError> for ErrorEnvelope {
    fn from(err: &AppError) -> Self {
        ErrorEnvelope {
            detail: vec![ErrorDetail {
                loc: err.loc(),
                msg: err.public_msg(),
                kind: err.kind().to_string(),
            }],
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        } else {
            tracing::warn!(kind = self.kind(), error = %self, "request rejected");
        }
        (status, Json(ErrorEnvelope::from(&self))).into_response()
    }
}
