use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Pipeline stage at which an external model call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStage {
    Rewrite,
    Embed,
    Retrieve,
    Generate,
}

impl std::fmt::Display for ProviderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProviderStage::Rewrite => "rewrite",
            ProviderStage::Embed => "embed",
            ProviderStage::Retrieve => "retrieve",
            ProviderStage::Generate => "generate",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("provider error at {stage}: {message}")]
    Provider {
        stage: ProviderStage,
        message: String,
    },
    #[error("storage error: {0}")]
    Storage(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }

    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Storage(err.to_string())
    }

    /// Provider failure; callers tag the pipeline stage via [`ApiError::at_stage`].
    pub fn provider<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Provider {
            stage: ProviderStage::Generate,
            message: err.to_string(),
        }
    }

    /// Re-tags a provider error with the stage it occurred in.
    /// Other variants pass through unchanged.
    pub fn at_stage(self, stage: ProviderStage) -> Self {
        match self {
            ApiError::Provider { message, .. } => ApiError::Provider { stage, message },
            other => other,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::UnsupportedFormat(msg) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, msg.clone()),
            ApiError::Provider { .. } => (StatusCode::BAD_GATEWAY, self.to_string()),
            ApiError::Storage(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_stage_retags_provider_errors_only() {
        let err = ApiError::provider("timeout").at_stage(ProviderStage::Rewrite);
        match err {
            ApiError::Provider { stage, .. } => assert_eq!(stage, ProviderStage::Rewrite),
            other => panic!("unexpected variant: {other}"),
        }

        let err = ApiError::NotFound("chat".into()).at_stage(ProviderStage::Embed);
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
