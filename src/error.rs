//! Error types for liaison.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Main error type for liaison.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No providers configured")]
    NoProvidersConfigured,

    #[error("No provider available for this request")]
    NoProviderAvailable,

    #[error("Provider '{0}' not found")]
    ProviderNotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::NoProvidersConfigured => StatusCode::INTERNAL_SERVER_ERROR,
            Error::NoProviderAvailable => StatusCode::SERVICE_UNAVAILABLE,
            Error::ProviderNotFound(_) => StatusCode::NOT_FOUND,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();

        // Return OpenAI-compatible error format
        let body = serde_json::json!({
            "error": {
                "message": self.to_string(),
                "type": "liaison_error",
                "code": status.as_u16()
            }
        });

        (status, axum::Json(body)).into_response()
    }
}
