//! HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use registrar_catalog::CatalogError;
use serde::Serialize;

/// Error returned by API handlers.
#[derive(Debug)]
pub struct ApiError(CatalogError);

/// JSON body of an error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(CatalogError::bad_request(msg))
    }

    /// HTTP status for the wrapped error.
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            CatalogError::BadRequest(_) => StatusCode::BAD_REQUEST,
            CatalogError::Conflict(_) => StatusCode::CONFLICT,
            CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
            CatalogError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CatalogError::Storage(_)
            | CatalogError::Valkey(_)
            | CatalogError::Redis(_)
            | CatalogError::Serialisation(_)
            | CatalogError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = match &self.0 {
            CatalogError::BadRequest(msg)
            | CatalogError::Conflict(msg)
            | CatalogError::NotFound(msg)
            | CatalogError::Unavailable(msg) => msg.clone(),
            other => {
                tracing::error!(error = %other, "internal API error");
                "internal error".to_owned()
            }
        };

        let body = ErrorBody {
            code: status.as_u16(),
            message,
        };
        (status, Json(body)).into_response()
    }
}
