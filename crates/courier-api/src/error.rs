use axum::{
    Json,
    extract::{FromRequest, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::debug;

use courier_types::StoreError;
use courier_types::api::ErrorResponse;

/// HTTP rendering of a [`StoreError`].
#[derive(Debug)]
pub struct ApiError(pub StoreError);

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(err)
    }
}

/// Rejected bodies (bad JSON, wrong field types, missing content type) are
/// validation failures like any other.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!("Rejected request body: {}", rejection.body_text());
        Self(StoreError::validation("Invalid request body"))
    }
}

/// `Json` extractor whose rejection renders as an [`ApiError`].
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            StoreError::Validation(_) => StatusCode::BAD_REQUEST,
            StoreError::Conflict(_) => StatusCode::CONFLICT,
            StoreError::Authentication => StatusCode::UNAUTHORIZED,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = match &self.0 {
            StoreError::Storage(_) => "internal server error".to_string(),
            other => other.to_string(),
        };
        (self.status(), Json(ErrorResponse { error })).into_response()
    }
}
