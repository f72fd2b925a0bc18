use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use courier_types::StoreError;

use crate::error::ApiError;
use crate::routes::AppState;

/// Extract and validate the session token from the Authorization header.
/// On success the token's `Claims` are available as a request extension.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(StoreError::Authentication)?;

    let claims = state.identity.tokens().verify(token)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
