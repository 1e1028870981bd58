use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use axum_extra::typed_header::TypedHeaderRejection;
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;

use huddle_core::Principal;
use huddle_types::api::Claims;

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, blocking};

/// Validate the bearer JWT issued by the identity service, record the user
/// locally, and attach a [`Principal`] for the handlers.
pub async fn require_auth(
    State(state): State<AppState>,
    header: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> ApiResult<Response> {
    let TypedHeader(Authorization(bearer)) =
        header.map_err(|_| ApiError::unauthorized("missing bearer token"))?;

    let claims = decode::<Claims>(
        bearer.token(),
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        debug!("Rejected token: {}", e);
        ApiError::unauthorized("invalid or expired token")
    })?
    .claims;

    let principal = Principal::new(claims.sub, claims.username.clone(), &claims.roles);

    let db = state.db.clone();
    let roles = principal.roles.clone();
    blocking(move || {
        let display_name = claims.display_name.as_deref().unwrap_or(&claims.username);
        db.upsert_user(&claims.sub.to_string(), &claims.username, display_name, &roles)?;
        Ok(())
    })
    .await?;

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}
