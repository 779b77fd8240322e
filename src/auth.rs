//! Bearer-token authentication.
//!
//! Sessions are owned by the external auth provider; this service only
//! verifies the HS256 access tokens it issues and reads the user id from `sub`.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::app_state::{AppState, AuthSettings};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

pub fn verify_token(token: &str, settings: &AuthSettings) -> Result<AuthUser, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    match &settings.audience {
        Some(aud) => validation.set_audience(&[aud]),
        None => validation.validate_aud = false,
    }

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(settings.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "Rejected bearer token");
        AppError::Unauthorized
    })?;

    if data.claims.sub.is_empty() {
        return Err(AppError::Unauthorized);
    }

    Ok(AuthUser {
        user_id: data.claims.sub,
    })
}

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AppError::Unauthorized)?;

        let state = AppState::from_ref(state);
        verify_token(token, &state.auth)
    }
}
