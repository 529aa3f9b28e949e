//! Bearer Token Authentication
//!
//! Tokens are issued by the hosted auth provider and signed with HS256. The
//! server only validates them; refreshing is the client's job, prompted by
//! the `x-session-refresh` header when a token is close to expiry.

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request, header},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use contacts_core::{AuthenticatedUser, CoreError, IdentityProvider, Result, Session, UserId};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

/// Response header set when the session is inside the refresh window
pub const SESSION_REFRESH_HEADER: &str = "x-session-refresh";

const AUDIENCE: &str = "authenticated";

/// JWT claims issued by the auth provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub exp: i64,
    pub aud: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// HS256 JWT validation
pub struct JwtIdentityProvider {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityProvider {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[AUDIENCE]);
        validation.leeway = 0;

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn session(&self, token: &str) -> Result<Session> {
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| CoreError::Auth(e.to_string()))?;
        let claims = data.claims;

        let id = UserId::parse(&claims.sub)
            .map_err(|_| CoreError::Auth("subject is not a user id".into()))?;
        let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0)
            .ok_or_else(|| CoreError::Auth("expiry out of range".into()))?;

        Ok(Session::new(
            AuthenticatedUser {
                id,
                email: claims.email,
            },
            expires_at,
        ))
    }
}

/// Require a valid bearer token and put the caller in request extensions
pub async fn require_user(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> std::result::Result<Response, ApiError> {
    let identity = state
        .identity
        .as_ref()
        .ok_or_else(|| ApiError::from(CoreError::Config("AUTH_JWT_SECRET not set".into())))?;

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Missing bearer token"))?;

    let session = identity.session(token).await.map_err(|e| {
        tracing::debug!(error = %e, "Rejected bearer token");
        ApiError::unauthorized("Invalid or expired token")
    })?;

    let now = Utc::now();
    if session.is_expired(now) {
        return Err(ApiError::unauthorized("Invalid or expired token"));
    }
    let refresh = session.needs_refresh(now, state.session_refresh_leeway);

    request.extensions_mut().insert(session.user);
    let mut response = next.run(request).await;

    if refresh {
        response
            .headers_mut()
            .insert(SESSION_REFRESH_HEADER, HeaderValue::from_static("recommended"));
    }

    Ok(response)
}
