//! Identity supplied by the upstream gateway.
//!
//! The relay does not verify credentials. The gateway in front of it
//! authenticates the caller and forwards the resulting user identifier in
//! the [`USER_ID_HEADER`] header, which is trusted as-is.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use courier_shared::UserId;

use crate::error::ServerError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller of an API request.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| UserId::new(v))
            .map(AuthUser)
            .ok_or(ServerError::Unauthorized)
    }
}
