use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::db::models::UserId;
use crate::error::AppError;
use crate::state::AppState;

/// Header set by the upstream auth proxy once it has verified the session.
pub const USER_HEADER: &str = "x-user-id";

/// Represents the currently authenticated user.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: UserId,
}

/// Extractor that requires authentication.
/// Returns 401 if the proxy did not identify a user.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        extract_user_id(parts)
            .map(|id| CurrentUser { id })
            .ok_or(AppError::Unauthorized)
    }
}

/// Optional user extractor: returns None instead of 401 when anonymous.
pub struct MaybeUser(pub Option<CurrentUser>);

impl MaybeUser {
    pub fn id(&self) -> Option<&UserId> {
        self.0.as_ref().map(|user| &user.id)
    }
}

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            extract_user_id(parts).map(|id| CurrentUser { id }),
        ))
    }
}

fn extract_user_id(parts: &Parts) -> Option<UserId> {
    parts
        .headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(UserId::new)
}
