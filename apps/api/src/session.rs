use std::convert::Infallible;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::errors::AppError;

/// Header the dashboard sets once the auth provider has signed the user in.
pub const USER_HEADER: &str = "x-user-id";

/// The caller's authentication session. Authentication itself happens in the
/// hosted auth provider; this only carries the resulting user id, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    user_id: Option<String>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_user(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let user_id = user_id.trim();
        Self {
            user_id: (!user_id.is_empty()).then(|| user_id.to_string()),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn require_user(&self) -> Result<&str, AppError> {
        self.user_id().ok_or(AppError::Unauthenticated)
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Session {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(Session::for_user)
            .unwrap_or_else(Session::anonymous))
    }
}
