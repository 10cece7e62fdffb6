use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use axum_extra::typed_header::TypedHeaderRejectionReason;
use headers::{Authorization, authorization::Bearer};
use uuid::Uuid;

use crate::auth::{Claims, TokenError};
use crate::error::ApiError;
use crate::models::{AppState, Role};

/// Identity of the caller, taken from a verified bearer token. The claims are
/// trusted as-is for the rest of the request; the account is not re-read.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
}

impl AuthContext {
    pub fn is_patient(&self) -> bool {
        self.role == Role::Patient
    }

    pub fn is_doctor(&self) -> bool {
        self.role == Role::Doctor
    }
}

impl From<Claims> for AuthContext {
    fn from(c: Claims) -> Self {
        AuthContext {
            user_id: c.sub,
            username: c.username,
            role: c.role,
        }
    }
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            // Extract Authorization: Bearer <token>
            let TypedHeader(authz): TypedHeader<Authorization<Bearer>> =
                TypedHeader::from_request_parts(parts, state)
                    .await
                    .map_err(|rejection| match rejection.reason() {
                        TypedHeaderRejectionReason::Missing => ApiError::TokenMissing,
                        _ => ApiError::TokenInvalid,
                    })?;

            let claims = state.tokens.verify(authz.token()).map_err(|e| match e {
                TokenError::Expired => ApiError::TokenExpired,
                TokenError::Malformed | TokenError::BadSignature => ApiError::TokenInvalid,
            })?;

            Ok(AuthContext::from(claims))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::Request;
    use chrono::{Duration, Utc};

    use super::*;
    use crate::auth::TokenKeys;
    use crate::store::MemoryStore;

    fn state() -> AppState {
        AppState {
            store: Arc::new(MemoryStore::new()),
            tokens: TokenKeys::new(b"auth-context-secret-auth-context-secret", 24),
        }
    }

    async fn extract(state: &AppState, header: Option<&str>) -> Result<AuthContext, ApiError> {
        let mut builder = Request::builder().uri("/api/appointments");
        if let Some(h) = header {
            builder = builder.header("authorization", h);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        AuthContext::from_request_parts(&mut parts, state).await
    }

    #[tokio::test]
    async fn test_valid_bearer_token() {
        let st = state();
        let id = Uuid::new_v4();
        let issued = st.tokens.issue(id, "drbob", Role::Doctor).unwrap();

        let ctx = extract(&st, Some(&format!("Bearer {}", issued.token)))
            .await
            .unwrap();
        assert_eq!(ctx.user_id, id);
        assert_eq!(ctx.username, "drbob");
        assert!(ctx.is_doctor());
        assert!(!ctx.is_patient());
    }

    #[tokio::test]
    async fn test_missing_header() {
        let err = extract(&state(), None).await.unwrap_err();
        assert!(matches!(err, ApiError::TokenMissing));
    }

    #[tokio::test]
    async fn test_wrong_scheme_is_invalid() {
        let err = extract(&state(), Some("Basic YWxpY2U6cHc="))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::TokenInvalid));
    }

    #[tokio::test]
    async fn test_garbage_token_is_invalid() {
        let err = extract(&state(), Some("Bearer not.a.jwt")).await.unwrap_err();
        assert!(matches!(err, ApiError::TokenInvalid));
    }

    #[tokio::test]
    async fn test_expired_token() {
        let st = state();
        let issued = st
            .tokens
            .issue_at(
                Uuid::new_v4(),
                "alice",
                Role::Patient,
                Utc::now() - Duration::hours(48),
            )
            .unwrap();
        let err = extract(&st, Some(&format!("Bearer {}", issued.token)))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::TokenExpired));
    }
}
