//! JWT authentication helpers and extractors.
//!
//! Tokens are issued by the platform's auth service and carry the user's
//! UUID and role. `AuthUser` accepts any valid token; `StaffUser` further
//! requires the admin or moderator role.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use careerak_common::error::AppError;
use careerak_common::types::Role;
use careerak_engine::preferences::PreferenceScope;

use crate::state::AppState;

/// JWT claims stored in the token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject: the user's UUID
    pub sub: String,
    pub role: Role,
    /// Expiration time (UNIX timestamp)
    pub exp: i64,
    /// Issued at (UNIX timestamp)
    pub iat: i64,
}

/// Authenticated user extracted from JWT token.
///
/// Use as an Axum extractor on protected routes:
/// ```ignore
/// async fn handler(auth: AuthUser) -> impl IntoResponse {
///     // auth.user_id is the authenticated user's UUID
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
    pub claims: Claims,
}

/// Authenticated admin or moderator.
#[derive(Debug, Clone)]
pub struct StaffUser(pub AuthUser);

/// An authenticated caller and the preference scope its routes manage.
pub trait ScopedUser: FromRequestParts<AppState, Rejection = AppError> + Send {
    const SCOPE: PreferenceScope;

    fn user_id(&self) -> Uuid;
}

impl ScopedUser for AuthUser {
    const SCOPE: PreferenceScope = PreferenceScope::User;

    fn user_id(&self) -> Uuid {
        self.user_id
    }
}

impl ScopedUser for StaffUser {
    const SCOPE: PreferenceScope = PreferenceScope::Admin;

    fn user_id(&self) -> Uuid {
        self.0.user_id
    }
}

/// Encode a JWT token for a user.
pub fn encode_jwt(
    user_id: Uuid,
    role: Role,
    secret: &str,
    expiry_hours: u64,
) -> Result<String, AppError> {
    let now = Utc::now();
    let exp = now + Duration::hours(expiry_hours as i64);

    let claims = Claims {
        sub: user_id.to_string(),
        role,
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Auth(format!("Failed to encode JWT: {}", e)))?;

    Ok(token)
}

/// Decode and validate a JWT token.
pub fn decode_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::Auth(format!("Invalid token: {}", e)))?;

    Ok(token_data.claims)
}

/// Extracts and validates the JWT from the `Authorization: Bearer <token>` header.
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let secret = state.config.jwt_secret.clone();

        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        async move {
            let token = auth_header
                .as_deref()
                .and_then(|auth| auth.strip_prefix("Bearer "))
                .ok_or_else(|| {
                    AppError::Auth(
                        "Missing or invalid Authorization header. Use 'Bearer <JWT>'".to_string(),
                    )
                })?;

            let claims = decode_jwt(token, &secret)?;
            let user_id = Uuid::parse_str(&claims.sub)
                .map_err(|_| AppError::Auth("Invalid user ID in token".to_string()))?;

            Ok(AuthUser {
                user_id,
                role: claims.role,
                claims,
            })
        }
    }
}

impl FromRequestParts<AppState> for StaffUser {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let auth = AuthUser::from_request_parts(parts, state);

        async move {
            let user = auth.await?;
            if !user.role.is_staff() {
                return Err(AppError::Forbidden(
                    "Admin or moderator role required".to_string(),
                ));
            }
            Ok(StaffUser(user))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "test-secret-key-for-unit-tests";

    #[test]
    fn test_encode_decode_jwt() {
        let user_id = Uuid::new_v4();
        let token = encode_jwt(user_id, Role::Moderator, TEST_SECRET, 24).unwrap();
        let claims = decode_jwt(&token, TEST_SECRET).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.role, Role::Moderator);
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn test_invalid_secret_rejected() {
        let user_id = Uuid::new_v4();
        let token = encode_jwt(user_id, Role::Admin, TEST_SECRET, 24).unwrap();
        let result = decode_jwt(&token, "wrong-secret");
        assert!(result.is_err());
    }

    #[test]
    fn test_expired_jwt_rejected() {
        let user_id = Uuid::new_v4();
        // Create a token that expired 1 hour ago
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            role: Role::JobSeeker,
            exp: (now - Duration::hours(1)).timestamp(),
            iat: (now - Duration::hours(2)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap();

        let result = decode_jwt(&token, TEST_SECRET);
        assert!(matches!(result, Err(AppError::Auth(_))));
    }

    #[test]
    fn test_unknown_role_rejected() {
        #[derive(Serialize)]
        struct RawClaims {
            sub: String,
            role: &'static str,
            exp: i64,
            iat: i64,
        }

        let now = Utc::now();
        let token = encode(
            &Header::default(),
            &RawClaims {
                sub: Uuid::new_v4().to_string(),
                role: "superuser",
                exp: (now + Duration::hours(1)).timestamp(),
                iat: now.timestamp(),
            },
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap();

        assert!(decode_jwt(&token, TEST_SECRET).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        let result = decode_jwt("not.a.valid.jwt", TEST_SECRET);
        assert!(result.is_err());
    }

    #[test]
    fn test_scopes() {
        assert_eq!(AuthUser::SCOPE, PreferenceScope::User);
        assert_eq!(StaffUser::SCOPE, PreferenceScope::Admin);
    }
}
