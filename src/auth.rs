//! Session-token verification.
//!
//! Sign-in itself is handled by the platform's OAuth flow, which issues an
//! HS256 session token; this service only verifies tokens and extracts the
//! caller's identity. Admin rights ride along in the `role` claim.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::ApiError;
use crate::AppState;

/// Claims carried by every session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// The user's internal database id.
    pub sub: i64,
    /// Role name: "user" or "admin".
    pub role: String,
    /// Expiration (UTC Unix timestamp).
    pub exp: i64,
    /// Issued-at (UTC Unix timestamp).
    pub iat: i64,
}

#[derive(Clone)]
pub struct JwtConfig {
    secret: String,
}

/// Session lifetime: 7 days.
const SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;

impl JwtConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let secret =
            std::env::var("JWT_SECRET").map_err(|_| anyhow::anyhow!("JWT_SECRET not set"))?;
        if secret.is_empty() {
            anyhow::bail!("JWT_SECRET must not be empty");
        }
        Ok(Self { secret })
    }

    #[cfg(test)]
    fn for_tests() -> Self {
        Self {
            secret: "test-secret".to_string(),
        }
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Issue a session token. Used by the platform's sign-in callback (out of
/// process) and by integration tooling.
#[allow(dead_code)]
pub fn generate_token(user_id: i64, role: &str, config: &JwtConfig) -> anyhow::Result<String> {
    let now = now_unix();
    let claims = Claims {
        sub: user_id,
        role: role.to_string(),
        exp: now + SESSION_TTL_SECS,
        iat: now,
    };

    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )?)
}

pub fn validate_token(token: &str, config: &JwtConfig) -> anyhow::Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

/// Authenticated caller, extracted from the `Authorization: Bearer` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }

    /// Gate for vocabulary mutations.
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("admin role required".to_string()))
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".into()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthorized("Expected: Bearer <token>".into()))?;

        let claims = validate_token(token, &state.jwt)
            .map_err(|_| ApiError::Unauthorized("Invalid or expired token".into()))?;

        Ok(AuthUser {
            user_id: claims.sub,
            role: claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip() {
        let config = JwtConfig::for_tests();
        let token = generate_token(42, "admin", &config).unwrap();
        let claims = validate_token(&token, &config).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.role, "admin");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = generate_token(1, "user", &JwtConfig::for_tests()).unwrap();
        let other = JwtConfig {
            secret: "different".to_string(),
        };
        assert!(validate_token(&token, &other).is_err());
    }

    #[test]
    fn admin_gate() {
        let admin = AuthUser {
            user_id: 1,
            role: "admin".into(),
        };
        let user = AuthUser {
            user_id: 2,
            role: "user".into(),
        };
        assert!(admin.require_admin().is_ok());
        assert!(user.require_admin().is_err());
    }
}
