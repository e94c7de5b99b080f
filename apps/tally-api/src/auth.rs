//! JWT identity module.
//!
//! Turns a bearer token into a [`Principal`]. Tokens are HS256 with claims
//! `{ sub, role, exp, iss? }`; issuing them is some other system's job, the
//! `issue` helper exists for tooling and tests.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tally_core::{AuthError, IdentityProvider, Principal, Role};

use crate::error::ApiError;
use crate::AppState;

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,

    pub role: Role,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// HS256 identity provider.
pub struct JwtIdentityProvider {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: Option<String>,
}

impl JwtIdentityProvider {
    pub fn new(secret: &str, issuer: Option<String>) -> Self {
        let mut validation = Validation::default();
        if let Some(iss) = &issuer {
            validation.set_issuer(&[iss]);
        }
        JwtIdentityProvider {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer,
        }
    }

    /// Signs a token for `principal` valid for `lifetime`.
    pub fn issue(&self, principal: &Principal, lifetime: Duration) -> Result<String, AuthError> {
        let claims = Claims {
            sub: principal.user_id.clone(),
            role: principal.role,
            exp: (Utc::now() + lifetime).timestamp(),
            iss: self.issuer.clone(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::Unauthenticated(format!("Failed to sign token: {}", e)))
    }
}

impl IdentityProvider for JwtIdentityProvider {
    fn principal(&self, token: &str) -> Result<Principal, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| AuthError::Unauthenticated(format!("Invalid token: {}", e)))?;
        if data.claims.sub.trim().is_empty() {
            return Err(AuthError::Unauthenticated("Token has no subject".to_string()));
        }
        Ok(Principal::new(data.claims.sub, data.claims.role))
    }
}

/// Extract bearer token from authorization header.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// The authenticated caller of a handler.
#[derive(Debug, Clone)]
pub struct Caller(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AuthError::Unauthenticated("Missing Authorization header".to_string()))?;
        let token = extract_bearer_token(header)
            .ok_or_else(|| AuthError::Unauthenticated("Expected a Bearer token".to_string()))?;
        Ok(Caller(state.identity.principal(token)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_roundtrip() {
        let provider = JwtIdentityProvider::new("test-secret", None);
        let token = provider
            .issue(&Principal::new("inspector-7", Role::Inspector), Duration::hours(1))
            .unwrap();

        let principal = provider.principal(&token).unwrap();
        assert_eq!(principal.user_id, "inspector-7");
        assert_eq!(principal.role, Role::Inspector);
    }

    #[test]
    fn test_wrong_secret_is_unauthenticated() {
        let issuer = JwtIdentityProvider::new("one-secret", None);
        let verifier = JwtIdentityProvider::new("another-secret", None);
        let token = issuer
            .issue(&Principal::new("cashier-1", Role::Cashier), Duration::hours(1))
            .unwrap();

        assert!(matches!(
            verifier.principal(&token),
            Err(AuthError::Unauthenticated(_))
        ));
    }

    #[test]
    fn test_expired_token() {
        let provider = JwtIdentityProvider::new("test-secret", None);
        let token = provider
            .issue(&Principal::new("manager-1", Role::Manager), Duration::hours(-2))
            .unwrap();
        assert!(provider.principal(&token).is_err());
    }

    #[test]
    fn test_issuer_is_checked() {
        let ours = JwtIdentityProvider::new("test-secret", Some("tally-auth".to_string()));
        let theirs = JwtIdentityProvider::new("test-secret", Some("elsewhere".to_string()));
        let token = theirs
            .issue(&Principal::new("manager-1", Role::Manager), Duration::hours(1))
            .unwrap();

        assert!(ours.principal(&token).is_err());
        let own = ours
            .issue(&Principal::new("manager-1", Role::Manager), Duration::hours(1))
            .unwrap();
        assert!(ours.principal(&own).is_ok());
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(extract_bearer_token("Bearer "), None);
        assert_eq!(extract_bearer_token("Basic dXNlcg=="), None);
    }
}
