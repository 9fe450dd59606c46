//! Signed session tokens.
//!
//! # States
//! ```text
//! NoToken ──issue──▶ Valid
//! Token ──validate──▶ Valid | Expired | Malformed | BadSignature | Empty
//! ```
//!
//! Tokens are HS256 JWTs. Only HS256 is accepted on validation; a token whose
//! header announces any other algorithm is rejected before its signature is
//! looked at. Callers outside this module only ever learn "unauthenticated".

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::{ConfigError, SessionConfig};
use crate::tenancy::{Tenant, TenantId, User, UserId};

pub const DEFAULT_EXPIRY_HOURS: u64 = 8;

/// Environment variable that overrides the configured signing secret.
pub const SECRET_ENV: &str = "CAMP_SESSION_SECRET";

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: UserId,
    pub email: String,
    pub site_id: TenantId,
    pub is_global_admin: bool,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session token is empty")]
    Empty,
    #[error("session token is malformed")]
    Malformed,
    #[error("session token signature is invalid")]
    BadSignature,
    /// Outside the `nbf`..`exp` window.
    #[error("session token is expired")]
    Expired,
    #[error("failed to sign session token: {0}")]
    Signing(String),
}

/// Pick the signing secret: environment override first, then configuration.
pub fn resolve_secret(env_value: Option<String>, configured: Option<&str>) -> Result<String, ConfigError> {
    env_value
        .filter(|s| !s.is_empty())
        .or_else(|| configured.filter(|s| !s.is_empty()).map(str::to_string))
        .ok_or(ConfigError::MissingSecret)
}

/// Issues and validates session tokens with a process-wide secret.
pub struct SessionAuthenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    expiry: Duration,
}

impl SessionAuthenticator {
    /// `expiry_hours == 0` falls back to the 8 hour default.
    pub fn new(secret: &[u8], expiry_hours: u64) -> Self {
        let hours = if expiry_hours == 0 { DEFAULT_EXPIRY_HOURS } else { expiry_hours };

        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "nbf"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            expiry: Duration::from_secs(hours.saturating_mul(3600)),
        }
    }

    /// Build from configuration, reading the environment override once.
    pub fn from_config(config: &SessionConfig) -> Result<Self, ConfigError> {
        let secret = resolve_secret(std::env::var(SECRET_ENV).ok(), config.secret.as_deref())?;
        Ok(Self::new(secret.as_bytes(), config.expiry_hours))
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Sign a session for `user` acting on `tenant`.
    pub fn issue(&self, user: &User, tenant: &Tenant) -> Result<String, SessionError> {
        let now = Utc::now();
        let expiry = ChronoDuration::from_std(self.expiry)
            .map_err(|e| SessionError::Signing(e.to_string()))?;

        let claims = Claims {
            user_id: user.id,
            email: user.email.clone(),
            site_id: tenant.id,
            is_global_admin: user.is_global_admin,
            exp: (now + expiry).timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
        };

        encode(&Header::new(ALGORITHM), &claims, &self.encoding)
            .map_err(|e| SessionError::Signing(e.to_string()))
    }

    pub fn validate(&self, token: &str) -> Result<Claims, SessionError> {
        if token.is_empty() {
            return Err(SessionError::Empty);
        }

        let header = decode_header(token).map_err(|_| SessionError::Malformed)?;
        if header.alg != ALGORITHM {
            tracing::debug!(alg = ?header.alg, "Session token with unexpected algorithm rejected");
            return Err(SessionError::BadSignature);
        }

        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => SessionError::Expired,
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => SessionError::BadSignature,
                _ => SessionError::Malformed,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret";

    fn user(id: i64, admin: bool) -> User {
        User {
            id: UserId(id),
            email: "camper@example.org".into(),
            password_hash: String::new(),
            is_global_admin: admin,
        }
    }

    fn tenant(id: i64) -> Tenant {
        Tenant {
            id: TenantId(id),
            subdomain: "camp".into(),
            custom_domain: None,
            owner_user_id: UserId(99),
            allowed_ips: Vec::new(),
        }
    }

    fn sign(claims: &Claims, alg: Algorithm, secret: &[u8]) -> String {
        encode(&Header::new(alg), claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    #[test]
    fn test_issue_validate_round_trip() {
        let auth = SessionAuthenticator::new(SECRET, 0);
        let token = auth.issue(&user(1, false), &tenant(5)).unwrap();

        let claims = auth.validate(&token).unwrap();
        assert_eq!(claims.user_id, UserId(1));
        assert_eq!(claims.site_id, TenantId(5));
        assert!(!claims.is_global_admin);
        assert_eq!(claims.exp - claims.iat, 8 * 3600);
        assert_eq!(claims.nbf, claims.iat);
    }

    #[test]
    fn test_claims_json_shape() {
        let auth = SessionAuthenticator::new(SECRET, 1);
        let token = auth.issue(&user(1, true), &tenant(5)).unwrap();
        let claims = auth.validate(&token).unwrap();

        let json = serde_json::to_value(&claims).unwrap();
        for key in ["user_id", "email", "site_id", "is_global_admin", "exp", "iat", "nbf"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["site_id"], 5);
    }

    #[test]
    fn test_empty_and_malformed() {
        let auth = SessionAuthenticator::new(SECRET, 8);
        assert_eq!(auth.validate(""), Err(SessionError::Empty));
        assert_eq!(auth.validate("not.a.jwt"), Err(SessionError::Malformed));
        assert_eq!(auth.validate("garbage"), Err(SessionError::Malformed));
    }

    #[test]
    fn test_wrong_secret_is_bad_signature() {
        let issuer = SessionAuthenticator::new(b"other-secret", 8);
        let token = issuer.issue(&user(1, false), &tenant(5)).unwrap();

        let auth = SessionAuthenticator::new(SECRET, 8);
        assert_eq!(auth.validate(&token), Err(SessionError::BadSignature));
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let now = Utc::now().timestamp();
        let claims = Claims {
            user_id: UserId(1),
            email: "a@example.org".into(),
            site_id: TenantId(5),
            is_global_admin: true,
            exp: now + 3600,
            iat: now,
            nbf: now,
        };
        let token = sign(&claims, Algorithm::HS384, SECRET);

        let auth = SessionAuthenticator::new(SECRET, 8);
        assert_eq!(auth.validate(&token), Err(SessionError::BadSignature));
    }

    #[test]
    fn test_expired_and_not_yet_valid() {
        let auth = SessionAuthenticator::new(SECRET, 8);
        let now = Utc::now().timestamp();
        let mut claims = Claims {
            user_id: UserId(1),
            email: "a@example.org".into(),
            site_id: TenantId(5),
            is_global_admin: false,
            exp: now - 10,
            iat: now - 3600,
            nbf: now - 3600,
        };
        assert_eq!(
            auth.validate(&sign(&claims, Algorithm::HS256, SECRET)),
            Err(SessionError::Expired)
        );

        claims.exp = now + 7200;
        claims.nbf = now + 3600;
        assert_eq!(
            auth.validate(&sign(&claims, Algorithm::HS256, SECRET)),
            Err(SessionError::Expired)
        );
    }

    #[test]
    fn test_secret_precedence() {
        assert_eq!(
            resolve_secret(Some("from-env".into()), Some("from-config")).unwrap(),
            "from-env"
        );
        assert_eq!(resolve_secret(None, Some("from-config")).unwrap(), "from-config");
        assert_eq!(resolve_secret(Some(String::new()), Some("from-config")).unwrap(), "from-config");
        assert!(matches!(resolve_secret(None, None), Err(ConfigError::MissingSecret)));
        assert!(matches!(resolve_secret(None, Some("")), Err(ConfigError::MissingSecret)));
    }
}
