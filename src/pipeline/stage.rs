//! Stage names, the admission error taxonomy and its HTTP mapping.

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::auth::SessionError;
use crate::security::CsrfError;

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Admission stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Tenant,
    IpFilter,
    RateLimit,
    Csrf,
    Session,
    Access,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Tenant => "tenant",
            Stage::IpFilter => "ip_filter",
            Stage::RateLimit => "rate_limit",
            Stage::Csrf => "csrf",
            Stage::Session => "session",
            Stage::Access => "access",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a 403 was returned. Never shown to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForbiddenReason {
    #[error("client address is not allowed")]
    IpBlocked,
    #[error(transparent)]
    Csrf(#[from] CsrfError),
    #[error("user has no access to this tenant")]
    NoAccess,
}

/// Why a 401 was returned. Never shown to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error(transparent)]
    Token(#[from] SessionError),
    #[error("session user no longer exists")]
    UnknownUser,
    #[error("invalid credentials")]
    BadCredentials,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("tenant not found")]
    TenantNotFound,

    #[error("unauthenticated: {0}")]
    Unauthenticated(AuthFailure),

    #[error("forbidden: {0}")]
    Forbidden(ForbiddenReason),

    #[error("rate limited by rule {rule}")]
    RateLimited { rule: String, retry_after: Duration },

    #[error("internal error: {0}")]
    Internal(String),
}

impl AdmissionError {
    pub fn status(&self) -> StatusCode {
        match self {
            AdmissionError::TenantNotFound => StatusCode::NOT_FOUND,
            AdmissionError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AdmissionError::Forbidden(_) => StatusCode::FORBIDDEN,
            AdmissionError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AdmissionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing body. Carries no diagnostics.
    fn public_message(&self) -> &'static str {
        match self {
            AdmissionError::TenantNotFound => "Site not found",
            AdmissionError::Unauthenticated(_) => "Unauthorized",
            AdmissionError::Forbidden(_) => "Forbidden",
            AdmissionError::RateLimited { .. } => "Too many requests",
            AdmissionError::Internal(_) => "Internal server error",
        }
    }
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), self.public_message()).into_response();
        if let AdmissionError::RateLimited { retry_after, .. } = &self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after.as_secs()));
        }
        response
    }
}

/// Rate limit state to report on the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateHeaders {
    pub limit: u32,
    pub remaining: u32,
}

impl RateHeaders {
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
    }
}

/// A terminated admission: the stage that stopped it and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub stage: Stage,
    pub error: AdmissionError,
    pub rate: Option<RateHeaders>,
}

impl Rejection {
    pub fn new(stage: Stage, error: AdmissionError) -> Self {
        Self {
            stage,
            error,
            rate: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.error.status()
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let mut response = self.error.into_response();
        if let Some(rate) = self.rate {
            rate.apply(response.headers_mut());
        }
        response
    }
}
