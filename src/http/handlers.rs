//! Route handlers behind the admission layer.
//!
//! Handlers read the typed `RequestContext` admission left in the request
//! extensions. A handler that finds no context answers 500: it was mounted
//! without the admission middleware.

use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

use crate::auth::{AccessError, AccessGrant};
use crate::http::cookies::{clear_cookie, session_cookie};
use crate::pipeline::{AdmissionError, AuthFailure, ForbiddenReason, RequestContext, RequestPipeline};
use crate::tenancy::{DirectoryError, Tenant, TenantId, UserId};

/// Errors a handler can return on top of the admission taxonomy.
#[derive(Debug)]
pub enum HandlerError {
    BadRequest,
    Admission(AdmissionError),
}

impl From<AdmissionError> for HandlerError {
    fn from(e: AdmissionError) -> Self {
        HandlerError::Admission(e)
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        match self {
            HandlerError::BadRequest => (StatusCode::BAD_REQUEST, "Bad request").into_response(),
            HandlerError::Admission(e) => {
                if let AdmissionError::Internal(reason) = &e {
                    tracing::error!(error = %reason, "Handler failed");
                }
                e.into_response()
            }
        }
    }
}

fn context(request: &Request) -> Result<RequestContext, AdmissionError> {
    request
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .ok_or_else(|| AdmissionError::Internal("request context missing".into()))
}

fn effective_tenant(ctx: &RequestContext) -> Result<Arc<Tenant>, AdmissionError> {
    ctx.tenant
        .clone()
        .ok_or_else(|| AdmissionError::Internal("tenant missing from request context".into()))
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    /// Accepts a JSON object or a url-encoded form.
    fn parse(body: &[u8], json: bool) -> Option<Self> {
        if json {
            return serde_json::from_slice(body).ok();
        }

        let mut email = None;
        let mut password = None;
        for (key, value) in url::form_urlencoded::parse(body) {
            match key.as_ref() {
                "email" => email = Some(value.into_owned()),
                "password" => password = Some(value.into_owned()),
                _ => {}
            }
        }
        Some(Self {
            email: email?,
            password: password?,
        })
    }
}

/// Hash verified against when the email is unknown, so both paths cost a
/// bcrypt round.
fn dummy_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY
        .get_or_init(|| bcrypt::hash("camp-gate-unknown-user", bcrypt::DEFAULT_COST).unwrap_or_default())
        .as_str()
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: UserId,
    pub site_id: TenantId,
    pub grant: AccessGrant,
}

pub async fn login(State(pipeline): State<Arc<RequestPipeline>>, request: Request) -> Response {
    match login_inner(&pipeline, request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn login_inner(pipeline: &RequestPipeline, request: Request) -> Result<Response, HandlerError> {
    let ctx = context(&request)?;
    let tenant = effective_tenant(&ctx)?;

    let json = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    let body = to_bytes(request.into_body(), pipeline.max_body_size())
        .await
        .map_err(|_| HandlerError::BadRequest)?;
    let credentials = Credentials::parse(&body, json).ok_or(HandlerError::BadRequest)?;

    let bad_credentials = || AdmissionError::Unauthenticated(AuthFailure::BadCredentials);

    let user = match pipeline.users().find_by_email(&credentials.email).await {
        Ok(user) => Some(user),
        Err(DirectoryError::NotFound) => None,
        Err(e) => return Err(AdmissionError::Internal(e.to_string()).into()),
    };

    // Unknown emails still pay for a bcrypt verification.
    let hash = match &user {
        Some(user) => user.password_hash.clone(),
        None => dummy_hash().to_string(),
    };
    let password = credentials.password;
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AdmissionError::Internal(e.to_string()))?;

    let Some(user) = user else {
        tracing::debug!(request_id = %ctx.request_id, "Login for unknown email");
        return Err(bad_credentials().into());
    };
    match verified {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(request_id = %ctx.request_id, user_id = %user.id, "Login with wrong password");
            return Err(bad_credentials().into());
        }
        Err(e) => {
            tracing::warn!(request_id = %ctx.request_id, user_id = %user.id, error = %e, "Stored password hash unusable");
            return Err(bad_credentials().into());
        }
    }

    let grant = pipeline.access().authorize(&user, &tenant).await.map_err(|e| match e {
        AccessError::Forbidden => AdmissionError::Forbidden(ForbiddenReason::NoAccess),
        AccessError::Directory(e) => AdmissionError::Internal(e.to_string()),
    })?;

    let token = pipeline
        .session()
        .issue(&user, &tenant)
        .map_err(|e| AdmissionError::Internal(e.to_string()))?;
    let cookie = session_cookie(
        pipeline.session_cookie_name(),
        &token,
        pipeline.session().expiry(),
        pipeline.secure_cookies(),
    );

    tracing::info!(
        request_id = %ctx.request_id,
        user_id = %user.id,
        tenant_id = %tenant.id,
        "User logged in"
    );

    let body = LoginResponse {
        user_id: user.id,
        site_id: tenant.id,
        grant,
    };
    Ok(([(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

pub async fn logout(State(pipeline): State<Arc<RequestPipeline>>, request: Request) -> Response {
    if let Ok(ctx) = context(&request) {
        tracing::info!(
            request_id = %ctx.request_id,
            user_id = ?ctx.user.as_ref().map(|u| u.id),
            "User logged out"
        );
    }
    let cookie = clear_cookie(pipeline.session_cookie_name(), pipeline.secure_cookies());
    (StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]).into_response()
}

#[derive(Debug, Serialize)]
pub struct TenantSummary {
    pub id: TenantId,
    pub subdomain: String,
    pub custom_domain: Option<String>,
}

impl From<&Tenant> for TenantSummary {
    fn from(t: &Tenant) -> Self {
        Self {
            id: t.id,
            subdomain: t.subdomain.clone(),
            custom_domain: t.custom_domain.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: UserId,
    pub email: String,
    pub is_global_admin: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub request_id: String,
    pub tenant: TenantSummary,
    pub host_tenant_id: Option<TenantId>,
    pub user: Option<UserSummary>,
    pub grant: Option<AccessGrant>,
    pub expires_at: Option<i64>,
    pub csrf_token: Option<String>,
}

/// The effective tenant and caller, as admission saw them.
pub async fn session_info(request: Request) -> Result<Json<SessionInfo>, HandlerError> {
    let ctx = context(&request)?;
    let tenant = effective_tenant(&ctx)?;

    Ok(Json(SessionInfo {
        request_id: ctx.request_id.clone(),
        tenant: TenantSummary::from(tenant.as_ref()),
        host_tenant_id: ctx.host_tenant.as_ref().map(|t| t.id),
        user: ctx.user.as_ref().map(|u| UserSummary {
            id: u.id,
            email: u.email.clone(),
            is_global_admin: u.is_global_admin,
        }),
        grant: ctx.grant,
        expires_at: ctx.claims.as_ref().map(|c| c.exp),
        csrf_token: ctx.csrf_token.clone(),
    }))
}

#[derive(Debug, Serialize)]
pub struct SitePage {
    pub site: String,
    pub path: String,
    pub user_id: Option<UserId>,
}

/// Stand-in for the content renderer mounted behind admission.
pub async fn site_page(request: Request) -> Result<Json<SitePage>, HandlerError> {
    let ctx = context(&request)?;
    let tenant = effective_tenant(&ctx)?;

    Ok(Json(SitePage {
        site: tenant.subdomain.clone(),
        path: request.uri().path().to_string(),
        user_id: ctx.user.as_ref().map(|u| u.id),
    }))
}

pub async fn health() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize)]
pub struct GateStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub base_domain: String,
    pub cached_hosts: usize,
    pub rate_buckets: usize,
    pub blocklist_entries: usize,
}

pub async fn status(State(pipeline): State<Arc<RequestPipeline>>) -> Json<GateStatus> {
    Json(GateStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        base_domain: pipeline.resolver().base_domain().to_string(),
        cached_hosts: pipeline.resolver().cached_hosts(),
        rate_buckets: pipeline.rate_limits().bucket_count(),
        blocklist_entries: pipeline.ip_filter().blocklist_len(),
    })
}
