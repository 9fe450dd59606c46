//! The admission pipeline and its axum middleware.
//!
//! Stages run in a fixed order and the first rejection ends the request.
//! Every stage returns `Result<_, Rejection>`; there is no shared abort flag.

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, request::Parts, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::auth::{AccessController, AccessError, SessionAuthenticator};
use crate::config::{ConfigError, GateConfig, RoutesConfig, ValidationError};
use crate::http::cookies::cookie_value;
use crate::http::X_REQUEST_ID;
use crate::observability::metrics;
use crate::pipeline::context::RequestContext;
use crate::pipeline::stage::{AdmissionError, AuthFailure, ForbiddenReason, RateHeaders, Rejection, Stage};
use crate::security::csrf::{generate_token, CsrfGuard};
use crate::security::ip_filter::client_ip;
use crate::security::{path_has_prefix, IpFilter, RateLimitRegistry};
use crate::tenancy::{
    DirectoryError, MembershipStore, MemoryDirectory, ResolveError, Tenant, TenantDirectory,
    TenantId, TenantResolver, UserStore,
};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Storage the pipeline reads from.
#[derive(Clone)]
pub struct Collaborators {
    pub tenants: Arc<dyn TenantDirectory>,
    pub users: Arc<dyn UserStore>,
    pub memberships: Arc<dyn MembershipStore>,
}

impl Collaborators {
    pub fn from_memory(directory: Arc<MemoryDirectory>) -> Self {
        Self {
            tenants: directory.clone(),
            users: directory.clone(),
            memberships: directory,
        }
    }
}

/// The request as the stages see it.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionRequest<'a> {
    pub method: &'a Method,
    pub host: &'a str,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub headers: &'a HeaderMap,
    pub peer: Option<SocketAddr>,
    /// Buffered url-encoded body, when the CSRF token may be in it.
    pub form_body: Option<&'a [u8]>,
    pub request_id: &'a str,
}

/// Process-wide admission state. Built once at startup and shared by every
/// request task.
pub struct RequestPipeline {
    resolver: TenantResolver,
    tenants: Arc<dyn TenantDirectory>,
    users: Arc<dyn UserStore>,
    ip_filter: IpFilter,
    rate_limits: Arc<RateLimitRegistry>,
    csrf: CsrfGuard,
    session: SessionAuthenticator,
    access: AccessController,
    routes: RoutesConfig,
    session_cookie: String,
    secure_cookies: bool,
    max_body_size: usize,
}

impl RequestPipeline {
    /// Fails when no signing secret is available or the blocklist does not parse.
    pub fn new(config: &GateConfig, collaborators: Collaborators) -> Result<Self, ConfigError> {
        let session = SessionAuthenticator::from_config(&config.session)?;
        let ip_filter = IpFilter::from_config(&config.ip_filter.global_blocklist).map_err(|e| {
            ConfigError::Validation(vec![ValidationError {
                field: "ip_filter.global_blocklist".to_string(),
                message: e.to_string(),
            }])
        })?;

        Ok(Self {
            resolver: TenantResolver::new(
                collaborators.tenants.clone(),
                config.tenancy.base_domain.clone(),
            ),
            tenants: collaborators.tenants,
            users: collaborators.users,
            ip_filter,
            rate_limits: Arc::new(RateLimitRegistry::from_config(&config.rate_limit)),
            csrf: CsrfGuard::from_config(&config.csrf, config.session.secure_cookies),
            session,
            access: AccessController::new(collaborators.memberships),
            routes: config.routes.clone(),
            session_cookie: config.session.cookie_name.clone(),
            secure_cookies: config.session.secure_cookies,
            max_body_size: config.security.max_body_size,
        })
    }

    pub fn resolver(&self) -> &TenantResolver {
        &self.resolver
    }

    pub fn ip_filter(&self) -> &IpFilter {
        &self.ip_filter
    }

    pub fn rate_limits(&self) -> &Arc<RateLimitRegistry> {
        &self.rate_limits
    }

    pub fn session(&self) -> &SessionAuthenticator {
        &self.session
    }

    pub fn access(&self) -> &AccessController {
        &self.access
    }

    pub fn users(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    pub fn csrf(&self) -> &CsrfGuard {
        &self.csrf
    }

    pub fn session_cookie_name(&self) -> &str {
        &self.session_cookie
    }

    pub fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    /// Paths under a public prefix skip the session and access stages.
    pub fn is_public(&self, path: &str) -> bool {
        self.routes
            .public_paths
            .iter()
            .any(|prefix| path_has_prefix(path, prefix))
    }

    /// Run every stage against a tenant-scoped request.
    pub async fn admit(&self, req: &AdmissionRequest<'_>) -> Result<RequestContext, Rejection> {
        let mut ctx = RequestContext {
            request_id: req.request_id.to_string(),
            ..RequestContext::default()
        };

        match self.run_stages(req, &mut ctx).await {
            Ok(()) => Ok(ctx),
            Err(mut rejection) => {
                if rejection.rate.is_none() {
                    rejection.rate = ctx.rate;
                }
                Err(rejection)
            }
        }
    }

    /// System routes have no tenant: only the global blocklist applies.
    pub fn admit_system(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> Result<Option<IpAddr>, Rejection> {
        let ip = client_ip(headers, peer);
        self.check_ip(ip, None)?;
        Ok(ip)
    }

    async fn run_stages(&self, req: &AdmissionRequest<'_>, ctx: &mut RequestContext) -> Result<(), Rejection> {
        let host_tenant = self.resolve_tenant(req.host).await?;
        ctx.host_tenant = Some(host_tenant.clone());

        ctx.client_ip = client_ip(req.headers, req.peer);
        self.check_ip(ctx.client_ip, Some(&host_tenant))?;

        ctx.rate = self.check_rate(req.path, ctx.client_ip)?;

        self.check_csrf(req)?;

        let effective = match self.resolve_override(req, &host_tenant).await? {
            Some(tenant) => {
                self.check_ip(ctx.client_ip, Some(&tenant))?;
                tenant
            }
            None => host_tenant,
        };

        if self.is_public(req.path) {
            // Public handlers authorize on their own before acting on the tenant.
            ctx.tenant = Some(effective);
            return Ok(());
        }

        let token = cookie_value(req.headers, &self.session_cookie).unwrap_or_default();
        let claims = self.session.validate(token).map_err(|e| {
            Rejection::new(Stage::Session, AdmissionError::Unauthenticated(AuthFailure::Token(e)))
        })?;

        let user = match self.users.find_by_id(claims.user_id).await {
            Ok(user) => user,
            Err(DirectoryError::NotFound) => {
                return Err(Rejection::new(
                    Stage::Session,
                    AdmissionError::Unauthenticated(AuthFailure::UnknownUser),
                ))
            }
            Err(e) => return Err(Rejection::new(Stage::Session, AdmissionError::Internal(e.to_string()))),
        };

        let grant = self.access.authorize(&user, &effective).await.map_err(|e| {
            let error = match e {
                AccessError::Forbidden => AdmissionError::Forbidden(ForbiddenReason::NoAccess),
                AccessError::Directory(e) => AdmissionError::Internal(e.to_string()),
            };
            Rejection::new(Stage::Access, error)
        })?;

        ctx.user = Some(Arc::new(user));
        ctx.claims = Some(claims);
        ctx.grant = Some(grant);
        // Downstream handlers act on the tenant the caller was authorized for.
        ctx.tenant = Some(effective);
        Ok(())
    }

    async fn resolve_tenant(&self, host: &str) -> Result<Arc<Tenant>, Rejection> {
        self.resolver.resolve(host).await.map_err(|e| match e {
            ResolveError::NotFound(_) => Rejection::new(Stage::Tenant, AdmissionError::TenantNotFound),
            ResolveError::Directory(e) => Rejection::new(Stage::Tenant, AdmissionError::Internal(e.to_string())),
        })
    }

    fn check_ip(&self, ip: Option<IpAddr>, tenant: Option<&Tenant>) -> Result<(), Rejection> {
        let allowed = match ip {
            Some(ip) => self.ip_filter.allow(ip, tenant),
            None => self.ip_filter.allow_unknown(tenant),
        };
        if allowed {
            Ok(())
        } else {
            Err(Rejection::new(
                Stage::IpFilter,
                AdmissionError::Forbidden(ForbiddenReason::IpBlocked),
            ))
        }
    }

    fn check_rate(&self, path: &str, ip: Option<IpAddr>) -> Result<Option<RateHeaders>, Rejection> {
        let Some(limiter) = self.rate_limits.for_path(path) else {
            return Ok(None);
        };

        let key = ip.map_or_else(|| "unknown".to_string(), |ip| ip.to_string());
        let decision = limiter.allow(&key);
        let headers = RateHeaders {
            limit: limiter.capacity(),
            remaining: decision.remaining,
        };

        if decision.allowed {
            return Ok(Some(headers));
        }

        metrics::record_rate_limited(limiter.name());
        Err(Rejection {
            stage: Stage::RateLimit,
            error: AdmissionError::RateLimited {
                rule: limiter.name().to_string(),
                retry_after: limiter.interval(),
            },
            rate: Some(headers),
        })
    }

    fn check_csrf(&self, req: &AdmissionRequest<'_>) -> Result<(), Rejection> {
        if !CsrfGuard::requires_check(req.method) {
            return Ok(());
        }

        let cookie = cookie_value(req.headers, self.csrf.cookie_name());
        let echoed = self
            .csrf
            .echoed_header(req.headers)
            .map(str::to_string)
            .or_else(|| req.form_body.and_then(|body| self.csrf.echoed_form_field(body)));

        self.csrf
            .verify(cookie, echoed.as_deref())
            .map_err(|e| Rejection::new(Stage::Csrf, AdmissionError::Forbidden(ForbiddenReason::Csrf(e))))
    }

    /// Look up the tenant named by the override header or query parameter.
    /// Unknown or unparsable ids are indistinguishable from an unknown host.
    async fn resolve_override(
        &self,
        req: &AdmissionRequest<'_>,
        host_tenant: &Arc<Tenant>,
    ) -> Result<Option<Arc<Tenant>>, Rejection> {
        let Some(raw) = self.override_value(req) else {
            return Ok(None);
        };

        let not_found = || Rejection::new(Stage::Tenant, AdmissionError::TenantNotFound);
        let id = raw.trim().parse::<i64>().map(TenantId).map_err(|_| not_found())?;
        if id == host_tenant.id {
            return Ok(None);
        }

        match self.tenants.find_by_id(id).await {
            Ok(tenant) => Ok(Some(Arc::new(tenant))),
            Err(DirectoryError::NotFound) => Err(not_found()),
            Err(e) => Err(Rejection::new(Stage::Tenant, AdmissionError::Internal(e.to_string()))),
        }
    }

    fn override_value(&self, req: &AdmissionRequest<'_>) -> Option<String> {
        let from_header = req
            .headers
            .get(self.routes.override_header.as_str())
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        from_header.or_else(|| {
            req.query.and_then(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .find(|(key, _)| key == self.routes.override_query.as_str())
                    .map(|(_, value)| value.into_owned())
                    .filter(|v| !v.is_empty())
            })
        })
    }

    /// Whether the CSRF token can only be found in the request body.
    fn needs_form_body(&self, method: &Method, headers: &HeaderMap) -> bool {
        CsrfGuard::requires_check(method)
            && self.csrf.echoed_header(headers).is_none()
            && headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|ct| ct.starts_with(FORM_CONTENT_TYPE))
    }
}

fn peer_addr(parts: &Parts) -> Option<SocketAddr> {
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

fn request_host(parts: &Parts) -> String {
    parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| parts.uri.authority().map(|a| a.as_str()))
        .unwrap_or_default()
        .to_string()
}

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn log_rejection(rejection: &Rejection, request_id: &str, host: &str, path: &str) {
    match rejection.status() {
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => tracing::warn!(
            request_id = %request_id,
            host = %host,
            path = %path,
            stage = %rejection.stage,
            reason = %rejection.error,
            "Request rejected"
        ),
        StatusCode::INTERNAL_SERVER_ERROR => tracing::error!(
            request_id = %request_id,
            host = %host,
            path = %path,
            stage = %rejection.stage,
            error = %rejection.error,
            "Admission failed"
        ),
        _ => tracing::debug!(
            request_id = %request_id,
            host = %host,
            path = %path,
            stage = %rejection.stage,
            reason = %rejection.error,
            "Request rejected"
        ),
    }
}

/// Tenant-scoped admission. On success the `RequestContext` is inserted into
/// the request extensions; on rejection the handler never runs.
pub async fn admission_middleware(
    State(pipeline): State<Arc<RequestPipeline>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let (parts, body) = request.into_parts();
    let request_id = request_id(&parts.headers);
    let host = request_host(&parts);

    let (body, form): (Body, Option<Bytes>) = if pipeline.needs_form_body(&parts.method, &parts.headers) {
        match to_bytes(body, pipeline.max_body_size).await {
            Ok(bytes) => (Body::from(bytes.clone()), Some(bytes)),
            Err(e) => {
                tracing::debug!(request_id = %request_id, error = %e, "Failed to buffer form body");
                return (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large").into_response();
            }
        }
    } else {
        (body, None)
    };

    let existing_csrf = cookie_value(&parts.headers, pipeline.csrf.cookie_name()).map(str::to_string);
    let minted_csrf = existing_csrf.is_none().then(generate_token);

    let result = {
        let admission = AdmissionRequest {
            method: &parts.method,
            host: &host,
            path: parts.uri.path(),
            query: parts.uri.query(),
            headers: &parts.headers,
            peer: peer_addr(&parts),
            form_body: form.as_deref(),
            request_id: &request_id,
        };
        pipeline.admit(&admission).await
    };

    let mut response = match result {
        Ok(mut ctx) => {
            ctx.csrf_token = existing_csrf.or_else(|| minted_csrf.clone());
            let rate = ctx.rate;
            tracing::debug!(
                request_id = %request_id,
                tenant_id = ?ctx.tenant.as_ref().map(|t| t.id),
                user_id = ?ctx.user.as_ref().map(|u| u.id),
                "Request admitted"
            );

            let mut request = Request::from_parts(parts, body);
            request.extensions_mut().insert(ctx);
            metrics::record_admission(true, start);

            let mut response = next.run(request).await;
            if let Some(rate) = rate {
                rate.apply(response.headers_mut());
            }
            response
        }
        Err(rejection) => {
            log_rejection(&rejection, &request_id, &host, parts.uri.path());
            metrics::record_rejection(rejection.stage.as_str());
            metrics::record_admission(false, start);
            rejection.into_response()
        }
    };

    if let Some(token) = minted_csrf {
        if let Ok(value) = HeaderValue::from_str(&pipeline.csrf.set_cookie(&token)) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}

/// Guard for the system routes: global blocklist only, no tenant.
pub async fn system_guard(
    State(pipeline): State<Arc<RequestPipeline>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    match pipeline.admit_system(request.headers(), peer) {
        Ok(_) => next.run(request).await,
        Err(rejection) => {
            let request_id = request_id(request.headers());
            log_rejection(&rejection, &request_id, "", request.uri().path());
            metrics::record_rejection(rejection.stage.as_str());
            rejection.into_response()
        }
    }
}
