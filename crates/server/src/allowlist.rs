//! IP allow-list middleware for `/api/v1/chat` (`spec.md` §6 `ALLOWED_OWUI_INSTANCES`).
//!
//! Client-IP extraction is carried over verbatim from the gateway workspace's
//! `crates/server/src/rate_limit.rs` `extract_client_ip`; matching against the
//! configured entries uses `fast-glob` so an operator can list either literal
//! IPs or glob patterns (`10.0.0.*`) in the same field.

use std::{
    fmt::Display,
    future::Future,
    net::{IpAddr, SocketAddr},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{body::Body, extract::ConnectInfo};
use config::ClientIpConfig;
use http::{Request, Response, StatusCode};
use tower::Layer;

#[derive(Clone)]
pub struct AllowlistLayer {
    client_ip: ClientIpConfig,
    allowed: Arc<Vec<String>>,
}

impl AllowlistLayer {
    /// An empty `allowed` list disables the check — every client is accepted.
    pub fn new(client_ip: ClientIpConfig, allowed: Vec<String>) -> Self {
        Self { client_ip, allowed: Arc::new(allowed) }
    }
}

impl<Service> Layer<Service> for AllowlistLayer
where
    Service: Send + Clone,
{
    type Service = AllowlistService<Service>;

    fn layer(&self, next: Service) -> Self::Service {
        AllowlistService { next, layer: self.clone() }
    }
}

#[derive(Clone)]
pub struct AllowlistService<Service> {
    next: Service,
    layer: AllowlistLayer,
}

impl<Service, ReqBody> tower::Service<Request<ReqBody>> for AllowlistService<Service>
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

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let mut next = self.next.clone();

        if self.layer.allowed.is_empty() {
            return Box::pin(async move { next.call(req).await });
        }

        let ip = extract_client_ip(&self.layer.client_ip, &req);
        let allowed = self.layer.allowed.clone();

        Box::pin(async move {
            let ip_str = ip.to_string();
            if allowed.iter().any(|pattern| fast_glob::glob_match(pattern, &ip_str)) {
                next.call(req).await
            } else {
                log::warn!("rejecting chat request from disallowed peer {ip_str}");
                Ok(Response::builder()
                    .status(StatusCode::FORBIDDEN)
                    .header("Content-Type", "application/json")
                    .body(Body::from(r#"{"error":{"message":"client not allowed","type":"auth_denied"}}"#))
                    .unwrap())
            }
        })
    }
}

fn extract_client_ip<B>(config: &ClientIpConfig, req: &Request<B>) -> IpAddr {
    if config.x_real_ip
        && let Some(ip) = req.headers().get("x-real-ip").and_then(|v| v.to_str().ok()).and_then(|s| s.trim().parse().ok())
    {
        return ip;
    }

    if let Some(hops) = config.x_forwarded_for_trusted_hops
        && let Some(ip) = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').rev().nth(hops))
            .and_then(|s| s.trim().parse().ok())
    {
        return ip;
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .expect("axum always provides the client SocketAddr when bound with into_make_service_with_connect_info")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_ip_matches_itself() {
        assert!(fast_glob::glob_match("127.0.0.1", "127.0.0.1"));
        assert!(!fast_glob::glob_match("127.0.0.1", "127.0.0.2"));
    }

    #[test]
    fn glob_pattern_matches_a_subnet_prefix() {
        assert!(fast_glob::glob_match("10.0.0.*", "10.0.0.42"));
        assert!(!fast_glob::glob_match("10.0.0.*", "10.0.1.42"));
    }
}
