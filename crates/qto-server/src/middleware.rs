// SPDX-License-Identifier: MIT OR Apache-2.0
//! Middleware stack: request ids, structured request logging, per-IP rate
//! limiting, CORS.

use crate::error::ApiError;
use axum::body::Body;
use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

/// Unique request identifier, available as an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub Uuid);

/// Attach a [`RequestId`] to the request and echo it as `x-request-id`.
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let id = RequestId(Uuid::new_v4());
    req.extensions_mut().insert(id);
    let mut resp = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id.0.to_string()) {
        resp.headers_mut().insert("x-request-id", value);
    }
    resp
}

/// Log method, path, status, and duration for every request.
pub async fn request_logger(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let start = Instant::now();

    let resp = next.run(req).await;

    info!(
        http.method = %method,
        http.path = %path,
        http.status = resp.status().as_u16(),
        http.duration_ms = start.elapsed().as_millis() as u64,
        "request completed"
    );
    resp
}

/// Permissive CORS for browser clients; credentials ride in headers, not
/// cookies.
pub fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods(AllowMethods::any())
        .allow_headers(AllowHeaders::any())
}

// ---------------------------------------------------------------------------
// RateLimiter
// ---------------------------------------------------------------------------

/// In-memory sliding-window rate limiter, one window per client IP.
///
/// A single-process map suffices here for the same reason the broker does:
/// the deployment model is single-writer. A multi-process front needs a
/// shared counter store instead.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    /// Create a limiter admitting `max_requests` per `window` per client.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    /// Record one request from `client`.
    ///
    /// Returns `Err(retry_after_secs)` when the window is exhausted; the
    /// rejected request is not recorded, so the window drains on its own.
    pub async fn check(&self, client: &str) -> Result<(), u64> {
        let now = Instant::now();
        let mut guard = self.inner.lock().await;
        let timestamps = guard.entry(client.to_string()).or_default();

        // Expire timestamps that fell out of the window.
        while let Some(&front) = timestamps.front() {
            if now.duration_since(front) > self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() as u32 >= self.max_requests {
            let retry_after = timestamps
                .front()
                .map(|&front| {
                    self.window
                        .saturating_sub(now.duration_since(front))
                        .as_secs()
                })
                .unwrap_or_else(|| self.window.as_secs())
                .max(1);
            return Err(retry_after);
        }

        timestamps.push_back(now);
        Ok(())
    }

    /// Create a Tower [`Layer`](tower::Layer) from this limiter.
    pub fn into_layer(self) -> RateLimiterLayer {
        RateLimiterLayer(self)
    }
}

/// Resolve the client identity of a request.
///
/// Proxy headers win (`X-Forwarded-For` first entry, then `X-Real-IP`),
/// then the peer address recorded by the listener. Requests that carry
/// none of these share one bucket.
fn client_ip(req: &Request<Body>) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = req.headers().get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if !real_ip.trim().is_empty() {
            return real_ip.trim().to_string();
        }
    }
    if let Some(connect) = req
        .extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
    {
        return connect.0.ip().to_string();
    }
    "unknown".to_string()
}

/// Tower [`Layer`] that wraps services with [`RateLimiter`] enforcement.
#[derive(Clone)]
pub struct RateLimiterLayer(RateLimiter);

impl<S: Clone> tower::Layer<S> for RateLimiterLayer {
    type Service = RateLimiterService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimiterService {
            limiter: self.0.clone(),
            inner,
        }
    }
}

/// Tower [`Service`] that enforces the rate limit before forwarding to the
/// inner service.
#[derive(Clone)]
pub struct RateLimiterService<S> {
    limiter: RateLimiter,
    inner: S,
}

impl<S> tower::Service<Request<Body>> for RateLimiterService<S>
where
    S: tower::Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: IntoResponse,
{
    type Response = Response;
    type Error = S::Error;
    type Future =
        std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let limiter = self.limiter.clone();
        let mut inner = self.inner.clone();
        Box::pin(async move {
            let client = client_ip(&req);
            if let Err(retry_after_secs) = limiter.check(&client).await {
                warn!(client = %client, retry_after_secs, "request rate limited");
                return Ok(ApiError(qto_error::Error::RateLimited { retry_after_secs })
                    .into_response());
            }
            inner.call(req).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_up_to_the_cap_then_rejects() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            limiter.check("10.0.0.1").await.unwrap();
        }
        let retry = limiter.check("10.0.0.1").await.unwrap_err();
        assert!((1..=60).contains(&retry));
    }

    #[tokio::test]
    async fn clients_have_independent_windows() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        limiter.check("10.0.0.1").await.unwrap();
        assert!(limiter.check("10.0.0.1").await.is_err());
        limiter.check("10.0.0.2").await.unwrap();
    }

    #[tokio::test]
    async fn rejected_requests_do_not_extend_the_window() {
        let limiter = RateLimiter::new(2, Duration::from_millis(50));
        limiter.check("c").await.unwrap();
        limiter.check("c").await.unwrap();
        assert!(limiter.check("c").await.is_err());

        // Once the recorded requests age out, the client is admitted again.
        tokio::time::sleep(Duration::from_millis(80)).await;
        limiter.check("c").await.unwrap();
    }

    fn request_with_headers(pairs: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder().uri("/api/v1/jobs");
        for (name, value) in pairs {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn forwarded_for_wins_over_real_ip() {
        let req = request_with_headers(&[
            ("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
            ("x-real-ip", "198.51.100.2"),
        ]);
        assert_eq!(client_ip(&req), "203.0.113.7");
    }

    #[test]
    fn real_ip_used_without_forwarded_for() {
        let req = request_with_headers(&[("x-real-ip", "198.51.100.2")]);
        assert_eq!(client_ip(&req), "198.51.100.2");
    }

    #[test]
    fn bare_request_shares_the_unknown_bucket() {
        let req = request_with_headers(&[]);
        assert_eq!(client_ip(&req), "unknown");
    }
}
