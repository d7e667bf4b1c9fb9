//! HTTP response caching middleware for axum.
//!
//! Wraps idempotent reads: on a hit the downstream handler never runs and
//! the stored payload is replayed; on a miss the response body is buffered
//! and stored in the background. Cache writes are tracked on a
//! [`TaskTracker`] so a graceful shutdown can drain them instead of losing
//! in-flight writes.

use crate::service::CacheService;
use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::task::TaskTracker;

/// Responses above this size are passed through uncached.
const MAX_CACHEABLE_BODY: usize = 1024 * 1024;

/// Marker header on replayed responses.
const CACHE_HEADER: &str = "x-cache";

/// Caller identity attached to the request by the auth layer.
///
/// Requests without one are cached under the shared `"public"` identity.
#[derive(Clone, Debug)]
pub struct CallerIdentity(pub String);

/// Stored form of a cached response.
///
/// The body is kept as raw bytes so binary payloads (images, compressed
/// JSON) replay exactly as stored.
#[derive(Serialize, Deserialize)]
struct CachedResponse {
    status: u16,
    content_type: Option<String>,
    body: Vec<u8>,
}

/// Custom cache-key function: receives identity, method, path-and-query.
pub type KeyFn = dyn Fn(&str, &str, &str) -> String + Send + Sync;

/// Response cache built on [`CacheService`].
#[derive(Clone)]
pub struct HttpCache {
    cache: CacheService,
    ttl_secs: u64,
    key_fn: Option<Arc<KeyFn>>,
    writes: TaskTracker,
}

impl HttpCache {
    pub fn new(cache: CacheService, ttl_secs: u64) -> Self {
        HttpCache {
            cache,
            ttl_secs,
            key_fn: None,
            writes: TaskTracker::new(),
        }
    }

    /// Replace the default key derivation.
    pub fn with_key_fn<F>(mut self, key_fn: F) -> Self
    where
        F: Fn(&str, &str, &str) -> String + Send + Sync + 'static,
    {
        self.key_fn = Some(Arc::new(key_fn));
        self
    }

    /// Middleware entry point, for `axum::middleware::from_fn_with_state`.
    pub async fn handle(
        State(http_cache): State<HttpCache>,
        request: Request<Body>,
        next: Next,
    ) -> Response {
        http_cache.run(request, next).await
    }

    async fn run(&self, request: Request<Body>, next: Next) -> Response {
        // Only idempotent reads are cacheable.
        if request.method() != Method::GET {
            return next.run(request).await;
        }

        let identity = request
            .extensions()
            .get::<CallerIdentity>()
            .map(|id| id.0.clone())
            .unwrap_or_else(|| "public".to_string());

        let path_and_query = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| request.uri().path().to_string());

        let key = match &self.key_fn {
            Some(f) => f(&identity, request.method().as_str(), &path_and_query),
            None => format!("http:{}:{}:{}", identity, request.method(), path_and_query),
        };

        if let Some(cached) = self.cache.get::<CachedResponse>(&key).await {
            debug!("✓ HTTP cache hit for {}", key);
            return replay(cached);
        }

        // Miss: run the handler, then buffer what it produced.
        let response = next.run(request).await;
        let status = response.status();
        if !status.is_success() {
            return response;
        }

        let (parts, body) = response.into_parts();
        let bytes = match to_bytes(body, usize::MAX).await {
            Ok(bytes) => bytes,
            Err(e) => {
                // The body broke mid-stream; nothing usable to return.
                warn!("✗ HTTP cache could not buffer response for {}: {}", key, e);
                return StatusCode::INTERNAL_SERVER_ERROR.into_response_with_parts(parts);
            }
        };

        if bytes.len() <= MAX_CACHEABLE_BODY {
            let cached = CachedResponse {
                status: status.as_u16(),
                content_type: parts
                    .headers
                    .get(header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(String::from),
                body: bytes.to_vec(),
            };

            // Tracked fire-and-forget write: the response is not delayed,
            // and drain() can await stragglers at shutdown.
            let cache = self.cache.clone();
            let ttl = self.ttl_secs;
            let write_key = key.clone();
            self.writes.spawn(async move {
                if !cache.set(&write_key, &cached, Some(ttl)).await {
                    debug!("HTTP cache store skipped for {}", write_key);
                }
            });
        } else {
            debug!("Response for {} exceeds cacheable size, passing through", key);
        }

        Response::from_parts(parts, Body::from(bytes))
    }

    /// Bust cached responses matching `pattern` (e.g. `"http:*:/api/courses*"`)
    /// after a mutating write. Returns the number of entries removed.
    pub async fn invalidate(&self, pattern: &str) -> u64 {
        self.cache.del_pattern(pattern).await
    }

    /// Await all in-flight cache writes. Call once, at graceful shutdown.
    pub async fn drain(&self) {
        self.writes.close();
        self.writes.wait().await;
    }
}

fn replay(cached: CachedResponse) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK))
        .header(CACHE_HEADER, "hit");

    if let Some(ct) = cached.content_type.as_deref() {
        if let Ok(value) = HeaderValue::from_str(ct) {
            builder = builder.header(header::CONTENT_TYPE, value);
        }
    }

    builder
        .body(Body::from(cached.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response_plain())
}

// Small shims keeping the error paths readable above.
trait IntoResponseExt {
    fn into_response_with_parts(self, parts: axum::http::response::Parts) -> Response;
    fn into_response_plain(self) -> Response;
}

impl IntoResponseExt for StatusCode {
    fn into_response_with_parts(self, mut parts: axum::http::response::Parts) -> Response {
        parts.status = self;
        Response::from_parts(parts, Body::empty())
    }

    fn into_response_plain(self) -> Response {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = self;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::config::CacheConfig;
    use crate::connection::CacheConnection;
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    fn memory_cache() -> CacheService {
        let conn = CacheConnection::with_backend(
            CacheConfig::default(),
            Arc::new(InMemoryBackend::new()),
        );
        CacheService::new(Arc::new(conn))
    }

    fn counting_app(http_cache: HttpCache, hits: Arc<AtomicUsize>) -> Router {
        Router::new()
            .route(
                "/api/courses",
                get(move || {
                    let hits = Arc::clone(&hits);
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        axum::Json(serde_json::json!({"courses": ["algebra"]}))
                    }
                }),
            )
            .layer(axum::middleware::from_fn_with_state(
                http_cache,
                HttpCache::handle,
            ))
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        String::from_utf8(bytes.to_vec()).expect("Body not UTF-8")
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .expect("Failed to build request")
    }

    #[tokio::test]
    async fn test_hit_short_circuits_handler() {
        let http_cache = HttpCache::new(memory_cache(), 60);
        let handler_runs = Arc::new(AtomicUsize::new(0));
        let app = counting_app(http_cache.clone(), Arc::clone(&handler_runs));

        let first = app
            .clone()
            .oneshot(get_request("/api/courses"))
            .await
            .expect("Request failed");
        assert_eq!(first.status(), StatusCode::OK);
        assert!(first.headers().get(CACHE_HEADER).is_none());
        let first_body = body_string(first).await;

        // Make sure the background write has landed.
        http_cache.drain().await;

        let second = app
            .clone()
            .oneshot(get_request("/api/courses"))
            .await
            .expect("Request failed");
        assert_eq!(
            second.headers().get(CACHE_HEADER),
            Some(&HeaderValue::from_static("hit"))
        );
        assert_eq!(
            second
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
        assert_eq!(body_string(second).await, first_body);

        // The handler ran exactly once; the hit never reached it.
        assert_eq!(handler_runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_binary_body_replays_byte_for_byte() {
        // Not valid UTF-8: a PNG-style magic plus high bytes.
        const PAYLOAD: [u8; 8] = [0x89, 0x50, 0x4e, 0x47, 0xff, 0xfe, 0x00, 0x01];

        let http_cache = HttpCache::new(memory_cache(), 60);
        let app = Router::new()
            .route(
                "/api/badge.png",
                get(|| async {
                    Response::builder()
                        .header(header::CONTENT_TYPE, "image/png")
                        .body(Body::from(PAYLOAD.to_vec()))
                        .expect("Failed to build response")
                }),
            )
            .layer(axum::middleware::from_fn_with_state(
                http_cache.clone(),
                HttpCache::handle,
            ));

        let first = app
            .clone()
            .oneshot(get_request("/api/badge.png"))
            .await
            .expect("Request failed");
        let first_bytes = to_bytes(first.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        assert_eq!(&first_bytes[..], &PAYLOAD);

        http_cache.drain().await;

        let second = app
            .clone()
            .oneshot(get_request("/api/badge.png"))
            .await
            .expect("Request failed");
        assert_eq!(
            second.headers().get(CACHE_HEADER),
            Some(&HeaderValue::from_static("hit"))
        );
        assert_eq!(
            second
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("image/png")
        );
        let second_bytes = to_bytes(second.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        assert_eq!(&second_bytes[..], &PAYLOAD);
    }

    #[tokio::test]
    async fn test_non_get_bypasses_cache() {
        let http_cache = HttpCache::new(memory_cache(), 60);
        let posts = Arc::new(AtomicUsize::new(0));
        let posts_in_handler = Arc::clone(&posts);

        let app = Router::new()
            .route(
                "/api/courses",
                axum::routing::post(move || {
                    let posts = Arc::clone(&posts_in_handler);
                    async move {
                        posts.fetch_add(1, Ordering::SeqCst);
                        "created"
                    }
                }),
            )
            .layer(axum::middleware::from_fn_with_state(
                http_cache.clone(),
                HttpCache::handle,
            ));

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method(Method::POST)
                        .uri("/api/courses")
                        .body(Body::empty())
                        .expect("Failed to build request"),
                )
                .await
                .expect("Request failed");
            assert_eq!(response.status(), StatusCode::OK);
        }

        http_cache.drain().await;
        // Both mutations reached the handler.
        assert_eq!(posts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_query_string_and_identity_split_entries() {
        let http_cache = HttpCache::new(memory_cache(), 60);
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_in_handler = Arc::clone(&runs);

        let app = Router::new()
            .route(
                "/api/courses",
                get(move || {
                    let runs = Arc::clone(&runs_in_handler);
                    async move {
                        let n = runs.fetch_add(1, Ordering::SeqCst);
                        format!("run-{n}")
                    }
                }),
            )
            .layer(axum::middleware::from_fn_with_state(
                http_cache.clone(),
                HttpCache::handle,
            ));

        let a = app
            .clone()
            .oneshot(get_request("/api/courses?page=1"))
            .await
            .expect("Request failed");
        http_cache.drain().await;
        let b = app
            .clone()
            .oneshot(get_request("/api/courses?page=2"))
            .await
            .expect("Request failed");

        assert_eq!(body_string(a).await, "run-0");
        assert_eq!(body_string(b).await, "run-1");
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_busts_entries() {
        let cache = memory_cache();
        let http_cache = HttpCache::new(cache.clone(), 60);
        let runs = Arc::new(AtomicUsize::new(0));
        let app = counting_app(http_cache.clone(), Arc::clone(&runs));

        app.clone()
            .oneshot(get_request("/api/courses"))
            .await
            .expect("Request failed");
        http_cache.drain().await;

        let removed = http_cache.invalidate("http:*").await;
        assert_eq!(removed, 1);

        app.clone()
            .oneshot(get_request("/api/courses"))
            .await
            .expect("Request failed");
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disabled_cache_passes_through() {
        let conn = CacheConnection::new(CacheConfig::disabled());
        let http_cache = HttpCache::new(CacheService::new(Arc::new(conn)), 60);
        let runs = Arc::new(AtomicUsize::new(0));
        let app = counting_app(http_cache.clone(), Arc::clone(&runs));

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(get_request("/api/courses"))
                .await
                .expect("Request failed");
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get(CACHE_HEADER).is_none());
        }

        http_cache.drain().await;
        // Every request reached the handler; no errors surfaced.
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_custom_key_fn() {
        let cache = memory_cache();
        let http_cache = HttpCache::new(cache.clone(), 60)
            .with_key_fn(|_identity, _method, path| format!("custom:{path}"));
        let runs = Arc::new(AtomicUsize::new(0));
        let app = counting_app(http_cache.clone(), Arc::clone(&runs));

        app.clone()
            .oneshot(get_request("/api/courses"))
            .await
            .expect("Request failed");
        http_cache.drain().await;

        assert!(cache.exists("custom:/api/courses").await);
    }
}
