//! In-memory idempotency-key replay.
//!
//! A caller that times out on a mutating request cannot know its outcome;
//! retrying with the same `Idempotency-Key` header replays the stored
//! response instead of re-executing the mutation.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

const IDEMPOTENCY_HEADER: &str = "idempotency-key";

#[derive(Clone)]
pub struct StoredResponse {
    pub status: StatusCode,
    pub body: Bytes,
    pub content_type: Option<HeaderValue>,
    pub stored_at: Instant,
}

#[derive(Clone)]
pub struct IdempotencyStore {
    entries: Arc<DashMap<String, StoredResponse>>,
    ttl: Duration,
}

impl Default for IdempotencyStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

impl IdempotencyStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<StoredResponse> {
        let stored = self.entries.get(key)?;
        if stored.stored_at.elapsed() < self.ttl {
            Some(stored.clone())
        } else {
            None
        }
    }

    pub fn insert(&self, key: &str, stored: StoredResponse) {
        self.entries.insert(key.to_string(), stored);
    }

    pub fn cleanup(&self) {
        let now = Instant::now();
        let ttl = self.ttl;
        self.entries
            .retain(|_, stored| now.duration_since(stored.stored_at) < ttl);
    }
}

/// Replays stored responses for repeated idempotency keys on mutating
/// methods; requests without the header pass straight through.
pub async fn idempotency_middleware(req: Request, next: Next) -> Response {
    let is_mutating = matches!(
        req.method().as_str(),
        "POST" | "PUT" | "PATCH" | "DELETE"
    );
    if !is_mutating {
        return next.run(req).await;
    }

    let Some(key) = req
        .headers()
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
    else {
        return next.run(req).await;
    };

    let store = req
        .extensions()
        .get::<IdempotencyStore>()
        .cloned()
        .unwrap_or_default();

    store.cleanup();

    if let Some(stored) = store.get(&key) {
        let mut resp = Response::new(axum::body::Body::from(stored.body.clone()));
        *resp.status_mut() = stored.status;
        if let Some(ct) = stored.content_type.clone() {
            resp.headers_mut()
                .insert(HeaderName::from_static("content-type"), ct);
        }
        return resp;
    }

    // Buffer the response so it can be replayed on a retry.
    let resp = next.run(req).await;
    let (parts, body) = resp.into_parts();
    match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => {
            let stored = StoredResponse {
                status: parts.status,
                body: bytes.clone(),
                content_type: parts.headers.get("content-type").cloned(),
                stored_at: Instant::now(),
            };
            store.insert(&key, stored);
            Response::from_parts(parts, axum::body::Body::from(bytes))
        }
        Err(_) => Response::from_parts(parts, axum::body::Body::empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::Request as HttpRequest,
        routing::post,
        Extension, Router,
    };
    use std::sync::atomic::{AtomicU32, Ordering};
    use tower::ServiceExt;

    #[tokio::test]
    async fn repeated_key_replays_the_first_response() {
        static CALLS: AtomicU32 = AtomicU32::new(0);

        async fn counted() -> String {
            let n = CALLS.fetch_add(1, Ordering::SeqCst) + 1;
            format!("call-{}", n)
        }

        let store = IdempotencyStore::new(Duration::from_secs(60));
        let app = Router::new()
            .route("/mutate", post(counted))
            .layer(axum::middleware::from_fn(idempotency_middleware))
            .layer(Extension(store));

        let request = || {
            HttpRequest::builder()
                .uri("/mutate")
                .method("POST")
                .header("idempotency-key", "key-1")
                .body(Body::empty())
                .unwrap()
        };

        let first = app.clone().oneshot(request()).await.unwrap();
        let first_body = to_bytes(first.into_body(), usize::MAX).await.unwrap();

        let second = app.clone().oneshot(request()).await.unwrap();
        let second_body = to_bytes(second.into_body(), usize::MAX).await.unwrap();

        assert_eq!(first_body, second_body);
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn requests_without_a_key_are_not_deduplicated() {
        static CALLS: AtomicU32 = AtomicU32::new(0);

        async fn counted() -> String {
            let n = CALLS.fetch_add(1, Ordering::SeqCst) + 1;
            format!("call-{}", n)
        }

        let store = IdempotencyStore::new(Duration::from_secs(60));
        let app = Router::new()
            .route("/mutate", post(counted))
            .layer(axum::middleware::from_fn(idempotency_middleware))
            .layer(Extension(store));

        let request = || {
            HttpRequest::builder()
                .uri("/mutate")
                .method("POST")
                .body(Body::empty())
                .unwrap()
        };

        let _ = app.clone().oneshot(request()).await.unwrap();
        let _ = app.clone().oneshot(request()).await.unwrap();

        assert_eq!(CALLS.load(Ordering::SeqCst), 2);
    }
}
