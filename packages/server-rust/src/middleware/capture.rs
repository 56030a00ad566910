//! Context-capture middleware.
//!
//! Runs once per inbound request: generates a fresh [`ContextId`], snapshots
//! headers, cookies, session and user into a [`ContextScope`], and drives the
//! rest of the request (including the inner service's synchronous `call`)
//! under that scope. It never rejects or short-circuits a request.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use ctxtrack_core::{ContextId, ContextScope, ContextStore, RequestSnapshot};
use http::header::COOKIE;
use http::{HeaderMap, HeaderValue, Request};
use serde_json::Value;
use tower::{Layer, Service};
use tracing::debug;

/// Session data placed in request extensions by an upstream session layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionData(pub Value);

/// Authenticated user placed in request extensions by an upstream auth layer.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser(pub Value);

// ---------------------------------------------------------------------------
// ContextCaptureLayer
// ---------------------------------------------------------------------------

/// Tower layer that binds a fresh [`ContextScope`] around every request.
///
/// Should be the outermost of the identity-dependent layers. Session or auth
/// layers that publish [`SessionData`] or [`AuthenticatedUser`] extensions
/// must run outside it so the snapshot sees them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextCaptureLayer {
    store: ContextStore,
}

impl ContextCaptureLayer {
    #[must_use]
    pub fn new(store: ContextStore) -> Self {
        Self { store }
    }
}

impl<S> Layer<S> for ContextCaptureLayer {
    type Service = ContextCaptureService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ContextCaptureService {
            inner,
            store: self.store,
        }
    }
}

// ---------------------------------------------------------------------------
// ContextCaptureService
// ---------------------------------------------------------------------------

/// Service wrapper produced by [`ContextCaptureLayer`].
#[derive(Debug, Clone)]
pub struct ContextCaptureService<S> {
    inner: S,
    store: ContextStore,
}

impl<S, B> Service<Request<B>> for ContextCaptureService<S>
where
    S: Service<Request<B>>,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let scope = Arc::new(ContextScope::new(snapshot_request(&req)));
        req.extensions_mut().insert(scope.id().clone());

        debug!(
            context_id = %scope.id(),
            method = %req.method(),
            path = req.uri().path(),
            "request context captured"
        );

        let inner = &mut self.inner;
        let fut = self
            .store
            .run_scoped_sync(Arc::clone(&scope), || inner.call(req));
        Box::pin(self.store.run_scoped(scope, fut))
    }
}

/// Builds the identity-relevant snapshot of `req`.
#[must_use]
pub fn snapshot_request<B>(req: &Request<B>) -> RequestSnapshot {
    let extensions = req.extensions();
    RequestSnapshot {
        headers: snapshot_headers(req.headers()),
        session: extensions.get::<SessionData>().map(|s| s.0.clone()),
        user: extensions.get::<AuthenticatedUser>().map(|u| u.0.clone()),
        cookies: parse_cookies(req.headers()),
    }
}

/// Lower-cased header names to values; repeated headers are joined with `", "`.
/// Values that are not valid UTF-8 are skipped.
fn snapshot_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .keys()
        .filter_map(|name| {
            let values: Vec<&str> = headers
                .get_all(name)
                .iter()
                .filter_map(header_str)
                .collect();
            (!values.is_empty()).then(|| (name.as_str().to_string(), values.join(", ")))
        })
        .collect()
}

/// `HeaderValue::to_str` only admits visible ASCII; identifiers may be any UTF-8.
fn header_str(value: &HeaderValue) -> Option<&str> {
    std::str::from_utf8(value.as_bytes()).ok()
}

/// Parses every `Cookie` header into a name/value map.
///
/// First occurrence of a name wins. Returns `None` when no `Cookie` header
/// was sent.
fn parse_cookies(headers: &HeaderMap) -> Option<BTreeMap<String, String>> {
    let mut cookies = BTreeMap::new();
    let mut seen_header = false;

    for value in headers.get_all(COOKIE) {
        seen_header = true;
        let Some(value) = header_str(value) else { continue };
        for pair in value.split(';') {
            let Some((name, val)) = pair.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let val = val.trim();
            let val = val
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(val);
            cookies
                .entry(name.to_string())
                .or_insert_with(|| val.to_string());
        }
    }

    seen_header.then_some(cookies)
}

/// Context id of the request, for handlers that prefer explicit access.
#[must_use]
pub fn request_context_id<B>(req: &Request<B>) -> Option<&ContextId> {
    req.extensions().get::<ContextId>()
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use serde_json::json;
    use tower::ServiceExt;

    use super::*;

    /// Reports what the ambient store sees while handling the request.
    #[derive(Clone)]
    struct Probe;

    impl Service<Request<()>> for Probe {
        type Response = (Option<ContextId>, Option<ContextId>, Option<String>);
        type Error = Infallible;
        type Future =
            Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Request<()>) -> Self::Future {
            let store = ContextStore::new();
            // Observed synchronously, before the returned future is polled.
            let at_call = store.id();
            let extension = request_context_id(&req).cloned();
            Box::pin(async move {
                tokio::task::yield_now().await;
                assert_eq!(store.id(), at_call);
                Ok((at_call, extension, store.header("x-user-id")))
            })
        }
    }

    #[tokio::test]
    async fn binds_scope_for_call_and_future() {
        let svc = ContextCaptureLayer::default().layer(Probe);
        let req = Request::builder()
            .header("X-User-Id", "abc")
            .body(())
            .unwrap();

        let (at_call, extension, header) = svc.oneshot(req).await.unwrap();
        assert!(at_call.is_some());
        assert_eq!(at_call, extension);
        assert_eq!(header.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn each_request_gets_a_fresh_id() {
        let layer = ContextCaptureLayer::default();
        let a = layer.layer(Probe).oneshot(Request::new(())).await.unwrap().0;
        let b = layer.layer(Probe).oneshot(Request::new(())).await.unwrap().0;
        assert_ne!(a, b);
    }

    #[test]
    fn snapshot_reads_extensions_and_headers() {
        let mut req = Request::builder()
            .header("X-Forwarded-For", "1.1.1.1")
            .header("accept", "text/html")
            .header("accept", "application/json")
            .body(())
            .unwrap();
        req.extensions_mut()
            .insert(SessionData(json!({"user": {"id": "s1"}})));
        req.extensions_mut()
            .insert(AuthenticatedUser(json!({"sub": "u1"})));

        let snapshot = snapshot_request(&req);
        assert_eq!(snapshot.header("x-forwarded-for"), Some("1.1.1.1"));
        assert_eq!(snapshot.header("accept"), Some("text/html, application/json"));
        assert_eq!(snapshot.session, Some(json!({"user": {"id": "s1"}})));
        assert_eq!(snapshot.user, Some(json!({"sub": "u1"})));
        assert!(snapshot.cookies.is_none());
    }

    #[test]
    fn cookie_parsing() {
        let req = Request::builder()
            .header("cookie", "uid=abc; theme=\"dark\"; flag; =skip")
            .header("cookie", "uid=shadowed; lang=en")
            .body(())
            .unwrap();
        let cookies = parse_cookies(req.headers()).unwrap();
        assert_eq!(cookies.get("uid").map(String::as_str), Some("abc"));
        assert_eq!(cookies.get("theme").map(String::as_str), Some("dark"));
        assert_eq!(cookies.get("lang").map(String::as_str), Some("en"));
        assert!(!cookies.contains_key("flag"));
        assert!(!cookies.contains_key(""));
    }

    #[test]
    fn snapshot_keeps_non_ascii_utf8_values() {
        let req = Request::builder()
            .header("x-user-id", HeaderValue::from_bytes("josé@example.com".as_bytes()).unwrap())
            .header("cookie", HeaderValue::from_bytes("uid=müller".as_bytes()).unwrap())
            .body(())
            .unwrap();
        let snapshot = snapshot_request(&req);
        assert_eq!(snapshot.header("x-user-id"), Some("josé@example.com"));
        assert_eq!(snapshot.cookie("uid"), Some("müller"));
    }

    #[test]
    fn invalid_utf8_values_are_skipped() {
        let req = Request::builder()
            .header("x-user-id", HeaderValue::from_bytes(&[0xff, 0xfe]).unwrap())
            .header("cookie", HeaderValue::from_bytes(&[b'u', b'=', 0xff]).unwrap())
            .body(())
            .unwrap();
        let snapshot = snapshot_request(&req);
        assert_eq!(snapshot.header("x-user-id"), None);
        assert_eq!(snapshot.cookies, Some(BTreeMap::new()));
    }

    #[tokio::test]
    async fn scope_is_released_after_response() {
        #[derive(Clone)]
        struct Capture;

        impl Service<Request<()>> for Capture {
            type Response = std::sync::Weak<ContextScope>;
            type Error = Infallible;
            type Future =
                Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

            fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Ok(()))
            }

            fn call(&mut self, _req: Request<()>) -> Self::Future {
                let weak = ContextStore::new()
                    .current()
                    .map(|scope| Arc::downgrade(&scope))
                    .unwrap_or_default();
                Box::pin(async move {
                    tokio::task::yield_now().await;
                    assert!(weak.upgrade().is_some());
                    Ok(weak)
                })
            }
        }

        let weak = ContextCaptureLayer::default()
            .layer(Capture)
            .oneshot(Request::new(()))
            .await
            .unwrap();
        assert!(weak.upgrade().is_none());
        assert!(ContextStore::new().current().is_none());
    }

    #[test]
    fn empty_cookie_header_yields_empty_map() {
        let req = Request::builder().header("cookie", "").body(()).unwrap();
        assert_eq!(parse_cookies(req.headers()), Some(BTreeMap::new()));
    }
}
