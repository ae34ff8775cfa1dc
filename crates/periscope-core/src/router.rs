//! Two-tier request dispatch
//!
//! 1. Paths under [`API_PREFIX`] go to the longest matching API handler
//! 2. Everything else is an exact lookup in the asset store

use crate::assets::AssetStore;
use crate::error::panic_message;
use crate::registry::HandlerRegistry;
use crate::{Request, Response};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Reserved API namespace
pub const API_PREFIX: &str = "/api/";

/// Route a normalized request to a response
///
/// Never panics on behalf of a handler: faults become 500 responses.
pub fn route(req: &Request, handlers: &HandlerRegistry, assets: &AssetStore) -> Response {
    if req.is_traversal() {
        tracing::debug!(path = %req.path, "rejected path traversal");
        return Response::forbidden();
    }

    if req.path.starts_with(API_PREFIX) {
        route_api(req, handlers)
    } else {
        route_asset(req, assets)
    }
}

fn route_api(req: &Request, handlers: &HandlerRegistry) -> Response {
    let not_found = || Response::not_found(&format!("API endpoint not found: {}", req.path));

    let Some(resolved) = handlers.resolve(&req.path) else {
        return not_found();
    };

    match catch_unwind(AssertUnwindSafe(|| resolved.handler.handle(req))) {
        Ok(Ok(Some(body))) => Response::json(body),
        Ok(Ok(None)) => not_found(),
        Ok(Err(e)) => {
            tracing::warn!(path = %req.path, error = %e, "API handler failed");
            Response::internal_error()
        }
        Err(payload) => {
            tracing::warn!(
                path = %req.path,
                error = %panic_message(payload.as_ref()),
                "API handler panicked"
            );
            Response::internal_error()
        }
    }
}

fn route_asset(req: &Request, assets: &AssetStore) -> Response {
    match assets.get(&req.path) {
        Some(asset) => crate::ResponseBuilder::new(crate::StatusCode::OK)
            .header("Content-Type", asset.content_type)
            .body(asset.body)
            .build(),
        None => Response::not_found(&format!("Not Found: {}", req.path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HandlerResult;
    use crate::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn error_of(res: &Response) -> String {
        let body: serde_json::Value = serde_json::from_slice(&res.body).unwrap();
        body["error"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_api_longest_prefix() {
        let handlers = HandlerRegistry::new();
        handlers.register("/api/", |_: &Request| -> HandlerResult { Ok(Some("\"short\"".into())) });
        handlers.register("/api/v1/game", |_: &Request| -> HandlerResult {
            Ok(Some("\"game\"".into()))
        });

        let res = route(&Request::new("GET", "/api/v1/game/x"), &handlers, &AssetStore::new());
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body_string().as_deref(), Some("\"game\""));
    }

    #[test]
    fn test_api_miss_is_404_json() {
        let res = route(
            &Request::new("GET", "/api/v1/nothing"),
            &HandlerRegistry::new(),
            &AssetStore::new(),
        );
        assert_eq!(res.status, StatusCode::NOT_FOUND);
        assert_eq!(error_of(&res), "API endpoint not found: /api/v1/nothing");
    }

    #[test]
    fn test_handler_none_is_404() {
        let handlers = HandlerRegistry::new();
        handlers.register("/api/v1/custom/", |_: &Request| -> HandlerResult { Ok(None) });

        let res = route(&Request::new("GET", "/api/v1/custom/missing"), &handlers, &AssetStore::new());
        assert_eq!(res.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_handler_error_and_panic_are_500() {
        let handlers = HandlerRegistry::new();
        handlers.register("/api/err", |_: &Request| -> HandlerResult { Err("boom".into()) });
        handlers.register("/api/panic", |_: &Request| -> HandlerResult { panic!("kaboom") });
        let assets = AssetStore::new();

        for path in ["/api/err", "/api/panic"] {
            let res = route(&Request::new("GET", path), &handlers, &assets);
            assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(error_of(&res), "Internal Server Error");
        }
    }

    #[test]
    fn test_traversal_rejected_before_lookup() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handlers = HandlerRegistry::new();
        let counter = Arc::clone(&calls);
        handlers.register("/api/", move |_: &Request| -> HandlerResult {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Some("{}".into()))
        });
        let assets = AssetStore::new();
        assets.insert("/../secret", "nope");

        for path in ["/../secret", "/api/../x", "/a/../b"] {
            let res = route(&Request::new("GET", path), &handlers, &assets);
            assert_eq!(res.status, StatusCode::FORBIDDEN);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_assets() {
        let assets = AssetStore::new();
        assets.insert("/index.html", "<html></html>");
        let handlers = HandlerRegistry::new();

        let res = route(&Request::new("GET", "/"), &handlers, &assets);
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.content_type(), Some("text/html; charset=utf-8"));

        let res = route(&Request::new("GET", "/does-not-exist"), &handlers, &assets);
        assert_eq!(res.status, StatusCode::NOT_FOUND);
        assert!(error_of(&res).contains("does-not-exist"));
    }

    #[test]
    fn test_api_namespace_never_falls_through_to_assets() {
        let assets = AssetStore::new();
        assets.insert("/api/v1/file.json", "{}");

        let res = route(&Request::new("GET", "/api/v1/file.json"), &HandlerRegistry::new(), &assets);
        assert_eq!(res.status, StatusCode::NOT_FOUND);
    }
}
