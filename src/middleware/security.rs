// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Security headers middleware.

use axum::{
    extract::Request,
    http::{header, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

/// Headers set on every response. Bodies carry credentials and athlete data,
/// so nothing may be cached or framed.
const SECURITY_HEADERS: &[(HeaderName, &str)] = &[
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::CACHE_CONTROL, "no-store"),
    (header::PRAGMA, "no-cache"),
    (
        header::STRICT_TRANSPORT_SECURITY,
        "max-age=31536000; includeSubDomains",
    ),
    (
        header::CONTENT_SECURITY_POLICY,
        "default-src 'none'; frame-ancestors 'none'",
    ),
    (header::REFERRER_POLICY, "no-referrer"),
];

/// Add security headers to all responses, overriding any a handler set.
pub async fn add_security_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    for (name, value) in SECURITY_HEADERS {
        headers.insert(name.clone(), HeaderValue::from_static(*value));
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::{routing::get, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route(
                "/cached",
                get(|| async { ([(header::CACHE_CONTROL, "max-age=3600")], "token") }),
            )
            .route(
                "/denied",
                get(|| async { AppError::Revoked.into_response() }),
            )
            .layer(axum::middleware::from_fn(add_security_headers))
    }

    async fn get_headers(uri: &str) -> (StatusCode, axum::http::HeaderMap) {
        let response = app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        (response.status(), response.headers().clone())
    }

    #[tokio::test]
    async fn test_handler_cache_header_is_overridden() {
        let (status, headers) = get_headers("/cached").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-store");
        assert_eq!(headers.get_all(header::CACHE_CONTROL).iter().count(), 1);
    }

    #[tokio::test]
    async fn test_error_responses_get_every_header() {
        let (status, headers) = get_headers("/denied").await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        for (name, value) in SECURITY_HEADERS {
            assert_eq!(headers.get(name).unwrap(), *value, "header {}", name);
        }
    }
}
