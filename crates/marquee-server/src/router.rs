//! HTTP routes: `/proxy` plus static files for directory bundles.

use std::path::PathBuf;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Shared state accessible from handlers.
#[derive(Clone)]
pub struct ProxyState {
    /// Client used to fetch proxied assets.
    pub client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ProxyQuery {
    src: String,
}

/// Build the router. With `root` set, unmatched paths are served from it.
pub fn build_router(root: Option<PathBuf>, client: reqwest::Client) -> Router {
    let router = Router::new()
        .route("/proxy", get(proxy_handler))
        .with_state(ProxyState { client });
    let router = match root {
        Some(root) => router.fallback_service(ServeDir::new(root)),
        None => router,
    };
    router.layer(TraceLayer::new_for_http())
}

/// GET /proxy?src=<url>
async fn proxy_handler(State(state): State<ProxyState>, Query(query): Query<ProxyQuery>) -> Response {
    let url = match url::Url::parse(&query.src) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url,
        Ok(url) => {
            return (
                StatusCode::BAD_REQUEST,
                format!("unsupported scheme: {}", url.scheme()),
            )
                .into_response();
        }
        Err(e) => return (StatusCode::BAD_REQUEST, format!("invalid src: {e}")).into_response(),
    };

    let upstream = match state.client.get(url.clone()).send().await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::warn!(src = %url, error = %e, "proxy fetch failed");
            return (StatusCode::BAD_GATEWAY, e.to_string()).into_response();
        }
    };

    let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = upstream
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_owned();
    match upstream.bytes().await {
        Ok(body) => (status, [(header::CONTENT_TYPE, content_type)], body).into_response(),
        Err(e) => (StatusCode::BAD_GATEWAY, e.to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;

    async fn body_string(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn serves_bundle_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>bundle</html>").unwrap();
        let app = build_router(Some(dir.path().to_path_buf()), reqwest::Client::new());

        let resp = app.oneshot(get_req("/index.html")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "<html>bundle</html>");
    }

    #[tokio::test]
    async fn missing_file_returns_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(Some(dir.path().to_path_buf()), reqwest::Client::new());
        let resp = app.oneshot(get_req("/nope.js")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn no_root_means_no_static_files() {
        let app = build_router(None, reqwest::Client::new());
        let resp = app.oneshot(get_req("/index.html")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn proxy_rejects_non_http_sources() {
        let app = build_router(None, reqwest::Client::new());
        let resp = app
            .clone()
            .oneshot(get_req("/proxy?src=file%3A%2F%2F%2Fetc%2Fpasswd"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app.oneshot(get_req("/proxy?src=not-a-url")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn proxy_requires_src() {
        let app = build_router(None, reqwest::Client::new());
        let resp = app.oneshot(get_req("/proxy")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn proxy_fetches_upstream() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("font.txt"), "glyphs").unwrap();
        let upstream = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = upstream.local_addr().unwrap().port();
        let upstream_app = build_router(Some(dir.path().to_path_buf()), reqwest::Client::new());
        let _server = tokio::spawn(async move {
            axum::serve(upstream, upstream_app).await.ok();
        });

        let app = build_router(None, reqwest::Client::new());
        let uri = format!("/proxy?src=http%3A%2F%2F127.0.0.1%3A{port}%2Ffont.txt");
        let resp = app.oneshot(get_req(&uri)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "glyphs");
    }
}
