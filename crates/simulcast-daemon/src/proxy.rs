/// Status proxy: the single local endpoint fronting the upstream
/// Simulcast.me API.
///
/// Serves `GET /status` on a local port (default 8990). The poller — and
/// any front-end embedding the stream — talks only to this endpoint, so the
/// API key never leaves the daemon. The handler performs **one** upstream
/// GET with the `X-API-Key` header and streams the JSON body straight
/// through, byte-for-byte, with the upstream status and content-type
/// forwarded.
///
/// Design notes
/// ─────────────
/// • No key configured → `500 {"error":"no_api_key"}` without touching the
///   network, matching the upstream contract clients already handle.
/// • Upstream transport failure → 502; the poller folds both cases into the
///   same "poll failed" outcome.
/// • The proxy re-uses a single `reqwest::Client` so TLS sessions are shared
///   across polls.
use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::json;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use simulcast_proto::config::ProxyConfig;

// ── Shared state ──────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ProxyState {
    upstream_url: String,
    api_key: String,
    client: Client,
}

impl ProxyState {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            upstream_url: config.upstream_url.clone(),
            api_key: config.api_key.clone(),
            client: Client::new(),
        }
    }
}

// ── Route handler ─────────────────────────────────────────────────────────────

async fn stream_status(State(state): State<ProxyState>) -> Response {
    if state.api_key.is_empty() {
        // Same shape the upstream would use; never calls out without a key.
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "no_api_key" })),
        )
            .into_response();
    }

    let upstream = match state
        .client
        .get(&state.upstream_url)
        .header("X-API-Key", &state.api_key)
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            warn!("proxy: upstream status request failed: {}", e);
            return Response::builder()
                .status(StatusCode::BAD_GATEWAY)
                .body(Body::empty())
                .unwrap();
        }
    };

    // Pass the upstream response through unmodified: status, content-type,
    // body bytes.
    let mut builder = Response::builder().status(
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
    );
    if let Some(ct) = upstream.headers().get(reqwest::header::CONTENT_TYPE) {
        if let Ok(hv) = axum::http::HeaderValue::from_bytes(ct.as_bytes()) {
            builder = builder.header("content-type", hv);
        }
    }

    let byte_stream = upstream.bytes_stream();
    let reader = tokio_util::io::StreamReader::new(
        byte_stream
            .map(|result| result.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))),
    );
    let body = Body::from_stream(ReaderStream::new(reader));

    builder.body(body).unwrap()
}

// ── Server startup ────────────────────────────────────────────────────────────

pub fn router(config: &ProxyConfig) -> Router {
    Router::new()
        .route("/status", get(stream_status))
        .with_state(ProxyState::new(config))
}

pub fn start_server(
    bind_address: String,
    port: u16,
    config: ProxyConfig,
) -> tokio::task::JoinHandle<()> {
    let app = router(&config);

    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);
        info!("Status proxy listening on http://{}", addr);
        let listener = match tokio::net::TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                warn!("Failed to bind status proxy on {}: {}", addr, e);
                return;
            }
        };
        if let Err(e) = axum::serve(listener, app).await {
            warn!("Status proxy error: {}", e);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Request;

    async fn serve(router: Router) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        addr
    }

    #[tokio::test]
    async fn test_missing_api_key_is_500_no_api_key() {
        let addr = serve(router(&ProxyConfig::default())).await;

        let resp = reqwest::get(format!("http://{}/status", addr))
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 500);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "no_api_key");
    }

    #[tokio::test]
    async fn test_passes_key_and_body_through() {
        // Fake upstream: verifies the X-API-Key header and answers with a
        // fixed live payload.
        let upstream = Router::new().route(
            "/api/public/stream/status",
            get(|req: Request| async move {
                let key = req
                    .headers()
                    .get("x-api-key")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                if key != "sk-test" {
                    return (StatusCode::UNAUTHORIZED, String::new());
                }
                (
                    StatusCode::OK,
                    r#"{"isLive":true,"hlsUrl":"https://x/a.m3u8","streamKeyLabel":"Cam1"}"#
                        .to_string(),
                )
            }),
        );
        let upstream_addr = serve(upstream).await;

        let config = ProxyConfig {
            upstream_url: format!("http://{}/api/public/stream/status", upstream_addr),
            api_key: "sk-test".to_string(),
            ..ProxyConfig::default()
        };
        let proxy_addr = serve(router(&config)).await;

        let resp = reqwest::get(format!("http://{}/status", proxy_addr))
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        let body = resp.text().await.unwrap();
        assert_eq!(
            body,
            r#"{"isLive":true,"hlsUrl":"https://x/a.m3u8","streamKeyLabel":"Cam1"}"#,
            "upstream body must pass through unmodified"
        );
    }

    #[tokio::test]
    async fn test_upstream_error_status_is_forwarded() {
        let upstream = Router::new().route(
            "/api/public/stream/status",
            get(|| async { (StatusCode::FORBIDDEN, r#"{"error":"bad_key"}"#) }),
        );
        let upstream_addr = serve(upstream).await;

        let config = ProxyConfig {
            upstream_url: format!("http://{}/api/public/stream/status", upstream_addr),
            api_key: "sk-test".to_string(),
            ..ProxyConfig::default()
        };
        let proxy_addr = serve(router(&config)).await;

        let resp = reqwest::get(format!("http://{}/status", proxy_addr))
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 403);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        let config = ProxyConfig {
            upstream_url: "http://127.0.0.1:1/api/public/stream/status".to_string(),
            api_key: "sk-test".to_string(),
            ..ProxyConfig::default()
        };
        let proxy_addr = serve(router(&config)).await;

        let resp = reqwest::get(format!("http://{}/status", proxy_addr))
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 502);
    }
}
