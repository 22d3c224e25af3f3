/// Local HTTP API: the view snapshot front-ends render, plus the tip
/// hand-off. Permissive CORS so an embedding page on another origin can
/// poll `/api/state` directly.
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use simulcast_proto::config::TipsConfig;
use simulcast_proto::protocol::StreamView;
use simulcast_proto::state::StateManager;

use crate::checkout;

#[derive(Clone)]
struct HttpState {
    state_manager: Arc<StateManager>,
    tips: TipsConfig,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct TipRequest {
    amount: f64,
}

#[derive(Serialize)]
struct TipAccepted {
    ok: bool,
}

pub fn start_server(
    bind_address: String,
    port: u16,
    state_manager: Arc<StateManager>,
    tips: TipsConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app_state = HttpState {
            state_manager,
            tips,
            client: reqwest::Client::new(),
        };

        let app = Router::new()
            .route("/api/state", get(get_state))
            .route("/api/tip", post(submit_tip))
            .layer(CorsLayer::permissive())
            .with_state(app_state);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn get_state(State(state): State<HttpState>) -> Json<StreamView> {
    Json(state.state_manager.get_view().await)
}

async fn submit_tip(
    State(state): State<HttpState>,
    Json(request): Json<TipRequest>,
) -> Result<Json<TipAccepted>, (StatusCode, Json<Value>)> {
    let submission = checkout::prepare_tip(&state.tips, request.amount)
        .map_err(|e| (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))))?;

    info!("HTTP API: tip of {} accepted, handing off to checkout", request.amount);
    checkout::spawn_submit(state.client.clone(), submission);
    Ok(Json(TipAccepted { ok: true }))
}
