use crate::channel::CommandChannel;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use maxx_proto::state::{Snapshot, StateManager};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

/// Client id used for commands that arrive over HTTP.
pub const HTTP_CLIENT_ID: usize = 0;

#[derive(Clone)]
struct HttpState {
    state_manager: Arc<StateManager>,
    channel: Arc<CommandChannel>,
}

#[derive(Serialize)]
struct Accepted {
    seq: u64,
}

pub fn router(state_manager: Arc<StateManager>, channel: Arc<CommandChannel>) -> Router {
    let app_state = HttpState {
        state_manager,
        channel,
    };

    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/command", post(post_command))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

pub fn start_server(
    bind_address: String,
    port: u16,
    state_manager: Arc<StateManager>,
    channel: Arc<CommandChannel>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(state_manager, channel);

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

async fn get_state(State(state): State<HttpState>) -> Json<Arc<Snapshot>> {
    Json(state.state_manager.get_state())
}

/// Same packet format and latest-wins slot as the TCP remote.
async fn post_command(
    State(state): State<HttpState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Accepted>), (StatusCode, String)> {
    match state.channel.submit(HTTP_CLIENT_ID, &body) {
        Ok(seq) => {
            info!("HTTP API: command #{} accepted", seq);
            Ok((StatusCode::ACCEPTED, Json(Accepted { seq })))
        }
        Err(e) => {
            warn!("HTTP API: rejected command: {}", e);
            Err((StatusCode::BAD_REQUEST, e.to_string()))
        }
    }
}
