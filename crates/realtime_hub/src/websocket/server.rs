use crate::domain::{HubHandle, Session, SessionConfig};
use crate::websocket::split_socket;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Route that upgrades to the reading stream
pub const READINGS_ROUTE: &str = "/iot/readings";
/// Liveness probe reporting the subscriber count
pub const HEALTH_ROUTE: &str = "/health";

/// Shared state handed to every request
#[derive(Clone)]
pub struct StreamingState {
    hub: HubHandle,
    session_config: SessionConfig,
    shutdown: CancellationToken,
}

impl StreamingState {
    pub fn new(hub: HubHandle, session_config: SessionConfig, shutdown: CancellationToken) -> Self {
        Self {
            hub,
            session_config,
            shutdown,
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    subscribers: usize,
}

/// Routes for the streaming and health endpoints
pub fn router(state: StreamingState) -> Router {
    Router::new()
        .route(READINGS_ROUTE, get(readings_upgrade))
        .route(HEALTH_ROUTE, get(health))
        .with_state(state)
}

/// Serve the streaming endpoint until `token` is cancelled
pub async fn serve(
    listener: TcpListener,
    state: StreamingState,
    token: CancellationToken,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, route = READINGS_ROUTE, "streaming endpoint listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(token.cancelled_owned())
        .await?;

    info!("streaming endpoint stopped");
    Ok(())
}

async fn readings_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<StreamingState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: StreamingState) {
    let session = Session::open(&state.hub, state.session_config.clone());
    let session_id = session.id();
    info!(session_id = %session_id, "subscriber connected");

    let (sink, stream) = split_socket(socket);
    session.run(sink, stream, &state.shutdown).await;

    info!(session_id = %session_id, "subscriber disconnected");
}

async fn health(State(state): State<StreamingState>) -> impl IntoResponse {
    match state.hub.subscriber_count().await {
        Ok(subscribers) => {
            debug!(subscribers, "health check");
            (
                StatusCode::OK,
                Json(HealthResponse {
                    status: "ok",
                    subscribers,
                }),
            )
                .into_response()
        }
        Err(e) => {
            warn!(error = %e, "health check failed");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}
