use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{dto::ws::RoleClaim, services::websocket_service, state::SharedState};

/// Query parameters accepted on the WebSocket upgrade.
#[derive(Debug, Deserialize, IntoParams)]
pub struct ConnectParams {
    /// Role the connection claims.
    pub role: RoleClaim,
    /// Previously issued identity, for session restoration.
    pub id: Option<Uuid>,
}

#[utoipa::path(
    get,
    path = "/ws",
    params(ConnectParams),
    responses((status = 101, description = "Switching protocols to WebSocket"))
)]
/// Upgrade the HTTP connection into a controller or judge WebSocket session.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let shared_state = state.clone();
    ws.on_upgrade(move |socket| {
        websocket_service::handle_socket(shared_state, socket, params.role, params.id)
    })
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws", get(ws_handler))
}
