//! WebSocket upgrade for the terminal multiplexer.

use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;

use crate::server::state::AppState;
use crate::terminal::ws::handle_socket;

pub async fn handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.terminals.clone()))
}
