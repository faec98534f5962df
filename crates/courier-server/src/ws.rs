//! WebSocket transport for push connections.
//!
//! Adapts an upgraded axum socket into the [`Incoming`] / [`Outgoing`]
//! stream and sink the delivery coordinator drives.

use axum::extract::ws::{Message as WsMessage, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::future;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::info;

use courier_shared::UserId;

use crate::api::AppState;
use crate::coordinator::Incoming;
use crate::error::ServerError;
use crate::registry::Outgoing;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    user_id: Option<String>,
}

/// GET /ws?user_id=...
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Result<Response, ServerError> {
    let user_id = params
        .user_id
        .as_deref()
        .and_then(|u| UserId::new(u))
        .ok_or(ServerError::Unauthorized)?;

    info!(user = %user_id, "Push connection upgrade requested");

    let coordinator = state.coordinator.clone();
    Ok(ws.on_upgrade(move |socket| async move {
        let (sink, stream) = socket.split();
        let inbound = stream.filter_map(|msg| future::ready(incoming(msg)));
        let outbound = sink.with(|out: Outgoing| future::ready(outgoing(out)));
        coordinator
            .handle_connection(user_id, inbound, outbound)
            .await;
    }))
}

/// Map a WebSocket frame to a transport event. Pings are answered by the
/// WebSocket layer itself; both pings and pongs count as liveness.
fn incoming(msg: Result<WsMessage, axum::Error>) -> Option<Result<Incoming, axum::Error>> {
    match msg {
        Ok(WsMessage::Text(text)) => Some(Ok(Incoming::Text(text))),
        Ok(WsMessage::Binary(data)) => Some(Ok(Incoming::Binary(data.len()))),
        Ok(WsMessage::Close(_)) => Some(Ok(Incoming::Close)),
        Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => Some(Ok(Incoming::Keepalive)),
        Err(e) => Some(Err(e)),
    }
}

fn outgoing(out: Outgoing) -> Result<WsMessage, axum::Error> {
    match out {
        Outgoing::Message(message) => serde_json::to_string(&message)
            .map(WsMessage::Text)
            .map_err(axum::Error::new),
        Outgoing::Error(reason) => Ok(WsMessage::Text(
            serde_json::json!({ "error": reason }).to_string(),
        )),
        Outgoing::Ping => Ok(WsMessage::Ping(Vec::new())),
        Outgoing::Close => Ok(WsMessage::Close(None)),
    }
}
