//! Websocket endpoint for the update channel.

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;

use crate::channel::UpdateChannel;

/// Router serving the update channel at `hmr_path`.
///
/// Merge it into the application's router:
///
/// ```rust,no_run
/// use fob_hmr::{UpdateChannel, server::hmr_router};
/// use std::sync::Arc;
///
/// let channel = Arc::new(UpdateChannel::new(100));
/// let app: axum::Router = axum::Router::new().merge(hmr_router("/__fob_hmr__", channel));
/// ```
pub fn hmr_router(hmr_path: &str, channel: Arc<UpdateChannel>) -> Router {
    Router::new()
        .route(hmr_path, get(ws_handler))
        .with_state(channel)
}

async fn ws_handler(ws: WebSocketUpgrade, State(channel): State<Arc<UpdateChannel>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, channel))
}

async fn handle_socket(socket: WebSocket, channel: Arc<UpdateChannel>) {
    let (id, mut updates) = channel.register();
    let (mut sender, mut receiver) = socket.split();

    // clients only ever send pings and close frames
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(client = id, error = %e, "websocket receive error");
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(payload) = update else { break };
                if let Err(e) = sender.send(Message::Text(payload.as_ref().into())).await {
                    tracing::debug!(client = id, error = %e, "failed to send update, closing");
                    break;
                }
            }
            _ = &mut recv_task => break,
        }
    }

    recv_task.abort();
    channel.unregister(id);
}
