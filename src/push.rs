//! WebSocket push channel for live viewer counters.

use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;

use crate::counters::Counters;

/// Start the push channel server. Every connection is a viewer: the online
/// count rises on upgrade and falls when the socket closes.
pub async fn serve_push(
    addr: SocketAddr,
    counters: Arc<Counters>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let app = Router::new().route("/", get(handler)).with_state(counters);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Handle the HTTP upgrade and spawn the connection processor.
async fn handler(ws: WebSocketUpgrade, State(counters): State<Arc<Counters>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| async move { process(socket, counters).await })
}

/// Forward counter events to one viewer until it disconnects.
async fn process(socket: WebSocket, counters: Arc<Counters>) {
    // Subscribe before announcing the connect so this viewer receives its
    // own updated count.
    let mut rx = counters.subscribe();
    counters.viewer_connected();
    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            ev = rx.recv() => match ev {
                Ok(ev) => {
                    if sender.send(Message::Text(ev.to_json())).await.is_err() {
                        break;
                    }
                }
                // A lagged viewer just misses intermediate counts.
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
            msg = receiver.next() => match msg {
                // Viewers don't speak; drain whatever arrives.
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }
    counters.viewer_disconnected();
}
