//! # Channel Socket Endpoints
//!
//! One axum server per channel port. `/ws` upgrades to a WebSocket whose
//! text frames are fed to the channel hub; everything the hub sends back for
//! the connection is pumped out on the same socket.

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::Method,
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use lib_common::channels::ChannelHandle;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

pub fn channel_router(handle: ChannelHandle) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST]);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(handle)
}

/// Serves one channel until the shutdown broadcast fires.
pub async fn serve(
    listener: TcpListener,
    handle: ChannelHandle,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let label = handle.channel().label.clone();
    axum::serve(listener, channel_router(handle))
        .with_graceful_shutdown(async move {
            shutdown.recv().await.ok();
            tracing::info!("{} socket server shutting down.", label);
        })
        .await
}

async fn root_handler(State(handle): State<ChannelHandle>) -> String {
    format!("Socket server is running on port {}", handle.channel().id)
}

async fn health_handler() -> impl IntoResponse {
    (axum::http::StatusCode::OK, "OK")
}

async fn ws_handler(ws: WebSocketUpgrade, State(handle): State<ChannelHandle>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, handle))
}

async fn handle_socket(socket: WebSocket, handle: ChannelHandle) {
    let (mut sink, mut stream) = socket.split();
    let (id, mut outbound) = handle.join();

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => handle.inbound(id, text.as_str()),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Binary, ping and pong frames carry nothing for the channel.
                Some(Ok(_)) => {}
            },
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if sink.send(Message::Text(frame.text().to_owned().into())).await.is_err() {
                        break;
                    }
                }
                None => {
                    tracing::debug!(conn = id, "outbound queue closed, dropping socket");
                    break;
                }
            },
        }
    }

    handle.leave(id);
}
