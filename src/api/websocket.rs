use actix_web::{web, Error, HttpRequest, Responder};
use actix_ws::Message;
use futures_util::StreamExt;
use log::{info, warn};
use serde_json::json;
use tokio::sync::mpsc;

use crate::api::AppState;
use crate::broadcast::{Broadcaster, CLIENT_QUEUE_CAPACITY};

/// Handle WebSocket connections: register the client with the broadcaster,
/// push the init snapshot, then stream until either side drops.
pub async fn ws_index(
    req: HttpRequest,
    body: web::Payload,
    state: web::Data<AppState>,
) -> Result<impl Responder, Error> {
    let peer = req
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let (response, session, mut msg_stream) = actix_ws::handle(&req, body)?;
    info!("WebSocket client connected: {}", peer);

    let (tx, mut rx) = mpsc::channel::<String>(CLIENT_QUEUE_CAPACITY);
    let client_id = state.broadcaster.register(tx);

    let init = Broadcaster::envelope(
        "init",
        &json!({
            "packets": state.store.recent_packets(100),
            "stats": state.store.stats(),
            "connections": state.store.connections(),
            "interface": state.config.interface,
        }),
    );

    // Writer task: the only place frames are written for this client
    {
        let mut session = session.clone();
        let broadcaster = state.broadcaster.clone();
        let peer = peer.clone();
        actix_web::rt::spawn(async move {
            match init {
                Ok(init) => {
                    if session.text(init).await.is_err() {
                        broadcaster.unregister(client_id);
                        return;
                    }
                }
                Err(e) => warn!("Failed to build init message: {}", e),
            }
            while let Some(message) = rx.recv().await {
                if session.text(message).await.is_err() {
                    break;
                }
            }
            broadcaster.unregister(client_id);
            let _ = session.close(None).await;
            info!("WebSocket writer finished for {}", peer);
        });
    }

    // Reader task: inbound frames are consumed only for liveness
    {
        let mut session = session;
        let broadcaster = state.broadcaster.clone();
        actix_web::rt::spawn(async move {
            while let Some(Ok(message)) = msg_stream.next().await {
                match message {
                    Message::Ping(bytes) => {
                        if session.pong(&bytes).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            broadcaster.unregister(client_id);
            let _ = session.close(None).await;
            info!("WebSocket client disconnected: {}", peer);
        });
    }

    Ok(response)
}
