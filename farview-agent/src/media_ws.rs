//! Media WebSocket endpoint — `GET /wsstream`.
//!
//! One upgrade yields one hub subscriber. The channel is one-way
//! server→client: binary frames carry encoded packets, and the reader
//! side only services control frames (pong, close). Any send or read
//! failure tears down this session only; the drop guard unregisters
//! the subscriber on every exit path.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tracing::{debug, info, warn};

use farview_core::StreamSupervisor;

/// Per-write deadline on the media socket.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Idle ping period.
const PING_PERIOD: Duration = Duration::from_secs(54);

/// Read deadline; extended by any inbound frame (pongs included).
const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Error frame sent when streaming has not been started.
fn stream_not_started() -> String {
    serde_json::json!({
        "error": "stream_not_started",
        "message": "call /api/startstream before connecting",
        "code": 4001,
    })
    .to_string()
}

/// Error frame sent when the hub actor is gone.
fn hub_not_initialized() -> String {
    serde_json::json!({
        "error": "hub_not_initialized",
        "message": "streaming service not initialized",
        "code": 4002,
    })
    .to_string()
}

/// Handle one media connection from upgrade to close.
pub async fn handle(stream: TcpStream, supervisor: Arc<StreamSupervisor>) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(error = %e, "media websocket upgrade failed");
            return;
        }
    };

    if !supervisor.is_running() {
        info!("media connection refused: stream not started");
        reject(ws, stream_not_started()).await;
        return;
    }
    if !supervisor.hub().is_alive() {
        warn!("media connection refused: hub not initialized");
        reject(ws, hub_not_initialized()).await;
        return;
    }

    let (guard, mut packets) = supervisor.hub().subscribe();
    info!(subscriber = %guard.id(), "media viewer connected");

    let (mut ws_tx, mut ws_rx) = ws.split();

    // Writer: drain the subscriber queue into binary frames, with idle
    // pings. Reader: consume control frames under the read deadline.
    let writer = async {
        let mut ping = tokio::time::interval_at(
            tokio::time::Instant::now() + PING_PERIOD,
            PING_PERIOD,
        );
        loop {
            tokio::select! {
                maybe = packets.recv() => {
                    let Some(data) = maybe else {
                        // Evicted by the hub (or pipeline stopped).
                        debug!("subscriber queue closed");
                        break;
                    };
                    match tokio::time::timeout(WRITE_TIMEOUT, ws_tx.send(Message::Binary(data))).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            debug!(error = %e, "media write failed");
                            break;
                        }
                        Err(_) => {
                            debug!("media write timed out");
                            break;
                        }
                    }
                }
                _ = ping.tick() => {
                    let sent = tokio::time::timeout(
                        WRITE_TIMEOUT,
                        ws_tx.send(Message::Ping(Vec::new())),
                    )
                    .await;
                    if !matches!(sent, Ok(Ok(()))) {
                        debug!("media ping failed");
                        break;
                    }
                }
            }
        }
    };

    let reader = async {
        loop {
            match tokio::time::timeout(READ_TIMEOUT, ws_rx.next()).await {
                Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                    debug!("media client closed");
                    break;
                }
                Ok(Some(Ok(_))) => {} // pong or stray frame: deadline extended
                Ok(Some(Err(e))) => {
                    debug!(error = %e, "media read failed");
                    break;
                }
                Err(_) => {
                    info!("media client idle past read deadline");
                    break;
                }
            }
        }
    };

    // Either side ending the session ends both.
    tokio::select! {
        _ = writer => {}
        _ = reader => {}
    }

    info!(subscriber = %guard.id(), "media viewer disconnected");
    drop(guard); // explicit: unregisters from the hub
}

/// Send one TEXT error frame and close.
async fn reject(mut ws: WebSocketStream<TcpStream>, body: String) {
    let _ = ws.send(Message::Text(body)).await;
    let _ = ws.close(None).await;
}
