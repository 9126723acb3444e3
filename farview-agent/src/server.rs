//! TCP accept loop and request routing.
//!
//! Every connection starts as HTTP. The request head is *peeked* (not
//! consumed) to pick a route: WebSocket upgrades hand the untouched
//! stream to tungstenite, plain API requests are consumed and answered
//! inline. Three JSON endpoints control the pipeline:
//!
//! - `GET /api/startstream`  — start the supervisor (idempotent)
//! - `GET /api/stopstream`   — stop, refused while viewers are connected
//! - `GET /api/streamstatus` — running flag + stats
//!
//! plus the two WebSocket endpoints `/wsstream` and `/wscontrol`.

use std::sync::Arc;

use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use farview_core::StreamSupervisor;

use crate::control_ws::{self, ControlContext};
use crate::http::{self, HttpRequest};
use crate::media_ws;

/// Upper bound on a request head we are willing to peek.
const MAX_HEAD: usize = 8192;

/// Run the agent server until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    supervisor: Arc<StreamSupervisor>,
    control: ControlContext,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "agent server listening");

    loop {
        let accepted = tokio::select! {
            result = listener.accept() => result,
            _ = shutdown.cancelled() => break,
        };

        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        debug!(%peer, "connection accepted");

        let supervisor = Arc::clone(&supervisor);
        let control = control.clone();
        tokio::spawn(async move {
            if let Err(e) = route(stream, supervisor, control).await {
                debug!(%peer, error = %e, "connection ended with error");
            }
        });
    }

    info!("agent server stopped");
    Ok(())
}

/// Peek the request head and dispatch the connection.
async fn route(
    stream: TcpStream,
    supervisor: Arc<StreamSupervisor>,
    control: ControlContext,
) -> std::io::Result<()> {
    let head = match peek_head(&stream).await? {
        Some(head) => head,
        None => return Ok(()), // peer went away before sending a head
    };

    let request = match HttpRequest::parse(&head) {
        Ok(req) => req,
        Err(e) => {
            let mut stream = stream;
            stream
                .write_all(http::bad_request(&e.to_string()).as_bytes())
                .await?;
            return stream.shutdown().await;
        }
    };

    match request.route() {
        // WebSocket endpoints get the stream with the handshake bytes
        // still unread; tungstenite performs the upgrade itself.
        "/wsstream" if request.is_websocket_upgrade() => {
            media_ws::handle(stream, supervisor).await;
            Ok(())
        }
        "/wscontrol" if request.is_websocket_upgrade() => {
            control_ws::handle(stream, control).await;
            Ok(())
        }
        route => respond_api(stream, &request, route, supervisor).await,
    }
}

/// Consume the head and answer a plain API request.
async fn respond_api(
    mut stream: TcpStream,
    request: &HttpRequest,
    route: &str,
    supervisor: Arc<StreamSupervisor>,
) -> std::io::Result<()> {
    // The head was only peeked so far; a GET has no body, so consuming
    // the peeked bytes drains the request before we answer.
    consume(&mut stream).await?;

    let response = if request.method != "GET" {
        http::json_response(
            405,
            "Method Not Allowed",
            &json!({ "code": -1, "message": "only GET is supported" }),
        )
    } else {
        match route {
            "/api/startstream" => start_stream(supervisor).await,
            "/api/stopstream" => stop_stream(supervisor).await,
            "/api/streamstatus" => stream_status(supervisor),
            other => http::not_found(other),
        }
    };

    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

// ── API handlers ─────────────────────────────────────────────────

async fn start_stream(supervisor: Arc<StreamSupervisor>) -> String {
    info!("start stream requested");

    if supervisor.is_running() {
        return http::json_response(
            200,
            "OK",
            &json!({
                "code": 0,
                "message": "stream already running",
                "data": { "running": true, "stats": supervisor.stats() },
            }),
        );
    }

    // start() probes the display and joins nothing, but it still does
    // blocking work; keep it off the reactor.
    let sup = Arc::clone(&supervisor);
    let started = tokio::task::spawn_blocking(move || sup.start()).await;

    match started {
        Ok(Ok(())) => http::json_response(
            200,
            "OK",
            &json!({
                "code": 0,
                "message": "stream started",
                "data": {
                    "running": supervisor.is_running(),
                    "stats": supervisor.stats(),
                    "websocket_url": "/wsstream",
                },
            }),
        ),
        Ok(Err(e)) => {
            warn!(error = %e, "stream start failed");
            http::json_response(
                500,
                "Internal Server Error",
                &json!({ "code": -1, "message": "failed to start stream", "error": e.to_string() }),
            )
        }
        Err(e) => http::json_response(
            500,
            "Internal Server Error",
            &json!({ "code": -1, "message": "failed to start stream", "error": e.to_string() }),
        ),
    }
}

async fn stop_stream(supervisor: Arc<StreamSupervisor>) -> String {
    info!("stop stream requested");

    if !supervisor.is_running() {
        return http::json_response(
            200,
            "OK",
            &json!({
                "code": 0,
                "message": "stream not running",
                "data": { "running": false, "stats": supervisor.stats() },
            }),
        );
    }

    // Somebody is still watching: refuse. The message is kept
    // byte-identical to the deployed backend's contract.
    let viewers = supervisor.client_count();
    if viewers > 0 {
        info!(viewers, "stop refused, viewers still connected");
        return http::json_response(
            200,
            "OK",
            &json!({ "code": 0, "message": "其他用户正在观看，无法停止视频流" }),
        );
    }

    let sup = Arc::clone(&supervisor);
    let stopped = tokio::task::spawn_blocking(move || sup.stop()).await;

    match stopped {
        Ok(Ok(())) => http::json_response(
            200,
            "OK",
            &json!({ "code": 0, "message": "stream stopped" }),
        ),
        Ok(Err(e)) => http::json_response(
            500,
            "Internal Server Error",
            &json!({ "code": -1, "message": "failed to stop stream", "error": e.to_string() }),
        ),
        Err(e) => http::json_response(
            500,
            "Internal Server Error",
            &json!({ "code": -1, "message": "failed to stop stream", "error": e.to_string() }),
        ),
    }
}

fn stream_status(supervisor: Arc<StreamSupervisor>) -> String {
    let running = supervisor.is_running();
    let mut data = serde_json::Map::new();
    data.insert("running".into(), json!(running));
    data.insert("stats".into(), supervisor.stats());
    data.insert("timestamp".into(), json!(chrono::Utc::now().timestamp()));

    if running {
        data.insert("websocket_url".into(), json!("/wsstream"));
        data.insert(
            "available_actions".into(),
            json!(["stop", "connect_websocket"]),
        );
        data.insert("message".into(), json!("stream running, websocket available"));
    } else {
        data.insert("available_actions".into(), json!(["start"]));
        data.insert(
            "message".into(),
            json!("stream not running, call /api/startstream first"),
        );
    }

    http::json_response(200, "OK", &json!({ "code": 0, "data": data }))
}

// ── Head peeking ─────────────────────────────────────────────────

/// Peek until a full request head (`\r\n\r\n`) is buffered.
///
/// Returns `None` when the peer closes before completing a head, and
/// an error when the head exceeds [`MAX_HEAD`].
async fn peek_head(stream: &TcpStream) -> std::io::Result<Option<String>> {
    let mut buf = vec![0u8; MAX_HEAD];
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(10);

    loop {
        let n = stream.peek(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }

        if let Some(end) = find_head_end(&buf[..n]) {
            let head = String::from_utf8_lossy(&buf[..end]).into_owned();
            return Ok(Some(head));
        }

        if n == buf.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "request head too large",
            ));
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "request head not completed in time",
            ));
        }

        // No terminator yet: wait for more bytes to arrive.
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
}

/// Byte offset just past the `\r\n\r\n` terminator, if present.
fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// Read and discard whatever is currently buffered on the socket.
async fn consume(stream: &mut TcpStream) -> std::io::Result<()> {
    use tokio::io::AsyncReadExt;
    let mut scratch = vec![0u8; MAX_HEAD];
    let n = stream.peek(&mut scratch).await?;
    if n > 0 {
        stream.read_exact(&mut scratch[..n]).await?;
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_end_detection() {
        assert_eq!(find_head_end(b"GET / HTTP/1.1\r\n\r\n"), Some(18));
        assert_eq!(find_head_end(b"GET / HTTP/1.1\r\n\r\nBODY"), Some(18));
        assert_eq!(find_head_end(b"GET / HTTP/1.1\r\n"), None);
        assert_eq!(find_head_end(b""), None);
    }
}
