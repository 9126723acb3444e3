//! Control WebSocket endpoint — `GET /wscontrol`.
//!
//! One connection is one control session: typed JSON messages in,
//! reply envelopes out. Mouse coordinates arrive in the encoder's
//! coordinate system and are mapped to the screen here, at the last
//! instant before injection. A malformed message costs one error
//! reply; only an I/O error or the idle deadline ends the session.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use farview_core::control::{
    self, ControlMessage, MSG_CLIPBOARD_GET, MSG_CLIPBOARD_PASTE, MSG_CLIPBOARD_SET,
    MSG_COORDINATE_MAPPING_STATUS, MSG_KEY_COMBO, MSG_KEY_DOWN, MSG_KEY_PRESS, MSG_KEY_UP,
    MSG_MOUSE_LEFT_CLICK, MSG_MOUSE_LEFT_DOWN, MSG_MOUSE_LEFT_UP, MSG_MOUSE_MIDDLE_CLICK,
    MSG_MOUSE_MIDDLE_DOWN, MSG_MOUSE_MIDDLE_UP, MSG_MOUSE_MOVE, MSG_MOUSE_RESET,
    MSG_MOUSE_RIGHT_CLICK, MSG_MOUSE_RIGHT_DOWN, MSG_MOUSE_RIGHT_UP, MSG_MOUSE_WHEEL_DOWN,
    MSG_MOUSE_WHEEL_UP, MSG_SYSTEM_DESKTOP, MSG_SYSTEM_REBOOT, MSG_SYSTEM_TASKMANAGER,
};
use farview_core::{clipboard, FarviewError, InputInjector, MouseButton, StreamSupervisor};

/// Idle ping period on the control channel.
const PING_PERIOD: Duration = Duration::from_secs(30);

/// Read deadline; extended by any inbound frame.
const READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Everything a control session needs to act on the host.
#[derive(Clone)]
pub struct ControlContext {
    pub supervisor: Arc<StreamSupervisor>,
    pub injector: InputInjector,
    /// Whether `SYSTEM_REBOOT` may act (config gate).
    pub reboot_enabled: bool,
    /// Seconds between accepting a reboot and issuing it.
    pub reboot_delay: u32,
}

/// Handle one control session from upgrade to close.
pub async fn handle(stream: TcpStream, ctx: ControlContext) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(error = %e, "control websocket upgrade failed");
            return;
        }
    };
    info!("control session established");

    let (mut ws_tx, mut ws_rx) = ws.split();

    // One-shot success envelope so the viewer knows the channel is up.
    let hello = ControlMessage::success("control connection established", Value::Null, None);
    if send(&mut ws_tx, &hello).await.is_err() {
        return;
    }

    if !ctx.supervisor.mapper().is_initialized() {
        warn!("coordinate mapping not initialized; control proceeds with identity transform");
    }

    let mut ping = tokio::time::interval_at(
        tokio::time::Instant::now() + PING_PERIOD,
        PING_PERIOD,
    );

    loop {
        tokio::select! {
            result = tokio::time::timeout(READ_TIMEOUT, ws_rx.next()) => {
                match result {
                    Ok(Some(Ok(Message::Text(text)))) => {
                        let reply = handle_text(&ctx, &text);
                        if send(&mut ws_tx, &reply).await.is_err() {
                            break;
                        }
                    }
                    Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                        debug!("control client closed");
                        break;
                    }
                    Ok(Some(Ok(_))) => {} // pong or stray frame
                    Ok(Some(Err(e))) => {
                        debug!(error = %e, "control read failed");
                        break;
                    }
                    Err(_) => {
                        info!("control client idle past read deadline");
                        break;
                    }
                }
            }
            _ = ping.tick() => {
                if ws_tx.send(Message::Ping(Vec::new())).await.is_err() {
                    debug!("control ping failed");
                    break;
                }
            }
        }
    }

    info!("control session ended");
}

async fn send<S>(ws_tx: &mut S, msg: &ControlMessage) -> Result<(), FarviewError>
where
    S: futures_util::Sink<Message> + Unpin,
{
    let text = msg.to_json()?;
    ws_tx
        .send(Message::Text(text))
        .await
        .map_err(|_| FarviewError::ChannelClosed)
}

/// Parse one TEXT frame and produce the reply envelope.
fn handle_text(ctx: &ControlContext, text: &str) -> ControlMessage {
    match ControlMessage::parse(text) {
        Ok(msg) => dispatch(ctx, msg),
        Err(parse_err) => handle_unparsed(ctx, text, parse_err),
    }
}

/// A frame that is not typed JSON: try the legacy dialect when built
/// in, otherwise reply with a parse error.
#[cfg(feature = "legacy-control")]
fn handle_unparsed(ctx: &ControlContext, text: &str, parse_err: FarviewError) -> ControlMessage {
    debug!(error = %parse_err, "not typed json, trying legacy dialect");
    match legacy::handle(ctx, text) {
        Ok(()) => ControlMessage::success("legacy message handled", Value::Null, None),
        Err(e) => ControlMessage::error("failed to handle message", &e.to_string(), None),
    }
}

#[cfg(not(feature = "legacy-control"))]
fn handle_unparsed(_ctx: &ControlContext, _text: &str, parse_err: FarviewError) -> ControlMessage {
    debug!(error = %parse_err, "unparseable control message");
    ControlMessage::error("failed to parse message", &parse_err.to_string(), None)
}

/// Execute one typed control message and build its reply.
pub fn dispatch(ctx: &ControlContext, msg: ControlMessage) -> ControlMessage {
    let id = msg.id.clone();
    let result = match msg.msg_type.as_str() {
        // ── Mouse ────────────────────────────────────────────────
        MSG_MOUSE_MOVE => mouse_at(ctx, &msg).map(|_| "mouse moved"),
        MSG_MOUSE_LEFT_CLICK => mouse_click(ctx, &msg, MouseButton::Left),
        MSG_MOUSE_RIGHT_CLICK => mouse_click(ctx, &msg, MouseButton::Right),
        MSG_MOUSE_MIDDLE_CLICK => mouse_click(ctx, &msg, MouseButton::Middle),
        MSG_MOUSE_LEFT_DOWN => mouse_button(ctx, &msg, MouseButton::Left, true),
        MSG_MOUSE_LEFT_UP => mouse_button(ctx, &msg, MouseButton::Left, false),
        MSG_MOUSE_RIGHT_DOWN => mouse_button(ctx, &msg, MouseButton::Right, true),
        MSG_MOUSE_RIGHT_UP => mouse_button(ctx, &msg, MouseButton::Right, false),
        MSG_MOUSE_MIDDLE_DOWN => mouse_button(ctx, &msg, MouseButton::Middle, true),
        MSG_MOUSE_MIDDLE_UP => mouse_button(ctx, &msg, MouseButton::Middle, false),
        MSG_MOUSE_WHEEL_UP => mouse_wheel(ctx, &msg, 3),
        MSG_MOUSE_WHEEL_DOWN => mouse_wheel(ctx, &msg, -3),
        MSG_MOUSE_RESET => {
            // Right button deliberately stays untouched: releasing it
            // here pops a context menu on the host.
            ctx.injector.button_up(MouseButton::Left).ok();
            ctx.injector.button_up(MouseButton::Middle).ok();
            Ok("mouse state reset")
        }

        // ── Keyboard ─────────────────────────────────────────────
        MSG_KEY_DOWN => return key_event(ctx, &msg, KeyAction::Down),
        MSG_KEY_UP => return key_event(ctx, &msg, KeyAction::Up),
        MSG_KEY_PRESS => return key_event(ctx, &msg, KeyAction::Tap),
        MSG_KEY_COMBO => control::extract_keys(&msg.data).and_then(|keys| {
            if keys.len() == 1 {
                ctx.injector.key_tap(&keys[0])?;
            } else {
                ctx.injector.key_combo(keys)?;
            }
            Ok("key combo issued")
        }),

        // ── Clipboard ────────────────────────────────────────────
        MSG_CLIPBOARD_PASTE => control::extract_text(&msg.data, "text").and_then(|text| {
            ctx.injector.type_string(text)?;
            Ok("text typed")
        }),
        MSG_CLIPBOARD_SET => control::extract_text(&msg.data, "text").and_then(|text| {
            clipboard::write(text)?;
            Ok("clipboard set")
        }),
        MSG_CLIPBOARD_GET => {
            return match clipboard::read() {
                Ok(text) => ControlMessage::clipboard_update(&text),
                Err(e) => ControlMessage::error("clipboard read failed", &e.to_string(), id),
            }
        }

        // ── System ───────────────────────────────────────────────
        MSG_SYSTEM_DESKTOP => ctx
            .injector
            .key_combo(vec!["cmd".into(), "d".into()])
            .map(|_| "desktop shown"),
        MSG_SYSTEM_TASKMANAGER => ctx
            .injector
            .key_combo(vec!["ctrl".into(), "shift".into(), "esc".into()])
            .map(|_| "task manager opened"),
        MSG_SYSTEM_REBOOT => {
            if !ctx.reboot_enabled {
                warn!("reboot requested but disabled by configuration");
                return ControlMessage::info("reboot disabled by configuration", id);
            }
            schedule_reboot(ctx.reboot_delay);
            return ControlMessage::success(
                "reboot scheduled",
                serde_json::json!({ "delay_seconds": ctx.reboot_delay }),
                id,
            );
        }

        // ── Mapping status ───────────────────────────────────────
        MSG_COORDINATE_MAPPING_STATUS => {
            let mapper = ctx.supervisor.mapper();
            return if mapper.is_initialized() {
                ControlMessage::success("coordinate mapping status", mapper.status(), id)
            } else {
                ControlMessage::error(
                    "coordinate mapping not initialized",
                    "wait for the video stream to start",
                    id,
                )
            };
        }

        other => Err(FarviewError::UnknownMessageType(other.to_string())),
    };

    match result {
        Ok(message) => ControlMessage::success(message, Value::Null, id),
        Err(e) => {
            debug!(msg_type = %msg.msg_type, error = %e, "control message failed");
            ControlMessage::error("failed to handle message", &e.to_string(), id)
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Transform the message's coordinates and move the pointer there.
fn mouse_at(ctx: &ControlContext, msg: &ControlMessage) -> Result<(i32, i32), FarviewError> {
    let (x, y) = control::extract_coordinates(&msg.data)?;
    let (sx, sy) = ctx.supervisor.mapper().transform(x, y);
    ctx.injector.move_to(sx, sy)?;
    Ok((sx, sy))
}

fn mouse_click(
    ctx: &ControlContext,
    msg: &ControlMessage,
    button: MouseButton,
) -> Result<&'static str, FarviewError> {
    mouse_at(ctx, msg)?;
    ctx.injector.click(button)?;
    Ok("mouse clicked")
}

fn mouse_button(
    ctx: &ControlContext,
    msg: &ControlMessage,
    button: MouseButton,
    down: bool,
) -> Result<&'static str, FarviewError> {
    mouse_at(ctx, msg)?;
    if down {
        ctx.injector.button_down(button)?;
        Ok("mouse button pressed")
    } else {
        ctx.injector.button_up(button)?;
        Ok("mouse button released")
    }
}

fn mouse_wheel(
    ctx: &ControlContext,
    msg: &ControlMessage,
    dy: i32,
) -> Result<&'static str, FarviewError> {
    mouse_at(ctx, msg)?;
    ctx.injector.scroll(0, dy)?;
    Ok("mouse wheel scrolled")
}

enum KeyAction {
    Down,
    Up,
    Tap,
}

/// Key events: a message with no key information is malformed, but a
/// keysym outside the mapping is logged and ignored per contract.
fn key_event(ctx: &ControlContext, msg: &ControlMessage, action: KeyAction) -> ControlMessage {
    let id = msg.id.clone();
    match control::extract_key(&msg.data) {
        Ok(key) => {
            let result = match action {
                KeyAction::Down => ctx.injector.key_down(&key),
                KeyAction::Up => ctx.injector.key_up(&key),
                KeyAction::Tap => ctx.injector.key_tap(&key),
            };
            match result {
                Ok(()) => ControlMessage::success("key event issued", Value::Null, id),
                Err(e) => ControlMessage::error("key injection failed", &e.to_string(), id),
            }
        }
        Err(e) => {
            let has_key_field =
                msg.data.contains_key("key") || msg.data.contains_key("keyStr");
            if has_key_field {
                warn!(data = ?msg.data, "unknown key symbol, ignoring");
                ControlMessage::success("key ignored: unknown key symbol", Value::Null, id)
            } else {
                ControlMessage::error("invalid key event", &e.to_string(), id)
            }
        }
    }
}

/// Schedule the OS reboot off the session task, so the reply still
/// goes out before the host goes down.
fn schedule_reboot(delay_seconds: u32) {
    info!(delay_seconds, "system reboot scheduled");
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(delay_seconds as u64)).await;
        info!("issuing system reboot");

        let mut command = tokio::process::Command::new("shutdown");
        if cfg!(target_os = "windows") {
            command.args(["/r", "/t", "0"]);
        } else {
            command.args(["-r", "now"]);
        }

        match command.status().await {
            Ok(status) if status.success() => info!("reboot command issued"),
            Ok(status) => warn!(code = ?status.code(), "reboot command failed"),
            Err(e) => warn!(error = %e, "reboot command could not be spawned"),
        }
    });
}

// ── Legacy textual dialect ───────────────────────────────────────

/// Compatibility parser for the pre-JSON control protocol:
/// `"<k>.<args>"` with `k` 5 for mouse/paste and 3 for
/// keyboard/command. Coordinates are raw screen coordinates; the
/// dialect predates the coordinate mapping.
#[cfg(feature = "legacy-control")]
mod legacy {
    use super::*;

    pub fn handle(ctx: &ControlContext, message: &str) -> Result<(), FarviewError> {
        let (kind, rest) = message
            .split_once('.')
            .ok_or_else(|| FarviewError::MalformedMessage(format!("invalid format: {message}")))?;
        let params: Vec<&str> = rest.split(',').collect();

        match kind {
            "5" => {
                if params.first() == Some(&"paste") {
                    return paste(ctx, rest);
                }
                mouse(ctx, &params)
            }
            "3" => keyboard_or_command(ctx, &params),
            other => Err(FarviewError::UnknownMessageType(other.to_string())),
        }
    }

    /// `5.mouse,x,y,button,timestamp`
    fn mouse(ctx: &ControlContext, params: &[&str]) -> Result<(), FarviewError> {
        if params.first() == Some(&"reset") {
            ctx.injector.button_up(MouseButton::Left)?;
            ctx.injector.button_up(MouseButton::Middle)?;
            return Ok(());
        }
        if params.len() < 4 || params[0] != "mouse" {
            return Err(FarviewError::MalformedMessage(format!(
                "invalid mouse params: {params:?}"
            )));
        }

        let x: i32 = params[1]
            .parse()
            .map_err(|_| FarviewError::MalformedMessage(format!("invalid x: {}", params[1])))?;
        let y: i32 = params[2]
            .parse()
            .map_err(|_| FarviewError::MalformedMessage(format!("invalid y: {}", params[2])))?;
        let button: u32 = params[3]
            .parse()
            .map_err(|_| FarviewError::MalformedMessage(format!("invalid button: {}", params[3])))?;

        ctx.injector.move_to(x, y)?;
        match button {
            0 => {}
            1 => ctx.injector.click(MouseButton::Left)?,
            2 => ctx.injector.click(MouseButton::Middle)?,
            4 => ctx.injector.click(MouseButton::Right)?,
            8 => ctx.injector.scroll(0, -3)?,
            16 => ctx.injector.scroll(0, 3)?,
            other => warn!(button = other, "unknown legacy mouse button"),
        }
        Ok(())
    }

    /// `5.paste,text` — text may itself contain commas.
    fn paste(ctx: &ControlContext, rest: &str) -> Result<(), FarviewError> {
        let text = rest
            .strip_prefix("paste,")
            .ok_or_else(|| FarviewError::MalformedMessage("paste without payload".into()))?;
        ctx.injector.type_string(text)
    }

    /// `3.key,keysym,pressed,timestamp` or `3.cmd,0.command`
    fn keyboard_or_command(ctx: &ControlContext, params: &[&str]) -> Result<(), FarviewError> {
        match params.first() {
            Some(&"key") => {
                if params.len() < 3 {
                    return Err(FarviewError::MalformedMessage(format!(
                        "invalid key params: {params:?}"
                    )));
                }
                let keysym: u32 = params[1].parse().map_err(|_| {
                    FarviewError::MalformedMessage(format!("invalid keysym: {}", params[1]))
                })?;
                let pressed = params[2] == "1";

                let Some(key) = farview_core::keysym::keysym_to_name(keysym) else {
                    warn!(keysym, "unsupported legacy keysym, ignoring");
                    return Ok(());
                };
                if pressed {
                    ctx.injector.key_down(&key)
                } else {
                    ctx.injector.key_up(&key)
                }
            }
            Some(&"cmd") => {
                let command = params.get(1..).map(|p| p.join(",")).unwrap_or_default();
                if command.contains("/keyboard?cmd=win_d") {
                    ctx.injector.key_combo(vec!["cmd".into(), "d".into()])
                } else if command.contains("/process?")
                    && command.contains("name=taskmgr")
                    && command.contains("action=start")
                {
                    ctx.injector
                        .key_combo(vec!["ctrl".into(), "shift".into(), "esc".into()])
                } else if command.contains("/reboot") {
                    // The legacy dialect has no config gate; log only.
                    info!("legacy reboot command received, not acting");
                    Ok(())
                } else {
                    Err(FarviewError::MalformedMessage(format!(
                        "unknown legacy command: {command}"
                    )))
                }
            }
            _ => Err(FarviewError::MalformedMessage(format!(
                "unknown keyboard/command action: {params:?}"
            ))),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use farview_core::control::{MSG_RESPONSE_ERROR, MSG_RESPONSE_INFO, MSG_RESPONSE_SUCCESS};
    use farview_core::input::InputBackend;
    use farview_core::{StreamConfig, StreamSupervisor};
    use std::sync::{Arc, Mutex};

    struct RecordingBackend {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl InputBackend for RecordingBackend {
        fn move_to(&mut self, x: i32, y: i32) -> Result<(), FarviewError> {
            self.log.lock().unwrap().push(format!("move {x},{y}"));
            Ok(())
        }
        fn button(&mut self, button: MouseButton, down: bool) -> Result<(), FarviewError> {
            let dir = if down { "down" } else { "up" };
            self.log
                .lock()
                .unwrap()
                .push(format!("button {} {dir}", button.name()));
            Ok(())
        }
        fn scroll(&mut self, dx: i32, dy: i32) -> Result<(), FarviewError> {
            self.log.lock().unwrap().push(format!("scroll {dx},{dy}"));
            Ok(())
        }
        fn key(&mut self, name: &str, down: bool) -> Result<(), FarviewError> {
            let dir = if down { "down" } else { "up" };
            self.log.lock().unwrap().push(format!("key {name} {dir}"));
            Ok(())
        }
        fn type_char(&mut self, c: char) -> Result<(), FarviewError> {
            self.log.lock().unwrap().push(format!("type {c}"));
            Ok(())
        }
    }

    fn context() -> (ControlContext, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let injector = InputInjector::with_backend(Box::new(RecordingBackend {
            log: Arc::clone(&log),
        }));
        // Fixed 1920x1080 screen probe so mapping updates are
        // deterministic without a display.
        let supervisor = StreamSupervisor::with_screen_probe(
            StreamConfig::default(),
            Box::new(|| Some((1920, 1080))),
        );
        let ctx = ControlContext {
            supervisor: Arc::new(supervisor),
            injector,
            reboot_enabled: false,
            reboot_delay: 1,
        };
        (ctx, log)
    }

    fn message(raw: &str) -> ControlMessage {
        ControlMessage::parse(raw).unwrap()
    }

    async fn wait_for(log: &Arc<Mutex<Vec<String>>>, n: usize) -> Vec<String> {
        for _ in 0..100 {
            if log.lock().unwrap().len() >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn mouse_move_applies_coordinate_mapping() {
        let (ctx, log) = context();
        // Encoder 1280x720 against the probed 1920x1080 screen.
        ctx.supervisor.mapper().update(1280, 720);

        let reply = dispatch(
            &ctx,
            message(r#"{"type":"MOUSE_MOVE","data":{"x":640,"y":360}}"#),
        );
        assert_eq!(reply.msg_type, MSG_RESPONSE_SUCCESS);
        assert_eq!(wait_for(&log, 1).await, vec!["move 960,540"]);
    }

    #[tokio::test]
    async fn click_moves_then_clicks() {
        let (ctx, log) = context();
        ctx.supervisor.mapper().update(1920, 1080);

        dispatch(
            &ctx,
            message(r#"{"type":"MOUSE_LEFT_CLICK","data":{"x":10,"y":20}}"#),
        );
        assert_eq!(
            wait_for(&log, 3).await,
            vec!["move 10,20", "button left down", "button left up"]
        );
    }

    #[tokio::test]
    async fn wheel_scrolls_three_notches() {
        let (ctx, log) = context();
        ctx.supervisor.mapper().update(1920, 1080);

        dispatch(
            &ctx,
            message(r#"{"type":"MOUSE_WHEEL_UP","data":{"x":5,"y":5}}"#),
        );
        dispatch(
            &ctx,
            message(r#"{"type":"MOUSE_WHEEL_DOWN","data":{"x":5,"y":5}}"#),
        );
        assert_eq!(
            wait_for(&log, 4).await,
            vec!["move 5,5", "scroll 0,3", "move 5,5", "scroll 0,-3"]
        );
    }

    #[tokio::test]
    async fn mouse_reset_leaves_right_button_alone() {
        let (ctx, log) = context();
        dispatch(&ctx, message(r#"{"type":"MOUSE_RESET","data":{}}"#));

        let log = wait_for(&log, 2).await;
        assert_eq!(log, vec!["button left up", "button middle up"]);
        assert!(!log.iter().any(|l| l.contains("right")));
    }

    #[tokio::test]
    async fn key_press_maps_keysym() {
        let (ctx, log) = context();
        dispatch(
            &ctx,
            message(r#"{"type":"KEY_PRESS","data":{"key":65293}}"#),
        );
        assert_eq!(wait_for(&log, 2).await, vec!["key enter down", "key enter up"]);
    }

    #[tokio::test]
    async fn unknown_keysym_is_ignored_not_errored() {
        let (ctx, log) = context();
        let reply = dispatch(
            &ctx,
            message(r#"{"type":"KEY_DOWN","data":{"key":9999999}}"#),
        );
        assert_eq!(reply.msg_type, MSG_RESPONSE_SUCCESS);
        assert!(reply.data["message"]
            .as_str()
            .unwrap()
            .contains("ignored"));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn key_event_without_key_info_is_an_error() {
        let (ctx, _log) = context();
        let reply = dispatch(&ctx, message(r#"{"type":"KEY_DOWN","data":{}}"#));
        assert_eq!(reply.msg_type, MSG_RESPONSE_ERROR);
    }

    #[tokio::test]
    async fn combo_taps_last_with_modifiers() {
        let (ctx, log) = context();
        dispatch(
            &ctx,
            message(r#"{"type":"SYSTEM_TASKMANAGER","data":{}}"#),
        );
        assert_eq!(
            wait_for(&log, 6).await,
            vec![
                "key ctrl down",
                "key shift down",
                "key esc down",
                "key esc up",
                "key shift up",
                "key ctrl up",
            ]
        );
    }

    #[tokio::test]
    async fn paste_types_the_text() {
        let (ctx, log) = context();
        let reply = dispatch(
            &ctx,
            message(r#"{"type":"CLIPBOARD_PASTE","data":{"text":"hi"}}"#),
        );
        assert_eq!(reply.msg_type, MSG_RESPONSE_SUCCESS);
        assert_eq!(wait_for(&log, 2).await, vec!["type h", "type i"]);
    }

    #[tokio::test]
    async fn reboot_disabled_by_config_never_acts() {
        let (ctx, _log) = context();
        assert!(!ctx.reboot_enabled);

        let reply = dispatch(&ctx, message(r#"{"type":"SYSTEM_REBOOT","data":{}}"#));
        assert_eq!(reply.msg_type, MSG_RESPONSE_INFO);
        assert!(reply.data["message"]
            .as_str()
            .unwrap()
            .contains("disabled"));
    }

    #[tokio::test]
    async fn reboot_enabled_schedules_and_replies() {
        let (mut ctx, _log) = context();
        ctx.reboot_enabled = true;
        ctx.reboot_delay = 3600; // far beyond the test's lifetime

        let reply = dispatch(&ctx, message(r#"{"type":"SYSTEM_REBOOT","data":{}}"#));
        assert_eq!(reply.msg_type, MSG_RESPONSE_SUCCESS);
        assert_eq!(reply.data["delay_seconds"], 3600);
    }

    #[tokio::test]
    async fn mapping_status_reflects_mapper_state() {
        let (ctx, _log) = context();

        let reply = dispatch(
            &ctx,
            message(r#"{"type":"COORDINATE_MAPPING_STATUS","data":{},"id":"q1"}"#),
        );
        assert_eq!(reply.msg_type, MSG_RESPONSE_ERROR);
        assert_eq!(reply.id.as_deref(), Some("q1"));

        ctx.supervisor.mapper().update(1280, 720);
        let reply = dispatch(
            &ctx,
            message(r#"{"type":"COORDINATE_MAPPING_STATUS","data":{}}"#),
        );
        assert_eq!(reply.msg_type, MSG_RESPONSE_SUCCESS);
        assert_eq!(reply.data["encoded_resolution"], "1280x720");
        assert_eq!(reply.data["screen_resolution"], "1920x1080");
    }

    #[tokio::test]
    async fn unknown_type_is_an_error_reply() {
        let (ctx, _log) = context();
        let reply = dispatch(&ctx, message(r#"{"type":"APP_START","data":{}}"#));
        assert_eq!(reply.msg_type, MSG_RESPONSE_ERROR);
    }

    #[cfg(feature = "legacy-control")]
    #[tokio::test]
    async fn legacy_mouse_message_moves_and_clicks() {
        let (ctx, log) = context();
        legacy::handle(&ctx, "5.mouse,100,200,1,1712000000").unwrap();
        assert_eq!(
            wait_for(&log, 3).await,
            vec!["move 100,200", "button left down", "button left up"]
        );
    }

    #[cfg(feature = "legacy-control")]
    #[tokio::test]
    async fn legacy_paste_preserves_commas() {
        let (ctx, log) = context();
        legacy::handle(&ctx, "5.paste,a,b").unwrap();
        assert_eq!(wait_for(&log, 3).await, vec!["type a", "type ,", "type b"]);
    }
}
