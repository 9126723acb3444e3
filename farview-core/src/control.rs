//! Control-channel wire types.
//!
//! The control WebSocket carries TEXT frames of typed JSON:
//! `{type, data, timestamp, id?}`. Payload shapes are type-indexed
//! maps rather than per-type structs — fields are extracted with the
//! helpers at the bottom so a malformed message costs one error reply,
//! never the session.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::FarviewError;

// ── Message type catalog ─────────────────────────────────────────

// Mouse
pub const MSG_MOUSE_MOVE: &str = "MOUSE_MOVE";
pub const MSG_MOUSE_LEFT_DOWN: &str = "MOUSE_LEFT_DOWN";
pub const MSG_MOUSE_LEFT_UP: &str = "MOUSE_LEFT_UP";
pub const MSG_MOUSE_LEFT_CLICK: &str = "MOUSE_LEFT_CLICK";
pub const MSG_MOUSE_RIGHT_DOWN: &str = "MOUSE_RIGHT_DOWN";
pub const MSG_MOUSE_RIGHT_UP: &str = "MOUSE_RIGHT_UP";
pub const MSG_MOUSE_RIGHT_CLICK: &str = "MOUSE_RIGHT_CLICK";
pub const MSG_MOUSE_MIDDLE_DOWN: &str = "MOUSE_MIDDLE_DOWN";
pub const MSG_MOUSE_MIDDLE_UP: &str = "MOUSE_MIDDLE_UP";
pub const MSG_MOUSE_MIDDLE_CLICK: &str = "MOUSE_MIDDLE_CLICK";
pub const MSG_MOUSE_WHEEL_UP: &str = "MOUSE_WHEEL_UP";
pub const MSG_MOUSE_WHEEL_DOWN: &str = "MOUSE_WHEEL_DOWN";
pub const MSG_MOUSE_RESET: &str = "MOUSE_RESET";

// Keyboard
pub const MSG_KEY_DOWN: &str = "KEY_DOWN";
pub const MSG_KEY_UP: &str = "KEY_UP";
pub const MSG_KEY_PRESS: &str = "KEY_PRESS";
pub const MSG_KEY_COMBO: &str = "KEY_COMBO";

// Clipboard
pub const MSG_CLIPBOARD_PASTE: &str = "CLIPBOARD_PASTE";
pub const MSG_CLIPBOARD_SET: &str = "CLIPBOARD_SET";
pub const MSG_CLIPBOARD_GET: &str = "CLIPBOARD_GET";
pub const MSG_CLIPBOARD_UPDATE: &str = "CLIPBOARD_UPDATE";

// System
pub const MSG_SYSTEM_DESKTOP: &str = "SYSTEM_DESKTOP";
pub const MSG_SYSTEM_TASKMANAGER: &str = "SYSTEM_TASKMANAGER";
pub const MSG_SYSTEM_REBOOT: &str = "SYSTEM_REBOOT";

// Responses (server → client)
pub const MSG_RESPONSE_SUCCESS: &str = "RESPONSE_SUCCESS";
pub const MSG_RESPONSE_ERROR: &str = "RESPONSE_ERROR";
pub const MSG_RESPONSE_INFO: &str = "RESPONSE_INFO";

// Coordinate mapping query
pub const MSG_COORDINATE_MAPPING_STATUS: &str = "COORDINATE_MAPPING_STATUS";

// ── ControlMessage ───────────────────────────────────────────────

/// One typed control message, in either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlMessage {
    /// Message type from the catalog above.
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Type-indexed payload.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Sender-side Unix timestamp, seconds.
    #[serde(default)]
    pub timestamp: i64,
    /// Optional correlation id, echoed in replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ControlMessage {
    /// Parse a TEXT frame into a message.
    pub fn parse(raw: &str) -> Result<Self, FarviewError> {
        let msg: ControlMessage = serde_json::from_str(raw)?;
        if msg.msg_type.is_empty() {
            return Err(FarviewError::MalformedMessage("empty type".into()));
        }
        Ok(msg)
    }

    /// Serialize for the wire.
    pub fn to_json(&self) -> Result<String, FarviewError> {
        Ok(serde_json::to_string(self)?)
    }

    fn reply(msg_type: &str, data: Map<String, Value>, id: Option<String>) -> Self {
        Self {
            msg_type: msg_type.to_string(),
            data,
            timestamp: chrono::Utc::now().timestamp(),
            id,
        }
    }

    /// Build a `RESPONSE_SUCCESS` envelope.
    pub fn success(message: &str, extra: Value, id: Option<String>) -> Self {
        let mut data = match extra {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("data".into(), other);
                map
            }
        };
        data.insert("message".into(), Value::String(message.to_string()));
        Self::reply(MSG_RESPONSE_SUCCESS, data, id)
    }

    /// Build a `RESPONSE_ERROR` envelope.
    pub fn error(message: &str, details: &str, id: Option<String>) -> Self {
        let mut data = Map::new();
        data.insert("message".into(), Value::String(message.to_string()));
        data.insert("details".into(), Value::String(details.to_string()));
        Self::reply(MSG_RESPONSE_ERROR, data, id)
    }

    /// Build a `RESPONSE_INFO` envelope.
    pub fn info(message: &str, id: Option<String>) -> Self {
        let mut data = Map::new();
        data.insert("message".into(), Value::String(message.to_string()));
        Self::reply(MSG_RESPONSE_INFO, data, id)
    }

    /// Build a `CLIPBOARD_UPDATE` reply carrying the host clipboard.
    pub fn clipboard_update(text: &str) -> Self {
        let mut data = Map::new();
        data.insert("text".into(), Value::String(text.to_string()));
        data.insert("text_length".into(), json!(text.len()));
        data.insert("char_count".into(), json!(text.chars().count()));
        Self::reply(MSG_CLIPBOARD_UPDATE, data, None)
    }
}

// ── Payload extraction helpers ───────────────────────────────────

/// Extract the `{x, y}` pair of a mouse payload (sent as JSON numbers,
/// possibly fractional).
pub fn extract_coordinates(data: &Map<String, Value>) -> Result<(i32, i32), FarviewError> {
    let x = data
        .get("x")
        .and_then(Value::as_f64)
        .ok_or_else(|| FarviewError::MalformedMessage("missing or invalid x".into()))?;
    let y = data
        .get("y")
        .and_then(Value::as_f64)
        .ok_or_else(|| FarviewError::MalformedMessage("missing or invalid y".into()))?;
    Ok((x as i32, y as i32))
}

/// Extract a required string field.
pub fn extract_text<'a>(
    data: &'a Map<String, Value>,
    field: &str,
) -> Result<&'a str, FarviewError> {
    data.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| FarviewError::MalformedMessage(format!("missing or invalid {field}")))
}

/// Extract key information: numeric keysym, symbolic name, or both.
/// The symbolic name wins when present.
pub fn extract_key(data: &Map<String, Value>) -> Result<String, FarviewError> {
    let from_code = data
        .get("key")
        .and_then(Value::as_i64)
        .and_then(|k| crate::keysym::keysym_to_name(k as u32));

    let from_str = data
        .get("keyStr")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    from_str
        .or(from_code)
        .ok_or_else(|| FarviewError::MalformedMessage("missing valid key information".into()))
}

/// Extract the `keys` array of a `KEY_COMBO` payload.
pub fn extract_keys(data: &Map<String, Value>) -> Result<Vec<String>, FarviewError> {
    let keys = data
        .get("keys")
        .and_then(Value::as_array)
        .ok_or_else(|| FarviewError::MalformedMessage("missing keys array".into()))?;

    let names: Vec<String> = keys
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();

    if names.is_empty() {
        return Err(FarviewError::MalformedMessage("empty keys array".into()));
    }
    Ok(names)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_typed_message() {
        let raw = r#"{"type":"MOUSE_MOVE","data":{"x":640,"y":360},"timestamp":1712000000}"#;
        let msg = ControlMessage::parse(raw).unwrap();
        assert_eq!(msg.msg_type, MSG_MOUSE_MOVE);
        assert_eq!(extract_coordinates(&msg.data).unwrap(), (640, 360));
        assert!(msg.id.is_none());
    }

    #[test]
    fn parse_keeps_correlation_id() {
        let raw = r#"{"type":"CLIPBOARD_GET","data":{},"timestamp":0,"id":"req-7"}"#;
        let msg = ControlMessage::parse(raw).unwrap();
        assert_eq!(msg.id.as_deref(), Some("req-7"));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(ControlMessage::parse("5.mouse,1,2,0").is_err());
        assert!(ControlMessage::parse("{}").is_err());
        assert!(ControlMessage::parse(r#"{"type":""}"#).is_err());
    }

    #[test]
    fn fractional_coordinates_truncate() {
        let raw = r#"{"type":"MOUSE_MOVE","data":{"x":12.9,"y":7.2}}"#;
        let msg = ControlMessage::parse(raw).unwrap();
        assert_eq!(extract_coordinates(&msg.data).unwrap(), (12, 7));
    }

    #[test]
    fn missing_coordinates_error() {
        let raw = r#"{"type":"MOUSE_MOVE","data":{"x":3}}"#;
        let msg = ControlMessage::parse(raw).unwrap();
        assert!(extract_coordinates(&msg.data).is_err());
    }

    #[test]
    fn success_envelope_shape() {
        let msg = ControlMessage::success("ok", json!({"extra": 1}), Some("id-1".into()));
        assert_eq!(msg.msg_type, MSG_RESPONSE_SUCCESS);
        assert_eq!(msg.data["message"], "ok");
        assert_eq!(msg.data["extra"], 1);
        assert_eq!(msg.id.as_deref(), Some("id-1"));

        let wire: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(wire["type"], MSG_RESPONSE_SUCCESS);
        assert!(wire["timestamp"].is_i64());
    }

    #[test]
    fn clipboard_update_counts_bytes_and_chars() {
        let msg = ControlMessage::clipboard_update("héllo");
        assert_eq!(msg.msg_type, MSG_CLIPBOARD_UPDATE);
        assert_eq!(msg.data["text"], "héllo");
        assert_eq!(msg.data["text_length"], 6); // bytes
        assert_eq!(msg.data["char_count"], 5); // chars
    }

    #[test]
    fn key_extraction_prefers_symbolic_name() {
        let raw = r#"{"type":"KEY_DOWN","data":{"key":65293,"keyStr":"enter"}}"#;
        let msg = ControlMessage::parse(raw).unwrap();
        assert_eq!(extract_key(&msg.data).unwrap(), "enter");

        let raw = r#"{"type":"KEY_DOWN","data":{"key":97}}"#;
        let msg = ControlMessage::parse(raw).unwrap();
        assert_eq!(extract_key(&msg.data).unwrap(), "a");

        let raw = r#"{"type":"KEY_DOWN","data":{}}"#;
        let msg = ControlMessage::parse(raw).unwrap();
        assert!(extract_key(&msg.data).is_err());
    }

    #[test]
    fn combo_keys_extraction() {
        let raw = r#"{"type":"KEY_COMBO","data":{"keys":["ctrl","shift","esc"]}}"#;
        let msg = ControlMessage::parse(raw).unwrap();
        assert_eq!(extract_keys(&msg.data).unwrap(), vec!["ctrl", "shift", "esc"]);

        let raw = r#"{"type":"KEY_COMBO","data":{"keys":[]}}"#;
        let msg = ControlMessage::parse(raw).unwrap();
        assert!(extract_keys(&msg.data).is_err());
    }
}
