//! Minimal HTTP/1.1 plumbing for the agent's small control surface.
//!
//! The agent serves three JSON endpoints and two WebSocket upgrades;
//! that does not warrant a framework. This module parses a request
//! head (request line + headers) and renders JSON responses. Bodies
//! are never read — every route is a bodyless GET.

use serde_json::Value;

use farview_core::FarviewError;

/// A parsed HTTP request head.
///
/// ```text
/// Method SP Request-Target SP HTTP-Version CRLF
/// *(Header: Value CRLF)
/// CRLF
/// ```
///
/// Header lookup is case-insensitive per RFC 9110 §5.1.
#[derive(Debug)]
pub struct HttpRequest {
    /// HTTP method (only GET is routed).
    pub method: String,
    /// Request target, e.g. `/api/streamstatus` or `/wsstream`.
    pub path: String,
    /// Protocol version (expected: `HTTP/1.1`).
    pub version: String,
    /// Headers as ordered (name, value) pairs, names as received.
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    /// Parse a request head from its text representation.
    pub fn parse(raw: &str) -> Result<Self, FarviewError> {
        let mut lines = raw.lines();

        let request_line = lines
            .next()
            .ok_or_else(|| FarviewError::MalformedMessage("empty request".into()))?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(FarviewError::MalformedMessage(format!(
                "invalid request line: {request_line}"
            )));
        }

        let method = parts[0].to_string();
        let path = parts[1].to_string();
        let version = parts[2].to_string();

        if !version.starts_with("HTTP/") {
            return Err(FarviewError::MalformedMessage(format!(
                "invalid version: {version}"
            )));
        }

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            let colon = line.find(':').ok_or_else(|| {
                FarviewError::MalformedMessage(format!("invalid header: {line}"))
            })?;
            headers.push((
                line[..colon].trim().to_string(),
                line[colon + 1..].trim().to_string(),
            ));
        }

        Ok(Self {
            method,
            path,
            version,
            headers,
        })
    }

    /// Look up a header value by name, case-insensitively.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The path without its query string.
    pub fn route(&self) -> &str {
        self.path.split('?').next().unwrap_or(&self.path)
    }

    /// Whether this request asks for a WebSocket upgrade.
    pub fn is_websocket_upgrade(&self) -> bool {
        let upgrade = self
            .get_header("Upgrade")
            .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
        let connection = self
            .get_header("Connection")
            .is_some_and(|v| v.to_ascii_lowercase().contains("upgrade"));
        upgrade && connection
    }
}

/// Render a JSON response with the given status.
pub fn json_response(status: u16, reason: &str, body: &Value) -> String {
    let body = body.to_string();
    format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    )
}

/// 404 for unrouted paths.
pub fn not_found(path: &str) -> String {
    json_response(
        404,
        "Not Found",
        &serde_json::json!({ "code": -1, "message": format!("no route for {path}") }),
    )
}

/// 400 for heads that did not parse.
pub fn bad_request(reason: &str) -> String {
    json_response(
        400,
        "Bad Request",
        &serde_json::json!({ "code": -1, "message": reason }),
    )
}

// ── Tests ────────────────────────────────────────────────────────
