//! The websocket upgrade *handoff contract* (`spec.md` §1: "the upgrade
//! handoff contract is specified; the websocket protocol is not"). Computes
//! the `Sec-WebSocket-Accept` handshake value; frame encoding/decoding is
//! out of scope.
//!
//! Grounded on the teacher's `src/server/websocket.rs` `get_handshake`
//! (same `Sec-WebSocket-Key` + GUID + SHA-1 recipe), ported to the `sha1`
//! 0.10 `Digest` API instead of the teacher's `Sha1::new()/update()/digest()`
//! one, since that API predates the crate's current major version.

use base64::Engine;
use sha1::{Digest, Sha1};

use crate::headers::{connection_has_upgrade, is_upgrade, trim_ows};
use crate::request::Request;

const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

pub struct Handshake {
    pub accept: String,
    pub protocols: Vec<String>,
    pub extensions: Vec<String>,
}

/// Inspects `request` for a websocket upgrade handshake. Returns `Ok(None)`
/// when this isn't an upgrade request at all; `Err` for a malformed one
/// (missing/duplicate `Sec-WebSocket-Key`, unsupported version).
pub fn get_handshake(request: &Request) -> Result<Option<Handshake>, &'static str> {
    let upgrade_requested = request
        .headers
        .get_combined("connection")
        .map(|v| connection_has_upgrade(v.as_bytes()))
        .unwrap_or(false)
        && request.headers.get_combined("upgrade").map(|v| is_upgrade(v.as_bytes())).unwrap_or(false);
    if !upgrade_requested {
        return Ok(None);
    }

    let key = request.headers.get_combined("sec-websocket-key").ok_or("missing Sec-WebSocket-Key")?;
    if let Some(version) = request.headers.get_combined("sec-websocket-version") {
        if trim_ows(version.as_bytes()) != b"13" {
            return Err("unsupported Sec-WebSocket-Version");
        }
    }

    let mut hasher = Sha1::new();
    hasher.update(trim_ows(key.as_bytes()));
    hasher.update(GUID.as_bytes());
    let digest = hasher.finalize();
    let accept = base64::engine::general_purpose::STANDARD.encode(digest);

    let protocols = split_tokens(request.headers.get_combined("sec-websocket-protocol"));
    let extensions = split_tokens(request.headers.get_combined("sec-websocket-extensions"));

    Ok(Some(Handshake { accept, protocols, extensions }))
}

fn split_tokens(value: Option<String>) -> Vec<String> {
    match value {
        None => Vec::new(),
        Some(v) => v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect(),
    }
}
