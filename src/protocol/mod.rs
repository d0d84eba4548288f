//! Request-reply depth protocol
//!
//! One endpoint serves one client at a time in strict request-reply
//! turn-taking: every received request produces exactly one reply. Requests
//! are dispatched on their `(ptype, pname)` header pair; unknown pairs get
//! an `ERROR` reply rather than being dropped.

use crate::wire::WireMessage;

mod handlers;
mod server;
mod transport;

pub use handlers::{EstimatorService, PlaybackService};
pub use server::{ProtocolServer, RequestHandler};
pub use transport::{recv_message, send_message, WireClient};

/// Highest protocol version this build understands. Handshakes from newer
/// clients are rejected.
pub const PROTOCOL_VERSION: i32 = 2;

/// Default port of the compute endpoint.
pub const DEFAULT_COMPUTE_PORT: u16 = 5555;

/// Default port of the playback endpoint.
pub const DEFAULT_PLAYBACK_PORT: u16 = 5556;

/// Dispatch key of a request, derived from its `(ptype, pname)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    HandshakeDepth,
    Depth,
    HandshakeImageAndDepth,
    ImageAndDepth,
    RequestPlay,
    RequestPause,
    RequestStop,
}

impl RequestKind {
    pub fn from_pair(ptype: &str, pname: &str) -> Option<RequestKind> {
        match (ptype, pname) {
            ("REQ", "HANDSHAKE_DEPTH") => Some(Self::HandshakeDepth),
            ("REQ", "DEPTH") => Some(Self::Depth),
            ("REQ", "HANDSHAKE_IMAGE_AND_DEPTH") => Some(Self::HandshakeImageAndDepth),
            ("REQ", "IMAGE_AND_DEPTH") => Some(Self::ImageAndDepth),
            ("REQ", "IMAGE_AND_DEPTH_REQUEST_PLAY") => Some(Self::RequestPlay),
            ("REQ", "IMAGE_AND_DEPTH_REQUEST_PAUSE") => Some(Self::RequestPause),
            ("REQ", "IMAGE_AND_DEPTH_REQUEST_STOP") => Some(Self::RequestStop),
            _ => None,
        }
    }

    /// Protocol name, mirrored into the reply of a handled request.
    pub fn pname(&self) -> &'static str {
        match self {
            Self::HandshakeDepth => "HANDSHAKE_DEPTH",
            Self::Depth => "DEPTH",
            Self::HandshakeImageAndDepth => "HANDSHAKE_IMAGE_AND_DEPTH",
            Self::ImageAndDepth => "IMAGE_AND_DEPTH",
            Self::RequestPlay => "IMAGE_AND_DEPTH_REQUEST_PLAY",
            Self::RequestPause => "IMAGE_AND_DEPTH_REQUEST_PAUSE",
            Self::RequestStop => "IMAGE_AND_DEPTH_REQUEST_STOP",
        }
    }
}

/// Identity strings a server advertises in handshake replies.
#[derive(Debug, Clone)]
pub struct ServerIdent {
    pub program: String,
    pub version: String,
}

impl ServerIdent {
    pub fn new() -> ServerIdent {
        ServerIdent {
            program: "depthtk".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Default for ServerIdent {
    fn default() -> Self {
        Self::new()
    }
}

/// Enforces the handshake version gate: a client declaring a version above
/// [`PROTOCOL_VERSION`] gets the returned error reply and no further
/// processing. Missing or non-numeric versions are rejected the same way.
pub(crate) fn check_version(request: &WireMessage) -> Option<WireMessage> {
    let declared = match request.get("pversion") {
        Some(v) => v,
        None => return Some(WireMessage::error("Handshake is missing pversion")),
    };
    match declared.parse::<i32>() {
        Ok(v) if v > PROTOCOL_VERSION => Some(WireMessage::error(&format!(
            "Protocol version {v} is not supported, this server speaks up to {PROTOCOL_VERSION}"
        ))),
        Ok(_) => None,
        Err(_) => Some(WireMessage::error(&format!(
            "Invalid pversion {declared:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_kinds_cover_all_pnames() {
        let kinds = [
            RequestKind::HandshakeDepth,
            RequestKind::Depth,
            RequestKind::HandshakeImageAndDepth,
            RequestKind::ImageAndDepth,
            RequestKind::RequestPlay,
            RequestKind::RequestPause,
            RequestKind::RequestStop,
        ];
        for kind in kinds {
            assert_eq!(RequestKind::from_pair("REQ", kind.pname()), Some(kind));
        }
        assert_eq!(RequestKind::from_pair("RES", "DEPTH"), None);
        assert_eq!(RequestKind::from_pair("REQ", "FOOBAR"), None);
    }

    #[test]
    fn version_gate_rejects_only_newer_clients() {
        for (version, rejected) in [("1", false), ("2", false), ("3", true)] {
            let mut request = WireMessage::request("HANDSHAKE_DEPTH");
            request.set("pversion", version).unwrap();
            assert_eq!(check_version(&request).is_some(), rejected, "pversion={version}");
        }
    }

    #[test]
    fn version_gate_rejects_missing_or_malformed_version() {
        let request = WireMessage::request("HANDSHAKE_DEPTH");
        assert!(check_version(&request).is_some());

        let mut request = WireMessage::request("HANDSHAKE_DEPTH");
        request.set("pversion", "two").unwrap();
        assert!(check_version(&request).is_some());
    }
}
