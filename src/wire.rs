//! Wire envelope codec
//!
//! Every request and reply on the depth protocol is a block of ASCII
//! `key=value` header lines, the terminator line [`HEADER_END`], and an
//! optional raw byte payload. Header insertion order is preserved on the
//! wire. The key `data` is reserved for the payload and never appears as a
//! header.

use log::warn;
use thiserror::Error;

/// Line separating the header block from the payload.
pub const HEADER_END: &str = "!HEADEREND";

/// Header key reserved for the payload.
const RESERVED_KEY: &str = "data";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WireError {
    #[error("Header key {0:?} is reserved for the payload")]
    ReservedKey(String),
    #[error("Header {key:?}={value:?} must be newline-free ASCII, with no '=' or leading '!' in the key")]
    IllegalHeader { key: String, value: String },
}

/// A single protocol message: ordered headers plus an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WireMessage {
    headers: Vec<(String, String)>,
    payload: Vec<u8>,
}

impl WireMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A request message. `pname` is expected to be a protocol constant.
    pub fn request(pname: &str) -> Self {
        Self::with_kind("REQ", pname)
    }

    /// A response message. `pname` is expected to be a protocol constant.
    pub fn response(pname: &str) -> Self {
        Self::with_kind("RES", pname)
    }

    /// An `ERROR` response whose payload carries the human-readable cause.
    pub fn error(reason: &str) -> Self {
        let mut message = Self::with_kind("RES", "ERROR");
        message.payload = reason.as_bytes().to_vec();
        message
    }

    fn with_kind(ptype: &str, pname: &str) -> Self {
        Self {
            headers: vec![
                ("ptype".to_string(), ptype.to_string()),
                ("pname".to_string(), pname.to_string()),
            ],
            payload: Vec::new(),
        }
    }

    /// Sets a header, updating in place if the key is already present so
    /// that wire order stays stable. Rejects the reserved `data` key and
    /// anything that could not survive the line-oriented encoding.
    pub fn set(&mut self, key: &str, value: impl ToString) -> Result<(), WireError> {
        let value = value.to_string();
        if key == RESERVED_KEY {
            return Err(WireError::ReservedKey(key.to_string()));
        }
        let key_ok = !key.is_empty()
            && key.is_ascii()
            && !key.contains(['\n', '\r', '='])
            && !key.starts_with('!');
        let value_ok = value.is_ascii() && !value.contains(['\n', '\r']);
        if !key_ok || !value_ok {
            return Err(WireError::IllegalHeader {
                key: key.to_string(),
                value,
            });
        }
        self.put(key, &value);
        Ok(())
    }

    fn put(&mut self, key: &str, value: &str) {
        match self.headers.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.headers.push((key.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn ptype(&self) -> Option<&str> {
        self.get("ptype")
    }

    pub fn pname(&self) -> Option<&str> {
        self.get("pname")
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn set_payload(&mut self, payload: Vec<u8>) {
        self.payload = payload;
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn take_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Serializes headers in insertion order, the terminator line, then the
    /// payload bytes untouched.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (key, value) in &self.headers {
            out.extend_from_slice(key.as_bytes());
            out.push(b'=');
            out.extend_from_slice(value.as_bytes());
            out.push(b'\n');
        }
        out.extend_from_slice(HEADER_END.as_bytes());
        out.push(b'\n');
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parses a message. Decoding never fails: blank lines, lines without
    /// `=`, unrecognized `!` directives and non-ASCII lines are logged and
    /// skipped. Keys and values are trimmed of surrounding whitespace.
    /// Everything after the terminator line is the payload, byte for byte.
    pub fn decode(bytes: &[u8]) -> WireMessage {
        let mut message = WireMessage::new();
        let mut pos = 0;
        while pos < bytes.len() {
            let (mut line, next) = match bytes[pos..].iter().position(|b| *b == b'\n') {
                Some(i) => (&bytes[pos..pos + i], pos + i + 1),
                None => (&bytes[pos..], bytes.len()),
            };
            pos = next;
            if let Some(head) = line.strip_suffix(b"\r") {
                line = head;
            }
            if line == HEADER_END.as_bytes() {
                message.payload = bytes[pos..].to_vec();
                break;
            }
            if line.is_empty() {
                continue;
            }
            let text = match std::str::from_utf8(line) {
                Ok(text) if text.is_ascii() => text,
                _ => {
                    warn!("Skipping non-ASCII header line");
                    continue;
                }
            };
            if let Some(directive) = text.strip_prefix('!') {
                warn!("Skipping unrecognized directive {directive:?}");
                continue;
            }
            match text.split_once('=') {
                Some((key, value)) => match (key.trim(), value.trim()) {
                    (RESERVED_KEY, _) => {
                        warn!("Skipping header with reserved key {RESERVED_KEY:?}")
                    }
                    (key, value) => message.put(key, value),
                },
                None => warn!("Skipping header line without '=': {text:?}"),
            }
        }
        message
    }
}
