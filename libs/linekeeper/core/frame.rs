//! Wire codec for the game server's Socket.IO-flavored framing
//!
//! Frames ride as WebSocket text messages:
//!
//! ```text
//! "0{...}"            open packet with session parameters
//! "2"                 server keepalive; must be answered with "3"
//! "3"                 keepalive acknowledgement (sent, never parsed)
//! "40/tx,{...}"       namespace connect / auth (token payload outbound)
//! "42/tx,[\"ev\",{}]" application event: JSON array of name + data
//! ```
//!
//! The namespace (`/tx` for the dice game) is configurable so the codec
//! can be pointed at other tables without edits.

use serde_json::Value;

use crate::traits::error::{LineError, Result};

/// Server keepalive frame
pub const KEEPALIVE: &str = "2";

/// Keepalive acknowledgement frame
pub const KEEPALIVE_ACK: &str = "3";

/// A decoded inbound frame
///
/// Payload variants borrow from the raw message; the codec never copies
/// on the hot receive path.
#[derive(Debug, PartialEq, Eq)]
pub enum Frame<'a> {
    /// `0{...}` - transport open packet
    Open(&'a str),
    /// `2` - server keepalive, ack immediately
    Keepalive,
    /// `3` - keepalive ack echoed back (rare, ignorable)
    KeepaliveAck,
    /// `40<ns>,...` - namespace connect acknowledgement
    Connected(&'a str),
    /// `42<ns>,[...]` - application event, payload is the JSON array
    Event(&'a str),
    /// Anything else the server sends
    Other(&'a str),
}

/// Frame encoder/decoder bound to one namespace
#[derive(Debug, Clone)]
pub struct Codec {
    namespace: String,
    event_prefix: String,
    connect_prefix: String,
}

impl Codec {
    /// Create a codec for a namespace such as `/tx`
    pub fn new(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            event_prefix: format!("42{namespace},"),
            connect_prefix: format!("40{namespace},"),
            namespace,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Decode a raw inbound text message
    pub fn decode<'a>(&self, raw: &'a str) -> Frame<'a> {
        if raw == KEEPALIVE {
            return Frame::Keepalive;
        }
        if raw == KEEPALIVE_ACK {
            return Frame::KeepaliveAck;
        }
        if let Some(payload) = raw.strip_prefix(&self.event_prefix) {
            return Frame::Event(payload);
        }
        if let Some(payload) = raw.strip_prefix(&self.connect_prefix) {
            return Frame::Connected(payload);
        }
        if let Some(payload) = raw.strip_prefix('0') {
            return Frame::Open(payload);
        }
        Frame::Other(raw)
    }

    /// Encode the namespace auth frame carrying a session token
    pub fn auth(&self, token: &str) -> String {
        format!(
            "40{},{}",
            self.namespace,
            serde_json::json!({ "token": token })
        )
    }

    /// Encode an application event frame
    ///
    /// With `data` the payload is `["name", {...}]`; without, `["name"]`.
    pub fn event(&self, name: &str, data: Option<&Value>) -> String {
        let arr = match data {
            Some(value) => serde_json::json!([name, value]),
            None => serde_json::json!([name]),
        };
        format!("42{},{}", self.namespace, arr)
    }
}

/// Split an event payload into its name and data object
///
/// The payload is the JSON array of an `Event` frame. The data element is
/// optional on the wire; a missing or non-object value decodes to an
/// empty object so handlers never see nulls.
pub fn parse_event(payload: &str) -> Result<(String, Value)> {
    let arr: Vec<Value> = serde_json::from_str(payload)
        .map_err(|e| LineError::Transport(format!("bad event payload: {e}")))?;

    let mut items = arr.into_iter();
    let name = match items.next() {
        Some(Value::String(name)) => name,
        other => {
            return Err(LineError::Transport(format!(
                "event name missing or not a string: {other:?}"
            )))
        }
    };
    let data = match items.next() {
        Some(value @ Value::Object(_)) => value,
        _ => Value::Object(Default::default()),
    };
    Ok((name, data))
}
