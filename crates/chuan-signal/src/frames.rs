//! Signaling frames exchanged over a room socket
//!
//! Text frames carry a JSON envelope `{type, payload, channel?}`. The
//! server reserves two tags for itself and forwards everything else
//! verbatim; relayed text is passed through as the original string so
//! clients see byte-identical JSON. Binary frames are opaque.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use chuan_core::SignalError;

/// Tag of the server-originated frame announcing the other slot filled
pub const TAG_PEER_JOINED: &str = "peer-joined";

/// Tag that ends a peer's session; client-originated farewells are
/// forwarded before the sender detaches
pub const TAG_DISCONNECTION: &str = "disconnection";

/// Reason carried by a server-originated `disconnection`
pub const REASON_PEER_LEFT: &str = "peer-left";

/// One of the two fixed slot positions in a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Sender,
    Receiver,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Sender => "sender",
            Role::Receiver => "receiver",
        }
    }

    pub fn opposite(&self) -> Role {
        match self {
            Role::Sender => Role::Receiver,
            Role::Receiver => Role::Sender,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sender" => Ok(Role::Sender),
            "receiver" => Ok(Role::Receiver),
            other => Err(SignalError::BadRequest(format!("unknown role: {other}"))),
        }
    }
}

/// A raw WebSocket frame queued for delivery to a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Shallow view of a text frame: the tag is read, the payload is not
/// interpreted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub tag: String,

    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,

    /// Client-scoped routing hint, preserved unchanged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

impl Envelope {
    /// Parse the envelope of a text frame
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Whether this is a client farewell
    pub fn is_disconnection(&self) -> bool {
        self.tag == TAG_DISCONNECTION
    }
}

/// Build the server-originated `peer-joined` frame. `role` is the role
/// of the OTHER peer, the one the receiver is being told about.
pub fn peer_joined(role: Role) -> String {
    serde_json::json!({
        "type": TAG_PEER_JOINED,
        "payload": { "role": role.as_str() },
    })
    .to_string()
}

/// Build a server-originated `disconnection` frame
pub fn disconnection(reason: &str) -> String {
    serde_json::json!({
        "type": TAG_DISCONNECTION,
        "payload": { "reason": reason },
    })
    .to_string()
}
