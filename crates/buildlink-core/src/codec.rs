//! JSON encoding of [`Envelope`]s.
//!
//! Wire shape:
//!
//! ```text
//! {"serial": 7, "replyTo": 3, "message": {"response": {"type": "key_lookup", "payload": {...}}}}
//! ```
//!
//! Decoding happens in two steps. The envelope and its `{type, payload}`
//! body are parsed loosely first; only a frame that fails *that* step is a
//! [`ProtocolError`]. The body is then matched against the typed enum, and a
//! body this client does not understand (unknown `type`, or a known `type`
//! with an incompatible payload) becomes the `Unrecognized` variant.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::ProtocolError;
use crate::protocol::{Envelope, Event, Message, Request, Response};

#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    serial: u64,
    #[serde(rename = "replyTo", default, skip_serializing_if = "Option::is_none")]
    reply_to: Option<u64>,
    message: WireMessage,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum WireMessage {
    Event(Tagged),
    Request(Tagged),
    Response(Tagged),
}

/// Untyped `{type, payload}` body.
#[derive(Serialize, Deserialize)]
struct Tagged {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
}

impl Tagged {
    fn from_typed<T: Serialize>(value: &T) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_value(serde_json::to_value(value)?)?)
    }

    fn into_typed<T: DeserializeOwned>(self, family: &'static str, fallback: T) -> T {
        let mut body = Map::new();
        let _ = body.insert("type".into(), Value::String(self.kind.clone()));
        if let Some(payload) = self.payload {
            let _ = body.insert("payload".into(), payload);
        }
        match serde_json::from_value(Value::Object(body)) {
            Ok(typed) => typed,
            Err(error) => {
                debug!(family, message_type = %self.kind, %error, "unrecognized message body");
                fallback
            }
        }
    }
}

/// Encode an envelope as one JSON document (no trailing newline).
pub fn encode(envelope: &Envelope) -> Result<String, ProtocolError> {
    let message = match &envelope.message {
        Message::Event(e) => WireMessage::Event(Tagged::from_typed(e)?),
        Message::Request(r) => WireMessage::Request(Tagged::from_typed(r)?),
        Message::Response(r) => WireMessage::Response(Tagged::from_typed(r)?),
    };
    let wire = WireEnvelope {
        serial: envelope.serial,
        reply_to: envelope.reply_to,
        message,
    };
    Ok(serde_json::to_string(&wire)?)
}

/// Decode one JSON document into an envelope.
pub fn decode(frame: &str) -> Result<Envelope, ProtocolError> {
    let wire: WireEnvelope = serde_json::from_str(frame)?;
    let message = match wire.message {
        WireMessage::Event(body) => Message::Event(body.into_typed("event", Event::Unrecognized)),
        WireMessage::Request(body) => {
            Message::Request(body.into_typed("request", Request::Unrecognized))
        }
        WireMessage::Response(body) => {
            Message::Response(body.into_typed("response", Response::Unrecognized))
        }
    };
    Ok(Envelope {
        serial: wire.serial,
        // Serials start at 1, so 0 means "not a reply".
        reply_to: wire.reply_to.filter(|&r| r != 0),
        message,
    })
}
