//! The unit of transfer on a connection.

use crate::protocol::events::Event;
use crate::protocol::requests::Request;
use crate::protocol::responses::Response;

/// Payload of an envelope.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    /// Server-pushed event.
    Event(Event),
    /// Request (either direction).
    Request(Request),
    /// Response to an earlier request.
    Response(Response),
}

impl Message {
    /// `event`, `request` or `response`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Event(_) => "event",
            Self::Request(_) => "request",
            Self::Response(_) => "response",
        }
    }

    /// Wire name of the carried message type.
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::Event(e) => e.event_type(),
            Self::Request(r) => r.request_type(),
            Self::Response(r) => r.response_type(),
        }
    }
}

/// One wire message: a serial, an optional reply-to serial, and a payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    /// Sender-assigned serial, strictly increasing per sender.
    pub serial: u64,
    /// Serial of the request this message answers.
    pub reply_to: Option<u64>,
    /// The message.
    pub message: Message,
}

impl Envelope {
    /// Envelope carrying a request.
    pub fn request(serial: u64, request: Request) -> Self {
        Self {
            serial,
            reply_to: None,
            message: Message::Request(request),
        }
    }

    /// Envelope answering `reply_to`.
    pub fn response(serial: u64, reply_to: u64, response: Response) -> Self {
        Self {
            serial,
            reply_to: Some(reply_to),
            message: Message::Response(response),
        }
    }

    /// Envelope carrying an event.
    pub fn event(serial: u64, event: Event) -> Self {
        Self {
            serial,
            reply_to: None,
            message: Message::Event(event),
        }
    }
}
