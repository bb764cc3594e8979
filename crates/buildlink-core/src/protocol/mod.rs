//! Protocol message types.
//!
//! An [`Envelope`] carries exactly one [`Message`]: an [`Event`] pushed by
//! the server, a [`Request`] (client → server, or the server asking the
//! client for input), or a [`Response`] correlated by `reply_to`.

mod envelope;
mod events;
mod keys;
mod requests;
mod responses;
mod types;

pub use envelope::{Envelope, Message};
pub use events::Event;
pub use keys::{AttributeKey, BuildStructure, ProjectReference, Scope, ScopedKey};
pub use requests::Request;
pub use responses::Response;
pub use types::{
    BackgroundJobInfo, ClientInfo, Completion, ExecutionAnalysis, LogEntry, LogLevel,
    PROTOCOL_VERSION, TaskResult,
};
