//! # buildlink-core
//!
//! Shared vocabulary for talking to a build server over the remote-control
//! protocol.
//!
//! - **Ids**: `ExecutionId`, `TaskId`, `BackgroundJobId` as numeric newtypes
//! - **Protocol**: [`Envelope`] carrying an [`Event`], [`Request`] or [`Response`]
//! - **Keys**: [`ScopedKey`] and the build structure types the server publishes
//! - **Codec**: JSON encoding of envelopes, tolerant of unknown message shapes
//! - **Connection**: the [`Connection`] capability plus in-memory and
//!   line-delimited TCP implementations
//!
//! [`Envelope`]: protocol::Envelope
//! [`Event`]: protocol::Event
//! [`Request`]: protocol::Request
//! [`Response`]: protocol::Response
//! [`ScopedKey`]: protocol::ScopedKey
//! [`Connection`]: connection::Connection

#![deny(unsafe_code)]

pub mod codec;
pub mod connection;
pub mod errors;
pub mod ids;
pub mod protocol;

pub use connection::{Connection, LineConnection, MemoryConnection};
pub use errors::{ProtocolError, TransportError};
pub use ids::{BackgroundJobId, ExecutionId, TaskId};
