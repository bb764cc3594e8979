//! # buildlink-client
//!
//! Client-side engine for talking to a long-lived build server.
//!
//! One background task reads the connection and routes each envelope:
//!
//! - **Responses** complete the [`PendingResult`] of the request they answer
//! - **Events** go to the matching [`SubscriptionGroup`]s and are folded into
//!   the [`ExecutionStateModel`]
//! - **Server requests** (read a line, confirm) are answered by the
//!   [`Interaction`] attached to the execution, or refused
//!
//! When the connection ends, every execution still in flight is closed out
//! with synthetic failure events, every listener is sent
//! [`Notification::Closed`], and every pending request fails with
//! [`ClientError::ConnectionClosed`].

#![deny(unsafe_code)]

pub mod client;
mod dispatch;
pub mod errors;
pub mod execution;
pub mod interaction;
pub mod outbox;
pub mod pending;
pub mod subscription;
pub mod values;

pub use client::{Client, ClientOptions};
pub use errors::ClientError;
pub use execution::{ExecutionPhase, ExecutionStateModel};
pub use interaction::{Interaction, NoInteraction};
pub use pending::{PendingRequestTable, PendingResult};
pub use subscription::{Notification, Subscription, SubscriptionGroup};
pub use values::ValueSubscriptionRegistry;
