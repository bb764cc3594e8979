//! Requests, in both directions.

use serde::{Deserialize, Serialize};

use crate::ids::ExecutionId;
use crate::protocol::keys::ScopedKey;
use crate::protocol::types::ClientInfo;

/// A request message.
///
/// Most variants travel client → server. [`Request::ReadLine`] and
/// [`Request::Confirm`] travel server → client and must be answered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Request {
    /// Announce this client. Answered with `Received`.
    RegisterClient {
        /// Client identity.
        info: ClientInfo,
    },
    /// Run a command line. Answered with `ExecutionRequestReceived`.
    Execution {
        /// Command line.
        command: String,
    },
    /// Run a single key. Answered with `ExecutionRequestReceived`.
    KeyExecution {
        /// Key to run.
        key: ScopedKey,
    },
    /// Cancel an execution. Answered with `CancelExecution`.
    CancelExecution {
        /// Execution to cancel.
        id: ExecutionId,
    },
    /// Start receiving all events.
    ListenToEvents,
    /// Stop receiving all events.
    UnlistenToEvents,
    /// Start receiving build structure changes.
    ListenToBuildChange,
    /// Stop receiving build structure changes.
    UnlistenToBuildChange,
    /// Ask the server to re-send the current build structure.
    SendSyntheticBuildChanged,
    /// Start receiving changes of one value.
    ListenToValue {
        /// Watched key.
        key: ScopedKey,
    },
    /// Stop receiving changes of one value.
    UnlistenToValue {
        /// Watched key.
        key: ScopedKey,
    },
    /// Ask the server to re-send the current value of a key.
    SendSyntheticValueChanged {
        /// Watched key.
        key: ScopedKey,
    },
    /// Resolve a key name. Answered with `KeyLookup`.
    KeyLookup {
        /// Key name, possibly scoped (`core/test:compile`).
        name: String,
    },
    /// Analyze a command line without running it.
    AnalyzeExecution {
        /// Command line.
        command: String,
    },
    /// Tab completions for a partial command line.
    CommandCompletions {
        /// Partial command line.
        partial: String,
        /// How much detail to include (0 = least).
        detail_level: u32,
    },
    /// Ask the server process to exit.
    KillServer,
    /// Server asks the client to read a line of input.
    ReadLine {
        /// Execution that wants input.
        execution_id: ExecutionId,
        /// Prompt to show.
        prompt: String,
        /// Whether input should be masked (passwords).
        mask: bool,
    },
    /// Server asks the client to confirm something.
    Confirm {
        /// Execution that wants confirmation.
        execution_id: ExecutionId,
        /// Question to show.
        message: String,
    },
    /// A request type this client does not know.
    Unrecognized,
}

impl Request {
    /// Wire name of the request type.
    pub fn request_type(&self) -> &'static str {
        match self {
            Self::RegisterClient { .. } => "register_client",
            Self::Execution { .. } => "execution",
            Self::KeyExecution { .. } => "key_execution",
            Self::CancelExecution { .. } => "cancel_execution",
            Self::ListenToEvents => "listen_to_events",
            Self::UnlistenToEvents => "unlisten_to_events",
            Self::ListenToBuildChange => "listen_to_build_change",
            Self::UnlistenToBuildChange => "unlisten_to_build_change",
            Self::SendSyntheticBuildChanged => "send_synthetic_build_changed",
            Self::ListenToValue { .. } => "listen_to_value",
            Self::UnlistenToValue { .. } => "unlisten_to_value",
            Self::SendSyntheticValueChanged { .. } => "send_synthetic_value_changed",
            Self::KeyLookup { .. } => "key_lookup",
            Self::AnalyzeExecution { .. } => "analyze_execution",
            Self::CommandCompletions { .. } => "command_completions",
            Self::KillServer => "kill_server",
            Self::ReadLine { .. } => "read_line",
            Self::Confirm { .. } => "confirm",
            Self::Unrecognized => "unrecognized",
        }
    }
}
