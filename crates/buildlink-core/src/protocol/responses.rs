//! Responses, correlated to a request by `reply_to`.

use serde::{Deserialize, Serialize};

use crate::ids::ExecutionId;
use crate::protocol::keys::ScopedKey;
use crate::protocol::types::{Completion, ExecutionAnalysis};

/// A response message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Response {
    /// Plain acknowledgement of a fire-and-forget request.
    Received,
    /// An execution request was queued under this id.
    ExecutionRequestReceived {
        /// Assigned execution id.
        id: ExecutionId,
    },
    /// Result of a cancellation request.
    CancelExecution {
        /// Whether the server attempted to cancel (false if already done).
        attempted: bool,
    },
    /// Keys matching a lookup.
    KeyLookup {
        /// Name that was looked up.
        name: String,
        /// Matching keys; empty when nothing matched.
        keys: Vec<ScopedKey>,
    },
    /// Analysis of a command line.
    AnalyzeExecution {
        /// The analysis.
        analysis: ExecutionAnalysis,
    },
    /// Tab completions.
    CommandCompletions {
        /// Candidates.
        completions: Vec<Completion>,
    },
    /// Client's answer to `ReadLine`. `None` means end of input.
    ReadLine {
        /// The line read.
        #[serde(default)]
        line: Option<String>,
    },
    /// Client's answer to `Confirm`.
    Confirm {
        /// Whether the user confirmed.
        confirmed: bool,
    },
    /// The request failed.
    Error {
        /// What went wrong.
        message: String,
    },
    /// A response type this client does not know.
    Unrecognized,
}

impl Response {
    /// Wire name of the response type.
    pub fn response_type(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::ExecutionRequestReceived { .. } => "execution_request_received",
            Self::CancelExecution { .. } => "cancel_execution",
            Self::KeyLookup { .. } => "key_lookup",
            Self::AnalyzeExecution { .. } => "analyze_execution",
            Self::CommandCompletions { .. } => "command_completions",
            Self::ReadLine { .. } => "read_line",
            Self::Confirm { .. } => "confirm",
            Self::Error { .. } => "error",
            Self::Unrecognized => "unrecognized",
        }
    }

    /// Build an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
