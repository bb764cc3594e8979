//! Payload types shared by events, requests and responses.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::ids::BackgroundJobId;
use crate::protocol::keys::ScopedKey;

/// Protocol version this client speaks.
pub const PROTOCOL_VERSION: &str = "1";

/// Identity a client announces when it registers with the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Unique id of this client instance.
    pub uuid: String,
    /// Stable client kind, e.g. `console` or `intellij`.
    pub config_name: String,
    /// Name shown to users in server-side listings.
    pub human_readable_name: String,
    /// Protocol version spoken by the client.
    pub protocol_version: String,
    /// Optional capabilities the client supports.
    #[serde(default)]
    pub feature_tags: Vec<String>,
}

impl ClientInfo {
    /// Fresh identity with a time-ordered uuid.
    pub fn new(config_name: impl Into<String>, human_readable_name: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::now_v7().to_string(),
            config_name: config_name.into(),
            human_readable_name: human_readable_name.into(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            feature_tags: Vec::new(),
        }
    }
}

/// Outcome of computing a task or setting on the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskResult {
    /// The value was computed.
    Success {
        /// Structured value, if the server could serialize it.
        value: Value,
        /// Human-readable rendering.
        #[serde(default)]
        rendered: String,
    },
    /// Computing the value failed.
    Failure {
        /// Failure description.
        message: String,
    },
}

impl TaskResult {
    /// Whether this is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Decode a successful value into `T`.
    ///
    /// A failed result decodes to `Err` with the server's message.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, String> {
        match self {
            Self::Success { value, .. } => {
                serde_json::from_value(value.clone()).map_err(|e| e.to_string())
            }
            Self::Failure { message } => Err(message.clone()),
        }
    }
}

/// Severity of a log line forwarded by the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Debug output.
    Debug,
    /// Informational output.
    Info,
    /// Warning.
    Warn,
    /// Error.
    Error,
}

/// A log line forwarded by the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Severity.
    pub level: LogLevel,
    /// The text.
    pub message: String,
}

/// A job the server keeps running after its execution finished.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundJobInfo {
    /// Job id.
    pub id: BackgroundJobId,
    /// Human-readable description.
    #[serde(default)]
    pub human_readable_name: String,
    /// Key of the task that spawned the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawning_task: Option<ScopedKey>,
}

/// What the server would do with a command line, without running it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionAnalysis {
    /// The command names a built-in command.
    Command {
        /// Command name.
        name: String,
    },
    /// The command runs one or more keys.
    Key {
        /// Keys that would run.
        keys: Vec<ScopedKey>,
    },
    /// The command does not parse.
    Error {
        /// Parser diagnostics.
        messages: Vec<String>,
    },
}

/// One tab-completion candidate.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    /// Text to append to the partial command.
    pub append: String,
    /// Text to display in a completion list.
    pub display: String,
    /// Whether the candidate is the empty completion.
    #[serde(default)]
    pub is_empty: bool,
}
