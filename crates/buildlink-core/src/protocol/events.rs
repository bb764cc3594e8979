//! Events pushed by the server.

use serde::{Deserialize, Serialize};

use crate::ids::{BackgroundJobId, ExecutionId, TaskId};
use crate::protocol::keys::{BuildStructure, ScopedKey};
use crate::protocol::types::{BackgroundJobInfo, ClientInfo, LogEntry, TaskResult};

/// Server-pushed event.
///
/// The codec maps unknown event shapes to [`Event::Unrecognized`] so newer
/// servers do not break older clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Event {
    /// A watched value changed.
    ValueChanged {
        /// Which value.
        key: ScopedKey,
        /// The new value.
        value: TaskResult,
    },

    /// The set of builds/projects changed.
    BuildStructureChanged {
        /// New structure.
        structure: BuildStructure,
    },

    /// An execution was queued.
    ExecutionWaiting {
        /// Execution id.
        id: ExecutionId,
        /// Command line being executed.
        command: String,
        /// Client that requested it, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client: Option<ClientInfo>,
    },

    /// An execution left the queue and began running.
    ExecutionStarting {
        /// Execution id.
        id: ExecutionId,
    },

    /// An execution completed successfully.
    ExecutionSuccess {
        /// Execution id.
        id: ExecutionId,
    },

    /// An execution failed.
    ExecutionFailure {
        /// Execution id.
        id: ExecutionId,
    },

    /// A task began running inside an execution.
    TaskStarted {
        /// Owning execution.
        execution_id: ExecutionId,
        /// Task id.
        task_id: TaskId,
        /// Task key, when the task has one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<ScopedKey>,
    },

    /// A task finished.
    TaskFinished {
        /// Owning execution.
        execution_id: ExecutionId,
        /// Task id.
        task_id: TaskId,
        /// Task key, when the task has one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<ScopedKey>,
        /// Whether the task succeeded.
        success: bool,
        /// Failure cause, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Log output attributed to a task.
    TaskLog {
        /// Task that logged.
        task_id: TaskId,
        /// The line.
        entry: LogEntry,
    },

    /// Log output from the server itself.
    CoreLog {
        /// The line.
        entry: LogEntry,
    },

    /// An execution spawned a background job.
    BackgroundJobStarted {
        /// Owning execution.
        execution_id: ExecutionId,
        /// The job.
        job: BackgroundJobInfo,
    },

    /// A background job ended.
    BackgroundJobFinished {
        /// Owning execution.
        execution_id: ExecutionId,
        /// Job id.
        job_id: BackgroundJobId,
    },

    /// An event type this client does not know.
    Unrecognized,
}

impl Event {
    /// Wire name of the event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ValueChanged { .. } => "value_changed",
            Self::BuildStructureChanged { .. } => "build_structure_changed",
            Self::ExecutionWaiting { .. } => "execution_waiting",
            Self::ExecutionStarting { .. } => "execution_starting",
            Self::ExecutionSuccess { .. } => "execution_success",
            Self::ExecutionFailure { .. } => "execution_failure",
            Self::TaskStarted { .. } => "task_started",
            Self::TaskFinished { .. } => "task_finished",
            Self::TaskLog { .. } => "task_log",
            Self::CoreLog { .. } => "core_log",
            Self::BackgroundJobStarted { .. } => "background_job_started",
            Self::BackgroundJobFinished { .. } => "background_job_finished",
            Self::Unrecognized => "unrecognized",
        }
    }

    /// Execution this event belongs to, if any.
    pub fn execution_id(&self) -> Option<ExecutionId> {
        match self {
            Self::ExecutionWaiting { id, .. }
            | Self::ExecutionStarting { id }
            | Self::ExecutionSuccess { id }
            | Self::ExecutionFailure { id } => Some(*id),
            Self::TaskStarted { execution_id, .. }
            | Self::TaskFinished { execution_id, .. }
            | Self::BackgroundJobStarted { execution_id, .. }
            | Self::BackgroundJobFinished { execution_id, .. } => Some(*execution_id),
            Self::ValueChanged { .. }
            | Self::BuildStructureChanged { .. }
            | Self::TaskLog { .. }
            | Self::CoreLog { .. }
            | Self::Unrecognized => None,
        }
    }

    /// Whether this event ends an execution.
    pub fn is_execution_terminal(&self) -> bool {
        matches!(
            self,
            Self::ExecutionSuccess { .. } | Self::ExecutionFailure { .. }
        )
    }
}
