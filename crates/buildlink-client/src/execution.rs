//! Local reconstruction of in-flight executions.
//!
//! The model folds lifecycle events in connection order. When the
//! connection dies, [`ExecutionStateModel::events_to_empty_engine_state`]
//! produces the terminal events the server never got to send, so every
//! listener sees each started execution, task and background job end.

use std::collections::{BTreeMap, BTreeSet};

use buildlink_core::protocol::{Event, ScopedKey};
use buildlink_core::{BackgroundJobId, ExecutionId, TaskId};

/// Message carried by synthesized task failures.
pub const SYNTHETIC_FAILURE_MESSAGE: &str = "connection closed";

/// Phase of a live execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionPhase {
    /// Queued on the server.
    Waiting,
    /// At least one task started, or the server said it began.
    Running,
}

#[derive(Debug, Default)]
struct ExecutionEntry {
    /// `None` once the execution ended; the entry then only lingers for
    /// background jobs that outlive it.
    phase: Option<ExecutionPhase>,
    tasks: BTreeMap<TaskId, Option<ScopedKey>>,
    jobs: BTreeSet<BackgroundJobId>,
}

impl ExecutionEntry {
    fn running() -> Self {
        Self {
            phase: Some(ExecutionPhase::Running),
            ..Self::default()
        }
    }

    fn is_spent(&self) -> bool {
        self.phase.is_none() && self.jobs.is_empty()
    }
}

/// In-flight executions, their tasks and background jobs.
#[derive(Debug, Default)]
pub struct ExecutionStateModel {
    executions: BTreeMap<ExecutionId, ExecutionEntry>,
}

impl ExecutionStateModel {
    /// Empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event. Events unrelated to executions are ignored.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::ExecutionWaiting { id, .. } => {
                let entry = self.executions.entry(*id).or_default();
                if entry.phase.is_none() {
                    entry.phase = Some(ExecutionPhase::Waiting);
                }
            }
            Event::ExecutionStarting { id } => {
                self.executions.entry(*id).or_default().phase = Some(ExecutionPhase::Running);
            }
            Event::TaskStarted {
                execution_id,
                task_id,
                key,
            } => {
                let entry = self
                    .executions
                    .entry(*execution_id)
                    .or_insert_with(ExecutionEntry::running);
                entry.phase = Some(ExecutionPhase::Running);
                let _ = entry.tasks.insert(*task_id, key.clone());
            }
            Event::TaskFinished {
                execution_id,
                task_id,
                ..
            } => {
                if let Some(entry) = self.executions.get_mut(execution_id) {
                    let _ = entry.tasks.remove(task_id);
                }
            }
            Event::BackgroundJobStarted { execution_id, job } => {
                let entry = self
                    .executions
                    .entry(*execution_id)
                    .or_insert_with(ExecutionEntry::running);
                let _ = entry.jobs.insert(job.id);
            }
            Event::BackgroundJobFinished {
                execution_id,
                job_id,
            } => {
                if let Some(entry) = self.executions.get_mut(execution_id) {
                    let _ = entry.jobs.remove(job_id);
                }
                self.drop_if_spent(*execution_id);
            }
            Event::ExecutionSuccess { id } | Event::ExecutionFailure { id } => {
                if let Some(entry) = self.executions.get_mut(id) {
                    entry.phase = None;
                    entry.tasks.clear();
                }
                self.drop_if_spent(*id);
            }
            Event::ValueChanged { .. }
            | Event::BuildStructureChanged { .. }
            | Event::TaskLog { .. }
            | Event::CoreLog { .. }
            | Event::Unrecognized => {}
        }
    }

    fn drop_if_spent(&mut self, id: ExecutionId) {
        if self.executions.get(&id).is_some_and(ExecutionEntry::is_spent) {
            let _ = self.executions.remove(&id);
        }
    }

    /// Drain the model into the events that would have ended everything in
    /// flight.
    ///
    /// Per execution, in ascending id order: a failed `TaskFinished` for
    /// each running task (ascending task id), a `BackgroundJobFinished` for
    /// each live job, then `ExecutionFailure` unless the execution already
    /// ended. The model is empty afterwards.
    pub fn events_to_empty_engine_state(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        for (execution_id, entry) in std::mem::take(&mut self.executions) {
            for (task_id, key) in entry.tasks {
                events.push(Event::TaskFinished {
                    execution_id,
                    task_id,
                    key,
                    success: false,
                    message: Some(SYNTHETIC_FAILURE_MESSAGE.to_string()),
                });
            }
            for job_id in entry.jobs {
                events.push(Event::BackgroundJobFinished {
                    execution_id,
                    job_id,
                });
            }
            if entry.phase.is_some() {
                events.push(Event::ExecutionFailure { id: execution_id });
            }
        }
        events
    }

    /// Phase of a live execution; `None` when unknown or ended.
    pub fn phase(&self, id: ExecutionId) -> Option<ExecutionPhase> {
        self.executions.get(&id).and_then(|e| e.phase)
    }

    /// Running tasks of an execution, ascending.
    pub fn in_flight_tasks(&self, id: ExecutionId) -> Vec<TaskId> {
        self.executions
            .get(&id)
            .map(|e| e.tasks.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use buildlink_core::protocol::BackgroundJobInfo;

    use super::*;

    fn exec(n: u64) -> ExecutionId {
        ExecutionId::new(n)
    }

    fn task(n: u64) -> TaskId {
        TaskId::new(n)
    }

    fn waiting(id: u64) -> Event {
        Event::ExecutionWaiting {
            id: exec(id),
            command: "compile".into(),
            client: None,
        }
    }

    fn started(e: u64, t: u64) -> Event {
        Event::TaskStarted {
            execution_id: exec(e),
            task_id: task(t),
            key: None,
        }
    }

    fn finished(e: u64, t: u64, success: bool) -> Event {
        Event::TaskFinished {
            execution_id: exec(e),
            task_id: task(t),
            key: None,
            success,
            message: None,
        }
    }

    fn synthetic_finish(e: u64, t: u64) -> Event {
        Event::TaskFinished {
            execution_id: exec(e),
            task_id: task(t),
            key: None,
            success: false,
            message: Some(SYNTHETIC_FAILURE_MESSAGE.into()),
        }
    }

    #[test]
    fn phases_follow_events() {
        let mut model = ExecutionStateModel::new();
        model.apply(&waiting(1));
        assert_eq!(model.phase(exec(1)), Some(ExecutionPhase::Waiting));

        model.apply(&started(1, 10));
        assert_eq!(model.phase(exec(1)), Some(ExecutionPhase::Running));
        assert_eq!(model.in_flight_tasks(exec(1)), vec![task(10)]);

        model.apply(&finished(1, 10, true));
        model.apply(&finished(1, 10, true));
        assert!(model.in_flight_tasks(exec(1)).is_empty());

        model.apply(&Event::ExecutionSuccess { id: exec(1) });
        assert_eq!(model.phase(exec(1)), None);
        assert!(model.is_empty());
    }

    #[test]
    fn execution_starting_marks_running() {
        let mut model = ExecutionStateModel::new();
        model.apply(&waiting(2));
        model.apply(&Event::ExecutionStarting { id: exec(2) });
        assert_eq!(model.phase(exec(2)), Some(ExecutionPhase::Running));
    }

    #[test]
    fn task_for_unknown_execution_creates_running_entry() {
        let mut model = ExecutionStateModel::new();
        model.apply(&started(4, 1));
        assert_eq!(model.phase(exec(4)), Some(ExecutionPhase::Running));
    }

    #[test]
    fn synthesis_covers_only_incomplete_executions() {
        let mut model = ExecutionStateModel::new();
        model.apply(&waiting(1));
        model.apply(&started(1, 1));
        model.apply(&started(1, 2));
        model.apply(&waiting(2));
        model.apply(&Event::ExecutionSuccess { id: exec(2) });

        assert_eq!(
            model.events_to_empty_engine_state(),
            vec![
                synthetic_finish(1, 1),
                synthetic_finish(1, 2),
                Event::ExecutionFailure { id: exec(1) },
            ]
        );
        assert!(model.is_empty());
        assert!(model.events_to_empty_engine_state().is_empty());
    }

    #[test]
    fn synthesis_orders_by_ids() {
        let mut model = ExecutionStateModel::new();
        model.apply(&started(9, 5));
        model.apply(&started(3, 7));
        model.apply(&started(3, 2));

        assert_eq!(
            model.events_to_empty_engine_state(),
            vec![
                synthetic_finish(3, 2),
                synthetic_finish(3, 7),
                Event::ExecutionFailure { id: exec(3) },
                synthetic_finish(9, 5),
                Event::ExecutionFailure { id: exec(9) },
            ]
        );
    }

    #[test]
    fn completed_execution_yields_nothing() {
        let mut model = ExecutionStateModel::new();
        model.apply(&waiting(7));
        model.apply(&started(7, 1));
        model.apply(&finished(7, 1, true));
        model.apply(&Event::ExecutionSuccess { id: exec(7) });
        assert!(model.events_to_empty_engine_state().is_empty());
    }

    #[test]
    fn background_jobs_outlive_their_execution() {
        let mut model = ExecutionStateModel::new();
        model.apply(&waiting(5));
        model.apply(&Event::BackgroundJobStarted {
            execution_id: exec(5),
            job: BackgroundJobInfo {
                id: BackgroundJobId::new(1),
                human_readable_name: "run".into(),
                spawning_task: None,
            },
        });
        model.apply(&Event::ExecutionSuccess { id: exec(5) });
        assert_eq!(model.phase(exec(5)), None);
        assert!(!model.is_empty());

        assert_eq!(
            model.events_to_empty_engine_state(),
            vec![Event::BackgroundJobFinished {
                execution_id: exec(5),
                job_id: BackgroundJobId::new(1),
            }]
        );
    }

    #[test]
    fn finished_job_releases_spent_execution() {
        let mut model = ExecutionStateModel::new();
        model.apply(&Event::BackgroundJobStarted {
            execution_id: exec(6),
            job: BackgroundJobInfo {
                id: BackgroundJobId::new(2),
                human_readable_name: "serve".into(),
                spawning_task: None,
            },
        });
        model.apply(&Event::ExecutionFailure { id: exec(6) });
        model.apply(&Event::BackgroundJobFinished {
            execution_id: exec(6),
            job_id: BackgroundJobId::new(2),
        });
        assert!(model.is_empty());
    }

    #[test]
    fn unrelated_events_ignored() {
        let mut model = ExecutionStateModel::new();
        model.apply(&Event::Unrecognized);
        model.apply(&finished(1, 1, false));
        assert!(model.is_empty());
    }
}
