//! Answering the server's requests for user input.
//!
//! An [`Interaction`] is attached to an execution request. Until the server
//! assigns an execution id it is parked under the request's serial; the
//! dispatch loop then binds it to the id and releases it when the execution
//! ends.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use buildlink_core::ExecutionId;
use parking_lot::Mutex;
use thiserror::Error;

/// The client cannot interact with the user for this execution.
#[derive(Clone, Copy, Debug, Default, Error, PartialEq, Eq)]
#[error("no interaction available")]
pub struct NoInteraction;

/// User input on behalf of a running execution.
#[async_trait]
pub trait Interaction: Send + Sync + 'static {
    /// Read one line. `Ok(None)` means end of input.
    async fn read_line(
        &self,
        execution_id: ExecutionId,
        prompt: &str,
        mask: bool,
    ) -> Result<Option<String>, NoInteraction>;

    /// Ask a yes/no question.
    async fn confirm(&self, execution_id: ExecutionId, message: &str)
    -> Result<bool, NoInteraction>;
}

#[derive(Default)]
struct Handlers {
    by_serial: HashMap<u64, Arc<dyn Interaction>>,
    by_execution: HashMap<ExecutionId, Arc<dyn Interaction>>,
}

/// Interaction handlers of in-flight executions.
#[derive(Default)]
pub struct InteractionRegistry {
    handlers: Mutex<Handlers>,
}

impl InteractionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `handler` under the serial of its execution request.
    pub fn park(&self, serial: u64, handler: Arc<dyn Interaction>) {
        let _ = self.handlers.lock().by_serial.insert(serial, handler);
    }

    /// Move the handler parked under `serial` to `execution_id`.
    pub fn bind(&self, serial: u64, execution_id: ExecutionId) {
        let mut handlers = self.handlers.lock();
        if let Some(handler) = handlers.by_serial.remove(&serial) {
            let _ = handlers.by_execution.insert(execution_id, handler);
        }
    }

    /// Drop the handler parked under `serial` (the request failed).
    pub fn forget(&self, serial: u64) {
        let _ = self.handlers.lock().by_serial.remove(&serial);
    }

    /// Drop the handler of a finished execution.
    pub fn release(&self, execution_id: ExecutionId) {
        let _ = self.handlers.lock().by_execution.remove(&execution_id);
    }

    /// Handler for `execution_id`, if any.
    pub fn get(&self, execution_id: ExecutionId) -> Option<Arc<dyn Interaction>> {
        self.handlers.lock().by_execution.get(&execution_id).cloned()
    }

    /// Drop every handler.
    pub fn clear(&self) {
        let mut handlers = self.handlers.lock();
        handlers.by_serial.clear();
        handlers.by_execution.clear();
    }
}
