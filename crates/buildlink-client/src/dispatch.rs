//! The single task that reads the connection and routes what arrives.

use std::sync::Arc;
use std::time::Duration;

use buildlink_core::protocol::{
    BuildStructure, Completion, Envelope, Event, ExecutionAnalysis, Message, Request, Response,
    ScopedKey,
};
use buildlink_core::{Connection, ExecutionId};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::errors::ClientError;
use crate::execution::ExecutionStateModel;
use crate::interaction::{InteractionRegistry, NoInteraction};
use crate::outbox::Outbox;
use crate::pending::PendingRequestTable;
use crate::subscription::{GroupControl, SubscriptionGroup};
use crate::values::ValueSubscriptionRegistry;

/// One correlation table per response kind.
pub(crate) struct Tables {
    pub executions: PendingRequestTable<ExecutionId>,
    pub completions: PendingRequestTable<Vec<Completion>>,
    pub lookups: PendingRequestTable<Vec<ScopedKey>>,
    pub analyses: PendingRequestTable<ExecutionAnalysis>,
    pub cancellations: PendingRequestTable<bool>,
    pub acks: PendingRequestTable<()>,
}

impl Tables {
    fn new(timeout: Option<Duration>) -> Self {
        Self {
            executions: PendingRequestTable::new("executions", timeout),
            completions: PendingRequestTable::new("completions", timeout),
            lookups: PendingRequestTable::new("lookups", timeout),
            analyses: PendingRequestTable::new("analyses", timeout),
            cancellations: PendingRequestTable::new("cancellations", timeout),
            acks: PendingRequestTable::new("acks", timeout),
        }
    }

    /// Fail `serial` in whichever table holds it.
    fn fail(&self, serial: u64, error: &ClientError) -> bool {
        self.executions.fail(serial, error.clone())
            || self.completions.fail(serial, error.clone())
            || self.lookups.fail(serial, error.clone())
            || self.analyses.fail(serial, error.clone())
            || self.cancellations.fail(serial, error.clone())
            || self.acks.fail(serial, error.clone())
    }

    fn fail_all(&self, error: &ClientError) {
        self.executions.fail_all(error);
        self.completions.fail_all(error);
        self.lookups.fail_all(error);
        self.analyses.fail_all(error);
        self.cancellations.fail_all(error);
        self.acks.fail_all(error);
    }
}

/// State shared between the facade and the dispatch loop.
pub(crate) struct Shared {
    pub outbox: Outbox,
    pub events: SubscriptionGroup<Event>,
    pub build: SubscriptionGroup<BuildStructure>,
    pub values: ValueSubscriptionRegistry,
    pub tables: Tables,
    pub interactions: InteractionRegistry,
}

impl Shared {
    pub fn new(outbox: Outbox, timeout: Option<Duration>) -> Self {
        Self {
            events: SubscriptionGroup::new(
                "events",
                GroupControl {
                    subscribe: Request::ListenToEvents,
                    unsubscribe: Request::UnlistenToEvents,
                    refresh: None,
                },
                outbox.clone(),
            ),
            build: SubscriptionGroup::new(
                "build structure",
                GroupControl {
                    subscribe: Request::ListenToBuildChange,
                    unsubscribe: Request::UnlistenToBuildChange,
                    refresh: Some(Request::SendSyntheticBuildChanged),
                },
                outbox.clone(),
            ),
            values: ValueSubscriptionRegistry::new(outbox.clone()),
            tables: Tables::new(timeout),
            interactions: InteractionRegistry::new(),
            outbox,
        }
    }
}

/// Reads envelopes until the connection ends or shutdown is requested,
/// then runs the shutdown sequence.
///
/// `finished` is cancelled once the loop is gone, whether the shutdown
/// sequence completed or the task was dropped.
pub(crate) struct DispatchLoop {
    connection: Arc<dyn Connection>,
    shared: Arc<Shared>,
    model: ExecutionStateModel,
    shutdown: CancellationToken,
    finished: CancellationToken,
}

impl DispatchLoop {
    pub fn new(
        connection: Arc<dyn Connection>,
        shared: Arc<Shared>,
        shutdown: CancellationToken,
        finished: CancellationToken,
    ) -> Self {
        Self {
            connection,
            shared,
            model: ExecutionStateModel::new(),
            shutdown,
            finished,
        }
    }

    pub async fn run(mut self) {
        let _finished = self.finished.clone().drop_guard();
        loop {
            let received = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    debug!("shutdown requested");
                    break;
                }
                received = self.connection.receive() => received,
            };
            match received {
                Ok(envelope) => self.route(envelope),
                Err(error) if error.is_disconnect() => {
                    debug!(%error, "connection ended");
                    break;
                }
                Err(error) => {
                    info!(%error, "connection failed");
                    break;
                }
            }
        }
        self.shut_down().await;
    }

    async fn shut_down(mut self) {
        for event in self.model.events_to_empty_engine_state() {
            trace!(event_type = event.event_type(), "synthetic event");
            self.route_event(event);
        }

        self.connection.close().await;

        let shared = &self.shared;
        shared.events.close();
        shared.values.close_all();
        shared.build.close();
        shared.tables.fail_all(&ClientError::ConnectionClosed);
        shared.interactions.clear();
        debug!("dispatch loop finished");
    }

    fn route(&mut self, envelope: Envelope) {
        let Envelope {
            serial,
            reply_to,
            message,
        } = envelope;
        match message {
            Message::Event(event) => self.route_event(event),
            Message::Response(response) => match reply_to {
                Some(reply_to) => self.route_response(reply_to, response),
                None => warn!(
                    serial,
                    kind = response.response_type(),
                    "response without reply_to dropped"
                ),
            },
            Message::Request(request) => self.serve_request(serial, request),
        }
    }

    fn route_event(&mut self, event: Event) {
        if matches!(event, Event::Unrecognized) {
            debug!("unrecognized event dropped");
            return;
        }
        self.model.apply(&event);

        let shared = &self.shared;
        shared.events.dispatch(&event);
        match &event {
            Event::ValueChanged { key, value } => shared.values.dispatch(key, value),
            Event::BuildStructureChanged { structure } => shared.build.dispatch(structure),
            _ => {}
        }
        if event.is_execution_terminal() {
            if let Some(id) = event.execution_id() {
                shared.interactions.release(id);
            }
        }
    }

    fn route_response(&self, reply_to: u64, response: Response) {
        let tables = &self.shared.tables;
        let kind = response.response_type();
        let matched = match response {
            Response::Received => {
                if !tables.acks.fire(reply_to, ()) {
                    trace!(reply_to, "ack for untracked request");
                }
                return;
            }
            Response::ExecutionRequestReceived { id } => {
                self.shared.interactions.bind(reply_to, id);
                tables.executions.fire(reply_to, id)
            }
            Response::CancelExecution { attempted } => {
                tables.cancellations.fire(reply_to, attempted)
            }
            Response::KeyLookup { keys, .. } => tables.lookups.fire(reply_to, keys),
            Response::AnalyzeExecution { analysis } => tables.analyses.fire(reply_to, analysis),
            Response::CommandCompletions { completions } => {
                tables.completions.fire(reply_to, completions)
            }
            Response::Error { message } => {
                self.shared.interactions.forget(reply_to);
                tables.fail(reply_to, &ClientError::Server { message })
            }
            Response::ReadLine { .. } | Response::Confirm { .. } | Response::Unrecognized => {
                debug!(reply_to, kind, "unexpected response kind dropped");
                return;
            }
        };
        if !matched {
            warn!(reply_to, kind, "response for unknown request");
        }
    }

    fn serve_request(&self, serial: u64, request: Request) {
        let outbox = self.shared.outbox.clone();
        match request {
            Request::ReadLine {
                execution_id,
                prompt,
                mask,
            } => {
                let Some(handler) = self.shared.interactions.get(execution_id) else {
                    debug!(serial, %execution_id, "read_line without interaction");
                    outbox.respond(serial, Response::error(NoInteraction.to_string()));
                    return;
                };
                drop(tokio::spawn(async move {
                    let response = match handler.read_line(execution_id, &prompt, mask).await {
                        Ok(line) => Response::ReadLine { line },
                        Err(error) => Response::error(error.to_string()),
                    };
                    outbox.respond(serial, response);
                }));
            }
            Request::Confirm {
                execution_id,
                message,
            } => {
                let Some(handler) = self.shared.interactions.get(execution_id) else {
                    debug!(serial, %execution_id, "confirm without interaction");
                    outbox.respond(serial, Response::error(NoInteraction.to_string()));
                    return;
                };
                drop(tokio::spawn(async move {
                    let response = match handler.confirm(execution_id, &message).await {
                        Ok(confirmed) => Response::Confirm { confirmed },
                        Err(error) => Response::error(error.to_string()),
                    };
                    outbox.respond(serial, response);
                }));
            }
            other => {
                let kind = other.request_type();
                warn!(serial, kind, "unsupported request from server");
                outbox.respond(serial, Response::error(format!("unsupported request: {kind}")));
            }
        }
    }
}
