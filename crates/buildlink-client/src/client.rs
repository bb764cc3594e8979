//! Public entry point.

use std::sync::Arc;
use std::time::Duration;

use buildlink_core::protocol::{
    BuildStructure, ClientInfo, Completion, Event, ExecutionAnalysis, Request, ScopedKey,
    TaskResult,
};
use buildlink_core::{Connection, ExecutionId, LineConnection};
use buildlink_settings::ClientSettings;
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatch::{DispatchLoop, Shared};
use crate::errors::ClientError;
use crate::interaction::Interaction;
use crate::outbox::FailureHook;
use crate::pending::{PendingRequestTable, PendingResult};
use crate::subscription::{Notification, Subscription};

/// How a [`Client`] identifies itself and behaves.
#[derive(Clone, Debug)]
pub struct ClientOptions {
    /// Identity sent in `RegisterClient`.
    pub info: ClientInfo,
    /// Bound on every request; `None` waits for a reply or disconnect.
    pub request_timeout: Option<Duration>,
    /// Where listener callbacks run by default. Defaults to the runtime the
    /// client was created on.
    pub executor: Option<Handle>,
}

impl ClientOptions {
    /// Options with the given identity and no timeout.
    pub fn new(info: ClientInfo) -> Self {
        Self {
            info,
            request_timeout: None,
            executor: None,
        }
    }

    /// Options derived from loaded settings.
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self {
            info: ClientInfo::new(
                settings.client.config_name.clone(),
                settings.client.human_readable_name.clone(),
            ),
            request_timeout: settings.client.request_timeout_ms.map(Duration::from_millis),
            executor: None,
        }
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from_settings(&ClientSettings::default())
    }
}

/// A connected client.
///
/// All methods may be called concurrently from any task. Request methods
/// return immediately with a [`PendingResult`]; subscription methods return
/// a [`Subscription`] handle.
pub struct Client {
    connection: Arc<dyn Connection>,
    shared: Arc<Shared>,
    executor: Handle,
    shutdown: CancellationToken,
    finished: CancellationToken,
}

impl Client {
    /// Dial the server named in `settings` and register.
    pub async fn connect(settings: &ClientSettings) -> Result<Self, ClientError> {
        let address = settings.connection.address.as_str();
        let timeout_ms = settings.connection.connect_timeout_ms;
        info!(address, "connecting");
        let connection = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            LineConnection::connect(address),
        )
        .await
        .map_err(|_| ClientError::Timeout { timeout_ms })??;
        Self::with_connection(Arc::new(connection), ClientOptions::from_settings(settings)).await
    }

    /// Start over an existing connection and register.
    ///
    /// Must be called within a tokio runtime. On registration failure the
    /// client is shut down and the error returned.
    pub async fn with_connection(
        connection: Arc<dyn Connection>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let info = options.info.clone();
        let client = Self::start(connection, options);
        let registered = client
            .send(&client.shared.tables.acks, Request::RegisterClient { info })
            .await;
        if let Err(error) = registered {
            warn!(%error, "registration failed");
            client.close().await;
            return Err(error);
        }
        debug!("registered");
        Ok(client)
    }

    fn start(connection: Arc<dyn Connection>, options: ClientOptions) -> Self {
        let executor = options.executor.unwrap_or_else(Handle::current);
        let (outbox, _writer) = crate::outbox::Outbox::start(Arc::clone(&connection));
        let shared = Arc::new(Shared::new(outbox, options.request_timeout));
        let shutdown = CancellationToken::new();
        let finished = CancellationToken::new();
        drop(tokio::spawn(
            DispatchLoop::new(
                Arc::clone(&connection),
                Arc::clone(&shared),
                shutdown.clone(),
                finished.clone(),
            )
            .run(),
        ));
        Self {
            connection,
            shared,
            executor,
            shutdown,
            finished,
        }
    }

    // ── Subscriptions ───────────────────────────────────────────────

    /// Receive every server event.
    pub fn subscribe_events<L>(&self, listener: L) -> Subscription
    where
        L: FnMut(Notification<Event>) -> anyhow::Result<()> + Send + 'static,
    {
        self.subscribe_events_on(&self.executor, listener)
    }

    /// [`subscribe_events`](Self::subscribe_events) with callbacks on `executor`.
    pub fn subscribe_events_on<L>(&self, executor: &Handle, listener: L) -> Subscription
    where
        L: FnMut(Notification<Event>) -> anyhow::Result<()> + Send + 'static,
    {
        self.shared.events.watch(listener, executor)
    }

    /// Receive build structure changes. Late subscribers are sent the
    /// current structure.
    pub fn subscribe_build_structure<L>(&self, listener: L) -> Subscription
    where
        L: FnMut(Notification<BuildStructure>) -> anyhow::Result<()> + Send + 'static,
    {
        self.subscribe_build_structure_on(&self.executor, listener)
    }

    /// [`subscribe_build_structure`](Self::subscribe_build_structure) with
    /// callbacks on `executor`.
    pub fn subscribe_build_structure_on<L>(&self, executor: &Handle, listener: L) -> Subscription
    where
        L: FnMut(Notification<BuildStructure>) -> anyhow::Result<()> + Send + 'static,
    {
        self.shared.build.watch(listener, executor)
    }

    /// Receive changes of one value.
    pub fn watch_value<L>(&self, key: &ScopedKey, listener: L) -> Subscription
    where
        L: FnMut(Notification<TaskResult>) -> anyhow::Result<()> + Send + 'static,
    {
        self.watch_value_on(&self.executor, key, listener)
    }

    /// [`watch_value`](Self::watch_value) with callbacks on `executor`.
    pub fn watch_value_on<L>(&self, executor: &Handle, key: &ScopedKey, listener: L) -> Subscription
    where
        L: FnMut(Notification<TaskResult>) -> anyhow::Result<()> + Send + 'static,
    {
        self.shared.values.group_for(key).watch(listener, executor)
    }

    /// Receive changes of one value decoded as `T`.
    ///
    /// A failed task, or a value that does not decode, arrives as `Err`
    /// with a description.
    pub fn watch_value_as<T, L>(&self, key: &ScopedKey, mut listener: L) -> Subscription
    where
        T: DeserializeOwned + Send + 'static,
        L: FnMut(Notification<Result<T, String>>) -> anyhow::Result<()> + Send + 'static,
    {
        self.watch_value(key, move |notification: Notification<TaskResult>| {
            listener(notification.map(|value| value.decode::<T>()))
        })
    }

    // ── Requests ────────────────────────────────────────────────────

    /// Run a command line. Resolves to the execution id once queued.
    ///
    /// `interaction` answers the server's input requests for this execution.
    pub fn request_execution(
        &self,
        command: impl Into<String>,
        interaction: Option<Arc<dyn Interaction>>,
    ) -> PendingResult<ExecutionId> {
        self.send_execution(
            Request::Execution {
                command: command.into(),
            },
            interaction,
        )
    }

    /// Run a single key. Resolves to the execution id once queued.
    pub fn request_key_execution(
        &self,
        key: ScopedKey,
        interaction: Option<Arc<dyn Interaction>>,
    ) -> PendingResult<ExecutionId> {
        self.send_execution(Request::KeyExecution { key }, interaction)
    }

    /// Cancel an execution. Resolves to whether the server attempted it.
    pub fn cancel_execution(&self, id: ExecutionId) -> PendingResult<bool> {
        self.send(&self.shared.tables.cancellations, Request::CancelExecution { id })
    }

    /// Resolve a key name to the keys it matches.
    pub fn lookup_key(&self, name: impl Into<String>) -> PendingResult<Vec<ScopedKey>> {
        self.send(
            &self.shared.tables.lookups,
            Request::KeyLookup { name: name.into() },
        )
    }

    /// Tab completions for a partial command line.
    pub fn autocomplete(
        &self,
        partial: impl Into<String>,
        detail_level: u32,
    ) -> PendingResult<Vec<Completion>> {
        self.send(
            &self.shared.tables.completions,
            Request::CommandCompletions {
                partial: partial.into(),
                detail_level,
            },
        )
    }

    /// Analyze a command line without running it.
    pub fn analyze_execution(&self, command: impl Into<String>) -> PendingResult<ExecutionAnalysis> {
        self.send(
            &self.shared.tables.analyses,
            Request::AnalyzeExecution {
                command: command.into(),
            },
        )
    }

    /// Ask the server to exit. Resolves when acknowledged, or with
    /// [`ClientError::ConnectionClosed`] if the server goes away first.
    pub fn kill_server(&self) -> PendingResult<()> {
        self.send(&self.shared.tables.acks, Request::KillServer)
    }

    fn send<T: Send + 'static>(
        &self,
        table: &PendingRequestTable<T>,
        request: Request,
    ) -> PendingResult<T> {
        let serial = self.shared.outbox.next_serial();
        let result = table.register(serial);
        let hook: FailureHook = Box::new(table.failure_hook(serial));
        self.shared.outbox.send_request(serial, request, Some(hook));
        result
    }

    fn send_execution(
        &self,
        request: Request,
        interaction: Option<Arc<dyn Interaction>>,
    ) -> PendingResult<ExecutionId> {
        let Some(interaction) = interaction else {
            return self.send(&self.shared.tables.executions, request);
        };
        let table = &self.shared.tables.executions;
        let serial = self.shared.outbox.next_serial();
        self.shared.interactions.park(serial, interaction);
        let parked = Arc::downgrade(&self.shared);
        let result = table.register(serial).on_timeout(move || {
            if let Some(shared) = parked.upgrade() {
                shared.interactions.forget(serial);
            }
        });
        let fail = table.failure_hook(serial);
        let shared = Arc::downgrade(&self.shared);
        let hook: FailureHook = Box::new(move |error| {
            if let Some(shared) = shared.upgrade() {
                shared.interactions.forget(serial);
            }
            fail(error);
        });
        self.shared.outbox.send_request(serial, request, Some(hook));
        result
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Stop the dispatch loop and wait for its shutdown sequence: synthetic
    /// terminal events, close notifications, then failure of every pending
    /// request. Idempotent; concurrent callers all wait for the same
    /// sequence to finish.
    pub async fn close(&self) {
        self.shutdown.cancel();
        self.connection.close().await;
        self.finished.cancelled().await;
    }

    /// Whether the client was closed or the connection ended.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled() || self.connection.is_closed()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
