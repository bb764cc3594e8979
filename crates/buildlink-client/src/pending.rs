//! Correlation of outgoing requests with their responses.
//!
//! A [`PendingRequestTable`] maps the serial of a request to the sender half
//! of a oneshot channel; the caller holds the matching [`PendingResult`].
//! Each entry completes exactly once: by a response, by a targeted failure,
//! or by [`PendingRequestTable::fail_all`] at shutdown.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::{Instant, Sleep};

use crate::errors::ClientError;

type Reply<T> = Result<T, ClientError>;

/// Cleanup run when a result gives up waiting.
type TimeoutHook = Box<dyn FnOnce() + Send>;

struct TableState<T> {
    waiting: HashMap<u64, oneshot::Sender<Reply<T>>>,
    closed: bool,
}

/// Serial → continuation map for one response kind.
pub struct PendingRequestTable<T> {
    name: &'static str,
    timeout: Option<Duration>,
    state: Arc<Mutex<TableState<T>>>,
}

impl<T: Send + 'static> PendingRequestTable<T> {
    /// Empty table. `timeout` bounds how long each result waits.
    pub fn new(name: &'static str, timeout: Option<Duration>) -> Self {
        Self {
            name,
            timeout,
            state: Arc::new(Mutex::new(TableState {
                waiting: HashMap::new(),
                closed: false,
            })),
        }
    }

    /// Table name used in diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register `serial`. Must happen before the request is sent.
    ///
    /// After [`fail_all`](Self::fail_all) the returned result is already
    /// failed with [`ClientError::ConnectionClosed`].
    pub fn register(&self, serial: u64) -> PendingResult<T> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock();
        if state.closed {
            let _ = tx.send(Err(ClientError::ConnectionClosed));
        } else if state.waiting.contains_key(&serial) {
            tracing::warn!(table = self.name, serial, "serial registered twice");
            let _ = tx.send(Err(ClientError::Transport(format!(
                "serial {serial} already pending"
            ))));
        } else {
            let _ = state.waiting.insert(serial, tx);
        }
        drop(state);

        PendingResult {
            rx,
            deadline: self.timeout.map(|t| (Instant::now() + t, t)),
            sleep: None,
            on_timeout: None,
            table: Arc::downgrade(&self.state),
            serial,
        }
    }

    /// Complete `serial` with a value. Returns `false` for unknown serials.
    pub fn fire(&self, serial: u64, value: T) -> bool {
        complete(&self.state, serial, Ok(value))
    }

    /// Complete `serial` with an error. Returns `false` for unknown serials.
    pub fn fail(&self, serial: u64, error: ClientError) -> bool {
        complete(&self.state, serial, Err(error))
    }

    /// Fail every waiting entry and refuse new ones.
    pub fn fail_all(&self, error: &ClientError) {
        let drained: Vec<_> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.waiting.drain().collect()
        };
        if !drained.is_empty() {
            tracing::debug!(table = self.name, count = drained.len(), %error, "failing pending requests");
        }
        for (_, tx) in drained {
            let _ = tx.send(Err(error.clone()));
        }
    }

    /// A callback that fails `serial`, for use after the table's owner is gone.
    pub fn failure_hook(&self, serial: u64) -> impl FnOnce(ClientError) + Send + 'static {
        let state = Arc::downgrade(&self.state);
        move |error| {
            if let Some(state) = state.upgrade() {
                let _ = complete(&state, serial, Err(error));
            }
        }
    }

    /// Whether `serial` is waiting.
    pub fn is_pending(&self, serial: u64) -> bool {
        self.state.lock().waiting.contains_key(&serial)
    }

    /// Number of waiting entries.
    pub fn len(&self) -> usize {
        self.state.lock().waiting.len()
    }

    /// Whether nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn complete<T>(state: &Mutex<TableState<T>>, serial: u64, reply: Reply<T>) -> bool {
    let Some(tx) = state.lock().waiting.remove(&serial) else {
        return false;
    };
    // The caller may have dropped its result; the entry still counts as used.
    let _ = tx.send(reply);
    true
}

/// Handle to the eventual reply of one request.
///
/// Resolves to the reply, a server error, a timeout (if configured), or
/// [`ClientError::ConnectionClosed`] once the client shuts down.
pub struct PendingResult<T> {
    rx: oneshot::Receiver<Reply<T>>,
    deadline: Option<(Instant, Duration)>,
    sleep: Option<Pin<Box<Sleep>>>,
    on_timeout: Option<TimeoutHook>,
    table: Weak<Mutex<TableState<T>>>,
    serial: u64,
}

impl<T> PendingResult<T> {
    /// Serial of the request this result belongs to.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Run `hook` if this result times out, after its entry is dropped.
    #[must_use]
    pub fn on_timeout(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_timeout = Some(Box::new(hook));
        self
    }

    fn forget(&self) {
        if let Some(state) = self.table.upgrade() {
            let _ = state.lock().waiting.remove(&self.serial);
        }
    }
}

impl<T> Future for PendingResult<T> {
    type Output = Reply<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        if let Poll::Ready(reply) = Pin::new(&mut this.rx).poll(cx) {
            return Poll::Ready(reply.unwrap_or(Err(ClientError::ConnectionClosed)));
        }
        let Some((deadline, timeout)) = this.deadline else {
            return Poll::Pending;
        };
        let sleep = this
            .sleep
            .get_or_insert_with(|| Box::pin(tokio::time::sleep_until(deadline)));
        if sleep.as_mut().poll(cx).is_pending() {
            return Poll::Pending;
        }
        this.forget();
        if let Some(hook) = this.on_timeout.take() {
            hook();
        }
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        Poll::Ready(Err(ClientError::Timeout { timeout_ms }))
    }
}
