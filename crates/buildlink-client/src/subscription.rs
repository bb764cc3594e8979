//! Reference-counted fan-out of one event category.
//!
//! A [`SubscriptionGroup`] tells the server to start sending a category when
//! its first listener arrives and to stop when the last one leaves. Every
//! listener gets its own FIFO queue drained by a task on the executor the
//! caller picked, so a slow listener never stalls the dispatch loop or its
//! neighbours.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use buildlink_core::protocol::Request;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::outbox::Outbox;

/// What a listener receives.
#[derive(Clone, Debug, PartialEq)]
pub enum Notification<E> {
    /// An event of the group's category.
    Event(E),
    /// The group closed. Always the last notification a listener sees.
    Closed,
}

impl<E> Notification<E> {
    /// Transform the carried event.
    pub fn map<F, U>(self, f: F) -> Notification<U>
    where
        F: FnOnce(E) -> U,
    {
        match self {
            Self::Event(event) => Notification::Event(f(event)),
            Self::Closed => Notification::Closed,
        }
    }
}

/// Control messages of a group.
#[derive(Clone, Debug)]
pub struct GroupControl {
    /// Sent when the first listener joins.
    pub subscribe: Request,
    /// Sent when the last listener leaves.
    pub unsubscribe: Request,
    /// Sent when a listener joins a group that is already subscribed, so the
    /// newcomer observes current state.
    pub refresh: Option<Request>,
}

struct GroupState<E> {
    listeners: HashMap<u64, mpsc::UnboundedSender<Notification<E>>>,
    next_id: u64,
    subscribed: bool,
    closed: bool,
}

struct GroupInner<E> {
    name: String,
    control: GroupControl,
    outbox: Outbox,
    state: Mutex<GroupState<E>>,
}

/// Shared handle to one group. Clones refer to the same group.
pub struct SubscriptionGroup<E> {
    inner: Arc<GroupInner<E>>,
}

impl<E> Clone for SubscriptionGroup<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Clone + Send + 'static> SubscriptionGroup<E> {
    /// New, empty group.
    pub fn new(name: impl Into<String>, control: GroupControl, outbox: Outbox) -> Self {
        Self {
            inner: Arc::new(GroupInner {
                name: name.into(),
                control,
                outbox,
                state: Mutex::new(GroupState {
                    listeners: HashMap::new(),
                    next_id: 0,
                    subscribed: false,
                    closed: false,
                }),
            }),
        }
    }

    /// Add a listener whose notifications run on `executor`.
    ///
    /// On a closed group the listener is sent [`Notification::Closed`] and
    /// not added; the returned handle is inert. Errors returned by the listener are logged; it keeps receiving.
    pub fn watch<L>(&self, listener: L, executor: &Handle) -> Subscription
    where
        L: FnMut(Notification<E>) -> anyhow::Result<()> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(executor.spawn(deliver(self.inner.name.clone(), listener, rx)));

        let mut state = self.inner.state.lock();
        if state.closed {
            drop(state);
            let _ = tx.send(Notification::Closed);
            return Subscription::inert();
        }

        let id = state.next_id;
        state.next_id += 1;
        let _ = state.listeners.insert(id, tx);

        // Control messages are enqueued under the lock so their order on
        // the wire matches the order of state transitions.
        if state.subscribed {
            if let Some(refresh) = &self.inner.control.refresh {
                let _ = self.inner.outbox.fire_and_forget(refresh.clone());
            }
        } else {
            state.subscribed = true;
            debug!(group = %self.inner.name, "first listener, subscribing");
            let _ = self
                .inner
                .outbox
                .fire_and_forget(self.inner.control.subscribe.clone());
        }
        drop(state);

        let group: Weak<dyn ListenerSet> = Arc::downgrade(&self.inner) as Weak<dyn ListenerSet>;
        Subscription {
            group,
            id,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Queue `event` for every current listener. No-op once closed.
    pub fn dispatch(&self, event: &E) {
        let state = self.inner.state.lock();
        if state.closed {
            return;
        }
        for (id, tx) in &state.listeners {
            if tx.send(Notification::Event(event.clone())).is_err() {
                debug!(group = %self.inner.name, listener = id, "listener task gone");
            }
        }
    }

    /// Close the group: each current listener gets exactly one
    /// [`Notification::Closed`] and is removed. Idempotent.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        for (_, tx) in state.listeners.drain() {
            let _ = tx.send(Notification::Closed);
        }
        if state.subscribed {
            state.subscribed = false;
            let _ = self
                .inner
                .outbox
                .fire_and_forget(self.inner.control.unsubscribe.clone());
        }
        debug!(group = %self.inner.name, "closed");
    }

    /// Number of current listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.state.lock().listeners.len()
    }

    /// Whether the server has been asked to send this category.
    pub fn is_subscribed(&self) -> bool {
        self.inner.state.lock().subscribed
    }

    /// Whether [`close`](Self::close) ran.
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }
}

async fn deliver<E, L>(
    group: String,
    mut listener: L,
    mut rx: mpsc::UnboundedReceiver<Notification<E>>,
) where
    L: FnMut(Notification<E>) -> anyhow::Result<()>,
{
    while let Some(notification) = rx.recv().await {
        let closed = matches!(notification, Notification::Closed);
        if let Err(error) = listener(notification) {
            warn!(%group, error = %error, "listener failed");
        }
        if closed {
            break;
        }
    }
}

trait ListenerSet: Send + Sync {
    fn remove(&self, id: u64);
}

impl<E: Send> ListenerSet for GroupInner<E> {
    fn remove(&self, id: u64) {
        let mut state = self.state.lock();
        if state.closed || state.listeners.remove(&id).is_none() {
            return;
        }
        if state.listeners.is_empty() && state.subscribed {
            state.subscribed = false;
            debug!(group = %self.name, "last listener left, unsubscribing");
            let _ = self
                .outbox
                .fire_and_forget(self.control.unsubscribe.clone());
        }
    }
}

/// Cancellation handle returned by `watch`.
///
/// Dropping the handle does not cancel; call [`Subscription::cancel`].
pub struct Subscription {
    group: Weak<dyn ListenerSet>,
    id: u64,
    cancelled: AtomicBool,
}

impl Subscription {
    fn inert() -> Self {
        let group: Weak<dyn ListenerSet> = Weak::<GroupInner<()>>::new();
        Self {
            group,
            id: 0,
            cancelled: AtomicBool::new(true),
        }
    }

    /// Stop receiving notifications. Idempotent, callable from any thread,
    /// and a no-op once the group closed.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(group) = self.group.upgrade() {
            group.remove(self.id);
        }
    }

    /// Whether [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
