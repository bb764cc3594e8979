//! One subscription group per watched key.

use std::collections::HashMap;

use buildlink_core::protocol::{Request, ScopedKey, TaskResult};
use parking_lot::Mutex;

use crate::outbox::Outbox;
use crate::subscription::{GroupControl, SubscriptionGroup};

struct RegistryState {
    groups: HashMap<ScopedKey, SubscriptionGroup<TaskResult>>,
    closed: bool,
}

/// Lazily created value groups, keyed by [`ScopedKey`].
///
/// The registry lock only covers lookup and creation; listener bookkeeping
/// happens under each group's own lock.
pub struct ValueSubscriptionRegistry {
    outbox: Outbox,
    state: Mutex<RegistryState>,
}

impl ValueSubscriptionRegistry {
    /// Empty registry sending control messages through `outbox`.
    pub fn new(outbox: Outbox) -> Self {
        Self {
            outbox,
            state: Mutex::new(RegistryState {
                groups: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// The group for `key`, created on first use.
    ///
    /// After [`close_all`](Self::close_all) a fresh group is returned
    /// already closed, so watchers get their close notification at once.
    pub fn group_for(&self, key: &ScopedKey) -> SubscriptionGroup<TaskResult> {
        let mut state = self.state.lock();
        if let Some(group) = state.groups.get(key) {
            return group.clone();
        }
        let group = SubscriptionGroup::new(
            format!("value {key}"),
            GroupControl {
                subscribe: Request::ListenToValue { key: key.clone() },
                unsubscribe: Request::UnlistenToValue { key: key.clone() },
                refresh: Some(Request::SendSyntheticValueChanged { key: key.clone() }),
            },
            self.outbox.clone(),
        );
        if state.closed {
            group.close();
        } else {
            let _ = state.groups.insert(key.clone(), group.clone());
        }
        group
    }

    /// Deliver a value change to the key's group, if anyone ever watched it.
    pub fn dispatch(&self, key: &ScopedKey, value: &TaskResult) {
        let group = self.state.lock().groups.get(key).cloned();
        if let Some(group) = group {
            group.dispatch(value);
        }
    }

    /// Close every group. Idempotent.
    pub fn close_all(&self) {
        let groups: Vec<_> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.groups.drain().map(|(_, group)| group).collect()
        };
        for group in groups {
            group.close();
        }
    }

    /// Number of cached groups.
    pub fn len(&self) -> usize {
        self.state.lock().groups.len()
    }

    /// Whether no group was created yet (or all were closed).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
