//! Change notification.
//!
//! Watchers receive content-free "something changed" signals for the scopes
//! they subscribed to and re-read whatever state they care about. Signals
//! coalesce: any number of changes between two reads of a watcher are
//! delivered as one signal.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use cluster_state_core::{MachineId, ServiceName, UnitName};
use futures::stream::{self, Stream};
use parking_lot::Mutex;
use tokio::sync::Notify;

/// A subset of the topology a watcher can subscribe to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// The machine collection.
    Machines,
    /// A single machine.
    Machine(MachineId),
    /// The service collection.
    Services,
    /// A single service.
    Service(ServiceName),
    /// The units of one service.
    Units(ServiceName),
    /// A single unit.
    Unit(UnitName),
    /// The charm collection.
    Charms,
    /// Environment configuration, including proxy settings.
    EnvironConfig,
    /// The addresses API servers listen on.
    ApiHostPorts,
}

#[derive(Debug, Default)]
struct SignalState {
    pending: bool,
    stopped: bool,
}

#[derive(Debug, Default)]
struct Signal {
    state: Mutex<SignalState>,
    notify: Notify,
}

impl Signal {
    fn raise(&self) {
        let mut state = self.state.lock();
        if state.stopped {
            return;
        }
        state.pending = true;
        drop(state);
        self.notify.notify_one();
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        state.stopped = true;
        state.pending = false;
        drop(state);
        self.notify.notify_one();
    }
}

struct Subscription {
    scopes: Vec<Scope>,
    signal: Arc<Signal>,
}

#[derive(Default)]
struct Registry {
    closed: bool,
    subscriptions: HashMap<u64, Subscription>,
}

/// Routes published changes to the subscriptions covering them.
#[derive(Default)]
pub(crate) struct Hub {
    next_id: AtomicU64,
    registry: Mutex<Registry>,
}

impl Hub {
    /// Register a watcher, or return `None` once the hub is closed.
    pub(crate) fn subscribe(self: &Arc<Self>, scopes: Vec<Scope>) -> Option<Watcher> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let signal = Arc::new(Signal::default());
        // Every consumer reads the current state once before waiting.
        signal.raise();

        let mut registry = self.registry.lock();
        if registry.closed {
            return None;
        }
        tracing::debug!(watcher_id = id, ?scopes, "Watcher started");
        registry.subscriptions.insert(
            id,
            Subscription {
                scopes,
                signal: Arc::clone(&signal),
            },
        );
        drop(registry);

        Some(Watcher {
            handle: StopHandle {
                id,
                signal,
                hub: Arc::downgrade(self),
            },
        })
    }

    pub(crate) fn publish(&self, scopes: &[Scope]) {
        let registry = self.registry.lock();
        for subscription in registry.subscriptions.values() {
            if subscription.scopes.iter().any(|s| scopes.contains(s)) {
                subscription.signal.raise();
            }
        }
    }

    fn unsubscribe(&self, id: u64) {
        if self.registry.lock().subscriptions.remove(&id).is_some() {
            tracing::debug!(watcher_id = id, "Watcher stopped");
        }
    }

    /// Stop every live watcher and refuse new ones.
    pub(crate) fn close(&self) {
        let subscriptions = {
            let mut registry = self.registry.lock();
            registry.closed = true;
            std::mem::take(&mut registry.subscriptions)
        };
        for subscription in subscriptions.into_values() {
            subscription.signal.stop();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.registry.lock().subscriptions.len()
    }
}

/// Stops a watcher from another task.
#[derive(Clone)]
pub struct StopHandle {
    id: u64,
    signal: Arc<Signal>,
    hub: Weak<Hub>,
}

impl StopHandle {
    /// Stop the watcher.
    ///
    /// Safe to call concurrently with a pending [`Watcher::changes`]; once
    /// this returns no further signal is delivered.
    pub fn stop(&self) {
        self.signal.stop();
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }

    /// Returns true once the watcher has been stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.signal.state.lock().stopped
    }
}

impl std::fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopHandle")
            .field("id", &self.id)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// A subscription to one or more scopes.
///
/// Dropping the watcher stops it.
#[derive(Debug)]
pub struct Watcher {
    handle: StopHandle,
}

impl Watcher {
    /// Wait for the next change signal.
    ///
    /// Returns `None` once the watcher has been stopped, either directly or
    /// by closing the state it watches.
    pub async fn changes(&mut self) -> Option<()> {
        loop {
            {
                let mut state = self.handle.signal.state.lock();
                if state.stopped {
                    return None;
                }
                if state.pending {
                    state.pending = false;
                    return Some(());
                }
            }
            self.handle.signal.notify.notified().await;
        }
    }

    /// Stop the watcher.
    pub fn stop(&self) {
        self.handle.stop();
    }

    /// A handle that can stop this watcher while it is being read.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.handle.clone()
    }

    /// Convert the watcher into a stream of signals.
    pub fn into_stream(self) -> impl Stream<Item = ()> + Send {
        stream::unfold(self, |mut watcher| async move {
            watcher.changes().await.map(|()| ((), watcher))
        })
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.handle.stop();
    }
}
