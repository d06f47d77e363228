//! Connectivity monitor.
//!
//! Tracks a binary online/offline state fed by host-level signals and fans
//! every signal out to subscribers over typed channels. A subscriber receives
//! the current state as soon as it subscribes. Repeated signals of the same
//! state are delivered as-is; filtering is left to the consumer.

use crate::remote::RemoteService;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Host connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn from_online(online: bool) -> Self {
        if online {
            Connectivity::Online
        } else {
            Connectivity::Offline
        }
    }

    pub fn is_online(self) -> bool {
        self == Connectivity::Online
    }
}

type SubscriberId = u64;

#[derive(Debug)]
struct State {
    current: Connectivity,
    /// Registration order is delivery order.
    subscribers: Vec<(SubscriberId, mpsc::UnboundedSender<Connectivity>)>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    next_id: AtomicU64,
}

impl Shared {
    fn detach(&self, id: SubscriberId) {
        self.state.lock().subscribers.retain(|(sid, _)| *sid != id);
    }
}

/// Online/offline state with subscriber fan-out.
///
/// Cloning is cheap; clones share the same state and subscribers.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    shared: Arc<Shared>,
}

impl ConnectivityMonitor {
    /// Create a monitor seeded from the host's current signal.
    pub fn new(initial: Connectivity) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    current: initial,
                    subscribers: Vec::new(),
                }),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn current(&self) -> Connectivity {
        self.shared.state.lock().current
    }

    pub fn is_online(&self) -> bool {
        self.current().is_online()
    }

    /// Register a subscriber. The current state is queued before this returns.
    pub fn subscribe(&self) -> Subscription {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut state = self.shared.state.lock();
        // Receiver is alive, so this cannot fail.
        let _ = tx.send(state.current);
        state.subscribers.push((id, tx));
        drop(state);

        Subscription {
            id,
            rx,
            monitor: Arc::downgrade(&self.shared),
            detached: false,
        }
    }

    /// Host signal entry point. Every call is delivered to every subscriber.
    pub fn set_state(&self, next: Connectivity) {
        let mut state = self.shared.state.lock();
        let previous = state.current;
        state.current = next;
        state.subscribers.retain(|(_, tx)| tx.send(next).is_ok());
        let subscribers = state.subscribers.len();
        drop(state);

        if previous != next {
            tracing::info!(?previous, ?next, "Connectivity changed");
        } else {
            tracing::debug!(state = ?next, subscribers, "Connectivity signal repeated");
        }
    }

    pub fn set_online(&self) {
        self.set_state(Connectivity::Online);
    }

    pub fn set_offline(&self) {
        self.set_state(Connectivity::Offline);
    }

    /// Number of attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.shared.state.lock().subscribers.len()
    }

    /// Spawn a host-signal source that probes the remote every `interval`
    /// and reports a state only when the probe result changes.
    pub fn spawn_probe(&self, remote: Arc<dyn RemoteService>, interval: Duration) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut last = monitor.current();
            loop {
                ticker.tick().await;
                let observed = match remote.probe().await {
                    Ok(()) => Connectivity::Online,
                    Err(e) => {
                        tracing::debug!(error = %e, "Connectivity probe failed");
                        Connectivity::Offline
                    }
                };
                if observed != last {
                    monitor.set_state(observed);
                    last = observed;
                }
            }
        })
    }
}

/// A registered subscriber.
///
/// [`Subscription::unsubscribe`] detaches it; calling it again, or dropping
/// the subscription afterwards, does nothing.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::UnboundedReceiver<Connectivity>,
    monitor: Weak<Shared>,
    detached: bool,
}

impl Subscription {
    /// Wait for the next delivered state. `None` once detached and drained.
    pub async fn recv(&mut self) -> Option<Connectivity> {
        self.rx.recv().await
    }

    /// Take a delivered state if one is queued.
    pub fn try_recv(&mut self) -> Option<Connectivity> {
        self.rx.try_recv().ok()
    }

    pub fn unsubscribe(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;
        if let Some(shared) = self.monitor.upgrade() {
            shared.detach(self.id);
        }
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
