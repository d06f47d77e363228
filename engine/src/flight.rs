//! Single-flight admission for replication cycles.
//!
//! At most one cycle runs at a time. A request arriving while a cycle runs is
//! queued; every request queued during one cycle is coalesced into exactly
//! one follow-up cycle, and all of their waiters receive that cycle's result.
//! The running flag is only ever cleared by the task that owns it.

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Requests that can be merged into one follow-up run.
pub trait Coalesce: Copy + Send + 'static {
    fn coalesce(self, other: Self) -> Self;
}

/// Outcome of [`SingleFlight::admit`].
#[derive(Debug)]
pub enum Admission<O> {
    /// Nothing was running; the caller now owns the flight and must call
    /// [`SingleFlight::finish`] when its run completes.
    Lead,
    /// A run is in progress; the receiver resolves with the follow-up
    /// run's result.
    Follow(oneshot::Receiver<O>),
}

/// A follow-up run handed to the current owner by [`SingleFlight::finish`].
#[derive(Debug)]
pub struct FollowUp<K, O> {
    pub request: K,
    pub waiters: Vec<oneshot::Sender<O>>,
}

impl<K, O: Clone> FollowUp<K, O> {
    /// Deliver the follow-up result to everyone who asked for it.
    pub fn complete(self, outcome: &O) {
        for waiter in self.waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}

#[derive(Debug)]
struct Slot<K, O> {
    running: bool,
    queued: Option<K>,
    waiters: Vec<oneshot::Sender<O>>,
}

/// Single-flight gate over runs of request type `K` producing `O`.
#[derive(Debug)]
pub struct SingleFlight<K, O> {
    slot: Mutex<Slot<K, O>>,
}

impl<K: Coalesce, O> SingleFlight<K, O> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                running: false,
                queued: None,
                waiters: Vec::new(),
            }),
        }
    }

    /// Either take ownership of the flight or queue behind the running one.
    pub fn admit(&self, request: K) -> Admission<O> {
        let mut slot = self.slot.lock();
        if !slot.running {
            slot.running = true;
            return Admission::Lead;
        }
        slot.queued = Some(match slot.queued {
            Some(queued) => queued.coalesce(request),
            None => request,
        });
        let (tx, rx) = oneshot::channel();
        slot.waiters.push(tx);
        Admission::Follow(rx)
    }

    /// Called by the owner after each run. Returns the coalesced follow-up
    /// (ownership is retained) or releases the flight when nothing is queued.
    pub fn finish(&self) -> Option<FollowUp<K, O>> {
        let mut slot = self.slot.lock();
        match slot.queued.take() {
            Some(request) => Some(FollowUp {
                request,
                waiters: std::mem::take(&mut slot.waiters),
            }),
            None => {
                slot.running = false;
                None
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.slot.lock().running
    }

    /// Number of callers waiting on the next follow-up.
    pub fn waiting(&self) -> usize {
        self.slot.lock().waiters.len()
    }
}

impl<K: Coalesce, O> Default for SingleFlight<K, O> {
    fn default() -> Self {
        Self::new()
    }
}
