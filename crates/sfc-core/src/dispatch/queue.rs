//! Priority-fair event queue with watermark backpressure.
//!
//! Events are kept in FIFO lanes per priority; consumers always drain the
//! lowest-numbered non-empty lane. Producers enqueue without blocking
//! until the high-water mark, then suspend until consumers bring the
//! depth back under the low-water mark. Nothing is ever dropped.

use crate::events::Event;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Notify};

#[derive(Default)]
struct Lanes {
    lanes: BTreeMap<u8, VecDeque<Event>>,
    len: usize,
}

impl Lanes {
    fn push(&mut self, event: Event) {
        self.lanes
            .entry(event.meta.priority)
            .or_default()
            .push_back(event);
        self.len += 1;
    }

    fn pop(&mut self) -> Option<Event> {
        let (&priority, _) = self.lanes.iter().find(|(_, lane)| !lane.is_empty())?;
        let event = self.lanes.get_mut(&priority)?.pop_front()?;
        self.len -= 1;
        Some(event)
    }
}

/// An event claimed from the queue; the claim counts toward the
/// termination check until the guard is dropped.
pub struct ClaimedEvent {
    /// The dequeued event.
    pub event: Event,
    _claim: ClaimGuard,
}

impl ClaimedEvent {
    /// Splits the claim into the event and the guard keeping it active.
    pub fn into_parts(self) -> (Event, ClaimGuard) {
        (self.event, self._claim)
    }
}

/// Keeps a dequeued event counted as in-flight until dropped.
pub struct ClaimGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Multi-producer multi-consumer event queue.
pub struct EventQueue {
    inner: Mutex<Lanes>,
    active: Arc<AtomicUsize>,
    ready: Notify,
    gate_tx: watch::Sender<bool>,
    high_water: usize,
    low_water: usize,
}

impl EventQueue {
    /// Creates a queue with the given watermarks.
    pub fn new(high_water: usize, low_water: usize) -> Self {
        let (gate_tx, _) = watch::channel(false);
        Self {
            inner: Mutex::new(Lanes::default()),
            active: Arc::new(AtomicUsize::new(0)),
            ready: Notify::new(),
            gate_tx,
            high_water: high_water.max(1),
            low_water: low_water.min(high_water.saturating_sub(1)),
        }
    }

    /// Enqueues an event, suspending while the queue is above its
    /// high-water mark until consumers drain it below the low-water mark.
    pub async fn push(&self, event: Event) {
        let mut gate_rx = self.gate_tx.subscribe();
        loop {
            if *gate_rx.borrow() {
                // Blocked: wait for consumers to drain the backlog.
                let _ = gate_rx.wait_for(|blocked| !*blocked).await;
                continue;
            }

            let mut inner = self.inner.lock().expect("queue lock");
            inner.push(event);
            if inner.len >= self.high_water {
                let _ = self.gate_tx.send(true);
            }
            drop(inner);
            self.ready.notify_one();
            return;
        }
    }

    /// Dequeues the next event, waiting until one is available or the
    /// cancel signal fires. Returns `None` on cancellation.
    pub async fn pop(&self, cancel: &mut watch::Receiver<bool>) -> Option<ClaimedEvent> {
        loop {
            {
                let mut inner = self.inner.lock().expect("queue lock");
                if let Some(event) = inner.pop() {
                    if *self.gate_tx.borrow() && inner.len <= self.low_water {
                        let _ = self.gate_tx.send(false);
                    }
                    self.active.fetch_add(1, Ordering::SeqCst);
                    return Some(ClaimedEvent {
                        event,
                        _claim: ClaimGuard {
                            counter: self.active.clone(),
                        },
                    });
                }
            }

            if *cancel.borrow() {
                return None;
            }
            tokio::select! {
                _ = self.ready.notified() => {}
                result = cancel.wait_for(|c| *c) => {
                    if result.is_ok() {
                        return None;
                    }
                }
            }
        }
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("queue lock").len
    }

    /// Returns true when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of dequeued events whose processing has not finished.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Returns true while producers are blocked on the high-water mark.
    pub fn is_gated(&self) -> bool {
        *self.gate_tx.borrow()
    }
}
