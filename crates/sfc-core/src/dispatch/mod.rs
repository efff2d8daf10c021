//! Event dispatcher.
//!
//! The dispatcher drives events through their matching handlers until the
//! stream drains. For a single event, handlers run in priority order:
//! every handler at a strictly lower priority number returns before any
//! higher-numbered handler starts, and handlers sharing a priority run
//! concurrently, each admitted by its own instance-cap semaphore.
//! Handler errors are logged with plugin context and never stop the
//! event's remaining handlers.

pub mod queue;

use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::events::{Event, Registry};
use crate::session::Session;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

pub use queue::EventQueue;

/// Dispatch counters, mirrored into the `metrics` registry.
#[derive(Debug, Default)]
pub struct DispatcherStats {
    /// Events accepted into the queue.
    pub enqueued: AtomicU64,
    /// Events fully processed.
    pub dispatched: AtomicU64,
    /// Handler invocations that returned an error.
    pub handler_errors: AtomicU64,
}

/// Snapshot of the dispatch counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatcherStatsSnapshot {
    pub enqueued: u64,
    pub dispatched: u64,
    pub handler_errors: u64,
}

/// Drives events through registered handlers until quiescence.
pub struct Dispatcher {
    registry: Arc<Registry>,
    queue: Arc<EventQueue>,
    stats: Arc<DispatcherStats>,
    workers: usize,
    quiescence_window: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher over a registry, tuned by the engine settings.
    pub fn new(registry: Arc<Registry>, config: &Config) -> Arc<Self> {
        Arc::new(Self {
            registry,
            queue: Arc::new(EventQueue::new(
                config.engine.queue_high_water,
                config.engine.queue_low_water,
            )),
            stats: Arc::new(DispatcherStats::default()),
            workers: config.engine.max_in_flight_events.max(1),
            quiescence_window: Duration::from_secs(config.engine.quiescence_window_secs),
        })
    }

    /// The handler registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Snapshot of the dispatch counters.
    pub fn stats(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            enqueued: self.stats.enqueued.load(Ordering::Relaxed),
            dispatched: self.stats.dispatched.load(Ordering::Relaxed),
            handler_errors: self.stats.handler_errors.load(Ordering::Relaxed),
        }
    }

    /// Current queue depth.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Enqueues an event for processing.
    ///
    /// Suspends under backpressure; observes the session done signal and
    /// returns [`EngineError::Cancelled`] once it has fired.
    pub async fn dispatch(&self, event: Event) -> EngineResult<()> {
        let mut done = event.session.done();
        if *done.borrow() {
            return Err(EngineError::Cancelled);
        }

        tokio::select! {
            _ = self.queue.push(event) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("dispatcher_events_enqueued").increment(1);
                metrics::gauge!("dispatcher_queue_depth").set(self.queue.len() as f64);
                Ok(())
            }
            _ = done.wait_for(|d| *d) => Err(EngineError::Cancelled),
        }
    }

    /// Spawns the worker pool and the termination detector for a session.
    ///
    /// Workers exit when the session done signal fires; the detector
    /// fires it once the stream has drained and stayed drained for the
    /// quiescence window.
    pub fn start(self: &Arc<Self>, session: Arc<Session>) -> Vec<JoinHandle<()>> {
        session.mark_running();

        let mut handles = Vec::with_capacity(self.workers + 1);
        for _ in 0..self.workers {
            let dispatcher = self.clone();
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                dispatcher.worker(session).await;
            }));
        }

        let dispatcher = self.clone();
        handles.push(tokio::spawn(async move {
            dispatcher.quiescence_monitor(session).await;
        }));
        handles
    }

    async fn worker(self: Arc<Self>, session: Arc<Session>) {
        let mut done = session.done();
        while let Some(claimed) = self.queue.pop(&mut done).await {
            let (event, claim) = claimed.into_parts();
            self.run_event(event).await;
            self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("dispatcher_events_dispatched").increment(1);
            drop(claim);
        }
    }

    /// Runs one event through its matching handlers, priority group by
    /// priority group.
    async fn run_event(&self, event: Event) {
        if event.meta.suppress {
            return;
        }

        let handlers = self.registry.handlers_for(event.asset.asset.asset_type());
        let mut idx = 0;
        while idx < handlers.len() {
            let priority = handlers[idx].handler.priority;
            let mut group = JoinSet::new();

            while idx < handlers.len() && handlers[idx].handler.priority == priority {
                let registered = handlers[idx].clone();
                let event = event.clone();
                let stats = self.stats.clone();
                idx += 1;

                group.spawn(async move {
                    let mut done = event.session.done();
                    let permit = tokio::select! {
                        permit = registered.gate.clone().acquire_owned() => {
                            match permit {
                                Ok(p) => p,
                                Err(_) => return,
                            }
                        }
                        _ = done.wait_for(|d| *d) => return,
                    };

                    let outcome = tokio::select! {
                        outcome = registered.handler.action.handle(&event) => outcome,
                        _ = done.wait_for(|d| *d) => Err(EngineError::Cancelled),
                    };
                    drop(permit);

                    match outcome {
                        Ok(()) => {}
                        Err(err) if err.is_cancelled() => {
                            debug!(
                                plugin = %registered.handler.plugin,
                                handler = %registered.handler.name,
                                "handler cancelled"
                            );
                        }
                        Err(err) => {
                            stats.handler_errors.fetch_add(1, Ordering::Relaxed);
                            metrics::counter!("dispatcher_handler_errors").increment(1);
                            warn!(
                                plugin = %registered.handler.plugin,
                                handler = %registered.handler.name,
                                error = %err,
                                "handler failed"
                            );
                        }
                    }
                });
            }

            // Barrier: the next priority group starts only after this one
            // has fully returned.
            while group.join_next().await.is_some() {}
        }
    }

    /// Declares quiescence once the queue is empty, no event is being
    /// processed, every handler gate is replenished, and no external I/O
    /// token is held, continuously for the quiescence window.
    async fn quiescence_monitor(self: Arc<Self>, session: Arc<Session>) {
        let mut done = session.done();
        let mut tick = tokio::time::interval(Duration::from_millis(250));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut idle_since: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = done.wait_for(|d| *d) => return,
            }

            let idle = self.queue.is_empty()
                && self.queue.active() == 0
                && session.outstanding_io() == 0
                && self.registry.all_idle();

            if !idle {
                idle_since = None;
                session.mark_running();
                continue;
            }

            if idle_since.is_none() {
                session.mark_draining();
            }
            let since = *idle_since.get_or_insert_with(Instant::now);
            if since.elapsed() >= self.quiescence_window {
                debug!(session = %session.id(), "quiescence reached");
                session.finish();
                return;
            }
        }
    }
}
