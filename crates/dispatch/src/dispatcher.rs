// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-worker FIFO dispatcher
//!
//! Producers enqueue from any context; one worker task drains the queue and
//! runs each event's handler to completion before taking the next. The queue
//! and the lifecycle state live behind one mutex, and the worker's idle wait
//! uses a permit-storing [`Notify`], so a wake issued between the worker's
//! empty check and its wait is never lost.

use crate::config::DispatcherConfig;
use crate::error::DispatcherError;
use crate::event::{describe, Event, EventHandle, EventId, EventState, Handler};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt::{self, Write as _};
use std::sync::{Arc, Mutex, TryLockError};
use tokio::runtime::Handle;
use tokio::sync::{watch, Notify};
use uuid::Uuid;

tokio::task_local! {
    /// Dispatcher whose worker is running the current task
    static WORKER: DispatcherId;
}

thread_local! {
    /// Dispatchers whose dump is in progress on this thread
    static DUMPING: RefCell<Vec<DispatcherId>> = const { RefCell::new(Vec::new()) };
}

/// Unique identifier for a dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatcherId(pub Uuid);

impl fmt::Display for DispatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a dispatcher's worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// No worker has ever been created
    Uninitialized,
    /// Worker task spawned, not yet polling
    Started,
    /// Dispatching, or about to poll the queue
    Running,
    /// Queue observed empty, blocked on a bounded wait
    WaitingIdle,
    /// Close requested, worker exits at its next check
    Closing,
    /// Worker exited; a later enqueue starts a new one
    Terminated,
}

impl DispatcherState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatcherState::Uninitialized => "uninitialized",
            DispatcherState::Started => "started",
            DispatcherState::Running => "running",
            DispatcherState::WaitingIdle => "waiting-idle",
            DispatcherState::Closing => "closing",
            DispatcherState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything guarded by the dispatcher mutex
struct Inner {
    queue: VecDeque<Event>,
    /// Generation of the live worker, if any
    worker: Option<u64>,
    generation: u64,
    demand_mode: bool,
    /// Idle waits that ran to their timeout since the last dispatch
    idle_cycles: u32,
    close_requested: bool,
    /// An event arrived after close was requested
    handoff: bool,
}

struct Shared {
    id: DispatcherId,
    config: DispatcherConfig,
    runtime: Handle,
    inner: Mutex<Inner>,
    /// Mirrors the lifecycle state; only written while `inner` is held
    state: watch::Sender<DispatcherState>,
    wake: Notify,
}

/// What the worker does next, decided under the lock
enum Step {
    Dispatch(Event),
    Idle,
    Exit,
}

/// A single-worker, multi-producer event dispatcher
///
/// Cloning is cheap and every clone drives the same queue and worker.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl Dispatcher {
    /// Create a dispatcher whose worker runs on the current tokio runtime
    pub fn new(config: DispatcherConfig) -> Result<Self, DispatcherError> {
        let runtime = Handle::try_current().map_err(|_| DispatcherError::NoRuntime)?;
        Ok(Self::with_runtime(config, runtime))
    }

    /// Create a dispatcher whose worker runs on the given runtime
    ///
    /// Producers may then enqueue from threads outside that runtime.
    pub fn with_runtime(config: DispatcherConfig, runtime: Handle) -> Self {
        let (state, _) = watch::channel(DispatcherState::Uninitialized);
        Self {
            shared: Arc::new(Shared {
                id: DispatcherId(Uuid::new_v4()),
                config,
                runtime,
                inner: Mutex::new(Inner {
                    queue: VecDeque::new(),
                    worker: None,
                    generation: 0,
                    demand_mode: false,
                    idle_cycles: 0,
                    close_requested: false,
                    handoff: false,
                }),
                state,
                wake: Notify::new(),
            }),
        }
    }

    pub fn id(&self) -> DispatcherId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.shared.config
    }

    pub fn state(&self) -> DispatcherState {
        *self.shared.state.borrow()
    }

    /// True if the current worker was created by an enqueue rather than `start`
    pub fn is_demand_mode(&self) -> bool {
        self.shared.lock().demand_mode
    }

    pub fn queue_len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Launch a persistent worker
    ///
    /// A persistent worker only exits on `close`. Starting a dispatcher that
    /// already has a live worker is an error.
    pub fn start(&self) -> Result<(), DispatcherError> {
        let mut inner = self.shared.lock();
        if inner.worker.is_some() {
            return Err(DispatcherError::AlreadyRunning(
                self.shared.config.name.clone(),
            ));
        }
        self.shared.spawn_worker(&mut inner, false);
        Ok(())
    }

    /// Append an event to the queue
    ///
    /// Never blocks. Creates a demand-mode worker if none is alive, and wakes
    /// the worker if it is idle.
    pub fn enqueue(&self, event: Event) -> EventHandle {
        let handle = event.handle();
        let mut inner = self.shared.lock();

        handle.mark(EventState::Queued);
        tracing::trace!(
            dispatcher = %self.shared.config.name,
            event = %handle.id(),
            depth = inner.queue.len() + 1,
            "enqueued"
        );
        inner.queue.push_back(event);

        if inner.worker.is_none() {
            self.shared.spawn_worker(&mut inner, true);
        } else if inner.close_requested {
            // The closing worker hands this event to a successor on exit
            inner.handoff = true;
        } else if self.state() == DispatcherState::WaitingIdle {
            self.shared.wake.notify_one();
        }

        handle
    }

    /// Remove a still-queued event
    ///
    /// Returns false if the worker already took it (or it was never queued
    /// here). Exactly one of cancellation and dispatch wins for any event.
    pub fn cancel(&self, handle: &EventHandle) -> bool {
        let mut inner = self.shared.lock();
        let Some(index) = inner.queue.iter().position(|e| e.id() == handle.id()) else {
            return false;
        };
        if let Some(event) = inner.queue.remove(index) {
            event.mark(EventState::Removed);
        }
        tracing::debug!(
            dispatcher = %self.shared.config.name,
            event = %handle.id(),
            "cancelled"
        );
        true
    }

    /// Ask the worker to exit
    ///
    /// Wakes an idle worker immediately. Events queued before the close stay
    /// queued for the next worker; an event enqueued while the worker is
    /// closing starts that next worker in demand mode. Idempotent.
    pub fn close(&self) {
        let mut inner = self.shared.lock();
        if inner.worker.is_none() || inner.close_requested {
            return;
        }
        inner.close_requested = true;
        self.shared.set_state(DispatcherState::Closing);
        self.shared.wake.notify_one();
        tracing::debug!(dispatcher = %self.shared.config.name, "close requested");
    }

    /// True when called from a handler running on this dispatcher's worker
    pub fn is_worker_context(&self) -> bool {
        WORKER
            .try_with(|id| *id == self.shared.id)
            .unwrap_or(false)
    }

    /// Watch lifecycle transitions
    pub fn subscribe_state(&self) -> watch::Receiver<DispatcherState> {
        self.shared.state.subscribe()
    }

    /// Wait until the worker has terminated
    pub async fn terminated(&self) {
        let mut rx = self.subscribe_state();
        let _ = rx
            .wait_for(|state| *state == DispatcherState::Terminated)
            .await;
    }

    /// Human-readable snapshot: identity, state, and the head of the queue
    ///
    /// Never blocks. Reports the dispatcher as busy if its lock is held, and
    /// refuses to recurse if an event description dumps a dispatcher again.
    pub fn dump(&self) -> String {
        let name = &self.shared.config.name;
        let id = self.shared.id;
        let entered = DUMPING.with(|dumping| {
            let mut dumping = dumping.borrow_mut();
            if dumping.contains(&id) {
                return false;
            }
            dumping.push(id);
            true
        });
        if !entered {
            return format!("Dispatcher[{name}] <recursive>");
        }
        let _reset = DumpGuard(id);

        let (depth, demand_mode, head) = match self.shared.inner.try_lock() {
            Ok(inner) => snapshot(&inner, self.shared.config.dump_limit),
            Err(TryLockError::Poisoned(poisoned)) => {
                snapshot(&poisoned.into_inner(), self.shared.config.dump_limit)
            }
            Err(TryLockError::WouldBlock) => {
                return format!("Dispatcher[{name}] state={} <busy>", self.state());
            }
        };

        let mut out = String::new();
        let _ = writeln!(
            out,
            "Dispatcher[{name}] id={} state={} demand={} queued={}",
            self.shared.id,
            self.state(),
            demand_mode,
            depth
        );
        for (id, label, handler) in &head {
            let _ = writeln!(out, "  {id} {}", describe(label.as_deref(), handler.as_ref()));
        }
        if depth > head.len() {
            let _ = writeln!(out, "  ... and {} more", depth - head.len());
        }
        out
    }
}

type Snapshot = (usize, bool, Vec<(EventId, Option<String>, Arc<dyn Handler>)>);

fn snapshot(inner: &Inner, limit: usize) -> Snapshot {
    let head = inner.queue.iter().take(limit).map(Event::snapshot).collect();
    (inner.queue.len(), inner.demand_mode, head)
}

struct DumpGuard(DispatcherId);

impl Drop for DumpGuard {
    fn drop(&mut self) {
        DUMPING.with(|dumping| dumping.borrow_mut().retain(|id| *id != self.0));
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("id", &self.shared.id)
            .field("name", &self.shared.config.name)
            .field("state", &self.state())
            .finish()
    }
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Caller must hold the `inner` lock
    fn set_state(&self, state: DispatcherState) {
        self.state.send_replace(state);
    }

    /// Caller must hold the `inner` lock
    fn spawn_worker(self: &Arc<Self>, inner: &mut Inner, demand_mode: bool) {
        inner.generation += 1;
        inner.worker = Some(inner.generation);
        inner.demand_mode = demand_mode;
        inner.idle_cycles = 0;
        inner.close_requested = false;
        inner.handoff = false;
        self.set_state(DispatcherState::Started);

        tracing::info!(
            dispatcher = %self.config.name,
            generation = inner.generation,
            demand_mode,
            "starting worker"
        );

        let shared = Arc::clone(self);
        let generation = inner.generation;
        self.runtime
            .spawn(WORKER.scope(self.id, run_worker(shared, generation)));
    }

    /// Caller must hold the `inner` lock
    ///
    /// Marks the worker gone. Events enqueued during the close get a new
    /// demand-mode worker.
    fn retire(self: &Arc<Self>, inner: &mut Inner) {
        inner.worker = None;
        self.set_state(DispatcherState::Terminated);

        if inner.handoff && !inner.queue.is_empty() {
            tracing::debug!(
                dispatcher = %self.config.name,
                queued = inner.queue.len(),
                "events arrived while closing"
            );
            self.spawn_worker(inner, true);
        }
    }

    /// Decide the worker's next step
    fn next_step(self: &Arc<Self>, generation: u64) -> Step {
        let mut inner = self.lock();

        if inner.worker != Some(generation) {
            // Superseded after a crash recovery; nothing left to do here
            return Step::Exit;
        }

        if inner.close_requested {
            self.retire(&mut inner);
            return Step::Exit;
        }

        if let Some(event) = inner.queue.pop_front() {
            inner.idle_cycles = 0;
            self.set_state(DispatcherState::Running);
            return Step::Dispatch(event);
        }

        if inner.demand_mode && inner.idle_cycles >= self.config.idle_cycle_limit {
            inner.worker = None;
            self.set_state(DispatcherState::Terminated);
            tracing::debug!(
                dispatcher = %self.config.name,
                idle_cycles = inner.idle_cycles,
                "idle limit reached"
            );
            return Step::Exit;
        }

        self.set_state(DispatcherState::WaitingIdle);
        Step::Idle
    }

    /// An idle wait ran to its timeout without a wake
    ///
    /// Wakes that find nothing to do (a leftover permit, a close) do not count.
    fn idle_timed_out(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.worker == Some(generation) && inner.demand_mode {
            inner.idle_cycles += 1;
        }
    }

    async fn dispatch(&self, event: Event) {
        let id = event.id();
        let handle = event.handle();
        let handler = event.handler();
        handle.mark(EventState::Dequeued);

        tracing::trace!(dispatcher = %self.config.name, event = %id, "dispatching");

        // Handler runs in its own task so a panic is contained to this event
        let task = tokio::spawn(WORKER.scope(self.id, async move {
            let mut event = event;
            handler.dequeued(&event);
            let result = handler.handle(&mut event).await;
            (event.is_retained(), result)
        }));

        let retained = match task.await {
            Ok((retained, Ok(()))) => retained,
            Ok((retained, Err(e))) => {
                tracing::warn!(
                    dispatcher = %self.config.name,
                    event = %id,
                    error = %e,
                    "handler failed"
                );
                retained
            }
            Err(e) if e.is_panic() => {
                tracing::error!(
                    dispatcher = %self.config.name,
                    event = %id,
                    "handler panicked"
                );
                false
            }
            Err(e) => {
                tracing::error!(
                    dispatcher = %self.config.name,
                    event = %id,
                    error = %e,
                    "handler task aborted"
                );
                false
            }
        };

        handle.mark(EventState::Applied);
        if !retained {
            handle.release();
        }
    }
}

async fn run_worker(shared: Arc<Shared>, generation: u64) {
    let _guard = WorkerGuard {
        shared: Arc::clone(&shared),
        generation,
    };

    loop {
        match shared.next_step(generation) {
            Step::Dispatch(event) => shared.dispatch(event).await,
            Step::Idle => {
                let timed_out = tokio::select! {
                    _ = shared.wake.notified() => false,
                    _ = tokio::time::sleep(shared.config.idle_wait) => true,
                };
                if timed_out {
                    shared.idle_timed_out(generation);
                }
            }
            Step::Exit => break,
        }
    }

    tracing::info!(
        dispatcher = %shared.config.name,
        generation,
        "worker terminated"
    );
}

/// Keeps the dispatcher alive if its own loop panics
///
/// On unwind the dead worker is replaced, so queued and future events are
/// still dispatched.
struct WorkerGuard {
    shared: Arc<Shared>,
    generation: u64,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return;
        }
        tracing::error!(
            dispatcher = %self.shared.config.name,
            generation = self.generation,
            "worker loop panicked, restarting"
        );

        let mut inner = self.shared.lock();
        if inner.worker != Some(self.generation) {
            return;
        }
        if inner.close_requested {
            self.shared.retire(&mut inner);
            return;
        }
        let demand_mode = inner.demand_mode;
        self.shared.spawn_worker(&mut inner, demand_mode);
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
