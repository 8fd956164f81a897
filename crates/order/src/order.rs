// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deferred orders: reusable jobs with a coalesced firing time
//!
//! An order is armed with [`DeferredOrder::activate_at`]. When the timer
//! reports the deadline, the order enqueues a firing on its dispatcher and
//! the worker runs [`DeferredOrder::execute`]. Execution clears the schedule
//! before the payload runs, so the payload may re-arm its own order.
//!
//! Every arm bumps a generation number. A firing carries the generation it
//! was queued for, which lets a firing that was overtaken by a re-arm run
//! without wiping out the newer request.

use crate::config::OrderConfig;
use crate::error::OrderError;
use crate::timer::{Timer, TimerTarget};
use async_trait::async_trait;
use lane_dispatch::{Dispatcher, Event, EventHandle, Handler};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

/// Unique identifier for an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderId(pub Uuid);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The payload an order runs each time it fires
#[async_trait]
pub trait OrderTask: Send + Sync + 'static {
    async fn run(&self, order: &DeferredOrder) -> anyhow::Result<()>;
}

#[async_trait]
impl<F> OrderTask for F
where
    F: Fn(&DeferredOrder) -> anyhow::Result<()> + Send + Sync + 'static,
{
    async fn run(&self, order: &DeferredOrder) -> anyhow::Result<()> {
        self(order)
    }
}

/// A firing that has been handed to the dispatcher
struct Queued {
    handle: EventHandle,
    generation: u64,
}

#[derive(Default)]
struct Schedule {
    time: Option<Instant>,
    latest: Option<Instant>,
    generation: u64,
    queued: Option<Queued>,
    /// Generation of a firing withdrawn after the worker had already taken it
    withdrawn: Option<u64>,
}

struct OrderShared {
    id: OrderId,
    config: OrderConfig,
    dispatcher: Dispatcher,
    timer: Timer,
    task: Arc<dyn OrderTask>,
    schedule: Mutex<Schedule>,
    /// Executions over the order's whole life
    total: AtomicU64,
    /// Executions since a caller last reset the count
    completed: watch::Sender<u64>,
    waiters: AtomicUsize,
}

/// A reusable job executed on one dispatcher at a requested time
///
/// Cloning is cheap and every clone refers to the same order.
#[derive(Clone)]
pub struct DeferredOrder {
    shared: Arc<OrderShared>,
}

impl DeferredOrder {
    pub fn new(
        config: OrderConfig,
        dispatcher: Dispatcher,
        timer: Timer,
        task: impl OrderTask,
    ) -> Self {
        let (completed, _) = watch::channel(0);
        Self {
            shared: Arc::new(OrderShared {
                id: OrderId(Uuid::new_v4()),
                config,
                dispatcher,
                timer,
                task: Arc::new(task),
                schedule: Mutex::new(Schedule::default()),
                total: AtomicU64::new(0),
                completed,
                waiters: AtomicUsize::new(0),
            }),
        }
    }

    pub fn id(&self) -> OrderId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.shared.dispatcher
    }

    /// Earliest acceptable firing time of the pending request
    pub fn scheduled_time(&self) -> Option<Instant> {
        self.lock().time
    }

    /// Latest acceptable firing time of the pending request, if one was given
    pub fn scheduled_time_latest(&self) -> Option<Instant> {
        self.lock().latest
    }

    pub fn is_scheduled(&self) -> bool {
        self.lock().time.is_some()
    }

    /// Request execution no earlier than `time`
    ///
    /// A pending request already inside `[time, latest]` (or, without
    /// `latest`, within the configured slack of `time`) absorbs this one.
    /// Returns false when the request was coalesced.
    pub fn activate_at(&self, time: Instant, latest: Option<Instant>) -> bool {
        let mut schedule = self.lock();

        if let Some(pending) = schedule.time {
            if coalesces(pending, time, latest, self.shared.config.coalesce_slack) {
                tracing::trace!(order = %self.shared.config.name, "activation coalesced");
                return false;
            }
        }

        schedule.time = Some(time);
        schedule.latest = latest;
        schedule.generation += 1;
        self.shared.timer.schedule(
            self.shared.id,
            time,
            Arc::new(Trigger {
                order: self.clone(),
                generation: schedule.generation,
            }),
        );

        tracing::debug!(
            order = %self.shared.config.name,
            generation = schedule.generation,
            "activated"
        );
        true
    }

    /// Request execution once `delay` has passed
    pub fn activate_after(&self, delay: Duration) -> bool {
        self.activate_at(Instant::now() + delay, None)
    }

    /// Withdraw the pending request, including a firing already queued
    ///
    /// A firing the worker has taken but not yet started is skipped. One whose
    /// payload is already running finishes. Returns whether anything was
    /// pending. Idempotent.
    pub fn cancel(&self) -> bool {
        let mut schedule = self.lock();
        let was_scheduled = schedule.time.take().is_some();
        schedule.latest = None;
        schedule.generation += 1;
        self.shared.timer.cancel(self.shared.id);
        self.withdraw_queued(&mut schedule);

        if was_scheduled {
            tracing::debug!(order = %self.shared.config.name, "cancelled");
        }
        was_scheduled
    }

    /// Run the payload now
    ///
    /// Clears the pending request (and withdraws it from the timer) before the
    /// payload runs. Meant to be called from the order's dispatcher worker.
    pub async fn execute(&self) {
        {
            let mut schedule = self.lock();
            schedule.time = None;
            schedule.latest = None;
            schedule.generation += 1;
            self.shared.timer.cancel(self.shared.id);
            self.withdraw_queued(&mut schedule);
        }
        self.run_task().await;
    }

    /// Executions since the last reset; `reset_to` atomically replaces the count
    pub fn completed_count(&self, reset_to: Option<u64>) -> u64 {
        match reset_to {
            Some(value) => self.shared.completed.send_replace(value),
            None => *self.shared.completed.borrow(),
        }
    }

    /// Executions over the order's whole life
    pub fn total_completed(&self) -> u64 {
        self.shared.total.load(Ordering::SeqCst)
    }

    pub fn is_waiter_pending(&self) -> bool {
        self.shared.waiters.load(Ordering::SeqCst) > 0
    }

    /// Wait until the resettable count reaches `target`
    ///
    /// `None` waits indefinitely. Returns whether the target was reached.
    /// Waiting on the order's own dispatcher worker would deadlock it, so that
    /// is refused.
    pub async fn await_execution(
        &self,
        target: u64,
        timeout: Option<Duration>,
    ) -> Result<bool, OrderError> {
        if self.shared.dispatcher.is_worker_context() {
            return Err(OrderError::WorkerContext(self.shared.config.name.clone()));
        }

        let mut rx = self.shared.completed.subscribe();
        let _waiting = Waiting::enter(&self.shared.waiters);
        let reached = rx.wait_for(|count| *count >= target);

        let reached = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, reached)
                .await
                .map(|result| result.is_ok())
                .unwrap_or(false),
            None => reached.await.is_ok(),
        };
        Ok(reached)
    }

    /// The timer reported the deadline of arm `generation`: queue a firing for it
    fn elapsed(&self, generation: u64) {
        let mut schedule = self.lock();
        // Superseded since the timer took the entry
        if schedule.time.is_none() || schedule.generation != generation {
            return;
        }

        if let Some(queued) = schedule.queued.take() {
            if queued.generation == generation {
                schedule.queued = Some(queued);
                return;
            }
            // Overtaken by a re-arm; if it has not started yet, this firing replaces it
            self.shared.dispatcher.cancel(&queued.handle);
        }

        let event = Event::new(Fire {
            order: self.clone(),
            generation,
        })
        .with_label(format!("fire {}", self.shared.config.name));
        let handle = self.shared.dispatcher.enqueue(event);
        schedule.queued = Some(Queued { handle, generation });
    }

    /// Caller holds the schedule lock
    fn withdraw_queued(&self, schedule: &mut Schedule) {
        if let Some(queued) = schedule.queued.take() {
            if !self.shared.dispatcher.cancel(&queued.handle) {
                // Already dequeued; `fire` checks this before running
                schedule.withdrawn = Some(queued.generation);
            }
        }
    }

    /// Execute on behalf of a queued firing
    async fn fire(&self, generation: u64) {
        {
            let mut schedule = self.lock();
            if schedule.withdrawn == Some(generation) {
                schedule.withdrawn = None;
                tracing::trace!(order = %self.shared.config.name, "firing withdrawn");
                return;
            }
            if schedule
                .queued
                .as_ref()
                .is_some_and(|queued| queued.generation == generation)
            {
                schedule.queued = None;
            }
            if schedule.generation == generation {
                schedule.time = None;
                schedule.latest = None;
            }
        }
        self.run_task().await;
    }

    async fn run_task(&self) {
        let _completion = Completion {
            shared: &self.shared,
        };

        tracing::trace!(order = %self.shared.config.name, "executing");
        if let Err(e) = self.shared.task.run(self).await {
            tracing::warn!(
                order = %self.shared.config.name,
                error = %e,
                "order task failed"
            );
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Schedule> {
        self.shared
            .schedule
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for DeferredOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredOrder")
            .field("id", &self.shared.id)
            .field("name", &self.shared.config.name)
            .field("scheduled_time", &self.scheduled_time())
            .field("total_completed", &self.total_completed())
            .finish()
    }
}

/// Whether a pending firing at `pending` already satisfies a new request
pub(crate) fn coalesces(
    pending: Instant,
    time: Instant,
    latest: Option<Instant>,
    slack: Duration,
) -> bool {
    match latest {
        Some(latest) => pending >= time && pending <= latest,
        None => {
            let distance = if pending >= time {
                pending - time
            } else {
                time - pending
            };
            distance <= slack
        }
    }
}

/// Counts an execution even if the payload panics
struct Completion<'a> {
    shared: &'a OrderShared,
}

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        self.shared.total.fetch_add(1, Ordering::SeqCst);
        self.shared.completed.send_modify(|count| *count += 1);
    }
}

struct Waiting<'a>(&'a AtomicUsize);

impl<'a> Waiting<'a> {
    fn enter(waiters: &'a AtomicUsize) -> Self {
        waiters.fetch_add(1, Ordering::SeqCst);
        Self(waiters)
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Trigger {
    order: DeferredOrder,
    generation: u64,
}

impl TimerTarget for Trigger {
    fn elapsed(&self) {
        self.order.elapsed(self.generation);
    }
}

struct Fire {
    order: DeferredOrder,
    generation: u64,
}

#[async_trait]
impl Handler for Fire {
    async fn handle(&self, _event: &mut Event) -> anyhow::Result<()> {
        self.order.fire(self.generation).await;
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "fire {} (generation {})",
            self.order.name(),
            self.generation
        )
    }
}

#[cfg(test)]
#[path = "order_tests.rs"]
mod tests;
