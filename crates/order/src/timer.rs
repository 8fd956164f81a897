// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timing facility for deferred orders
//!
//! One background task sleeps until the earliest registered deadline, then
//! notifies each due target. Targets are expected to hand the work to a
//! dispatcher rather than doing it on the timer task.

use crate::error::OrderError;
use crate::order::OrderId;
use crate::timer_queue::TimerQueue;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Something the timer calls back once its deadline has passed
pub trait TimerTarget: Send + Sync + 'static {
    /// Runs on the timer task; must not block
    fn elapsed(&self);
}

struct Registry {
    deadlines: TimerQueue<OrderId>,
    targets: HashMap<OrderId, Arc<dyn TimerTarget>>,
}

struct TimerShared {
    registry: Mutex<Registry>,
    wake: Notify,
    stopped: AtomicBool,
}

impl TimerShared {
    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }
}

/// Stops the driver once the last `Timer` handle is gone
struct DriverStop(Arc<TimerShared>);

impl Drop for DriverStop {
    fn drop(&mut self) {
        self.0.stop();
    }
}

/// Deadline-driven timer shared by any number of orders
///
/// The driver task runs until [`Timer::shutdown`] or until every clone has
/// been dropped. A registered order holds its timer, so pending entries keep
/// the driver alive until they fire or are cancelled.
#[derive(Clone)]
pub struct Timer {
    shared: Arc<TimerShared>,
    _stop: Arc<DriverStop>,
}

impl Timer {
    /// Start a timer on the current tokio runtime
    pub fn new() -> Result<Self, OrderError> {
        let runtime = Handle::try_current().map_err(|_| OrderError::NoRuntime)?;
        Ok(Self::with_runtime(&runtime))
    }

    /// Start a timer whose driver task runs on `runtime`
    pub fn with_runtime(runtime: &Handle) -> Self {
        let shared = Arc::new(TimerShared {
            registry: Mutex::new(Registry {
                deadlines: TimerQueue::new(),
                targets: HashMap::new(),
            }),
            wake: Notify::new(),
            stopped: AtomicBool::new(false),
        });
        runtime.spawn(drive(Arc::clone(&shared)));
        Self {
            _stop: Arc::new(DriverStop(Arc::clone(&shared))),
            shared,
        }
    }

    /// Register `target` to be notified at `at`, replacing any pending entry for `key`
    pub fn schedule(&self, key: OrderId, at: Instant, target: Arc<dyn TimerTarget>) {
        if self.shared.stopped.load(Ordering::SeqCst) {
            tracing::debug!(order = %key, "timer stopped, entry dropped");
            return;
        }
        let mut registry = self.shared.lock();
        let earliest = registry.deadlines.next_fire_time();
        registry.deadlines.schedule(key, at);
        registry.targets.insert(key, target);

        // Only an earlier deadline changes how long the driver should sleep
        if earliest.map_or(true, |earliest| at < earliest) {
            self.shared.wake.notify_one();
        }
    }

    /// Drop the pending entry for `key`; returns whether one existed
    pub fn cancel(&self, key: OrderId) -> bool {
        let mut registry = self.shared.lock();
        registry.targets.remove(&key);
        registry.deadlines.cancel(&key)
    }

    /// Deadline currently registered for `key`
    pub fn deadline(&self, key: OrderId) -> Option<Instant> {
        self.shared.lock().deadlines.fire_time(&key)
    }

    /// Number of pending entries
    pub fn pending(&self) -> usize {
        self.shared.lock().deadlines.len()
    }

    /// Stop the driver task; pending entries never fire
    pub fn shutdown(&self) {
        self.shared.stop();
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("pending", &self.pending())
            .field("stopped", &self.shared.stopped.load(Ordering::SeqCst))
            .finish()
    }
}

async fn drive(shared: Arc<TimerShared>) {
    tracing::debug!("timer started");

    while !shared.stopped.load(Ordering::SeqCst) {
        let (due, next) = {
            let mut registry = shared.lock();
            let keys = registry.deadlines.poll(Instant::now());
            let due: Vec<_> = keys
                .iter()
                .filter_map(|key| registry.targets.remove(key))
                .collect();
            (due, registry.deadlines.next_fire_time())
        };

        // Outside the lock: targets may re-register themselves
        for target in due {
            target.elapsed();
        }

        match next {
            Some(deadline) => {
                tokio::select! {
                    _ = shared.wake.notified() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => shared.wake.notified().await,
        }
    }

    // Targets hold their orders; release them now that nothing will fire
    let abandoned = {
        let mut registry = shared.lock();
        registry.deadlines = TimerQueue::new();
        std::mem::take(&mut registry.targets)
    };
    tracing::debug!(abandoned = abandoned.len(), "timer stopped");
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
