// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events and the handlers they are delivered to
//!
//! An [`Event`] is owned by exactly one party at a time: the producer that
//! built it, the dispatcher queue it was enqueued on, or the worker that is
//! dispatching it. Producers keep an [`EventHandle`] to follow the lifecycle
//! after giving the event away.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Unique identifier for an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle tag of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    /// Built by a producer, not yet enqueued
    Created,
    /// Owned by a dispatcher queue
    Queued,
    /// Taken by the worker, handler not yet finished
    Dequeued,
    /// Handler returned (successfully or not)
    Applied,
    /// Cancelled while still queued
    Removed,
}

impl EventState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventState::Created => "created",
            EventState::Queued => "queued",
            EventState::Dequeued => "dequeued",
            EventState::Applied => "applied",
            EventState::Removed => "removed",
        }
    }
}

impl fmt::Display for EventState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination of an event
///
/// Handlers run on the dispatcher's worker, one at a time. An `Err` (or a
/// panic) is logged by the dispatcher and never stops it.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, event: &mut Event) -> anyhow::Result<()>;

    /// Called by the worker right after the event leaves the queue
    fn dequeued(&self, _event: &Event) {}

    /// Human-readable description used by diagnostics
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

#[async_trait]
impl<F> Handler for F
where
    F: Fn(&mut Event) -> anyhow::Result<()> + Send + Sync + 'static,
{
    async fn handle(&self, event: &mut Event) -> anyhow::Result<()> {
        self(event)
    }

    fn describe(&self) -> String {
        "fn handler".to_string()
    }
}

#[derive(Debug, Clone, Copy)]
struct Lifecycle {
    state: EventState,
    released: bool,
}

/// Shared lifecycle cell, written by the dispatcher and read by handles
struct EventCell {
    id: EventId,
    lifecycle: watch::Sender<Lifecycle>,
}

impl EventCell {
    fn new() -> Self {
        let (lifecycle, _) = watch::channel(Lifecycle {
            state: EventState::Created,
            released: false,
        });
        Self {
            id: EventId::new(),
            lifecycle,
        }
    }

    fn state(&self) -> EventState {
        self.lifecycle.borrow().state
    }
}

/// A unit of work bound to a destination handler
pub struct Event {
    cell: Arc<EventCell>,
    handler: Arc<dyn Handler>,
    label: Option<String>,
    retained: bool,
}

impl Event {
    pub fn new(handler: impl Handler) -> Self {
        Self::from_arc(Arc::new(handler))
    }

    /// Build an event for a handler shared with other events
    pub fn from_arc(handler: Arc<dyn Handler>) -> Self {
        Self {
            cell: Arc::new(EventCell::new()),
            handler,
            label: None,
            retained: false,
        }
    }

    /// Attach a label shown by diagnostics instead of the handler description
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn id(&self) -> EventId {
        self.cell.id
    }

    pub fn state(&self) -> EventState {
        self.cell.state()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// A handle that follows this event's lifecycle
    pub fn handle(&self) -> EventHandle {
        EventHandle {
            cell: Arc::clone(&self.cell),
        }
    }

    /// Opt out of release after the handler returns
    ///
    /// Handles of a retained event never observe a release.
    pub fn retain(&mut self) {
        self.retained = true;
    }

    pub fn is_retained(&self) -> bool {
        self.retained
    }

    /// Hand this event's work over to a fresh event
    ///
    /// The returned event shares the handler and label but has its own id and
    /// lifecycle, so it can be enqueued again (here or on another dispatcher)
    /// while this one finishes. This event is retained.
    pub fn forward(&mut self) -> Event {
        self.retained = true;
        Event {
            cell: Arc::new(EventCell::new()),
            handler: Arc::clone(&self.handler),
            label: self.label.clone(),
            retained: false,
        }
    }

    /// Label if set, otherwise the handler's own description
    pub fn describe(&self) -> String {
        describe(self.label.as_deref(), self.handler.as_ref())
    }

    pub(crate) fn handler(&self) -> Arc<dyn Handler> {
        Arc::clone(&self.handler)
    }

    pub(crate) fn snapshot(&self) -> (EventId, Option<String>, Arc<dyn Handler>) {
        (self.id(), self.label.clone(), self.handler())
    }

    pub(crate) fn mark(&self, state: EventState) {
        self.handle().mark(state);
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("label", &self.label)
            .field("retained", &self.retained)
            .finish()
    }
}

pub(crate) fn describe(label: Option<&str>, handler: &dyn Handler) -> String {
    match label {
        Some(label) => label.to_string(),
        None => handler.describe(),
    }
}

/// Producer-side view of an event's lifecycle
#[derive(Clone)]
pub struct EventHandle {
    cell: Arc<EventCell>,
}

impl EventHandle {
    pub fn id(&self) -> EventId {
        self.cell.id
    }

    pub fn state(&self) -> EventState {
        self.cell.state()
    }

    /// True once the worker finished with the event and did not retain it
    pub fn is_released(&self) -> bool {
        self.cell.lifecycle.borrow().released
    }

    /// Wait until the event is released and can be reused
    pub async fn released(&self) {
        let mut rx = self.cell.lifecycle.subscribe();
        // The cell owns the sender, so the channel cannot close while we wait
        let _ = rx.wait_for(|lifecycle| lifecycle.released).await;
    }

    /// Wait until the event reaches `state`
    pub async fn reached(&self, state: EventState) {
        let mut rx = self.cell.lifecycle.subscribe();
        let _ = rx.wait_for(|lifecycle| lifecycle.state == state).await;
    }

    pub(crate) fn mark(&self, state: EventState) {
        self.cell.lifecycle.send_modify(|lifecycle| {
            lifecycle.state = state;
            if state == EventState::Queued {
                lifecycle.released = false;
            }
        });
    }

    pub(crate) fn release(&self) {
        self.cell
            .lifecycle
            .send_modify(|lifecycle| lifecycle.released = true);
    }
}

impl fmt::Debug for EventHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandle")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
