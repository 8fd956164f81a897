//! Shared helpers for the behavioral specs

pub use lane_dispatch::{
    async_trait, Dispatcher, DispatcherConfig, DispatcherState, Event, EventHandle, EventState,
    Handler,
};
pub use lane_order::{DeferredOrder, OrderConfig, OrderError, Timer};
pub use std::sync::{Arc, Mutex};
pub use std::time::Duration;
pub use tokio::time::Instant;

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

pub fn dispatcher(name: &str) -> Dispatcher {
    Dispatcher::new(DispatcherConfig::new(name)).unwrap()
}

/// Shared log that events append to when they run
#[derive(Clone)]
pub struct Journal<T>(Arc<Mutex<Vec<T>>>);

impl<T: Clone + Send + Sync + 'static> Journal<T> {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    /// An event that appends `value` when dispatched
    pub fn event(&self, value: T) -> Event {
        Event::new(Append {
            journal: self.clone(),
            value,
        })
    }

    pub fn entries(&self) -> Vec<T> {
        self.0.lock().unwrap().clone()
    }

    pub fn push(&self, value: T) {
        self.0.lock().unwrap().push(value);
    }
}

impl<T: Clone + Send + Sync + 'static> Default for Journal<T> {
    fn default() -> Self {
        Self::new()
    }
}

struct Append<T> {
    journal: Journal<T>,
    value: T,
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Handler for Append<T> {
    async fn handle(&self, _event: &mut Event) -> anyhow::Result<()> {
        self.journal.push(self.value.clone());
        Ok(())
    }
}

/// Enqueue a no-op and wait for it; every earlier event has been handled by then
pub async fn drain(dispatcher: &Dispatcher) {
    let marker = dispatcher.enqueue(Event::new(
        |_: &mut Event| -> anyhow::Result<()> { Ok(()) },
    ));
    marker.released().await;
}
