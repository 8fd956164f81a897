//! Dispatcher cancellation specs
//!
//! Verify a queued event can be withdrawn, and that cancellation and
//! dispatch never both win for the same event.

use crate::prelude::*;
use tokio::sync::Notify;

/// Holds the worker until notified
struct Gate(Arc<Notify>);

#[async_trait]
impl Handler for Gate {
    async fn handle(&self, _event: &mut Event) -> anyhow::Result<()> {
        self.0.notified().await;
        Ok(())
    }
}

#[tokio::test]
async fn queued_event_can_be_withdrawn() {
    let dispatcher = dispatcher("withdraw");
    let journal = Journal::new();
    let gate = Arc::new(Notify::new());

    let blocker = dispatcher.enqueue(Event::new(Gate(Arc::clone(&gate))));
    blocker.reached(EventState::Dequeued).await;

    let doomed = dispatcher.enqueue(journal.event("doomed"));
    dispatcher.enqueue(journal.event("kept"));

    assert!(dispatcher.cancel(&doomed));
    assert!(!dispatcher.cancel(&doomed));
    assert_eq!(doomed.state(), EventState::Removed);

    gate.notify_one();
    drain(&dispatcher).await;
    assert_eq!(journal.entries(), vec!["kept"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_and_dispatch_race_has_one_winner() {
    let dispatcher = dispatcher("race");

    for round in 0..200 {
        let journal = Journal::new();
        let handle = dispatcher.enqueue(journal.event(round));

        let canceller = {
            let dispatcher = dispatcher.clone();
            let handle = handle.clone();
            tokio::spawn(async move { dispatcher.cancel(&handle) })
        };
        let cancelled = canceller.await.unwrap();

        drain(&dispatcher).await;
        let ran = journal.entries() == vec![round];
        assert_ne!(cancelled, ran, "round {round}: cancelled={cancelled} ran={ran}");
        if cancelled {
            assert_eq!(handle.state(), EventState::Removed);
        } else {
            assert!(handle.is_released());
        }
    }
}
