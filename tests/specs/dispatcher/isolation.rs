//! Dispatcher failure isolation specs
//!
//! Verify a failing or panicking handler only affects its own event.

use crate::prelude::*;

#[tokio::test]
async fn failing_and_panicking_handlers_do_not_stop_the_queue() {
    let dispatcher = dispatcher("isolation");
    let journal = Journal::new();

    dispatcher.enqueue(journal.event("before"));
    let failed = dispatcher.enqueue(Event::new(|_: &mut Event| -> anyhow::Result<()> {
        anyhow::bail!("handler refused")
    }));
    let panicked = dispatcher.enqueue(Event::new(|_: &mut Event| -> anyhow::Result<()> {
        panic!("handler blew up")
    }));
    dispatcher.enqueue(journal.event("after"));

    drain(&dispatcher).await;
    assert_eq!(journal.entries(), vec!["before", "after"]);
    assert!(failed.is_released());
    assert!(panicked.is_released());
    assert_eq!(panicked.state(), EventState::Applied);
    assert_ne!(dispatcher.state(), DispatcherState::Terminated);
}
