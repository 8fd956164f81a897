//! Dispatcher lifecycle specs
//!
//! Verify demand-started workers retire after a bounded idle period and
//! come back on the next enqueue, while started workers stay up until closed.

use crate::prelude::*;

fn idle_config(name: &str) -> DispatcherConfig {
    DispatcherConfig::new(name)
        .with_idle_wait(Duration::from_secs(1))
        .with_idle_cycle_limit(5)
}

#[tokio::test(start_paused = true)]
async fn demand_worker_retires_after_idle_cycles() {
    let dispatcher = Dispatcher::new(idle_config("retire")).unwrap();
    let journal = Journal::new();
    let start = Instant::now();

    dispatcher.enqueue(journal.event("first"));
    assert!(dispatcher.is_demand_mode());
    dispatcher.terminated().await;

    let idle = Instant::now() - start;
    assert!(idle >= Duration::from_secs(5), "retired after {idle:?}");
    assert!(idle < Duration::from_secs(7), "retired after {idle:?}");
    assert_eq!(journal.entries(), vec!["first"]);
}

#[tokio::test(start_paused = true)]
async fn enqueue_after_retirement_starts_new_worker() {
    let dispatcher = Dispatcher::new(idle_config("revive")).unwrap();
    let journal = Journal::new();

    dispatcher.enqueue(journal.event("before"));
    dispatcher.terminated().await;
    assert_eq!(dispatcher.state(), DispatcherState::Terminated);

    dispatcher.enqueue(journal.event("after"));
    assert_ne!(dispatcher.state(), DispatcherState::Terminated);
    drain(&dispatcher).await;

    assert_eq!(journal.entries(), vec!["before", "after"]);
}

#[tokio::test(start_paused = true)]
async fn started_worker_outlives_idle_period() {
    let dispatcher = Dispatcher::new(idle_config("persistent")).unwrap();
    dispatcher.start().unwrap();
    assert!(!dispatcher.is_demand_mode());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(dispatcher.state(), DispatcherState::WaitingIdle);

    dispatcher.close();
    dispatcher.terminated().await;
    assert_eq!(dispatcher.state(), DispatcherState::Terminated);
}

#[tokio::test]
async fn second_start_is_rejected() {
    let dispatcher = dispatcher("twice");
    dispatcher.start().unwrap();
    assert!(dispatcher.start().is_err());
    dispatcher.close();
}
