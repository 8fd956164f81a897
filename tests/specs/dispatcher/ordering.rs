//! Dispatcher ordering specs
//!
//! Verify events run one at a time in the order they were enqueued, no
//! matter how many producers feed the queue.

use crate::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn events_from_many_producers_run_in_enqueue_order() {
    let dispatcher = dispatcher("fifo");
    let journal = Journal::new();
    let enqueued = Arc::new(Mutex::new(Vec::new()));

    let producers: Vec<_> = (0..4)
        .map(|producer| {
            let dispatcher = dispatcher.clone();
            let journal = journal.clone();
            let enqueued = Arc::clone(&enqueued);
            tokio::spawn(async move {
                for seq in 0..100 {
                    let mut order = enqueued.lock().unwrap();
                    dispatcher.enqueue(journal.event((producer, seq)));
                    order.push((producer, seq));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.unwrap();
    }

    drain(&dispatcher).await;
    let entries = journal.entries();
    assert_eq!(entries.len(), 400);
    assert_eq!(entries, *enqueued.lock().unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn handlers_never_overlap() {
    let dispatcher = dispatcher("serial");
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    struct Probe {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Handler for Probe {
        async fn handle(&self, _event: &mut Event) -> anyhow::Result<()> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let dispatcher = dispatcher.clone();
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            std::thread::spawn(move || {
                for _ in 0..25 {
                    dispatcher.enqueue(Event::new(Probe {
                        active: Arc::clone(&active),
                        peak: Arc::clone(&peak),
                    }));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    drain(&dispatcher).await;
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}
