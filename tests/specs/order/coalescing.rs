//! Order coalescing specs
//!
//! Verify nearby activation requests collapse into one firing, and that a
//! request outside the pending one's window moves it.

use crate::prelude::*;

fn stamping_order(name: &str, stamps: &Journal<Instant>) -> DeferredOrder {
    let stamps = stamps.clone();
    DeferredOrder::new(
        OrderConfig::new(name),
        dispatcher(name),
        Timer::new().unwrap(),
        move |_: &DeferredOrder| -> anyhow::Result<()> {
            stamps.push(Instant::now());
            Ok(())
        },
    )
}

#[tokio::test(start_paused = true)]
async fn requests_a_few_millis_apart_fire_once_at_the_first_time() {
    let stamps = Journal::new();
    let order = stamping_order("nearby", &stamps);
    let t = Instant::now() + ms(100);

    assert!(order.activate_at(t, None));
    assert!(!order.activate_at(t + ms(3), None));

    tokio::time::sleep(ms(500)).await;
    let fired = stamps.entries();
    assert_eq!(fired.len(), 1);
    assert!(fired[0] >= t && fired[0] < t + ms(3), "fired at {:?}", fired[0] - t);
}

#[tokio::test(start_paused = true)]
async fn pending_time_inside_requested_window_absorbs_request() {
    let stamps = Journal::new();
    let order = stamping_order("window", &stamps);
    let t = Instant::now() + ms(200);

    assert!(order.activate_at(t, None));
    assert!(!order.activate_at(t - ms(100), Some(t + ms(100))));
    assert_eq!(order.scheduled_time(), Some(t));

    tokio::time::sleep(ms(500)).await;
    assert_eq!(stamps.entries().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn request_outside_window_moves_the_firing() {
    let stamps = Journal::new();
    let order = stamping_order("moved", &stamps);
    let t = Instant::now() + ms(200);

    assert!(order.activate_at(t, None));
    assert!(order.activate_at(t - ms(150), Some(t - ms(100))));
    assert_eq!(order.scheduled_time(), Some(t - ms(150)));

    tokio::time::sleep(ms(500)).await;
    let fired = stamps.entries();
    assert_eq!(fired.len(), 1);
    assert!(fired[0] < t);
}

#[tokio::test(start_paused = true)]
async fn larger_slack_absorbs_more() {
    let stamps = Journal::new();
    let stamps_in_task = stamps.clone();
    let order = DeferredOrder::new(
        OrderConfig::new("lazy").with_coalesce_slack(ms(50)),
        dispatcher("lazy"),
        Timer::new().unwrap(),
        move |_: &DeferredOrder| -> anyhow::Result<()> {
            stamps_in_task.push(Instant::now());
            Ok(())
        },
    );
    let t = Instant::now() + ms(100);

    assert!(order.activate_at(t, None));
    assert!(!order.activate_at(t + ms(40), None));

    tokio::time::sleep(ms(500)).await;
    assert_eq!(stamps.entries().len(), 1);
}
