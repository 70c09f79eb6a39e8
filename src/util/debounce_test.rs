use super::*;

const DELAY: Duration = Duration::from_millis(100);

#[tokio::test(start_paused = true)]
async fn value_is_not_due_before_delay() {
    let mut debouncer = Debouncer::new(DELAY);
    let start = Instant::now();
    debouncer.schedule("ha", start);
    assert_eq!(debouncer.take_due(start + Duration::from_millis(99)), None);
    assert_eq!(debouncer.take_due(start + DELAY), Some("ha"));
    assert_eq!(debouncer.deadline(), None);
}

#[tokio::test(start_paused = true)]
async fn reschedule_replaces_value_and_pushes_deadline() {
    let mut debouncer = Debouncer::new(DELAY);
    let start = Instant::now();
    debouncer.schedule("h", start);
    debouncer.schedule("ha", start + Duration::from_millis(60));

    assert_eq!(debouncer.deadline(), Some(start + Duration::from_millis(160)));
    assert_eq!(debouncer.take_due(start + DELAY), None);
    assert_eq!(debouncer.take_due(start + Duration::from_millis(160)), Some("ha"));
}

#[tokio::test(start_paused = true)]
async fn sleeping_until_deadline_fires() {
    let mut debouncer = Debouncer::new(DELAY);
    debouncer.schedule(1_u32, Instant::now());
    let Some(deadline) = debouncer.deadline() else {
        panic!("deadline should be set");
    };
    tokio::time::sleep_until(deadline).await;
    assert_eq!(debouncer.take_due(Instant::now()), Some(1));
}
