//! Heartbeat publication tied to the monitored daemon

use crate::helpers::*;
use builder_boot::coordination::heartbeat::{Heartbeat, HeartbeatConfig};
use builder_boot::coordination::MemoryStore;
use builder_boot::execution::TaskSet;
use std::sync::Arc;
use std::time::Duration;

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_follows_process_lifetime() {
    let store = Arc::new(MemoryStore::new());
    let control = FakeControl::new(&[31]);
    let tasks = TaskSet::new();
    let config = HeartbeatConfig::new("/deis/builder", "10.1.2.3", "8080", Duration::from_secs(20), 31);

    Heartbeat::new(config)
        .publish(store.clone(), control.clone(), &tasks)
        .await
        .unwrap();
    assert_eq!(store.write_count(), 2);
    assert_eq!(store.value("/deis/builder/host").await.as_deref(), Some("10.1.2.3"));
    assert_eq!(store.value("/deis/builder/port").await.as_deref(), Some("8080"));

    // Stay half a second off the tick boundaries
    tokio::time::sleep(Duration::from_millis(500)).await;
    for refreshes in 1..=3 {
        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(store.write_count(), 2 + 2 * refreshes);
    }

    control.die(31);
    tokio::time::sleep(Duration::from_secs(60)).await;
    settle().await;
    assert_eq!(store.write_count(), 8);
    assert_eq!(tasks.running(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_heartbeat_stops_writing() {
    let store = Arc::new(MemoryStore::new());
    let tasks = TaskSet::new();
    let config = HeartbeatConfig::new("/deis/builder", "10.1.2.3", "8080", Duration::from_secs(20), 31)
        .with_interval(Duration::from_secs(1));

    Heartbeat::new(config)
        .publish(store.clone(), FakeControl::new(&[31]), &tasks)
        .await
        .unwrap();

    tasks.cancel_all();
    assert_eq!(tasks.join(Duration::from_secs(1)).await, 0);

    tokio::time::sleep(Duration::from_secs(10)).await;
    settle().await;
    assert_eq!(store.write_count(), 2);
}
