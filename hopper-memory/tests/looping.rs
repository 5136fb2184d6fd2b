use std::sync::Arc;
use std::time::Duration as StdDuration;

use hopper_core::testing::SpyProcessor;
use hopper_core::{Driver, Duration, TimeoutLooper};
use hopper_memory::MemoryDriver;
use serde_json::json;

async fn wait_for_calls(spy: &SpyProcessor, calls: usize) {
    tokio::time::timeout(StdDuration::from_secs(5), async {
        while spy.calls() < calls {
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
    })
    .await
    .expect("processor was not called in time");
}

#[tokio::test]
async fn timeout_looper_processes_jobs_in_the_background() {
    let driver = MemoryDriver::new().with_looper(TimeoutLooper::new(Duration::milliseconds(5)));
    let queue = driver.create_queue("background").await.unwrap();
    let spy = SpyProcessor::new();
    queue.set_processor(Arc::new(spy.clone()));

    queue.start_processing().await.unwrap();
    let first = queue.create_job(json!({ "n": 1 })).save(queue.as_ref()).await.unwrap();
    let second = queue.create_job(json!({ "n": 2 })).save(queue.as_ref()).await.unwrap();
    wait_for_calls(&spy, 2).await;
    queue.stop_processing().await;

    for id in [first.id, second.id] {
        let job = queue.read_job(&id).await.unwrap().unwrap();
        assert!(job.is_completed());
    }
}

#[tokio::test]
async fn stopping_drains_in_flight_jobs() {
    let driver = MemoryDriver::new();
    let queue = driver.create_queue("drain").await.unwrap();
    let spy = SpyProcessor::with_delay(Duration::milliseconds(50));
    queue.set_processor(Arc::new(spy.clone()));

    let built = queue.create_job(json!({})).save(queue.as_ref()).await.unwrap();
    queue.start_processing().await.unwrap();
    wait_for_calls(&spy, 1).await;

    assert!(queue.read_job(&built.id).await.unwrap().unwrap().is_processing());
    queue.stop_processing().await;
    assert!(queue.read_job(&built.id).await.unwrap().unwrap().is_completed());
}

#[tokio::test]
async fn stopped_queue_claims_nothing() {
    let driver = MemoryDriver::new().with_looper(TimeoutLooper::new(Duration::milliseconds(5)));
    let queue = driver.create_queue("stopped").await.unwrap();
    let spy = SpyProcessor::new();
    queue.set_processor(Arc::new(spy.clone()));

    queue.start_processing().await.unwrap();
    queue.stop_processing().await;

    let built = queue.create_job(json!({})).save(queue.as_ref()).await.unwrap();
    tokio::time::sleep(StdDuration::from_millis(40)).await;

    assert_eq!(spy.calls(), 0);
    assert!(queue.read_job(&built.id).await.unwrap().unwrap().is_waiting());
}
