//! Integration tests against a real Redis instance.
//!
//! These tests need a reachable broker and are skipped by default.
//! Run with: REDIS_URL=redis://localhost:6379 cargo test --test redis_integration -- --ignored

use imageforge::filters::FilterDescriptor;
use imageforge::registry::WorkerRegistry;
use imageforge::scheduler::{Task, TaskQueue};
use redis::aio::ConnectionManager;
use std::time::Duration;

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

async fn connect(queue_name: &str) -> TaskQueue {
    TaskQueue::connect(&redis_url(), queue_name, 3, Duration::from_secs(300))
        .await
        .expect("failed to connect to redis")
}

#[tokio::test]
#[ignore] // needs a reachable redis instance
async fn submitted_task_round_trips_through_claim_and_completion() {
    let queue_name = format!("imageforge_test_{}", std::process::id());
    let queue = connect(&queue_name).await;
    queue.clear().await.expect("clear should succeed");

    let task = Task::new("in.jpg", "out.jpg", vec![FilterDescriptor::new("grayscale")]);
    let task_id = queue.add_task(task).await.expect("add_task should succeed");

    let claimed = queue
        .claim("test-worker", Duration::from_secs(1))
        .await
        .expect("claim should succeed")
        .expect("a task should be claimable");
    assert_eq!(claimed.id, task_id);

    queue
        .mark_completed(&task_id, Some(serde_json::json!({"ok": true})))
        .await
        .expect("mark_completed should succeed");

    let stored = queue
        .get_task(&task_id)
        .await
        .expect("get_task should succeed")
        .expect("task should exist");
    assert_eq!(stored.status.to_string(), "completed");

    queue.clear().await.expect("clear should succeed");
}

#[tokio::test]
#[ignore] // needs a reachable redis instance
async fn task_exceeding_max_retries_is_routed_to_dead_letter() {
    let queue_name = format!("imageforge_test_dlq_{}", std::process::id());
    let queue = connect(&queue_name).await;
    queue.clear().await.expect("clear should succeed");

    let task = Task::new("in.jpg", "out.jpg", vec![FilterDescriptor::new("grayscale")]);
    let task_id = queue.add_task(task).await.expect("add_task should succeed");

    for _ in 0..3 {
        queue
            .claim("test-worker", Duration::from_secs(1))
            .await
            .expect("claim should succeed");
        queue
            .mark_failed(&task_id, "simulated failure", true)
            .await
            .expect("mark_failed should succeed");
    }

    let dead_letter_ids = queue.dead_letter_ids().await.expect("dead_letter_ids should succeed");
    assert!(dead_letter_ids.contains(&task_id));

    queue.clear().await.expect("clear should succeed");
}

#[tokio::test]
#[ignore] // needs a reachable redis instance
async fn worker_registry_heartbeat_round_trips() {
    let client = redis::Client::open(redis_url()).expect("client should open");
    let conn = ConnectionManager::new(client).await.expect("connection should succeed");
    let registry = WorkerRegistry::new(conn, Duration::from_secs(30));

    registry.register("test-worker-1", None).await.expect("register should succeed");
    registry.send_heartbeat("test-worker-1").await.expect("heartbeat should succeed");

    let info = registry
        .get_worker_info("test-worker-1")
        .await
        .expect("get_worker_info should succeed")
        .expect("worker should be registered");
    assert!(info.is_alive);

    registry.unregister("test-worker-1").await.expect("unregister should succeed");
}
