// Concurrent Consumers
//
// Many consumers drain one queue in parallel: every sent message is
// delivered and deleted exactly once.

use plainq_core::application::QueueService;
use plainq_core::domain::{MessageId, NewMessage};
use plainq_core::port::queue_storage::{CreateQueueRequest, DeleteRequest, ReceiveRequest, SendRequest};
use plainq_core::port::time_provider::SystemTimeProvider;
use plainq_store_sqlite::{create_pool, run_migrations, Storage, StoreConfig};
use plainq_telemetry::MetricsObserver;
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

const MESSAGES: usize = 400;
const CONSUMERS: usize = 8;
const BATCH_SIZE: u32 = 10;

async fn setup() -> (Arc<QueueService>, TempDir) {
    plainq_integration_tests::init_tracing();

    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}/plainq.db", dir.path().display());

    let pool = create_pool(&url).await.unwrap();
    run_migrations(&pool).await.unwrap();

    let storage = Storage::open(
        pool,
        StoreConfig::default(),
        Arc::new(MetricsObserver::new()),
        Arc::new(SystemTimeProvider),
    )
    .await
    .unwrap();

    (Arc::new(QueueService::new(Arc::new(storage))), dir)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_consumers_never_see_the_same_message() {
    let (service, _dir) = setup().await;

    let queue_id = service
        .create_queue(CreateQueueRequest {
            queue_name: "orders".to_string(),
            // Large enough that no consumer times out mid-drain.
            visibility_timeout_seconds: 300,
            ..Default::default()
        })
        .await
        .unwrap()
        .queue_id;

    let mut sent: HashSet<MessageId> = HashSet::new();
    for chunk in 0..(MESSAGES / 100) {
        let response = service
            .send(SendRequest {
                queue_id: queue_id.to_string(),
                messages: (0..100)
                    .map(|i| NewMessage {
                        body: format!("{chunk}-{i}").into_bytes(),
                    })
                    .collect(),
            })
            .await
            .unwrap();

        sent.extend(response.message_ids);
    }
    assert_eq!(sent.len(), MESSAGES);

    let mut workers = Vec::with_capacity(CONSUMERS);

    for _ in 0..CONSUMERS {
        let service = service.clone();
        let queue_id = queue_id.to_string();

        workers.push(tokio::spawn(async move {
            let mut drained: Vec<MessageId> = Vec::new();

            loop {
                let received = service
                    .receive(ReceiveRequest {
                        queue_id: queue_id.clone(),
                        batch_size: BATCH_SIZE,
                    })
                    .await
                    .unwrap();

                if received.messages.is_empty() {
                    return drained;
                }

                let response = service
                    .delete(DeleteRequest {
                        queue_id: queue_id.clone(),
                        message_ids: received
                            .messages
                            .iter()
                            .map(|m| m.id.to_string())
                            .collect(),
                    })
                    .await
                    .unwrap();

                assert!(response.failed.is_empty(), "double delete detected");
                drained.extend(response.successful);
            }
        }));
    }

    let mut deleted: Vec<MessageId> = Vec::new();
    for worker in workers {
        deleted.extend(worker.await.unwrap());
    }

    // The union of deleted ids equals the sent ids; no id was seen twice.
    assert_eq!(deleted.len(), MESSAGES, "a message was delivered twice");
    let deleted: HashSet<MessageId> = deleted.into_iter().collect();
    assert_eq!(deleted, sent);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_consumer_drains_every_message_exactly_once() {
    let (service, _dir) = setup().await;

    let queue_id = service
        .create_queue(CreateQueueRequest {
            queue_name: "orders".to_string(),
            visibility_timeout_seconds: 300,
            ..Default::default()
        })
        .await
        .unwrap()
        .queue_id;

    let sent = service
        .send(SendRequest {
            queue_id: queue_id.to_string(),
            messages: (0..50)
                .map(|i| NewMessage {
                    body: format!("{i}").into_bytes(),
                })
                .collect(),
        })
        .await
        .unwrap();

    let mut drained = Vec::new();

    loop {
        let received = service
            .receive(ReceiveRequest {
                queue_id: queue_id.to_string(),
                batch_size: 1,
            })
            .await
            .unwrap();

        let Some(message) = received.messages.into_iter().next() else {
            break;
        };

        service
            .delete(DeleteRequest {
                queue_id: queue_id.to_string(),
                message_ids: vec![message.id.to_string()],
            })
            .await
            .unwrap();

        drained.push(message.id);
    }

    // Single consumer sees strict send order.
    assert_eq!(drained, sent.message_ids);
}
