// Storage Engine
//
// Owns the connection pool, the properties cache, the telemetry handles, and
// the garbage collection task. Every multi-statement operation runs inside a
// transaction; dropping an unfinished sqlx transaction rolls it back, so
// every early-return error path rolls back unconditionally. The cache is
// updated only after a successful commit.

use crate::cache::QueuePropsCache;
use crate::config::{StoreConfig, DEFAULT_PAGE_SIZE};
use crate::error::{fatal, map_sqlx_error};
use crate::gc::GcWorker;
use crate::query;
use async_trait::async_trait;
use plainq_core::domain::{EvictionPolicy, MessageId, QueueId, QueueProperties, ReceivedMessage};
use plainq_core::error::{Error, Result};
use plainq_core::port::observer::Observer;
use plainq_core::port::queue_storage::{
    CreateQueueRequest, CreateQueueResponse, DeleteFailure, DeleteQueueRequest, DeleteRequest,
    DeleteResponse, DescribeQueueRequest, ListQueuesRequest, ListQueuesResponse, OrderBy,
    PurgeQueueRequest, QueueStorage, ReceiveRequest, ReceiveResponse, SendRequest, SendResponse,
};
use plainq_core::port::time_provider::TimeProvider;
use plainq_core::time::millis_between;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// SQLite-backed queue storage engine.
pub struct Storage {
    pool: SqlitePool,
    config: StoreConfig,

    cache: Arc<QueuePropsCache>,
    observer: Arc<dyn Observer>,
    time: Arc<dyn TimeProvider>,

    /// Live queue count. Mirrored into the observer's queues-exist gauge but
    /// kept here as well so the garbage collector works with a no-op
    /// observer.
    queue_count: Arc<AtomicU64>,

    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
    gc_task: Mutex<Option<JoinHandle<()>>>,
}

impl Storage {
    /// Opens the engine on a migrated pool: seeds the queues-exist gauge,
    /// warms the properties cache, and launches the garbage collection task.
    /// Exceeding the warm-up timeout is a fatal initialization error.
    pub async fn open(
        pool: SqlitePool,
        config: StoreConfig,
        observer: Arc<dyn Observer>,
        time: Arc<dyn TimeProvider>,
    ) -> Result<Storage> {
        let config = config.normalized();

        let (shutdown, shutdown_rx) = watch::channel(false);

        let storage = Storage {
            pool,
            cache: Arc::new(QueuePropsCache::new(config.cache_capacity)),
            observer,
            time,
            queue_count: Arc::new(AtomicU64::new(0)),
            closed: AtomicBool::new(false),
            shutdown,
            gc_task: Mutex::new(None),
            config,
        };

        let warmup = async {
            let count = storage.count_queues().await?;
            storage.queue_count.store(count, Ordering::SeqCst);

            let gauge = storage.observer.queues_exist();
            if gauge.get() == 0 {
                gauge.add(count);
            }

            storage.fill_cache().await
        };

        tokio::time::timeout(storage.config.cache_warmup_timeout, warmup)
            .await
            .map_err(|_| Error::Unavailable)??;

        let handle = tokio::spawn(storage.gc_worker().run(shutdown_rx));
        *storage.gc_task.lock().await = Some(handle);

        Ok(storage)
    }

    /// Stops the garbage collection task and waits for it to exit. After
    /// close, every operation returns `GracefulShutdown`.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let _ = self.shutdown.send(true);

        if let Some(handle) = self.gc_task.lock().await.take() {
            if let Err(err) = handle.await {
                // A panic that escaped the task bypassed the fatal-abort
                // path; escalate it instead of serving without a sweeper.
                if err.is_panic() {
                    fatal(format!("garbage collection task panicked: {err}"));
                }

                error!(error = %err, "garbage collection task failed");
            }
        }
    }

    /// Pings the database.
    pub async fn health(&self) -> Result<()> {
        sqlx::query("select 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    pub(crate) fn gc_worker(&self) -> GcWorker {
        GcWorker::new(
            self.pool.clone(),
            self.cache.clone(),
            self.observer.clone(),
            self.time.clone(),
            self.queue_count.clone(),
            self.config.gc_timeout,
        )
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::GracefulShutdown);
        }

        Ok(())
    }

    async fn count_queues(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(query::COUNT_QUEUES)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(count.max(0) as u64)
    }

    /// Warms the cache by paging through the properties table until
    /// exhaustion or until the cache is full.
    async fn fill_cache(&self) -> Result<()> {
        debug!("listing queues to fill the cache");

        let mut cursor: Option<String> = None;

        loop {
            let page = self
                .list_queues(ListQueuesRequest {
                    cursor: cursor.clone(),
                    ..Default::default()
                })
                .await?;

            for props in page.queues {
                self.cache.put(props);
            }

            if !page.has_more || self.cache.len() >= self.config.cache_capacity {
                return Ok(());
            }

            cursor = page.next_cursor;
        }
    }

    async fn read_props_by_id(&self, queue_id: &QueueId) -> Result<QueueProperties> {
        let row: Option<QueuePropsRow> = sqlx::query_as(&query::select_props_by_id())
            .bind(queue_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(QueuePropsRow::into_props).ok_or(Error::NotFound)
    }

    async fn read_props_by_name(&self, queue_name: &str) -> Result<QueueProperties> {
        let row: Option<QueuePropsRow> = sqlx::query_as(&query::select_props_by_name())
            .bind(queue_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(QueuePropsRow::into_props).ok_or(Error::NotFound)
    }

    /// Cache-first properties lookup; a miss falls through to the database
    /// and inserts the row on success.
    async fn lookup_props(&self, queue_id: &QueueId) -> Result<QueueProperties> {
        if let Some(props) = self.cache.get_by_id(queue_id) {
            return Ok(props);
        }

        let props = self.read_props_by_id(queue_id).await?;
        self.cache.put(props.clone());

        Ok(props)
    }
}

#[async_trait]
impl QueueStorage for Storage {
    async fn create_queue(&self, input: CreateQueueRequest) -> Result<CreateQueueResponse> {
        self.ensure_open()?;

        if input.queue_name.is_empty() {
            return Err(Error::InvalidArgument("queue name is empty".to_string()));
        }

        let retention_period_seconds = if input.retention_period_seconds == 0 {
            self.config.default_retention_period_seconds
        } else {
            input.retention_period_seconds
        };

        let visibility_timeout_seconds = if input.visibility_timeout_seconds == 0 {
            self.config.default_visibility_timeout_seconds
        } else {
            input.visibility_timeout_seconds
        };

        let max_receive_attempts = if input.max_receive_attempts == 0 {
            self.config.default_max_receive_attempts
        } else {
            input.max_receive_attempts
        };

        let eviction_policy = input.eviction_policy.unwrap_or_default();

        let dead_letter_queue_id = match &input.dead_letter_queue_id {
            Some(raw) => Some(QueueId::parse(raw)?),
            None => None,
        };

        if eviction_policy == EvictionPolicy::DeadLetter {
            let dlq_id = dead_letter_queue_id.as_ref().ok_or_else(|| {
                Error::InvalidArgument(
                    "dead_letter_queue_id is required for the dead-letter eviction policy"
                        .to_string(),
                )
            })?;

            if self.cache.get_by_id(dlq_id).is_none() {
                match self.read_props_by_id(dlq_id).await {
                    Ok(props) => self.cache.put(props),
                    Err(Error::NotFound) => {
                        return Err(Error::InvalidArgument(
                            "dead-letter queue does not exist".to_string(),
                        ));
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        let queue_id = QueueId::generate();
        let now = self.time.now_millis();

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(query::INSERT_QUEUE_PROPS)
            .bind(queue_id.as_str())
            .bind(&input.queue_name)
            .bind(now)
            .bind(now)
            .bind(retention_period_seconds as i64)
            .bind(visibility_timeout_seconds as i64)
            .bind(max_receive_attempts as i64)
            .bind(eviction_policy.as_i64())
            .bind(dead_letter_queue_id.as_ref().map(|id| id.as_str()))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        for statement in query::create_queue_table(&queue_id) {
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        self.cache.put(QueueProperties {
            id: queue_id.clone(),
            name: input.queue_name.clone(),
            created_at: now,
            last_swept_at: now,
            retention_period_seconds,
            visibility_timeout_seconds,
            max_receive_attempts,
            eviction_policy,
            dead_letter_queue_id,
        });

        self.queue_count.fetch_add(1, Ordering::SeqCst);
        self.observer.queues_exist().inc();

        debug!(queue_id = %queue_id, queue_name = %input.queue_name, "queue created");

        Ok(CreateQueueResponse { queue_id })
    }

    async fn describe_queue(&self, input: DescribeQueueRequest) -> Result<QueueProperties> {
        self.ensure_open()?;

        match (input.queue_id.as_deref(), input.queue_name.as_deref()) {
            (Some(raw_id), None) => {
                let queue_id = QueueId::parse(raw_id)?;
                self.lookup_props(&queue_id).await
            }

            (None, Some(queue_name)) if !queue_name.is_empty() => {
                if let Some(props) = self.cache.get_by_name(queue_name) {
                    return Ok(props);
                }

                let props = self.read_props_by_name(queue_name).await?;
                self.cache.put(props.clone());

                Ok(props)
            }

            _ => Err(Error::InvalidArgument(
                "exactly one of queue_id or queue_name must be specified".to_string(),
            )),
        }
    }

    async fn list_queues(&self, input: ListQueuesRequest) -> Result<ListQueuesResponse> {
        self.ensure_open()?;

        let page_size = if input.limit == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            input.limit
        };

        // One extra row tells whether there are more results.
        let fetch_limit = page_size as i64 + 1;

        let sql = query::list_queues(
            input.order_by,
            input.sort_by,
            input.queue_prefix.is_some(),
            input.cursor.is_some(),
        );

        let mut select = sqlx::query_as::<_, QueuePropsRow>(&sql);

        if let Some(prefix) = &input.queue_prefix {
            select = select.bind(query::like_prefix(prefix));
        }

        if let Some(cursor) = &input.cursor {
            select = match input.order_by {
                OrderBy::CreatedAt => {
                    let millis: i64 = cursor
                        .parse()
                        .map_err(|_| Error::InvalidArgument("invalid cursor".to_string()))?;
                    select.bind(millis)
                }

                OrderBy::Id | OrderBy::Name => select.bind(cursor.clone()),
            };
        }

        let rows = select
            .bind(fetch_limit)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let mut queues: Vec<QueueProperties> =
            rows.into_iter().map(QueuePropsRow::into_props).collect();

        let mut next_cursor = None;
        let mut has_more = false;

        if queues.len() > page_size as usize {
            queues.truncate(page_size as usize);
            has_more = true;
            next_cursor = queues.last().map(|last| cursor_value(input.order_by, last));
        }

        Ok(ListQueuesResponse {
            queues,
            next_cursor,
            has_more,
        })
    }

    async fn purge_queue(&self, input: PurgeQueueRequest) -> Result<()> {
        self.ensure_open()?;

        let queue_id = QueueId::parse(&input.queue_id)?;
        self.lookup_props(&queue_id).await?;

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let count: i64 = sqlx::query_scalar(&query::count_messages(&queue_id))
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let purged = sqlx::query(&query::purge_queue(&queue_id))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        // A mismatch means a concurrent writer slipped between the count and
        // the delete; abort and let the caller retry.
        if purged.rows_affected() != count.max(0) as u64 {
            return Err(Error::Unavailable);
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete_queue(&self, input: DeleteQueueRequest) -> Result<()> {
        self.ensure_open()?;

        let queue_id = QueueId::parse(&input.queue_id)?;
        let props = self.lookup_props(&queue_id).await?;

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let deleted = sqlx::query(query::DELETE_QUEUE_PROPS)
            .bind(queue_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        if deleted.rows_affected() < 1 {
            return Err(Error::NotFound);
        }

        sqlx::query(&query::drop_queue_table(&queue_id))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        self.cache.delete(&props.id, &props.name);
        self.queue_count.fetch_sub(1, Ordering::SeqCst);
        self.observer.queues_exist().dec();

        debug!(queue_id = %queue_id, "queue deleted");

        Ok(())
    }

    async fn send(&self, input: SendRequest) -> Result<SendResponse> {
        self.ensure_open()?;

        let queue_id = QueueId::parse(&input.queue_id)?;
        self.lookup_props(&queue_id).await?;

        let now = self.time.now_millis();
        let insert = query::insert_message(&queue_id);

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let mut message_ids = Vec::with_capacity(input.messages.len());
        let mut bytes_sent: u64 = 0;

        for message in &input.messages {
            let message_id = MessageId::generate();

            sqlx::query(&insert)
                .bind(message_id.as_str())
                .bind(&message.body)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;

            bytes_sent += message.body.len() as u64;
            message_ids.push(message_id);
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        self.observer
            .messages_sent(&queue_id)
            .add(message_ids.len() as u64);
        self.observer.messages_sent_bytes(&queue_id).add(bytes_sent);

        Ok(SendResponse { message_ids })
    }

    async fn receive(&self, input: ReceiveRequest) -> Result<ReceiveResponse> {
        self.ensure_open()?;

        let queue_id = QueueId::parse(&input.queue_id)?;
        let props = self.lookup_props(&queue_id).await?;

        let batch_size = if input.batch_size == 0 {
            1
        } else {
            input.batch_size
        };

        let now = self.time.now_millis();
        let visible_at = now + props.visibility_timeout_seconds as i64 * 1_000;

        // A single claiming statement; two concurrent receives cannot return
        // the same message.
        let rows: Vec<(String, Vec<u8>)> = sqlx::query_as(&query::receive_messages(&queue_id))
            .bind(visible_at)
            .bind(now)
            .bind(props.max_receive_attempts as i64)
            .bind(batch_size as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let mut messages = Vec::with_capacity(rows.len());

        for (raw_id, body) in rows {
            let id = MessageId::parse(&raw_id).unwrap_or_else(|_| {
                fatal(format!(
                    "queue (id: {queue_id}) contains a message with invalid id (id: {raw_id})"
                ))
            });

            messages.push(ReceivedMessage { id, body });
        }

        // RETURNING does not guarantee an order; message ids are
        // time-ordered, so this restores the selection order.
        messages.sort_by(|a, b| a.id.cmp(&b.id));

        if messages.is_empty() {
            self.observer.empty_receives(&queue_id).inc();
        } else {
            self.observer
                .messages_received(&queue_id)
                .add(messages.len() as u64);
        }

        Ok(ReceiveResponse { messages })
    }

    async fn delete(&self, input: DeleteRequest) -> Result<DeleteResponse> {
        self.ensure_open()?;

        let queue_id = QueueId::parse(&input.queue_id)?;
        self.lookup_props(&queue_id).await?;

        let now = self.time.now_millis();
        let delete = query::delete_message(&queue_id);
        let time_in_queue = self.observer.time_in_queue(&queue_id);

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let mut successful = Vec::with_capacity(input.message_ids.len());
        let mut failed = Vec::new();

        for raw_id in &input.message_ids {
            let deleted = match sqlx::query(&delete).bind(raw_id).execute(&mut *tx).await {
                Ok(result) => result.rows_affected() > 0,
                Err(err) => {
                    debug!(message_id = %raw_id, error = %err, "message delete failed");
                    false
                }
            };

            if !deleted {
                failed.push(DeleteFailure {
                    message_id: raw_id.clone(),
                });
                continue;
            }

            // The row existed, so its id was accepted by Send; failing to
            // parse it back means the storage was modified manually.
            let message_id = MessageId::parse(raw_id).unwrap_or_else(|_| {
                fatal(format!(
                    "queue (id: {queue_id}) contains a message with invalid id (id: {raw_id})"
                ))
            });
            let created_at = message_id.created_at_millis().unwrap_or_else(|_| {
                fatal(format!(
                    "queue (id: {queue_id}) contains a message with invalid id (id: {raw_id})"
                ))
            });

            time_in_queue.observe(millis_between(created_at, now));
            successful.push(message_id);
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        self.observer
            .messages_deleted(&queue_id)
            .add(successful.len() as u64);

        Ok(DeleteResponse { successful, failed })
    }
}

fn cursor_value(order_by: OrderBy, props: &QueueProperties) -> String {
    match order_by {
        OrderBy::Id => props.id.to_string(),
        OrderBy::Name => props.name.clone(),
        OrderBy::CreatedAt => props.created_at.to_string(),
    }
}

/// Raw properties row. Timestamps and sizes are SQLite integers.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct QueuePropsRow {
    queue_id: String,
    queue_name: String,
    created_at: i64,
    last_swept_at: i64,
    retention_period_seconds: i64,
    visibility_timeout_seconds: i64,
    max_receive_attempts: i64,
    eviction_policy: i64,
    dead_letter_queue_id: Option<String>,
}

impl QueuePropsRow {
    pub(crate) fn into_props(self) -> QueueProperties {
        let id = QueueId::parse(&self.queue_id).unwrap_or_else(|_| {
            fatal(format!(
                "queue properties row contains an invalid queue id (id: {})",
                self.queue_id
            ))
        });

        let dead_letter_queue_id = self.dead_letter_queue_id.as_deref().map(|raw| {
            QueueId::parse(raw).unwrap_or_else(|_| {
                fatal(format!(
                    "queue properties row contains an invalid dead-letter queue id (id: {raw})"
                ))
            })
        });

        QueueProperties {
            id,
            name: self.queue_name,
            created_at: self.created_at,
            last_swept_at: self.last_swept_at,
            retention_period_seconds: self.retention_period_seconds.max(0) as u64,
            visibility_timeout_seconds: self.visibility_timeout_seconds.max(0) as u64,
            max_receive_attempts: self.max_receive_attempts.max(0) as u32,
            eviction_policy: EvictionPolicy::from_i64(self.eviction_policy),
            dead_letter_queue_id,
        }
    }
}
