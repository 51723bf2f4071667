// Garbage Collector
//
// Runs on a timer. Each tick pages through queues whose last sweep is older
// than the GC timeout and applies the configured eviction policy to each.
// A database error in one sweep aborts the rest of the tick but not the
// loop; invariant violations (uncached properties, tampered rows) abort the
// process.

use crate::cache::QueuePropsCache;
use crate::error::{fatal, map_sqlx_error};
use crate::query;
use plainq_core::domain::{EvictionPolicy, QueueId, QueueProperties};
use plainq_core::error::{Error, Result};
use plainq_core::port::observer::Observer;
use plainq_core::port::time_provider::TimeProvider;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error};

pub(crate) struct GcWorker {
    pool: SqlitePool,
    cache: Arc<QueuePropsCache>,
    observer: Arc<dyn Observer>,
    time: Arc<dyn TimeProvider>,
    queue_count: Arc<AtomicU64>,
    gc_timeout: Duration,
}

pub(crate) struct SweepOutcome {
    pub duration: Duration,
    pub dropped: u64,
}

impl GcWorker {
    pub(crate) fn new(
        pool: SqlitePool,
        cache: Arc<QueuePropsCache>,
        observer: Arc<dyn Observer>,
        time: Arc<dyn TimeProvider>,
        queue_count: Arc<AtomicU64>,
        gc_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            cache,
            observer,
            time,
            queue_count,
            gc_timeout,
        }
    }

    /// Ticker loop; exits when the shutdown signal fires.
    pub(crate) async fn run(self, mut shutdown: watch::Receiver<bool>) {
        debug!("starting garbage collection routine");

        let mut ticker = tokio::time::interval(self.gc_timeout);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // The first interval tick completes immediately; skip it so sweeps
        // start one full period after startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    debug!("stopping garbage collection routine");
                    return;
                }

                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    async fn tick(&self) {
        // No queues, no work; the tick is not counted as a schedule.
        if self.queue_count.load(Ordering::SeqCst) == 0 {
            return;
        }

        self.observer.gc_schedules().inc();

        let start = Instant::now();

        let queues = match self.queues_for_gc().await {
            Ok(queues) => queues,
            Err(err) => {
                error!(error = %err, "selecting queues for garbage collection");
                return;
            }
        };

        for queue_id in queues {
            debug!(queue_id = %queue_id, "running garbage collection for queue");

            match self.sweep(&queue_id).await {
                Ok(outcome) => debug!(
                    queue_id = %queue_id,
                    duration = ?outcome.duration,
                    messages_dropped = outcome.dropped,
                    "garbage collection",
                ),

                Err(err) => {
                    error!(queue_id = %queue_id, error = %err, "sweep failed, aborting tick");
                    break;
                }
            }
        }

        self.observer.gc_duration().observe(start.elapsed());
    }

    /// Selects queues whose last sweep is older than the GC timeout, oldest
    /// first. Pages of `queue_count` rows are fetched with an increasing
    /// offset until a short page arrives.
    pub(crate) async fn queues_for_gc(&self) -> Result<Vec<QueueId>> {
        let limit = self.queue_count.load(Ordering::SeqCst);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let cutoff = self.time.now_millis() - self.gc_timeout.as_millis() as i64;

        let mut queues = Vec::with_capacity(limit as usize);
        let mut offset: i64 = 0;

        loop {
            let rows: Vec<String> = sqlx::query_scalar(query::SELECT_QUEUES_FOR_GC)
                .bind(cutoff)
                .bind(limit as i64)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            let full_page = rows.len() as u64 == limit;

            for raw in rows {
                let queue_id = QueueId::parse(&raw).unwrap_or_else(|_| {
                    fatal(format!(
                        "queue properties row contains an invalid queue id (id: {raw})"
                    ))
                });

                queues.push(queue_id);
            }

            if !full_page {
                return Ok(queues);
            }

            offset += limit as i64;
        }
    }

    /// One GC pass over one queue: evicts expired messages under the queue's
    /// policy and advances its sweep cursor.
    pub(crate) async fn sweep(&self, queue_id: &QueueId) -> Result<SweepOutcome> {
        let start = Instant::now();

        // Properties must be cached for every live queue; a miss here means
        // the cache and the database have diverged.
        let props = self
            .cache
            .get_by_id(queue_id)
            .unwrap_or_else(|| fatal(format!("queue props (id: {queue_id}) not cached")));

        let now = self.time.now_millis();
        let retention_cutoff = now - props.retention_period_seconds as i64 * 1_000;

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let dropped = match props.eviction_policy {
            EvictionPolicy::Drop => {
                let result = sqlx::query(&query::drop_expired_messages(queue_id))
                    .bind(props.max_receive_attempts as i64)
                    .bind(retention_cutoff)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_sqlx_error)?;

                result.rows_affected()
            }

            EvictionPolicy::DeadLetter => {
                let dlq_id = props.dead_letter_queue_id.as_ref().unwrap_or_else(|| {
                    fatal(format!(
                        "queue props (id: {queue_id}) carry the dead-letter policy \
                         without a dead-letter queue"
                    ))
                });

                let expired: Vec<(String, Vec<u8>)> =
                    sqlx::query_as(&query::select_expired_messages(queue_id))
                        .bind(props.max_receive_attempts as i64)
                        .bind(retention_cutoff)
                        .fetch_all(&mut *tx)
                        .await
                        .map_err(map_sqlx_error)?;

                let insert = query::insert_message(dlq_id);
                let delete = query::delete_message(queue_id);

                // Message id and body are preserved; visibility, retries,
                // and retention restart in the dead-letter queue.
                for (msg_id, msg_body) in &expired {
                    sqlx::query(&insert)
                        .bind(msg_id)
                        .bind(msg_body)
                        .bind(now)
                        .bind(now)
                        .execute(&mut *tx)
                        .await
                        .map_err(map_sqlx_error)?;

                    sqlx::query(&delete)
                        .bind(msg_id)
                        .execute(&mut *tx)
                        .await
                        .map_err(map_sqlx_error)?;
                }

                expired.len() as u64
            }
        };

        let updated = sqlx::query(query::UPDATE_LAST_SWEPT)
            .bind(now)
            .bind(queue_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        // The queue was deleted while this sweep ran.
        if updated.rows_affected() == 0 {
            return Err(Error::NotFound);
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        self.cache.put(QueueProperties {
            last_swept_at: now,
            ..props.clone()
        });

        self.observer
            .messages_dropped(queue_id, props.eviction_policy)
            .add(dropped);

        Ok(SweepOutcome {
            duration: start.elapsed(),
            dropped,
        })
    }
}
