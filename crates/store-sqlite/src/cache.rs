// Queue Properties Cache
//
// In-memory mapping from queue id and queue name to properties, bounded to a
// configured capacity. Reads take a shared lock and bump an atomic recency
// counter; when the cache is full, a put evicts the oldest-untouched entry.
// The cache accelerates lookups only: every mutation goes through the
// database first and the cache is updated after the commit.

use crate::config::DEFAULT_CACHE_CAPACITY;
use parking_lot::RwLock;
use plainq_core::domain::{QueueId, QueueProperties};
use plainq_core::port::queue_storage::{OrderBy, SortBy};
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct QueuePropsCache {
    capacity: usize,
    tick: AtomicU64,
    inner: RwLock<Inner>,
}

struct Inner {
    by_id: HashMap<QueueId, CacheEntry>,
    by_name: HashMap<String, QueueId>,
}

struct CacheEntry {
    props: QueueProperties,
    touched: AtomicU64,
}

impl QueuePropsCache {
    /// Zero capacity falls back to the default.
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_CACHE_CAPACITY
        } else {
            capacity
        };

        Self {
            capacity,
            tick: AtomicU64::new(0),
            inner: RwLock::new(Inner {
                by_id: HashMap::with_capacity(capacity),
                by_name: HashMap::with_capacity(capacity),
            }),
        }
    }

    pub fn get_by_id(&self, id: &QueueId) -> Option<QueueProperties> {
        let inner = self.inner.read();

        let entry = inner.by_id.get(id)?;
        self.touch(entry);

        Some(entry.props.clone())
    }

    pub fn get_by_name(&self, name: &str) -> Option<QueueProperties> {
        let inner = self.inner.read();

        let id = inner.by_name.get(name)?;
        let entry = inner.by_id.get(id)?;
        self.touch(entry);

        Some(entry.props.clone())
    }

    pub fn put(&self, props: QueueProperties) {
        let mut inner = self.inner.write();

        if let Some(previous) = inner.by_id.remove(&props.id) {
            inner.by_name.remove(&previous.props.name);
        } else if inner.by_id.len() >= self.capacity {
            if let Some(stale_id) = inner
                .by_id
                .iter()
                .min_by_key(|(_, entry)| entry.touched.load(Ordering::Relaxed))
                .map(|(id, _)| id.clone())
            {
                if let Some(stale) = inner.by_id.remove(&stale_id) {
                    inner.by_name.remove(&stale.props.name);
                }
            }
        }

        let entry = CacheEntry {
            touched: AtomicU64::new(self.next_tick()),
            props,
        };

        inner.by_name.insert(entry.props.name.clone(), entry.props.id.clone());
        inner.by_id.insert(entry.props.id.clone(), entry);
    }

    pub fn delete(&self, id: &QueueId, name: &str) {
        let mut inner = self.inner.write();

        inner.by_id.remove(id);

        // Only drop the name mapping when it still points at this queue.
        if inner.by_name.get(name) == Some(id) {
            inner.by_name.remove(name);
        }
    }

    /// Sorted snapshot of the cached properties, not a live view.
    /// Ties on `CreatedAt` break by id ascending.
    pub fn list(&self, order_by: OrderBy, sort_by: SortBy) -> Vec<QueueProperties> {
        let inner = self.inner.read();

        let mut props: Vec<QueueProperties> = inner
            .by_id
            .values()
            .map(|entry| entry.props.clone())
            .collect();

        drop(inner);

        props.sort_by(|a, b| {
            let ordering = match order_by {
                OrderBy::Id => a.id.cmp(&b.id),
                OrderBy::Name => a.name.cmp(&b.name),
                OrderBy::CreatedAt => a.created_at.cmp(&b.created_at),
            };

            let ordering = match sort_by {
                SortBy::Asc => ordering,
                SortBy::Desc => ordering.reverse(),
            };

            match ordering {
                CmpOrdering::Equal => a.id.cmp(&b.id),
                other => other,
            }
        });

        props
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn touch(&self, entry: &CacheEntry) {
        entry.touched.store(self.next_tick(), Ordering::Relaxed);
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plainq_core::domain::EvictionPolicy;

    fn props(name: &str, created_at: i64) -> QueueProperties {
        QueueProperties {
            id: QueueId::generate(),
            name: name.to_string(),
            created_at,
            last_swept_at: created_at,
            retention_period_seconds: 60,
            visibility_timeout_seconds: 30,
            max_receive_attempts: 5,
            eviction_policy: EvictionPolicy::Drop,
            dead_letter_queue_id: None,
        }
    }

    #[test]
    fn lookup_by_id_and_name() {
        let cache = QueuePropsCache::new(10);
        let orders = props("orders", 1);

        cache.put(orders.clone());

        assert_eq!(cache.get_by_id(&orders.id), Some(orders.clone()));
        assert_eq!(cache.get_by_name("orders"), Some(orders));
        assert_eq!(cache.get_by_name("missing"), None);
    }

    #[test]
    fn delete_removes_both_indexes() {
        let cache = QueuePropsCache::new(10);
        let orders = props("orders", 1);

        cache.put(orders.clone());
        cache.delete(&orders.id, &orders.name);

        assert_eq!(cache.get_by_id(&orders.id), None);
        assert_eq!(cache.get_by_name("orders"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn full_cache_evicts_the_oldest_untouched_entry() {
        let cache = QueuePropsCache::new(2);
        let first = props("first", 1);
        let second = props("second", 2);
        let third = props("third", 3);

        cache.put(first.clone());
        cache.put(second.clone());

        // Touch the older entry so "second" becomes the eviction candidate.
        assert!(cache.get_by_id(&first.id).is_some());

        cache.put(third.clone());

        assert_eq!(cache.len(), 2);
        assert!(cache.get_by_id(&first.id).is_some());
        assert!(cache.get_by_id(&second.id).is_none());
        assert!(cache.get_by_name("second").is_none());
        assert!(cache.get_by_id(&third.id).is_some());
    }

    #[test]
    fn put_replaces_existing_entry_without_eviction() {
        let cache = QueuePropsCache::new(2);
        let mut orders = props("orders", 1);
        let invoices = props("invoices", 2);

        cache.put(orders.clone());
        cache.put(invoices.clone());

        orders.last_swept_at = 99;
        cache.put(orders.clone());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get_by_id(&orders.id).unwrap().last_swept_at, 99);
        assert!(cache.get_by_id(&invoices.id).is_some());
    }

    #[test]
    fn list_sorts_by_the_requested_key() {
        let cache = QueuePropsCache::new(10);
        let a = props("alpha", 3);
        let b = props("beta", 1);
        let c = props("gamma", 2);

        cache.put(a.clone());
        cache.put(b.clone());
        cache.put(c.clone());

        let by_name: Vec<String> = cache
            .list(OrderBy::Name, SortBy::Asc)
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(by_name, vec!["alpha", "beta", "gamma"]);

        let by_created_desc: Vec<i64> = cache
            .list(OrderBy::CreatedAt, SortBy::Desc)
            .into_iter()
            .map(|p| p.created_at)
            .collect();
        assert_eq!(by_created_desc, vec![3, 2, 1]);

        let by_id: Vec<QueueId> = cache
            .list(OrderBy::Id, SortBy::Asc)
            .into_iter()
            .map(|p| p.id)
            .collect();
        let mut expected = vec![a.id, b.id, c.id];
        expected.sort();
        assert_eq!(by_id, expected);
    }

    #[test]
    fn list_breaks_created_at_ties_by_id() {
        let cache = QueuePropsCache::new(10);
        let a = props("a", 7);
        let b = props("b", 7);

        cache.put(a.clone());
        cache.put(b.clone());

        let listed: Vec<QueueId> = cache
            .list(OrderBy::CreatedAt, SortBy::Asc)
            .into_iter()
            .map(|p| p.id)
            .collect();

        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(listed, expected);
    }

    #[test]
    fn concurrent_readers_share_the_lock() {
        let cache = std::sync::Arc::new(QueuePropsCache::new(100));
        let orders = props("orders", 1);
        cache.put(orders.clone());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let id = orders.id.clone();
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        assert!(cache.get_by_id(&id).is_some());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
