use crate::domain::order::Order;
use crate::domain::ports::{IdempotencyTracker, OrderRepository};
use crate::error::{OrderError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Column Family for storing orders.
pub const CF_ORDERS: &str = "orders";
/// Column Family for storing idempotency records.
pub const CF_DELIVERIES: &str = "deliveries";

/// A persistent store implementation using RocksDB.
///
/// Serves both as `OrderRepository` and as `IdempotencyTracker`, in separate
/// Column Families. Writes that check existence first are serialized through
/// `write_lock` so `save` and `update` stay atomic.
///
/// Idempotency records are bounded like the in-memory tracker: once more than
/// `dedupe_capacity` are held, expired records are deleted first and then the
/// oldest ones, down to 90% of capacity.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
    dedupe_ttl: Duration,
    dedupe_capacity: usize,
    deliveries: Arc<AtomicUsize>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path and drops
    /// idempotency records older than `dedupe_ttl`.
    pub fn open<P: AsRef<Path>>(
        path: P,
        dedupe_ttl: Duration,
        dedupe_capacity: usize,
    ) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_orders = ColumnFamilyDescriptor::new(CF_ORDERS, Options::default());
        let cf_deliveries = ColumnFamilyDescriptor::new(CF_DELIVERIES, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_orders, cf_deliveries])?;
        let store = Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
            dedupe_ttl,
            dedupe_capacity: dedupe_capacity.max(1),
            deliveries: Arc::new(AtomicUsize::new(0)),
        };

        let purged = store.purge_expired()?;
        if purged > 0 {
            info!(purged, "Dropped expired idempotency records");
        }
        let held = store.db.iterator_cf(store.cf(CF_DELIVERIES)?, IteratorMode::Start).count();
        store.deliveries.store(held, Ordering::SeqCst);
        if held > store.dedupe_capacity {
            store.evict_deliveries()?;
        }
        Ok(store)
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| OrderError::Storage(format!("{name} column family not found")))
    }

    fn read_order(&self, id: &str) -> Result<Option<Order>> {
        let cf = self.cf(CF_ORDERS)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_order(&self, order: &Order) -> Result<()> {
        let cf = self.cf(CF_ORDERS)?;
        let value = serde_json::to_vec(order)?;
        self.db.put_cf(cf, order.id.as_bytes(), value)?;
        Ok(())
    }

    /// Removes idempotency records past the retention window.
    pub fn purge_expired(&self) -> Result<usize> {
        let cf = self.cf(CF_DELIVERIES)?;
        let now = now_nanos();
        let mut expired = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            if !self.is_fresh(&value, now) {
                expired.push(key);
            }
        }
        for key in &expired {
            self.db.delete_cf(cf, key)?;
        }
        self.deliveries.fetch_sub(
            expired.len().min(self.deliveries.load(Ordering::SeqCst)),
            Ordering::SeqCst,
        );
        Ok(expired.len())
    }

    /// Number of idempotency records held, expired or not.
    pub fn delivery_count(&self) -> usize {
        self.deliveries.load(Ordering::SeqCst)
    }

    fn evict_deliveries(&self) -> Result<()> {
        let purged = self.purge_expired()?;
        let target = (self.dedupe_capacity * 9 / 10).max(1);
        let cf = self.cf(CF_DELIVERIES)?;

        let mut by_age = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            let marked_at = <[u8; 8]>::try_from(&value[..])
                .map(u64::from_be_bytes)
                .unwrap_or_default();
            by_age.push((marked_at, key));
        }
        let excess = by_age.len().saturating_sub(target);
        if excess > 0 {
            by_age.sort_by_key(|(marked_at, _)| *marked_at);
            for (_, key) in by_age.iter().take(excess) {
                self.db.delete_cf(cf, key)?;
            }
        }
        self.deliveries.store(by_age.len() - excess, Ordering::SeqCst);
        debug!(purged, evicted = excess, "Idempotency records trimmed");
        Ok(())
    }

    fn is_fresh(&self, value: &[u8], now: u64) -> bool {
        let Ok(bytes) = <[u8; 8]>::try_from(value) else {
            return false;
        };
        let marked_at = u64::from_be_bytes(bytes);
        now.saturating_sub(marked_at) < self.dedupe_ttl.as_nanos() as u64
    }
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

#[async_trait]
impl OrderRepository for RocksDBStore {
    async fn save(&self, order: Order) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.read_order(&order.id)?.is_some() {
            return Err(OrderError::AlreadyExists(order.id));
        }
        self.write_order(&order)
    }

    async fn find_by_id(&self, id: &str) -> Result<Order> {
        self.read_order(id)?
            .ok_or_else(|| OrderError::NotFound(id.to_string()))
    }

    async fn update(&self, order: Order) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.read_order(&order.id)?.is_none() {
            return Err(OrderError::NotFound(order.id));
        }
        self.write_order(&order)
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        let cf = self.cf(CF_ORDERS)?;
        let mut orders = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            orders.push(serde_json::from_slice(&value)?);
        }
        Ok(orders)
    }
}

#[async_trait]
impl IdempotencyTracker for RocksDBStore {
    async fn is_processed(&self, key: &str) -> Result<bool> {
        let cf = self.cf(CF_DELIVERIES)?;
        Ok(self
            .db
            .get_pinned_cf(cf, key.as_bytes())?
            .is_some_and(|value| self.is_fresh(&value, now_nanos())))
    }

    async fn mark_processed(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_DELIVERIES)?;
        let is_new = self.db.get_pinned_cf(cf, key.as_bytes())?.is_none();
        // Re-marking refreshes the window.
        self.db
            .put_cf(cf, key.as_bytes(), now_nanos().to_be_bytes())?;
        if is_new && self.deliveries.fetch_add(1, Ordering::SeqCst) + 1 > self.dedupe_capacity {
            self.evict_deliveries()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OrderStatus;
    use tempfile::tempdir;

    const DAY: Duration = Duration::from_secs(86_400);
    const CAPACITY: usize = 100_000;

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path(), DAY, CAPACITY).expect("Failed to open RocksDB");

        assert!(store.db.cf_handle(CF_ORDERS).is_some());
        assert!(store.db.cf_handle(CF_DELIVERIES).is_some());
    }

    #[tokio::test]
    async fn test_rocksdb_order_repository() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path(), DAY, CAPACITY).unwrap();
        let mut order = Order::new("order-1", vec!["a".into()]).unwrap();

        store.save(order.clone()).await.unwrap();
        assert!(matches!(
            store.save(order.clone()).await,
            Err(OrderError::AlreadyExists(_))
        ));

        order.status = OrderStatus::Processed;
        store.update(order.clone()).await.unwrap();
        assert_eq!(store.find_by_id("order-1").await.unwrap(), order);
        assert_eq!(store.all_orders().await.unwrap(), vec![order]);

        assert!(matches!(
            store.find_by_id("order-2").await,
            Err(OrderError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rocksdb_idempotency_tracker() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path(), DAY, CAPACITY).unwrap();

        assert!(!store.is_processed("created:order-1").await.unwrap());
        store.mark_processed("created:order-1").await.unwrap();
        store.mark_processed("created:order-1").await.unwrap();
        assert!(store.is_processed("created:order-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_records_purged_on_open() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDBStore::open(dir.path(), DAY, CAPACITY).unwrap();
            store.mark_processed("k").await.unwrap();
        }
        let store = RocksDBStore::open(dir.path(), Duration::ZERO, CAPACITY).unwrap();
        assert!(!store.is_processed("k").await.unwrap());
        assert_eq!(store.purge_expired().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tracker_capacity_bounds_records() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path(), DAY, 10).unwrap();

        for i in 0..25 {
            store.mark_processed(&format!("created:order-{i}")).await.unwrap();
            assert!(store.delivery_count() <= 10);
        }

        let cf = store.cf(CF_DELIVERIES).unwrap();
        let held = store.db.iterator_cf(cf, IteratorMode::Start).count();
        assert_eq!(held, store.delivery_count());
        assert!(held <= 10);
        assert!(store.is_processed("created:order-24").await.unwrap());
        assert!(!store.is_processed("created:order-0").await.unwrap());
    }

    #[tokio::test]
    async fn test_remarking_does_not_grow_records() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path(), DAY, 10).unwrap();

        for _ in 0..20 {
            store.mark_processed("processed:order-1").await.unwrap();
        }
        assert_eq!(store.delivery_count(), 1);
    }

    #[tokio::test]
    async fn test_reopen_with_smaller_capacity_trims() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDBStore::open(dir.path(), DAY, CAPACITY).unwrap();
            for i in 0..20 {
                store.mark_processed(&format!("k-{i}")).await.unwrap();
            }
            assert_eq!(store.delivery_count(), 20);
        }
        let store = RocksDBStore::open(dir.path(), DAY, 10).unwrap();
        assert!(store.delivery_count() <= 10);
    }
}
