use crate::domain::order::Order;
use crate::domain::ports::{IdempotencyTracker, OrderRepository};
use crate::error::{OrderError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// A thread-safe in-memory order store.
///
/// Uses `Arc<RwLock<HashMap<String, Order>>>`: each call holds the lock for
/// its whole check-and-write, so `save` and `update` never interleave.
#[derive(Default, Clone)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<HashMap<String, Order>>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn save(&self, order: Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(OrderError::AlreadyExists(order.id));
        }
        orders.insert(order.id.clone(), order);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Order> {
        let orders = self.orders.read().await;
        orders
            .get(id)
            .cloned()
            .ok_or_else(|| OrderError::NotFound(id.to_string()))
    }

    async fn update(&self, order: Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&order.id) {
            Some(existing) => {
                *existing = order;
                Ok(())
            }
            None => Err(OrderError::NotFound(order.id)),
        }
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.values().cloned().collect())
    }
}

/// In-memory idempotency tracker with a retention window and a size cap.
///
/// A key counts as processed only while it is younger than `ttl`. Once the
/// map grows past `capacity`, expired keys are purged first and then the
/// oldest ones, down to 90% of capacity.
#[derive(Clone)]
pub struct InMemoryIdempotencyTracker {
    marked: Arc<RwLock<HashMap<String, Instant>>>,
    ttl: Duration,
    capacity: usize,
}

impl InMemoryIdempotencyTracker {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
    pub const DEFAULT_CAPACITY: usize = 100_000;

    pub fn new() -> Self {
        Self::with_limits(Self::DEFAULT_TTL, Self::DEFAULT_CAPACITY)
    }

    pub fn with_limits(ttl: Duration, capacity: usize) -> Self {
        Self {
            marked: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Number of keys currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.marked.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.marked.read().await.is_empty()
    }

    fn evict(&self, marked: &mut HashMap<String, Instant>, now: Instant) {
        marked.retain(|_, at| now.duration_since(*at) < self.ttl);
        let target = (self.capacity * 9 / 10).max(1);
        if marked.len() <= target {
            return;
        }
        let mut by_age: Vec<(String, Instant)> =
            marked.iter().map(|(k, at)| (k.clone(), *at)).collect();
        by_age.sort_by_key(|(_, at)| *at);
        let excess = marked.len() - target;
        for (key, _) in by_age.into_iter().take(excess) {
            marked.remove(&key);
        }
    }
}

impl Default for InMemoryIdempotencyTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdempotencyTracker for InMemoryIdempotencyTracker {
    async fn is_processed(&self, key: &str) -> Result<bool> {
        let marked = self.marked.read().await;
        Ok(marked
            .get(key)
            .is_some_and(|at| at.elapsed() < self.ttl))
    }

    async fn mark_processed(&self, key: &str) -> Result<()> {
        let now = Instant::now();
        let mut marked = self.marked.write().await;
        // Re-marking refreshes the window; it is never an error.
        marked.insert(key.to_string(), now);
        if marked.len() > self.capacity {
            self.evict(&mut marked, now);
        }
        Ok(())
    }
}
