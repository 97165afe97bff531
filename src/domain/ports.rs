use super::delivery::{DeliveryStream, PublishAck};
use super::order::Order;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Keyed storage for order state.
///
/// Every call is atomic with respect to the others: no reader observes a
/// half-written order.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts a new order; fails with `AlreadyExists` if the id is taken.
    async fn save(&self, order: Order) -> Result<()>;
    /// Fails with `NotFound` if the id is absent.
    async fn find_by_id(&self, id: &str) -> Result<Order>;
    /// Replaces an existing order; fails with `NotFound` if the id is absent.
    async fn update(&self, order: Order) -> Result<()>;
    async fn all_orders(&self) -> Result<Vec<Order>>;
}

/// Records idempotency keys whose side effects have been fully applied.
#[async_trait]
pub trait IdempotencyTracker: Send + Sync {
    async fn is_processed(&self, key: &str) -> Result<bool>;
    /// Marking an already-marked key is a no-op.
    async fn mark_processed(&self, key: &str) -> Result<()>;
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<PublishAck>;
}

#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Subscribes with manual acknowledgement. Subscribers sharing a
    /// `queue_group` compete for messages; `None` gets its own copy.
    async fn subscribe(&self, subject: &str, queue_group: Option<&str>)
    -> Result<DeliveryStream>;
}

pub type OrderRepositoryBox = Box<dyn OrderRepository>;
pub type IdempotencyTrackerBox = Box<dyn IdempotencyTracker>;
pub type PublisherRef = Arc<dyn Publisher>;
pub type SubscriberRef = Arc<dyn Subscriber>;
