use crate::domain::order::Order;
use crate::domain::ports::OrderRepositoryBox;
use crate::error::{OrderError, Result};
use async_trait::async_trait;

/// Order state machine over a repository.
#[async_trait]
pub trait OrderService: Send + Sync {
    /// `(absent) -> created`. Returns the stored order.
    async fn create_order(&self, order: Order) -> Result<Order>;
    async fn get_order(&self, id: &str) -> Result<Order>;
    /// `created -> processed`. Returns the stored order.
    async fn process_order(&self, id: &str) -> Result<Order>;
}

pub type OrderServiceBox = Box<dyn OrderService>;

/// Default `OrderService`. Each operation is deterministic given the stored
/// state; a repeated create or process is rejected by its precondition.
pub struct OrderManager {
    repo: OrderRepositoryBox,
}

impl OrderManager {
    pub fn new(repo: OrderRepositoryBox) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl OrderService for OrderManager {
    async fn create_order(&self, order: Order) -> Result<Order> {
        // Re-validate: callers may build `Order` directly.
        let order = Order::new(order.id, order.items)?;
        match self.repo.find_by_id(&order.id).await {
            Ok(_) => return Err(OrderError::AlreadyExists(order.id)),
            Err(OrderError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.repo.save(order.clone()).await?;
        Ok(order)
    }

    async fn get_order(&self, id: &str) -> Result<Order> {
        self.repo.find_by_id(id).await
    }

    async fn process_order(&self, id: &str) -> Result<Order> {
        let mut order = self.repo.find_by_id(id).await?;
        order.process()?;
        self.repo.update(order.clone()).await?;
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OrderStatus;
    use crate::infrastructure::in_memory::InMemoryOrderRepository;

    fn manager() -> OrderManager {
        OrderManager::new(Box::new(InMemoryOrderRepository::new()))
    }

    #[tokio::test]
    async fn test_create_sets_created_status() {
        let service = manager();
        let mut order = Order::new("order-101", vec!["a".into(), "b".into()]).unwrap();
        order.status = OrderStatus::Processed;

        let stored = service.create_order(order).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Created);
        assert_eq!(
            service.get_order("order-101").await.unwrap().status,
            OrderStatus::Created
        );
    }

    #[tokio::test]
    async fn test_second_create_leaves_state_unchanged() {
        let service = manager();
        service
            .create_order(Order::new("order-1", vec!["a".into()]).unwrap())
            .await
            .unwrap();

        let err = service
            .create_order(Order::new("order-1", vec!["z".into()]).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::AlreadyExists(_)));
        assert_eq!(
            service.get_order("order-1").await.unwrap().items,
            vec!["a".to_string()]
        );
    }

    #[tokio::test]
    async fn test_create_rejects_empty_id() {
        let service = manager();
        let order = Order {
            id: String::new(),
            items: vec![],
            status: OrderStatus::Created,
        };
        assert!(matches!(
            service.create_order(order).await,
            Err(OrderError::InvalidOrder(_))
        ));
    }

    #[tokio::test]
    async fn test_process_transitions_once() {
        let service = manager();
        service
            .create_order(Order::new("order-1", vec![]).unwrap())
            .await
            .unwrap();

        let processed = service.process_order("order-1").await.unwrap();
        assert_eq!(processed.status, OrderStatus::Processed);

        let err = service.process_order("order-1").await.unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidTransition {
                current: OrderStatus::Processed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_process_missing_order() {
        let service = manager();
        assert!(matches!(
            service.process_order("missing").await,
            Err(OrderError::NotFound(_))
        ));
    }
}
