//! Process wiring: provisions the streams, picks the stores, and starts the
//! coordinator behind a queue-group listener.

use crate::application::coordinator::{DeliveryCoordinator, ProcessOutcome};
use crate::application::emitter::EventEmitter;
use crate::application::service::OrderManager;
use crate::config::{AppConfig, DLQ_SUBJECTS, ORDERS_SUBJECTS, SUBJECT_CREATED};
use crate::domain::delivery::PublishAck;
use crate::domain::order::Order;
use crate::domain::ports::{IdempotencyTrackerBox, OrderRepositoryBox, Publisher};
use crate::error::{OrderError, Result};
use crate::infrastructure::broker::{InMemoryBroker, StreamConfig};
use crate::infrastructure::in_memory::{InMemoryIdempotencyTracker, InMemoryOrderRepository};
use crate::interfaces::codec::PayloadEncoding;
use crate::interfaces::listener::{ListenerHandle, OrderListener};
use std::sync::Arc;
use tracing::info;

struct Stores {
    service_repo: OrderRepositoryBox,
    view_repo: OrderRepositoryBox,
    tracker: IdempotencyTrackerBox,
}

#[cfg(feature = "storage-rocksdb")]
fn persistent_stores(config: &AppConfig) -> Result<Option<Stores>> {
    let Some(db_path) = &config.db_path else {
        return Ok(None);
    };
    let store = crate::infrastructure::rocksdb::RocksDBStore::open(
        db_path,
        config.dedupe_ttl(),
        config.dedupe_capacity,
    )?;
    info!(path = %db_path.display(), "Using RocksDB storage");
    Ok(Some(Stores {
        service_repo: Box::new(store.clone()),
        view_repo: Box::new(store.clone()),
        tracker: Box::new(store),
    }))
}

#[cfg(not(feature = "storage-rocksdb"))]
fn persistent_stores(config: &AppConfig) -> Result<Option<Stores>> {
    if config.db_path.is_some() {
        tracing::warn!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(None)
}

fn build_stores(config: &AppConfig) -> Result<Stores> {
    if let Some(stores) = persistent_stores(config)? {
        return Ok(stores);
    }

    let repo = InMemoryOrderRepository::new();
    Ok(Stores {
        service_repo: Box::new(repo.clone()),
        view_repo: Box::new(repo),
        tracker: Box::new(InMemoryIdempotencyTracker::with_limits(
            config.dedupe_ttl(),
            config.dedupe_capacity,
        )),
    })
}

/// Receipt of the demonstration workflow.
#[derive(Debug)]
pub struct DemoReport {
    pub processed: Order,
    pub event: PublishAck,
    pub orders: Vec<Order>,
}

/// A running order pipeline over the in-process broker.
pub struct Pipeline {
    broker: InMemoryBroker,
    coordinator: Arc<DeliveryCoordinator>,
    orders: OrderRepositoryBox,
    listener: ListenerHandle,
}

impl Pipeline {
    pub async fn start(config: &AppConfig) -> Result<Self> {
        info!(
            endpoint = %config.nats_url,
            stream = %config.stream_name,
            "Starting order pipeline"
        );
        let broker = InMemoryBroker::new(config.ack_wait(), config.max_deliver);
        broker
            .add_stream(StreamConfig::new(&config.stream_name, &[ORDERS_SUBJECTS]))
            .await?;
        broker
            .add_stream(StreamConfig::new(&config.dlq_stream_name, &[DLQ_SUBJECTS]))
            .await?;

        let stores = build_stores(config)?;
        let coordinator = Arc::new(
            DeliveryCoordinator::new(
                Box::new(OrderManager::new(stores.service_repo)),
                stores.tracker,
                EventEmitter::new(Arc::new(broker.clone())),
            )
            .with_encoding(config.encoding)
            .with_max_deliver(config.max_deliver)
            .with_lock_shards(config.lock_shards),
        );

        let listener = OrderListener::new(
            Arc::new(broker.clone()),
            coordinator.clone(),
            config.queue_group.clone(),
            config.workers,
        )
        .start()
        .await?;

        Ok(Self {
            broker,
            coordinator,
            orders: stores.view_repo,
            listener,
        })
    }

    pub fn broker(&self) -> &InMemoryBroker {
        &self.broker
    }

    pub fn coordinator(&self) -> &DeliveryCoordinator {
        &self.coordinator
    }

    /// Publishes and waits until the pipeline has settled every delivery.
    pub async fn publish_and_settle(&self, subject: &str, payload: Vec<u8>) -> Result<PublishAck> {
        let ack = self.broker.publish(subject, payload).await?;
        self.broker.wait_idle().await;
        Ok(ack)
    }

    /// All stored orders, sorted by id.
    pub async fn orders(&self) -> Result<Vec<Order>> {
        let mut orders = self.orders.all_orders().await?;
        orders.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(orders)
    }

    /// Creates `order-101` through the transport, processes it by direct
    /// invocation, then redelivers the created message twice.
    pub async fn run_demo(&self) -> Result<DemoReport> {
        let id = "order-101";
        let payload = match self.coordinator.encoding() {
            PayloadEncoding::Json => serde_json::to_vec(&serde_json::json!({
                "id": id,
                "items": ["a", "b"],
                "status": "",
            }))?,
            PayloadEncoding::RawId => id.as_bytes().to_vec(),
        };

        self.publish_and_settle(SUBJECT_CREATED, payload.clone()).await?;
        let (processed, event) = match self.coordinator.process_order(id).await? {
            ProcessOutcome::Processed { order, event } => (order, event?),
            ProcessOutcome::Duplicate => {
                return Err(OrderError::InvalidTransition {
                    id: id.to_string(),
                    current: self.coordinator.get_order(id).await?.status,
                });
            }
        };

        for _ in 0..2 {
            self.publish_and_settle(SUBJECT_CREATED, payload.clone()).await?;
        }

        Ok(DemoReport {
            processed,
            event,
            orders: self.orders().await?,
        })
    }

    pub async fn shutdown(self) {
        self.broker.wait_idle().await;
        self.listener.shutdown().await;
        info!("Order pipeline stopped");
    }
}
