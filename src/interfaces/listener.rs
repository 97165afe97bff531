use crate::application::coordinator::DeliveryCoordinator;
use crate::config::{SUBJECT_CREATED, SUBJECT_PROCESS};
use crate::domain::ports::SubscriberRef;
use crate::error::Result;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Inbound adapter: a pool of competing consumers feeding the coordinator.
pub struct OrderListener {
    subscriber: SubscriberRef,
    coordinator: Arc<DeliveryCoordinator>,
    queue_group: String,
    workers: usize,
}

impl OrderListener {
    pub fn new(
        subscriber: SubscriberRef,
        coordinator: Arc<DeliveryCoordinator>,
        queue_group: impl Into<String>,
        workers: usize,
    ) -> Self {
        Self {
            subscriber,
            coordinator,
            queue_group: queue_group.into(),
            workers: workers.max(1),
        }
    }

    /// Subscribes `workers` consumers per subject in the queue group, each
    /// running in its own task.
    pub async fn start(self) -> Result<ListenerHandle> {
        let mut tasks = JoinSet::new();
        for subject in [SUBJECT_CREATED, SUBJECT_PROCESS] {
            for worker in 0..self.workers {
                let mut deliveries = self
                    .subscriber
                    .subscribe(subject, Some(self.queue_group.as_str()))
                    .await?;
                let coordinator = self.coordinator.clone();
                tasks.spawn(async move {
                    while let Some(delivery) = deliveries.recv().await {
                        coordinator.handle(delivery).await;
                    }
                    debug!(subject, worker, "Subscription closed");
                });
            }
            info!(
                subject,
                queue_group = %self.queue_group,
                workers = self.workers,
                "Subscribed to subject"
            );
        }
        Ok(ListenerHandle { tasks })
    }
}

pub struct ListenerHandle {
    tasks: JoinSet<()>,
}

impl ListenerHandle {
    /// Stops all consumers. Deliveries they held go back to the transport
    /// through its redelivery timer.
    pub async fn shutdown(mut self) {
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
    }
}
