use super::emitter::EventEmitter;
use super::locks::ShardedLocks;
use super::service::OrderServiceBox;
use crate::config::{SUBJECT_CREATED, SUBJECT_PROCESS};
use crate::domain::delivery::{Delivery, Disposition, PublishAck};
use crate::domain::order::Order;
use crate::domain::ports::IdempotencyTrackerBox;
use crate::error::{OrderError, Result};
use crate::interfaces::codec::PayloadEncoding;
use tracing::{debug, error, info, warn};

/// Outcome of applying a create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(Order),
    /// Already applied earlier; nothing was changed.
    Duplicate,
}

/// Outcome of applying a process transition.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// The transition was committed. `event` reports the notification, whose
    /// failure does not undo the transition.
    Processed {
        order: Order,
        event: Result<PublishAck>,
    },
    /// Already applied earlier; nothing was changed or emitted.
    Duplicate,
}

/// Idempotency key for an operation: the transport's message id when present,
/// otherwise the operation name joined with the order id.
pub fn idempotency_key(operation: &str, order_id: &str, message_id: Option<&str>) -> String {
    match message_id {
        Some(id) => format!("{operation}:msg:{id}"),
        None => format!("{operation}:{order_id}"),
    }
}

/// Turns inbound deliveries into state transitions and decides each
/// delivery's disposition.
///
/// For a given order id, the span from the idempotency check through the
/// store mutation, the event emission and the idempotency mark runs under one
/// per-id lock, so concurrent or redelivered messages for the same order are
/// applied at most once.
pub struct DeliveryCoordinator {
    service: OrderServiceBox,
    tracker: IdempotencyTrackerBox,
    emitter: EventEmitter,
    locks: ShardedLocks,
    encoding: PayloadEncoding,
    max_deliver: u32,
}

impl DeliveryCoordinator {
    pub const DEFAULT_MAX_DELIVER: u32 = 5;

    pub fn new(
        service: OrderServiceBox,
        tracker: IdempotencyTrackerBox,
        emitter: EventEmitter,
    ) -> Self {
        Self {
            service,
            tracker,
            emitter,
            locks: ShardedLocks::default(),
            encoding: PayloadEncoding::default(),
            max_deliver: Self::DEFAULT_MAX_DELIVER,
        }
    }

    pub fn with_encoding(mut self, encoding: PayloadEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Delivery attempt at which a retriable failure is dead-lettered and
    /// terminated instead of nak'd.
    pub fn with_max_deliver(mut self, max_deliver: u32) -> Self {
        self.max_deliver = max_deliver.max(1);
        self
    }

    pub fn with_lock_shards(mut self, shards: usize) -> Self {
        self.locks = ShardedLocks::new(shards);
        self
    }

    pub fn encoding(&self) -> PayloadEncoding {
        self.encoding
    }

    pub async fn get_order(&self, id: &str) -> Result<Order> {
        self.service.get_order(id).await
    }

    /// Applies a create with the default idempotency key.
    pub async fn create_order(&self, order: Order) -> Result<CreateOutcome> {
        let key = idempotency_key("created", &order.id, None);
        self.create_with_key(order, &key).await
    }

    /// Applies `created -> processed` and emits the processed event, with the
    /// default idempotency key.
    pub async fn process_order(&self, id: &str) -> Result<ProcessOutcome> {
        let key = idempotency_key("processed", id, None);
        self.process_with_key(id, &key).await
    }

    async fn create_with_key(&self, order: Order, key: &str) -> Result<CreateOutcome> {
        let _guard = self.locks.lock(&order.id).await;

        if self.tracker.is_processed(key).await? {
            debug!(order_id = %order.id, key, "Create already applied");
            return Ok(CreateOutcome::Duplicate);
        }

        match self.service.create_order(order).await {
            Ok(order) => {
                self.tracker.mark_processed(key).await?;
                Ok(CreateOutcome::Created(order))
            }
            Err(OrderError::AlreadyExists(id)) => {
                debug!(order_id = %id, key, "Order already exists, treating create as duplicate");
                self.tracker.mark_processed(key).await?;
                Ok(CreateOutcome::Duplicate)
            }
            Err(e) => Err(e),
        }
    }

    async fn process_with_key(&self, id: &str, key: &str) -> Result<ProcessOutcome> {
        let _guard = self.locks.lock(id).await;

        if self.tracker.is_processed(key).await? {
            debug!(order_id = %id, key, "Process already applied");
            return Ok(ProcessOutcome::Duplicate);
        }

        let order = self.service.process_order(id).await?;
        // The transition is committed; the mark comes last so that a failure
        // before it leaves the state machine precondition as the guard.
        let event = self.emitter.publish_order_processed(&order).await;
        self.tracker.mark_processed(key).await?;
        Ok(ProcessOutcome::Processed { order, event })
    }

    /// Handles one delivery and reports exactly one disposition for it.
    pub async fn handle(&self, delivery: Delivery) -> Disposition {
        let (order_id, result) = match delivery.subject() {
            SUBJECT_CREATED => self.handle_created(&delivery).await,
            SUBJECT_PROCESS => self.handle_process(&delivery).await,
            other => (
                None,
                Err(OrderError::InvalidOrder(format!(
                    "no handler for subject {other}"
                ))),
            ),
        };
        self.settle(delivery, order_id, result).await
    }

    async fn handle_created(&self, delivery: &Delivery) -> (Option<String>, Result<&'static str>) {
        let order = match self.encoding.decode_order(delivery.payload()) {
            Ok(order) => order,
            Err(e) => return (None, Err(e)),
        };
        let id = order.id.clone();
        let key = idempotency_key("created", &id, delivery.message_id());
        let result = self.create_with_key(order, &key).await.map(|outcome| match outcome {
            CreateOutcome::Created(_) => "order created",
            CreateOutcome::Duplicate => "duplicate create, already applied",
        });
        (Some(id), result)
    }

    async fn handle_process(&self, delivery: &Delivery) -> (Option<String>, Result<&'static str>) {
        let id = match self.encoding.decode_order_id(delivery.payload()) {
            Ok(id) => id,
            Err(e) => return (None, Err(e)),
        };
        let key = idempotency_key("processed", &id, delivery.message_id());
        let result = self.process_with_key(&id, &key).await.map(|outcome| match outcome {
            ProcessOutcome::Processed { event: Ok(_), .. } => "order processed",
            ProcessOutcome::Processed { event: Err(_), .. } => {
                "order processed, event publish failed"
            }
            ProcessOutcome::Duplicate => "duplicate process, already applied",
        });
        (Some(id), result)
    }

    async fn settle(
        &self,
        delivery: Delivery,
        order_id: Option<String>,
        result: Result<&'static str>,
    ) -> Disposition {
        let order_id = order_id.unwrap_or_else(|| "-".to_string());
        let subject = delivery.subject().to_string();
        let attempt = delivery.attempt();

        let (mut disposition, reason) = match &result {
            Ok(reason) => (Disposition::Ack, reason.to_string()),
            Err(e) => (e.disposition(), e.to_string()),
        };

        if disposition == Disposition::Nak && attempt >= self.max_deliver {
            match self
                .emitter
                .publish_dead_letter(&subject, delivery.payload())
                .await
            {
                Ok(ack) => {
                    warn!(
                        order_id = %order_id,
                        subject = %subject,
                        attempt,
                        dlq_sequence = ack.sequence,
                        "Retry budget exhausted, message dead-lettered"
                    );
                    disposition = Disposition::Term;
                }
                Err(e) => {
                    error!(order_id = %order_id, subject = %subject, error = %e, "Failed to dead-letter message");
                }
            }
        }

        match disposition {
            Disposition::Ack => {
                info!(order_id = %order_id, subject = %subject, attempt, %disposition, reason = %reason, "Message settled")
            }
            Disposition::Nak => {
                warn!(order_id = %order_id, subject = %subject, attempt, %disposition, reason = %reason, "Message settled")
            }
            Disposition::Term => {
                warn!(order_id = %order_id, subject = %subject, attempt, %disposition, reason = %reason, "Message settled")
            }
        }

        if let Err(e) = delivery.dispose(disposition).await {
            error!(order_id = %order_id, subject = %subject, %disposition, error = %e, "Failed to report disposition");
        }
        disposition
    }
}
