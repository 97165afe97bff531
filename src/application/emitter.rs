use crate::config::{DLQ_SUBJECT_PREFIX, SUBJECT_PROCESSED};
use crate::domain::delivery::PublishAck;
use crate::domain::order::Order;
use crate::domain::ports::PublisherRef;
use crate::error::{OrderError, Result};
use tracing::{error, info};

/// Publishes derived order events.
///
/// A failed publish is reported as `PublishFailure` and never undoes the
/// state transition that produced the event.
#[derive(Clone)]
pub struct EventEmitter {
    publisher: PublisherRef,
}

impl EventEmitter {
    pub fn new(publisher: PublisherRef) -> Self {
        Self { publisher }
    }

    pub async fn publish_order_processed(&self, order: &Order) -> Result<PublishAck> {
        let payload = serde_json::to_vec(order)?;
        match self.publisher.publish(SUBJECT_PROCESSED, payload).await {
            Ok(ack) => {
                info!(
                    order_id = %order.id,
                    stream = %ack.stream,
                    sequence = ack.sequence,
                    "Order processed event published"
                );
                Ok(ack)
            }
            Err(e) => {
                error!(order_id = %order.id, error = %e, "Failed to publish order processed event");
                Err(OrderError::PublishFailure {
                    subject: SUBJECT_PROCESSED.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Forwards an undeliverable payload to `dlq.orders.<suffix>`, where the
    /// suffix is the last token of the subject it arrived on.
    pub async fn publish_dead_letter(&self, subject: &str, payload: &[u8]) -> Result<PublishAck> {
        let suffix = subject.rsplit('.').next().unwrap_or(subject);
        let dlq_subject = format!("{DLQ_SUBJECT_PREFIX}{suffix}");
        self.publisher
            .publish(&dlq_subject, payload.to_vec())
            .await
            .map_err(|e| OrderError::PublishFailure {
                subject: dlq_subject,
                reason: e.to_string(),
            })
    }
}
