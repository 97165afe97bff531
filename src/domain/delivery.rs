use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;

/// Terminal outcome a consumer reports for one delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    /// Processed (or recognized as a duplicate); never redeliver.
    Ack,
    /// Request redelivery.
    Nak,
    /// Discard without redelivery.
    Term,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::Ack => write!(f, "ack"),
            Disposition::Nak => write!(f, "nak"),
            Disposition::Term => write!(f, "term"),
        }
    }
}

/// Receipt returned by the transport for a published message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishAck {
    pub stream: String,
    pub sequence: u64,
}

/// Transport-side half of a delivery: forwards the consumer's disposition.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn respond(&self, disposition: Disposition) -> Result<()>;
}

/// A message handed to a consumer.
///
/// `ack`, `nak` and `term` consume the delivery, so exactly one disposition
/// can be reported for it.
pub struct Delivery {
    subject: String,
    payload: Vec<u8>,
    attempt: u32,
    message_id: Option<String>,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(
        subject: impl Into<String>,
        payload: Vec<u8>,
        attempt: u32,
        message_id: Option<String>,
        acker: Box<dyn Acknowledger>,
    ) -> Self {
        Self {
            subject: subject.into(),
            payload,
            attempt,
            message_id,
            acker,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// 1-based delivery attempt; greater than 1 for redeliveries.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Publisher-assigned message id, when the transport carries one.
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub async fn ack(self) -> Result<()> {
        self.dispose(Disposition::Ack).await
    }

    pub async fn nak(self) -> Result<()> {
        self.dispose(Disposition::Nak).await
    }

    pub async fn term(self) -> Result<()> {
        self.dispose(Disposition::Term).await
    }

    pub async fn dispose(self, disposition: Disposition) -> Result<()> {
        self.acker.respond(disposition).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("subject", &self.subject)
            .field("attempt", &self.attempt)
            .field("message_id", &self.message_id)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// Stream of deliveries for one subscription.
pub type DeliveryStream = mpsc::Receiver<Delivery>;
