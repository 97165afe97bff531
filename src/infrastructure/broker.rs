use crate::domain::delivery::{Acknowledger, Delivery, DeliveryStream, Disposition, PublishAck};
use crate::domain::ports::{Publisher, Subscriber};
use crate::error::{OrderError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

const SUBSCRIPTION_BUFFER: usize = 256;

/// A stream bound to one or more subject patterns (`*` matches one token,
/// `>` matches the remaining tokens).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub name: String,
    pub subjects: Vec<String>,
}

impl StreamConfig {
    pub fn new(name: impl Into<String>, subjects: &[&str]) -> Self {
        Self {
            name: name.into(),
            subjects: subjects.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub sequence: u64,
    pub subject: String,
    pub payload: Vec<u8>,
    pub message_id: Option<String>,
}

struct Stream {
    config: StreamConfig,
    messages: Vec<Arc<StoredMessage>>,
}

struct Consumer {
    filter: String,
    members: Vec<mpsc::Sender<Delivery>>,
    next: usize,
}

#[derive(Default)]
struct BrokerState {
    streams: Vec<Stream>,
    consumers: HashMap<String, Consumer>,
}

struct Inner {
    state: Mutex<BrokerState>,
    ack_wait: Duration,
    max_deliver: u32,
    pending: AtomicUsize,
    idle: Notify,
    next_subscription: AtomicU64,
}

/// In-process message log with manual acknowledgement.
///
/// Messages are appended to the stream whose subjects match, then handed to
/// every consumer whose filter matches. Consumers that share a queue group
/// receive one copy per message, distributed round-robin. A delivery that is
/// nak'd, or that gets no disposition within `ack_wait`, is redelivered with
/// an incremented attempt until `max_deliver` is reached.
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl InMemoryBroker {
    pub fn new(ack_wait: Duration, max_deliver: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(BrokerState::default()),
                ack_wait,
                max_deliver: max_deliver.max(1),
                pending: AtomicUsize::new(0),
                idle: Notify::new(),
                next_subscription: AtomicU64::new(1),
            }),
        }
    }

    /// Creates the stream, or updates its subjects if it already exists.
    pub async fn add_stream(&self, config: StreamConfig) -> Result<()> {
        let mut state = self.inner.state.lock().await;

        let overlap = state
            .streams
            .iter()
            .filter(|s| s.config.name != config.name)
            .flat_map(|s| s.config.subjects.iter())
            .find(|existing| {
                config
                    .subjects
                    .iter()
                    .any(|subject| patterns_overlap(existing, subject))
            });
        if let Some(subject) = overlap {
            return Err(OrderError::Transport(format!(
                "subjects overlap with an existing stream: {subject}"
            )));
        }

        if let Some(stream) = state.streams.iter_mut().find(|s| s.config.name == config.name) {
            warn!(stream = %config.name, "Stream already exists, updating subjects");
            stream.config.subjects = config.subjects;
            return Ok(());
        }

        debug!(stream = %config.name, subjects = ?config.subjects, "Stream created");
        state.streams.push(Stream {
            config,
            messages: Vec::new(),
        });
        Ok(())
    }

    /// Publishes with a publisher-assigned message id, surfaced to consumers
    /// through `Delivery::message_id`.
    pub async fn publish_with_id(
        &self,
        subject: &str,
        payload: Vec<u8>,
        message_id: Option<String>,
    ) -> Result<PublishAck> {
        let (ack, message, targets) = {
            let mut state = self.inner.state.lock().await;
            let stream = state
                .streams
                .iter_mut()
                .find(|s| s.config.subjects.iter().any(|p| subject_matches(p, subject)))
                .ok_or_else(|| {
                    OrderError::Transport(format!("no stream matches subject {subject}"))
                })?;

            let sequence = stream.messages.len() as u64 + 1;
            let message = Arc::new(StoredMessage {
                sequence,
                subject: subject.to_string(),
                payload,
                message_id,
            });
            stream.messages.push(message.clone());
            let ack = PublishAck {
                stream: stream.config.name.clone(),
                sequence,
            };

            let targets: Vec<String> = state
                .consumers
                .iter()
                .filter(|(_, c)| subject_matches(&c.filter, subject))
                .map(|(key, _)| key.clone())
                .collect();
            (ack, message, targets)
        };

        for key in targets {
            self.dispatch(key, message.clone());
        }
        Ok(ack)
    }

    /// Snapshot of the messages stored in a stream.
    pub async fn messages(&self, stream: &str) -> Vec<StoredMessage> {
        let state = self.inner.state.lock().await;
        state
            .streams
            .iter()
            .find(|s| s.config.name == stream)
            .map(|s| s.messages.iter().map(|m| (**m).clone()).collect())
            .unwrap_or_default()
    }

    /// Number of (message, consumer) pairs not yet acked, terminated, or
    /// given up on.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Waits until every dispatched message has reached a final outcome.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            // Registered before the check so a settle in between is not missed.
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn dispatch(&self, consumer: String, message: Arc<StoredMessage>) {
        self.inner.pending.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.clone();
        tokio::spawn(async move {
            deliver_until_settled(&inner, &consumer, &message).await;
            if inner.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                inner.idle.notify_waiters();
            }
        });
    }
}

async fn pick_member(inner: &Inner, consumer: &str) -> Option<mpsc::Sender<Delivery>> {
    let mut state = inner.state.lock().await;
    let consumer = state.consumers.get_mut(consumer)?;
    consumer.members.retain(|m| !m.is_closed());
    if consumer.members.is_empty() {
        return None;
    }
    let index = consumer.next % consumer.members.len();
    consumer.next = consumer.next.wrapping_add(1);
    Some(consumer.members[index].clone())
}

async fn deliver_until_settled(inner: &Inner, consumer: &str, message: &StoredMessage) {
    let mut attempt = 1;
    loop {
        let Some(member) = pick_member(inner, consumer).await else {
            debug!(consumer, sequence = message.sequence, "No live subscriber, message left in stream");
            return;
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let delivery = Delivery::new(
            message.subject.clone(),
            message.payload.clone(),
            attempt,
            message.message_id.clone(),
            Box::new(BrokerAcker {
                reply: Mutex::new(Some(reply_tx)),
            }),
        );
        let deadline = Instant::now() + inner.ack_wait;
        if member.send(delivery).await.is_err() {
            // Subscriber went away between pick and send; try another one.
            continue;
        }

        let outcome = match tokio::time::timeout_at(deadline, reply_rx).await {
            Ok(Ok(disposition)) => Some(disposition),
            Ok(Err(_)) => {
                // Dropped without a disposition: stays pending until ack_wait.
                tokio::time::sleep_until(deadline).await;
                None
            }
            Err(_) => None,
        };

        match outcome {
            Some(Disposition::Ack) | Some(Disposition::Term) => return,
            Some(Disposition::Nak) | None => {
                if attempt >= inner.max_deliver {
                    warn!(
                        subject = %message.subject,
                        sequence = message.sequence,
                        attempt,
                        "Maximum deliveries reached, giving up on message"
                    );
                    return;
                }
                attempt += 1;
            }
        }
    }
}

struct BrokerAcker {
    reply: Mutex<Option<oneshot::Sender<Disposition>>>,
}

#[async_trait]
impl Acknowledger for BrokerAcker {
    async fn respond(&self, disposition: Disposition) -> Result<()> {
        let reply = self.reply.lock().await.take().ok_or_else(|| {
            OrderError::Transport("delivery already acknowledged".to_string())
        })?;
        reply.send(disposition).map_err(|_| {
            OrderError::Transport("ack wait expired, message is being redelivered".to_string())
        })
    }
}

#[async_trait]
impl Publisher for InMemoryBroker {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<PublishAck> {
        self.publish_with_id(subject, payload, None).await
    }
}

#[async_trait]
impl Subscriber for InMemoryBroker {
    async fn subscribe(
        &self,
        subject: &str,
        queue_group: Option<&str>,
    ) -> Result<DeliveryStream> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let key = match queue_group {
            Some(group) => format!("{group}@{subject}"),
            None => format!(
                "_sub.{}@{subject}",
                self.inner.next_subscription.fetch_add(1, Ordering::SeqCst)
            ),
        };

        let backlog = {
            let mut state = self.inner.state.lock().await;
            if let Some(consumer) = state.consumers.get_mut(&key) {
                consumer.members.push(tx);
                Vec::new()
            } else {
                let backlog: Vec<Arc<StoredMessage>> = state
                    .streams
                    .iter()
                    .flat_map(|s| s.messages.iter())
                    .filter(|m| subject_matches(subject, &m.subject))
                    .cloned()
                    .collect();
                state.consumers.insert(
                    key.clone(),
                    Consumer {
                        filter: subject.to_string(),
                        members: vec![tx],
                        next: 0,
                    },
                );
                backlog
            }
        };

        for message in backlog {
            self.dispatch(key.clone(), message);
        }
        debug!(subject, consumer = %key, "Subscribed");
        Ok(rx)
    }
}

/// Whether two subject patterns can match a common subject.
pub fn patterns_overlap(a: &str, b: &str) -> bool {
    let mut a_tokens = a.split('.');
    let mut b_tokens = b.split('.');
    loop {
        match (a_tokens.next(), b_tokens.next()) {
            (None, None) => return true,
            (Some(">"), Some(_)) | (Some(_), Some(">")) => return true,
            (Some(x), Some(y)) if x == "*" || y == "*" || x == y => {}
            _ => return false,
        }
    }
}

/// Token-wise subject match: `*` matches exactly one token, a trailing `>`
/// matches one or more remaining tokens.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut subject_tokens = subject.split('.');
    for token in pattern.split('.') {
        match (token, subject_tokens.next()) {
            (">", Some(_)) => return true,
            ("*", Some(_)) => {}
            (literal, Some(actual)) if literal == actual => {}
            _ => return false,
        }
    }
    subject_tokens.next().is_none()
}
