#![allow(dead_code)]

use async_trait::async_trait;
use orderflow::application::coordinator::DeliveryCoordinator;
use orderflow::application::emitter::EventEmitter;
use orderflow::application::service::OrderManager;
use orderflow::domain::delivery::{Acknowledger, Delivery, Disposition, PublishAck};
use orderflow::domain::order::Order;
use orderflow::domain::ports::{OrderRepository, OrderRepositoryBox, Publisher};
use orderflow::error::{OrderError, Result};
use orderflow::infrastructure::in_memory::{InMemoryIdempotencyTracker, InMemoryOrderRepository};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Publisher that records every publish and can be told to fail.
#[derive(Default)]
pub struct RecordingPublisher {
    pub published: Mutex<Vec<(String, Vec<u8>)>>,
    pub fail: std::sync::atomic::AtomicBool,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        let publisher = Self::default();
        publisher.fail.store(true, Ordering::SeqCst);
        publisher
    }

    pub fn subjects(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(s, _)| s.clone())
            .collect()
    }

    pub fn count(&self, subject: &str) -> usize {
        self.subjects().iter().filter(|s| *s == subject).count()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<PublishAck> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(OrderError::Transport("connection refused".to_string()));
        }
        let mut published = self.published.lock().unwrap();
        published.push((subject.to_string(), payload));
        Ok(PublishAck {
            stream: "ORDERS_STREAM".to_string(),
            sequence: published.len() as u64,
        })
    }
}

/// Acknowledger that records the dispositions it receives.
#[derive(Clone, Default)]
pub struct AckLog(pub Arc<Mutex<Vec<Disposition>>>);

impl AckLog {
    pub fn delivery(&self, subject: &str, payload: &[u8], attempt: u32) -> Delivery {
        Delivery::new(subject, payload.to_vec(), attempt, None, Box::new(self.clone()))
    }

    pub fn dispositions(&self) -> Vec<Disposition> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait]
impl Acknowledger for AckLog {
    async fn respond(&self, disposition: Disposition) -> Result<()> {
        self.0.lock().unwrap().push(disposition);
        Ok(())
    }
}

/// Repository wrapper that counts writes, fails the first `failures` saves,
/// and sleeps after each read to widen check-then-act windows.
#[derive(Clone)]
pub struct InstrumentedRepository {
    inner: InMemoryOrderRepository,
    pub saves: Arc<AtomicUsize>,
    pub updates: Arc<AtomicUsize>,
    failures: Arc<AtomicUsize>,
    read_delay: Duration,
}

impl InstrumentedRepository {
    pub fn new() -> Self {
        Self {
            inner: InMemoryOrderRepository::new(),
            saves: Arc::default(),
            updates: Arc::default(),
            failures: Arc::default(),
            read_delay: Duration::ZERO,
        }
    }

    pub fn failing_saves(self, failures: usize) -> Self {
        self.failures.store(failures, Ordering::SeqCst);
        self
    }

    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }
}

#[async_trait]
impl OrderRepository for InstrumentedRepository {
    async fn save(&self, order: Order) -> Result<()> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(OrderError::Storage("disk unavailable".to_string()));
        }
        self.inner.save(order).await?;
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Order> {
        let found = self.inner.find_by_id(id).await;
        if !self.read_delay.is_zero() {
            tokio::time::sleep(self.read_delay).await;
        }
        found
    }

    async fn update(&self, order: Order) -> Result<()> {
        self.inner.update(order).await?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        self.inner.all_orders().await
    }
}

pub fn coordinator(repo: OrderRepositoryBox, publisher: Arc<RecordingPublisher>) -> DeliveryCoordinator {
    DeliveryCoordinator::new(
        Box::new(OrderManager::new(repo)),
        Box::new(InMemoryIdempotencyTracker::new()),
        EventEmitter::new(publisher),
    )
}

pub fn order_json(id: &str, items: &[&str]) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "id": id,
        "items": items,
        "status": "",
    }))
    .unwrap()
}

/// Writes a replay file creating `rows` orders and processing every other one.
pub fn generate_replay(path: &std::path::Path, rows: usize) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = std::fs::File::create(path)?;
    for i in 1..=rows {
        let created = serde_json::json!({
            "subject": "orders.created",
            "payload": { "id": format!("order-{i}"), "items": ["x"], "status": "" },
        });
        writeln!(file, "{created}")?;
        if i % 2 == 0 {
            let process = serde_json::json!({
                "subject": "orders.process",
                "payload": { "id": format!("order-{i}") },
            });
            writeln!(file, "{process}")?;
        }
    }
    Ok(())
}
