use crate::interfaces::codec::PayloadEncoding;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

pub const SUBJECT_CREATED: &str = "orders.created";
pub const SUBJECT_PROCESS: &str = "orders.process";
pub const SUBJECT_PROCESSED: &str = "orders.processed";
pub const ORDERS_SUBJECTS: &str = "orders.*";
pub const DLQ_SUBJECT_PREFIX: &str = "dlq.orders.";
pub const DLQ_SUBJECTS: &str = "dlq.orders.*";

/// Runtime settings. Each flag can also be supplied through the environment.
/// Blank names are rejected.
#[derive(Args, Debug, Clone)]
pub struct AppConfig {
    /// Transport endpoint. Passed through to the transport untouched.
    #[arg(long, env = "NATS_URL", default_value = "nats://localhost:4222", value_parser = non_blank)]
    pub nats_url: String,

    /// Primary stream bound to `orders.*`.
    #[arg(long, env = "NATS_STREAM", default_value = "ORDERS_STREAM", value_parser = non_blank)]
    pub stream_name: String,

    /// Dead-letter stream bound to `dlq.orders.*`.
    #[arg(long, env = "NATS_DLQ_STREAM", default_value = "ORDERS_DLQ", value_parser = non_blank)]
    pub dlq_stream_name: String,

    /// Queue group shared by the competing consumers.
    #[arg(long, env = "QUEUE_GROUP", default_value = "orders-workers", value_parser = non_blank)]
    pub queue_group: String,

    /// Consumers per subscribed subject.
    #[arg(long, env = "WORKERS", default_value_t = 4)]
    pub workers: usize,

    #[arg(long, env = "PAYLOAD_ENCODING", value_enum, default_value_t = PayloadEncoding::Json)]
    pub encoding: PayloadEncoding,

    /// How long a delivery may stay unacknowledged before redelivery.
    #[arg(long, env = "ACK_WAIT_MS", default_value_t = 30_000)]
    pub ack_wait_ms: u64,

    /// Delivery attempts before a message is dead-lettered.
    #[arg(long, env = "MAX_DELIVER", default_value_t = 5)]
    pub max_deliver: u32,

    /// Retention window of idempotency records.
    #[arg(long, env = "DEDUPE_TTL_SECS", default_value_t = 86_400)]
    pub dedupe_ttl_secs: u64,

    /// Maximum idempotency records kept in memory.
    #[arg(long, env = "DEDUPE_CAPACITY", default_value_t = 100_000)]
    pub dedupe_capacity: usize,

    /// Number of per-order lock stripes.
    #[arg(long, env = "LOCK_SHARDS", default_value_t = 64)]
    pub lock_shards: usize,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "DB_PATH")]
    pub db_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn ack_wait(&self) -> Duration {
        Duration::from_millis(self.ack_wait_ms)
    }

    pub fn dedupe_ttl(&self) -> Duration {
        Duration::from_secs(self.dedupe_ttl_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats_url: "nats://localhost:4222".to_string(),
            stream_name: "ORDERS_STREAM".to_string(),
            dlq_stream_name: "ORDERS_DLQ".to_string(),
            queue_group: "orders-workers".to_string(),
            workers: 4,
            encoding: PayloadEncoding::Json,
            ack_wait_ms: 30_000,
            max_deliver: 5,
            dedupe_ttl_secs: 86_400,
            dedupe_capacity: 100_000,
            lock_shards: 64,
            db_path: None,
        }
    }
}

fn non_blank(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err("value must not be blank".to_string())
    } else {
        Ok(trimmed.to_string())
    }
}
