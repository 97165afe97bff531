use crate::domain::order::Order;
use crate::error::{OrderError, Result};
use clap::ValueEnum;
use serde::Deserialize;

/// Wire format of inbound order messages, chosen per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PayloadEncoding {
    /// `{"id": "...", "items": [...], "status": "..."}`
    #[default]
    Json,
    /// The bare order id as UTF-8 text.
    RawId,
}

/// Order-created record. `status` is accepted but ignored: a create always
/// starts in `created`. Unknown fields are rejected as ambiguous.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OrderPayload {
    id: String,
    #[serde(default)]
    items: Vec<String>,
    #[serde(default, rename = "status")]
    _status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderRef {
    id: String,
}

impl PayloadEncoding {
    /// Decodes an order-created message into a fresh order.
    ///
    /// A decodable record with an empty id is an `InvalidOrder`, not a
    /// `DecodeFailure`.
    pub fn decode_order(&self, payload: &[u8]) -> Result<Order> {
        match self {
            PayloadEncoding::Json => {
                let record: OrderPayload = serde_json::from_slice(payload)
                    .map_err(|e| OrderError::DecodeFailure(e.to_string()))?;
                Order::new(record.id, record.items)
            }
            PayloadEncoding::RawId => Order::new(decode_raw_id(payload)?, Vec::new()),
        }
    }

    /// Decodes a process message, which names the order to transition.
    ///
    /// JSON deployments accept any order-shaped record and only read `id`.
    pub fn decode_order_id(&self, payload: &[u8]) -> Result<String> {
        let id = match self {
            PayloadEncoding::Json => {
                let record: OrderRef = serde_json::from_slice(payload)
                    .map_err(|e| OrderError::DecodeFailure(e.to_string()))?;
                record.id
            }
            PayloadEncoding::RawId => decode_raw_id(payload)?,
        };
        if id.trim().is_empty() {
            return Err(OrderError::InvalidOrder(
                "order ID must not be empty".to_string(),
            ));
        }
        Ok(id)
    }
}

fn decode_raw_id(payload: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| OrderError::DecodeFailure(format!("payload is not UTF-8: {e}")))?;
    let id = text.trim();
    if id.is_empty() {
        return Err(OrderError::DecodeFailure("empty payload".to_string()));
    }
    if id.chars().any(char::is_whitespace) {
        return Err(OrderError::DecodeFailure(format!(
            "raw order id must be a single token, got {id:?}"
        )));
    }
    if id.starts_with(['{', '[', '"']) {
        return Err(OrderError::DecodeFailure(
            "structured payload received where a raw order id was expected".to_string(),
        ));
    }
    Ok(id.to_string())
}
