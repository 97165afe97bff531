use crate::error::{OrderError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of an order.
///
/// Transitions are one-directional: `Created -> Processed`. `Processed` is
/// terminal.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Created,
    Processed,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Created => write!(f, "created"),
            OrderStatus::Processed => write!(f, "processed"),
        }
    }
}

/// An order entity. Items are opaque to the pipeline.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Order {
    pub id: String,
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default)]
    pub status: OrderStatus,
}

impl Order {
    /// Builds a freshly created order, rejecting an empty id.
    pub fn new(id: impl Into<String>, items: Vec<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(OrderError::InvalidOrder(
                "order ID must not be empty".to_string(),
            ));
        }
        Ok(Self {
            id,
            items,
            status: OrderStatus::Created,
        })
    }

    /// Applies the `process` event: `Created -> Processed`.
    ///
    /// Any other starting status is rejected with `InvalidTransition`, which
    /// makes reprocessing a guard failure instead of a silent repeat.
    pub fn process(&mut self) -> Result<()> {
        match self.status {
            OrderStatus::Created => {
                self.status = OrderStatus::Processed;
                Ok(())
            }
            current => Err(OrderError::InvalidTransition {
                id: self.id.clone(),
                current,
            }),
        }
    }
}
