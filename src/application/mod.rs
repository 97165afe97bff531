//! Application layer containing the delivery/acknowledgement orchestration.
//!
//! `DeliveryCoordinator` is the entry point for inbound messages. It drives
//! the `OrderService` state machine under a per-order lock, consults the
//! idempotency tracker, and hands committed transitions to the `EventEmitter`.

pub mod coordinator;
pub mod emitter;
pub mod locks;
pub mod service;
