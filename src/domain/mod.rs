//! Domain layer: the order entity, its status transitions, and the ports the
//! application layer drives (stores, idempotency tracking, transport).

pub mod delivery;
pub mod order;
pub mod ports;
