//! Inbound adapters: payload codecs, the queue-group listener, and the replay
//! file reader used by the CLI.

pub mod codec;
pub mod listener;
pub mod replay;
