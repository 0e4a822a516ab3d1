//! Bidirectional worker channel.
//!
//! The server side accepts WebSocket connections from workers, tracks their
//! liveness and relays proof tasks and replies. The worker side keeps one
//! long-lived connection open, reconnecting with exponential backoff, and
//! executes tasks off the heartbeat path.

pub mod protocol;
pub mod server;
pub mod worker;

pub use server::{handle_socket, ChannelConfig, WorkerPool};
pub use worker::{WorkerConfig, WorkerRuntime};
