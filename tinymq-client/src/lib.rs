//! Client library for the TinyMQ publish/subscribe broker.
//!
//! [`Client`] mirrors the broker's session contract: it connects with a
//! client id, subscribes handlers to topics, publishes byte payloads, and
//! runs a background read loop that dispatches incoming messages.

pub use client::{Client, MessageHandler};
pub use error::Error;

mod client;
mod error;
