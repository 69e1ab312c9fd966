//! A tiny publish/subscribe message broker over TCP.
//!
//! Clients identify themselves with a string id, subscribe to named topics,
//! and publish byte payloads that are fanned out to every current subscriber
//! of the topic. Delivery is fire-and-forget: no persistence, no retained
//! messages, no quality-of-service levels.

use log::Level;

pub mod broker;
pub mod config;
pub mod error;
mod network;
pub mod packet;
mod protocol;

pub use broker::{Broker, BrokerHandle};
pub use config::Config;

/// Severity attached to every event the broker core emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
    Incoming,
    Outgoing,
    System,
}

impl Severity {
    fn level(self) -> Level {
        match self {
            Severity::Error => Level::Error,
            Severity::Warning => Level::Warn,
            Severity::Incoming | Severity::Outgoing => Level::Debug,
            Severity::Info | Severity::Success | Severity::System => Level::Info,
        }
    }
}

/// Receives every event the broker core emits: a severity, a source tag and
/// the message text. Formatting and timestamps are the sink's business.
pub trait EventSink: Send + Sync + 'static {
    fn event(&self, severity: Severity, source: &str, message: &str);
}

/// Default sink: forwards events to the `log` facade, with the source as the
/// log target.
pub struct LogSink;

impl EventSink for LogSink {
    fn event(&self, severity: Severity, source: &str, message: &str) {
        log::log!(target: source, severity.level(), "{message}");
    }
}

/// Discards every event.
pub struct NoopSink;

impl EventSink for NoopSink {
    fn event(&self, _severity: Severity, _source: &str, _message: &str) {}
}
