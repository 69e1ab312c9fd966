//! Protocol layer: the router owns the session and subscription registries
//! and serializes every mutation. Connections talk to it through `Incoming`
//! messages and receive replies and fan-out on their per-session queues.

use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;

use crate::packet::Packet;

pub(crate) use router::Router;

mod router;
mod session;

/// Messages from connection event loops to the router. Each carries the
/// connection's identity; operations the router must acknowledge also carry
/// the connection's outbound queue.
#[derive(Debug)]
pub enum Incoming {
    Connect {
        session_id: u64,
        client_id: Bytes,
        conn_tx: UnboundedSender<Packet>,
    },
    Publish {
        client_id: Bytes,
        topic: Bytes,
        message: Bytes,
        conn_tx: UnboundedSender<Packet>,
    },
    Subscribe {
        session_id: u64,
        client_id: Bytes,
        topic: Bytes,
        conn_tx: UnboundedSender<Packet>,
    },
    Unsubscribe {
        session_id: u64,
        client_id: Bytes,
        topic: Bytes,
        conn_tx: UnboundedSender<Packet>,
    },
    Disconnect {
        session_id: u64,
        client_id: Bytes,
    },
}
