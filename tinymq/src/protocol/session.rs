use bytes::Bytes;
use log::trace;
use tokio::sync::mpsc::UnboundedSender;

use crate::packet::Packet;

/// The broker-side record of one authenticated connection. The session id is
/// the connection's identity; it tells apart two sessions that presented the
/// same client id.
#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) session_id: u64,
    pub(crate) client_id: Bytes,
    conn_tx: UnboundedSender<Packet>,
}

impl Session {
    pub(crate) fn new(session_id: u64, client_id: Bytes, conn_tx: UnboundedSender<Packet>) -> Self {
        Self {
            session_id,
            client_id,
            conn_tx,
        }
    }

    /// Queues a packet on the session's connection. The connection task
    /// writes queued packets in order, so frames are never interleaved.
    pub(crate) fn send_packet(&self, packet: Packet) {
        if self.conn_tx.send(packet).is_err() {
            // The connection is already gone; its Disconnect is on the way.
            trace!(
                "dropping packet for closed session {}",
                String::from_utf8_lossy(&self.client_id)
            );
        }
    }
}
