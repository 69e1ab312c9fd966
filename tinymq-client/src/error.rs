use tinymq::packet;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("Packet error: {0}")]
    Packet(#[from] packet::Error),
    #[error("Not connected")]
    NotConnected,
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Empty client id")]
    EmptyClientId,
    #[error("Handshake failed: expected CONNACK")]
    HandshakeFailed,
}
