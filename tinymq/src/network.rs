//! Network layer: socket ownership, framing and the per-connection event
//! loop. Protocol state that spans connections lives in the router.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::{
    net::TcpStream,
    select,
    sync::{
        broadcast,
        mpsc::{self, error::SendError, Sender, UnboundedReceiver, UnboundedSender},
    },
};

pub(crate) use conn::ClientConnection;

use crate::{
    packet::{self, Connect, Packet, Publish, Subscribe, Unsubscribe},
    protocol::Incoming,
    EventSink, Severity,
};

pub(crate) mod conn;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Packet error: {0}")]
    Packet(#[from] packet::Error),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection closed by peer")]
    ConnectionAborted,
    #[error("Connection reset by peer")]
    ConnectionReset,
    #[error("CONN with empty client id")]
    EmptyClientId,
    #[error("Send message to router error: {0}")]
    SendIncoming(#[from] SendError<Incoming>),
}

/// One task per accepted connection. Owns the socket and the session-local
/// state (client id, authenticated flag); being the only accessor, none of it
/// needs locking. Outbound packets from the router arrive on `conn_rx` and are
/// written by this task alone, so writes on a session are never interleaved.
pub(crate) struct ClientEventLoop {
    session_id: u64,
    peer: SocketAddr,
    conn: ClientConnection,
    router_tx: Sender<Incoming>,
    conn_tx: UnboundedSender<Packet>,
    conn_rx: UnboundedReceiver<Packet>,
    detached: bool,
    shutdown_rx: broadcast::Receiver<()>,
    sink: Arc<dyn EventSink>,
    client_id: Bytes,
    authenticated: bool,
}

impl ClientEventLoop {
    pub(crate) fn new(
        session_id: u64,
        stream: TcpStream,
        peer: SocketAddr,
        router_tx: Sender<Incoming>,
        shutdown_rx: broadcast::Receiver<()>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let (conn_tx, conn_rx) = mpsc::unbounded_channel();
        Self {
            session_id,
            peer,
            conn: ClientConnection::new(stream),
            router_tx,
            conn_tx,
            conn_rx,
            detached: false,
            shutdown_rx,
            sink,
            client_id: Bytes::new(),
            authenticated: false,
        }
    }

    /// Runs the session to completion and tells the router to drop its
    /// registration afterwards. A clean EOF is a normal exit.
    pub(crate) async fn start(mut self) -> Result<(), Error> {
        let result = self.run().await;
        if self.authenticated {
            // Best effort: during shutdown the router may already be gone.
            let _ = self
                .router_tx
                .send(Incoming::Disconnect {
                    session_id: self.session_id,
                    client_id: self.client_id.clone(),
                })
                .await;
        }
        result
    }

    async fn run(&mut self) -> Result<(), Error> {
        loop {
            select! {
                // Frames from the socket.
                res = self.conn.read_packet() => match res {
                    Ok(packet) => self.handle_packet(packet).await?,
                    Err(Error::Packet(packet::Error::MalformedPublish)) => {
                        self.sink.event(
                            Severity::Warning,
                            "Session",
                            &format!(
                                "Discarding malformed PUB from {}",
                                String::from_utf8_lossy(&self.client_id),
                            ),
                        );
                    }
                    Err(Error::ConnectionAborted) => {
                        self.sink.event(
                            Severity::Info,
                            "Session",
                            &format!("Client disconnected: {}", self.describe()),
                        );
                        return Ok(());
                    }
                    Err(e) => {
                        self.sink.event(
                            Severity::Error,
                            "Session",
                            &format!("Read error on {}: {e}", self.describe()),
                        );
                        return Err(e);
                    }
                },
                // Replies and fan-out from the router.
                recv = self.conn_rx.recv(), if !self.detached => match recv {
                    Some(packet) => self.conn.write_packet(&packet).await?,
                    // All senders dropped; stop polling the queue but keep
                    // serving reads until the socket dies.
                    None => self.detached = true,
                },
                _ = self.shutdown_rx.recv() => return Ok(()),
            }
        }
    }

    async fn handle_packet(&mut self, packet: Packet) -> Result<(), Error> {
        match packet {
            Packet::Connect(connect) => self.handle_connect(connect).await,
            Packet::Publish(publish) => self.handle_publish(publish).await,
            Packet::Subscribe(subscribe) => self.handle_subscribe(subscribe).await,
            Packet::Unsubscribe(unsubscribe) => self.handle_unsubscribe(unsubscribe).await,
            Packet::Unsupported { packet_type } => {
                self.sink.event(
                    Severity::Warning,
                    "Session",
                    &format!("Received unsupported packet type: 0x{packet_type:02X}"),
                );
                Ok(())
            }
            _ => {
                self.sink.event(
                    Severity::Warning,
                    "Session",
                    "Ignoring unexpected acknowledgement packet",
                );
                Ok(())
            }
        }
    }

    async fn handle_connect(&mut self, connect: Connect) -> Result<(), Error> {
        if connect.client_id.is_empty() {
            self.sink.event(
                Severity::Error,
                "Session",
                "Invalid CONN packet (empty client id)",
            );
            return Err(Error::EmptyClientId);
        }

        if self.authenticated && connect.client_id != self.client_id {
            // A second CONN under a new id retires the old registration first.
            self.router_tx
                .send(Incoming::Disconnect {
                    session_id: self.session_id,
                    client_id: self.client_id.clone(),
                })
                .await?;
        }

        self.client_id = connect.client_id;
        self.authenticated = true;
        self.sink.event(
            Severity::Success,
            "Session",
            &format!("Client connected: {}", self.describe()),
        );

        // The router registers the session and replies CONNACK through the
        // session's queue.
        self.router_tx
            .send(Incoming::Connect {
                session_id: self.session_id,
                client_id: self.client_id.clone(),
                conn_tx: self.conn_tx.clone(),
            })
            .await?;
        Ok(())
    }

    async fn handle_publish(&mut self, publish: Publish) -> Result<(), Error> {
        if !self.authenticated {
            self.sink.event(
                Severity::Warning,
                "Session",
                "Unauthenticated client trying to publish",
            );
            return Ok(());
        }

        self.sink.event(
            Severity::Outgoing,
            "Session",
            &format!(
                "Client {} published to topic '{}': {}",
                String::from_utf8_lossy(&self.client_id),
                String::from_utf8_lossy(&publish.topic),
                preview(&publish.message),
            ),
        );

        self.router_tx
            .send(Incoming::Publish {
                client_id: self.client_id.clone(),
                topic: publish.topic,
                message: publish.message,
                conn_tx: self.conn_tx.clone(),
            })
            .await?;
        Ok(())
    }

    async fn handle_subscribe(&mut self, subscribe: Subscribe) -> Result<(), Error> {
        if !self.authenticated {
            self.sink.event(
                Severity::Warning,
                "Session",
                "Unauthenticated client trying to subscribe",
            );
            return Ok(());
        }
        if subscribe.topic.is_empty() {
            return Ok(());
        }

        self.sink.event(
            Severity::Info,
            "Session",
            &format!(
                "Client {} subscribing to topic: {}",
                String::from_utf8_lossy(&self.client_id),
                String::from_utf8_lossy(&subscribe.topic),
            ),
        );

        self.router_tx
            .send(Incoming::Subscribe {
                session_id: self.session_id,
                client_id: self.client_id.clone(),
                topic: subscribe.topic,
                conn_tx: self.conn_tx.clone(),
            })
            .await?;
        Ok(())
    }

    async fn handle_unsubscribe(&mut self, unsubscribe: Unsubscribe) -> Result<(), Error> {
        if !self.authenticated {
            self.sink.event(
                Severity::Warning,
                "Session",
                "Unauthenticated client trying to unsubscribe",
            );
            return Ok(());
        }
        if unsubscribe.topic.is_empty() {
            return Ok(());
        }

        self.sink.event(
            Severity::Info,
            "Session",
            &format!(
                "Client {} unsubscribing from topic: {}",
                String::from_utf8_lossy(&self.client_id),
                String::from_utf8_lossy(&unsubscribe.topic),
            ),
        );

        self.router_tx
            .send(Incoming::Unsubscribe {
                session_id: self.session_id,
                client_id: self.client_id.clone(),
                topic: unsubscribe.topic,
                conn_tx: self.conn_tx.clone(),
            })
            .await?;
        Ok(())
    }

    fn describe(&self) -> String {
        if self.client_id.is_empty() {
            self.peer.to_string()
        } else {
            format!("{} ({})", String::from_utf8_lossy(&self.client_id), self.peer)
        }
    }
}

/// Printable preview of a message payload for log lines, capped at 20 bytes.
pub(crate) fn preview(payload: &[u8]) -> String {
    let mut out: String = payload
        .iter()
        .take(20)
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '?'
            }
        })
        .collect();
    if payload.len() > 20 {
        out.push_str("...");
    }
    out
}
