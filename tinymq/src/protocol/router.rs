use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc::{Receiver, UnboundedSender};

use crate::{
    config::SessionConfig,
    packet::{ConnAck, Packet, PubAck, Publish, SubAck, UnsubAck},
    EventSink, Severity,
};

use super::{session::Session, Incoming};

/// One topic list entry: the connection's identity plus the queue fan-out
/// writes to.
#[derive(Debug, Clone)]
struct Subscriber {
    session_id: u64,
    conn_tx: UnboundedSender<Packet>,
}

/// Owns the two registries. All handlers run on one task, so every mutation
/// is serialized without locks. No handler blocks on a connection; outbound
/// packets are queued on per-session unbounded channels, so a slow subscriber
/// cannot stall other publishers.
pub(crate) struct Router {
    cfg: SessionConfig,
    router_rx: Receiver<Incoming>,
    /// client id -> the session currently owning that id.
    sessions: HashMap<Bytes, Session>,
    /// topic -> subscribers in subscription order, no duplicates.
    topic_subscribers: HashMap<Bytes, Vec<Subscriber>>,
    sink: Arc<dyn EventSink>,
    /// Next ack id when ack numbering is enabled. Zero is never used; an
    /// absent id is encoded as an empty ack payload.
    next_packet_id: u16,
}

impl Router {
    pub(crate) fn new(
        cfg: SessionConfig,
        sink: Arc<dyn EventSink>,
        router_rx: Receiver<Incoming>,
    ) -> Self {
        Self {
            cfg,
            router_rx,
            sessions: HashMap::new(),
            topic_subscribers: HashMap::new(),
            sink,
            next_packet_id: 1,
        }
    }

    /// Processes registry mutations until every connection and the accept
    /// loop have dropped their senders, then clears both registries.
    pub(crate) async fn start(mut self) {
        while let Some(incoming) = self.router_rx.recv().await {
            self.handle_incoming(incoming);
        }

        self.sessions.clear();
        self.topic_subscribers.clear();
    }

    fn handle_incoming(&mut self, incoming: Incoming) {
        match incoming {
            Incoming::Connect {
                session_id,
                client_id,
                conn_tx,
            } => self.handle_connect(session_id, client_id, conn_tx),
            Incoming::Publish {
                client_id,
                topic,
                message,
                conn_tx,
            } => self.handle_publish(client_id, topic, message, conn_tx),
            Incoming::Subscribe {
                session_id,
                client_id,
                topic,
                conn_tx,
            } => self.handle_subscribe(session_id, client_id, topic, conn_tx),
            Incoming::Unsubscribe {
                session_id,
                client_id,
                topic,
                conn_tx,
            } => self.handle_unsubscribe(session_id, client_id, topic, conn_tx),
            Incoming::Disconnect {
                session_id,
                client_id,
            } => self.handle_disconnect(session_id, client_id),
        }
    }

    /// Registers a session under its client id. A prior session holding the
    /// same id is displaced: dropped from both registries and cut off from
    /// fan-out. Its socket is not closed here; it dies on its own.
    fn handle_connect(
        &mut self,
        session_id: u64,
        client_id: Bytes,
        conn_tx: UnboundedSender<Packet>,
    ) {
        if let Some(old) = self.sessions.get(&client_id) {
            let old_session_id = old.session_id;
            self.sink.event(
                Severity::Warning,
                "Broker",
                &format!(
                    "Client id already in use, disconnecting old session: {}",
                    String::from_utf8_lossy(&client_id)
                ),
            );
            self.remove_subscriptions(old_session_id);
        }

        let session = Session::new(session_id, client_id.clone(), conn_tx);
        self.sessions.insert(client_id.clone(), session);

        let ack = Packet::ConnAck(ConnAck {
            packet_id: self.next_ack_id(),
        });
        self.sessions[&client_id].send_packet(ack);

        self.sink.event(
            Severity::Success,
            "Broker",
            &format!("Session registered: {}", String::from_utf8_lossy(&client_id)),
        );
    }

    /// Fans a message out to the topic's current subscribers, in subscription
    /// order, then acks the publisher. The ack only confirms the broker took
    /// the message; it says nothing about delivery.
    fn handle_publish(
        &mut self,
        _client_id: Bytes,
        topic: Bytes,
        message: Bytes,
        conn_tx: UnboundedSender<Packet>,
    ) {
        match self.topic_subscribers.get(&topic) {
            Some(subscribers) => {
                self.sink.event(
                    Severity::Outgoing,
                    "Topic",
                    &format!(
                        "Publishing to {} subscribers on topic: {}",
                        subscribers.len(),
                        String::from_utf8_lossy(&topic)
                    ),
                );

                let packet = Packet::Publish(Publish {
                    topic: topic.clone(),
                    message,
                });
                for subscriber in subscribers {
                    let _ = subscriber.conn_tx.send(packet.clone());
                }
            }
            None => {
                self.sink.event(
                    Severity::Info,
                    "Topic",
                    &format!("No subscribers for topic: {}", String::from_utf8_lossy(&topic)),
                );
            }
        }

        let _ = conn_tx.send(Packet::PubAck(PubAck {
            packet_id: self.next_ack_id(),
        }));
    }

    /// Appends the session to the topic's subscriber list unless it is
    /// already there. Requests from a connection that is no longer the
    /// registered session for its client id are dropped.
    fn handle_subscribe(
        &mut self,
        session_id: u64,
        client_id: Bytes,
        topic: Bytes,
        conn_tx: UnboundedSender<Packet>,
    ) {
        match self.sessions.get(&client_id) {
            Some(current) if current.session_id == session_id => {
                let subscribers = self.topic_subscribers.entry(topic.clone()).or_default();
                if !subscribers.iter().any(|s| s.session_id == session_id) {
                    subscribers.push(Subscriber {
                        session_id,
                        conn_tx: conn_tx.clone(),
                    });
                    self.sink.event(
                        Severity::Info,
                        "Topic",
                        &format!(
                            "Client {} subscribed to topic: {}",
                            String::from_utf8_lossy(&client_id),
                            String::from_utf8_lossy(&topic)
                        ),
                    );
                }

                let _ = conn_tx.send(Packet::SubAck(SubAck {
                    packet_id: self.next_ack_id(),
                }));
            }
            _ => {
                self.sink.event(
                    Severity::Warning,
                    "Broker",
                    &format!(
                        "Dropping subscribe from displaced session: {}",
                        String::from_utf8_lossy(&client_id)
                    ),
                );
            }
        }
    }

    /// Removes the session from the topic's list; a no-op when it was not
    /// subscribed. Topics left without subscribers are dropped.
    fn handle_unsubscribe(
        &mut self,
        session_id: u64,
        client_id: Bytes,
        topic: Bytes,
        conn_tx: UnboundedSender<Packet>,
    ) {
        if let Some(subscribers) = self.topic_subscribers.get_mut(&topic) {
            subscribers.retain(|s| s.session_id != session_id);
            if subscribers.is_empty() {
                self.topic_subscribers.remove(&topic);
            }
            self.sink.event(
                Severity::Info,
                "Topic",
                &format!(
                    "Client {} unsubscribed from topic: {}",
                    String::from_utf8_lossy(&client_id),
                    String::from_utf8_lossy(&topic)
                ),
            );
        }

        let _ = conn_tx.send(Packet::UnsubAck(UnsubAck {
            packet_id: self.next_ack_id(),
        }));
    }

    /// Drops a closed connection from both registries. The sessions entry is
    /// only removed when it still belongs to this connection; a displaced
    /// session must not erase its replacement.
    fn handle_disconnect(&mut self, session_id: u64, client_id: Bytes) {
        if client_id.is_empty() {
            return;
        }

        if self
            .sessions
            .get(&client_id)
            .map(|s| s.session_id)
            == Some(session_id)
        {
            self.sessions.remove(&client_id);
            self.sink.event(
                Severity::Info,
                "Broker",
                &format!("Session removed: {}", String::from_utf8_lossy(&client_id)),
            );
        }

        self.remove_subscriptions(session_id);
    }

    fn remove_subscriptions(&mut self, session_id: u64) {
        self.topic_subscribers.retain(|_, subscribers| {
            subscribers.retain(|s| s.session_id != session_id);
            !subscribers.is_empty()
        });
    }

    fn next_ack_id(&mut self) -> Option<u16> {
        if !self.cfg.ack_packet_ids {
            return None;
        }
        let id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.checked_add(1).unwrap_or(1);
        Some(id)
    }
}
