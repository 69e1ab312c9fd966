use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use bytes::{Bytes, BytesMut};
use log::{debug, info, warn};
use parking_lot::Mutex;
use tinymq::packet::{self, Connect, Packet, Publish, Subscribe, Unsubscribe};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};

use crate::error::Error;

/// Callback invoked for every message received on a subscribed topic. It runs
/// on the client's background read task and must not block; a caller that
/// needs to do real work should hand the message off to its own queue.
pub type MessageHandler = Arc<dyn Fn(&str, &[u8]) + Send + Sync + 'static>;

/// A connection to a TinyMQ broker.
///
/// All sends go through an internal queue drained by a single writer task, so
/// frames from different call sites are never interleaved on the socket.
pub struct Client {
    client_id: String,
    host: String,
    port: u16,
    connected: Arc<AtomicBool>,
    handlers: Arc<Mutex<HashMap<String, MessageHandler>>>,
    conn: Option<Connection>,
}

struct Connection {
    writer_tx: UnboundedSender<Packet>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Client {
    /// Client for a broker on `localhost:1505`.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self::with_addr(client_id, "localhost", tinymq::config::DEFAULT_PORT)
    }

    pub fn with_addr(client_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            client_id: client_id.into(),
            host: host.into(),
            port,
            connected: Arc::new(AtomicBool::new(false)),
            handlers: Arc::new(Mutex::new(HashMap::new())),
            conn: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Opens the TCP connection, performs the CONN / CONNACK handshake, then
    /// starts the background read and write loops.
    pub async fn connect(&mut self) -> Result<(), Error> {
        if self.is_connected() {
            info!("Already connected");
            return Ok(());
        }
        if self.client_id.is_empty() {
            return Err(Error::EmptyClientId);
        }

        info!(
            "Connecting to {}:{} as '{}'",
            self.host, self.port, self.client_id
        );
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        let (mut read_half, mut write_half) = stream.into_split();

        let mut write_buf = BytesMut::new();
        Packet::Connect(Connect {
            client_id: Bytes::copy_from_slice(self.client_id.as_bytes()),
        })
        .write(&mut write_buf)?;
        write_half.write_all(&write_buf).await?;

        let mut read_buf = BytesMut::new();
        match read_packet(&mut read_half, &mut read_buf).await? {
            Packet::ConnAck(_) => info!("Connection acknowledged"),
            _ => return Err(Error::HandshakeFailed),
        }

        self.connected.store(true, Ordering::SeqCst);

        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_loop(write_half, writer_rx, self.connected.clone()));
        let reader = tokio::spawn(read_loop(
            read_half,
            read_buf,
            self.handlers.clone(),
            self.connected.clone(),
        ));

        self.conn = Some(Connection {
            writer_tx,
            reader,
            writer,
        });
        Ok(())
    }

    /// Closes the socket. There is no goodbye packet; the broker treats the
    /// resulting EOF as the disconnect.
    pub fn disconnect(&mut self) {
        if self.conn.is_none() {
            return;
        }

        info!("Disconnecting...");
        self.connected.store(false, Ordering::SeqCst);
        if let Some(conn) = self.conn.take() {
            conn.reader.abort();
            conn.writer.abort();
        }
        self.handlers.lock().clear();
        info!("Disconnected");
    }

    /// Registers `handler` for `topic`, then subscribes. The broker confirms
    /// with a SUBACK on the read loop.
    pub fn subscribe(
        &self,
        topic: &str,
        handler: impl Fn(&str, &[u8]) + Send + Sync + 'static,
    ) -> Result<(), Error> {
        let conn = self.conn()?;
        if topic.is_empty() || topic.len() > packet::MAX_TOPIC_LEN {
            return Err(Error::Packet(packet::Error::InvalidTopic));
        }

        info!("Subscribing to topic: {topic}");
        self.handlers
            .lock()
            .insert(topic.to_string(), Arc::new(handler));

        conn.writer_tx
            .send(Packet::Subscribe(Subscribe {
                topic: Bytes::copy_from_slice(topic.as_bytes()),
            }))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Drops the topic's handler and unsubscribes.
    pub fn unsubscribe(&self, topic: &str) -> Result<(), Error> {
        let conn = self.conn()?;

        info!("Unsubscribing from topic: {topic}");
        self.handlers.lock().remove(topic);

        conn.writer_tx
            .send(Packet::Unsubscribe(Unsubscribe {
                topic: Bytes::copy_from_slice(topic.as_bytes()),
            }))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Publishes a message. The broker's PUBACK only confirms receipt, not
    /// delivery to any subscriber.
    pub fn publish(&self, topic: &str, message: impl Into<Bytes>) -> Result<(), Error> {
        let conn = self.conn()?;
        let publish = Publish::new(Bytes::copy_from_slice(topic.as_bytes()), message.into())?;

        debug!(
            "Publishing to topic '{topic}': {}",
            preview(&publish.message)
        );
        conn.writer_tx
            .send(Packet::Publish(publish))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn conn(&self) -> Result<&Connection, Error> {
        match &self.conn {
            Some(conn) if self.is_connected() => Ok(conn),
            _ => Err(Error::NotConnected),
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut writer_rx: UnboundedReceiver<Packet>,
    connected: Arc<AtomicBool>,
) {
    let mut buf = BytesMut::new();
    while let Some(packet) = writer_rx.recv().await {
        if let Err(e) = packet.write(&mut buf) {
            warn!("Failed to encode packet: {e}");
            buf.clear();
            continue;
        }
        if let Err(e) = write_half.write_all(&buf).await {
            warn!("Send error: {e}");
            connected.store(false, Ordering::SeqCst);
            break;
        }
        buf.clear();
    }
}

async fn read_loop(
    mut read_half: OwnedReadHalf,
    mut buf: BytesMut,
    handlers: Arc<Mutex<HashMap<String, MessageHandler>>>,
    connected: Arc<AtomicBool>,
) {
    loop {
        let packet = match read_packet(&mut read_half, &mut buf).await {
            Ok(packet) => packet,
            Err(Error::ConnectionClosed) => {
                info!("Connection closed by broker");
                break;
            }
            Err(Error::Packet(packet::Error::MalformedPublish)) => {
                warn!("Discarding malformed PUB");
                continue;
            }
            Err(e) => {
                warn!("Read error: {e}");
                break;
            }
        };

        match packet {
            Packet::ConnAck(_) => info!("Connection acknowledged"),
            Packet::PubAck(_) => debug!("Publish acknowledged"),
            Packet::SubAck(_) => debug!("Subscribe acknowledged"),
            Packet::UnsubAck(_) => debug!("Unsubscribe acknowledged"),
            Packet::Publish(publish) => {
                let topic = String::from_utf8_lossy(&publish.topic).into_owned();
                debug!(
                    "Received message on topic '{topic}': {}",
                    preview(&publish.message)
                );
                // Every PUB is consumed from the wire; only registered topics
                // reach a handler. The handler runs outside the map lock.
                let handler = handlers.lock().get(&topic).cloned();
                if let Some(handler) = handler {
                    handler(&topic, &publish.message);
                }
            }
            Packet::Unsupported { packet_type } => {
                warn!("Received unsupported packet type: 0x{packet_type:02X}");
            }
            _ => warn!("Ignoring unexpected packet"),
        }
    }

    connected.store(false, Ordering::SeqCst);
}

/// Reads one frame, pulling more bytes from the socket as the codec asks for
/// them. EOF surfaces as `ConnectionClosed`.
async fn read_packet(read_half: &mut OwnedReadHalf, buf: &mut BytesMut) -> Result<Packet, Error> {
    loop {
        match Packet::read(buf) {
            Ok(packet) => return Ok(packet),
            Err(packet::Error::InsufficientBytes(_)) => {}
            Err(e) => return Err(Error::Packet(e)),
        }

        if read_half.read_buf(buf).await? == 0 {
            return Err(Error::ConnectionClosed);
        }
    }
}

/// Printable preview of a message payload for log lines, capped at 20 bytes.
fn preview(payload: &[u8]) -> String {
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
