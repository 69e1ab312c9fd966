//! End-to-end scenarios driven over raw sockets, so the broker is exercised
//! exactly as a foreign client implementation would.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tinymq::{config::Config, Broker, EventSink, Severity};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    task::JoinHandle,
    time::{sleep, timeout},
};

const CONN: u8 = 0x01;
const CONNACK: u8 = 0x02;
const PUB: u8 = 0x03;
const PUBACK: u8 = 0x04;
const SUB: u8 = 0x05;
const SUBACK: u8 = 0x06;
const UNSUB: u8 = 0x07;
const UNSUBACK: u8 = 0x08;

/// Records every event the broker emits, so tests can assert on log-only
/// behavior such as "no subscribers".
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<(Severity, String, String)>>,
}

impl EventSink for Recorder {
    fn event(&self, severity: Severity, source: &str, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push((severity, source.to_string(), message.to_string()));
    }
}

impl Recorder {
    fn contains(&self, needle: &str) -> bool {
        self.events
            .lock()
            .unwrap()
            .iter()
            .any(|(_, _, message)| message.contains(needle))
    }
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

async fn start_broker(mut cfg: Config, sink: Arc<Recorder>) -> (u16, Arc<Broker>, JoinHandle<()>) {
    let port = free_port();
    cfg.broker.port = port;
    let broker = Arc::new(Broker::with_sink(cfg, sink));

    let task = {
        let broker = broker.clone();
        tokio::spawn(async move {
            broker.run().await.unwrap();
        })
    };

    // Wait until the listener answers.
    for _ in 0..100 {
        if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return (port, broker, task);
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("broker did not come up on port {port}");
}

async fn write_frame(stream: &mut TcpStream, packet_type: u8, payload: &[u8]) {
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.push(packet_type);
    frame.push(0);
    frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    frame.extend_from_slice(payload);
    stream.write_all(&frame).await.unwrap();
}

async fn read_frame(stream: &mut TcpStream) -> (u8, u8, Vec<u8>) {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await.unwrap();
    let len = u16::from_be_bytes([header[2], header[3]]) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.unwrap();
    (header[0], header[1], payload)
}

/// No frame may arrive within the grace period.
async fn assert_silent(stream: &mut TcpStream) {
    let mut byte = [0u8; 1];
    assert!(
        timeout(Duration::from_millis(200), stream.read_exact(&mut byte))
            .await
            .is_err(),
        "expected no frame, got one"
    );
}

fn pub_payload(topic: &[u8], message: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(1 + topic.len() + message.len());
    payload.push(topic.len() as u8);
    payload.extend_from_slice(topic);
    payload.extend_from_slice(message);
    payload
}

async fn connect_client(port: u16, client_id: &[u8]) -> TcpStream {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    write_frame(&mut stream, CONN, client_id).await;
    let (packet_type, flags, payload) = read_frame(&mut stream).await;
    assert_eq!(packet_type, CONNACK);
    assert_eq!(flags, 0);
    assert!(payload.is_empty());
    stream
}

#[tokio::test]
async fn happy_publish() {
    let (port, _broker, _task) = start_broker(Config::default(), Arc::default()).await;

    let mut a = connect_client(port, b"a").await;
    let mut b = connect_client(port, b"b").await;

    write_frame(&mut b, SUB, b"weather").await;
    let (packet_type, _, _) = read_frame(&mut b).await;
    assert_eq!(packet_type, SUBACK);

    write_frame(&mut a, PUB, &pub_payload(b"weather", b"72F")).await;
    let (packet_type, _, payload) = read_frame(&mut a).await;
    assert_eq!(packet_type, PUBACK);
    assert!(payload.is_empty());

    let (packet_type, _, payload) = read_frame(&mut b).await;
    assert_eq!(packet_type, PUB);
    assert_eq!(payload, pub_payload(b"weather", b"72F"));
}

#[tokio::test]
async fn publish_without_subscribers_is_acked_and_logged() {
    let sink = Arc::new(Recorder::default());
    let (port, _broker, _task) = start_broker(Config::default(), sink.clone()).await;

    let mut a = connect_client(port, b"a").await;
    write_frame(&mut a, PUB, &pub_payload(b"chat", b"hello")).await;
    let (packet_type, _, _) = read_frame(&mut a).await;
    assert_eq!(packet_type, PUBACK);

    assert!(sink.contains("No subscribers for topic: chat"));
}

#[tokio::test]
async fn displaced_client_id_stops_receiving() {
    let (port, _broker, _task) = start_broker(Config::default(), Arc::default()).await;

    let mut first = connect_client(port, b"x").await;
    write_frame(&mut first, SUB, b"t").await;
    let (packet_type, _, _) = read_frame(&mut first).await;
    assert_eq!(packet_type, SUBACK);

    // Second connection with the same id displaces the first.
    let _second = connect_client(port, b"x").await;

    let mut publisher = connect_client(port, b"p").await;
    write_frame(&mut publisher, PUB, &pub_payload(b"t", b"m")).await;
    let (packet_type, _, _) = read_frame(&mut publisher).await;
    assert_eq!(packet_type, PUBACK);

    // The displaced session is out of every subscriber list.
    assert_silent(&mut first).await;
}

#[tokio::test]
async fn unauthenticated_publish_is_dropped_without_closing() {
    let (port, _broker, _task) = start_broker(Config::default(), Arc::default()).await;

    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    write_frame(&mut stream, PUB, &pub_payload(b"t", b"m")).await;
    assert_silent(&mut stream).await;

    // The connection is still usable: CONN succeeds normally afterwards.
    write_frame(&mut stream, CONN, b"late").await;
    let (packet_type, _, _) = read_frame(&mut stream).await;
    assert_eq!(packet_type, CONNACK);
}

#[tokio::test]
async fn malformed_publish_is_discarded_and_connection_survives() {
    let (port, _broker, _task) = start_broker(Config::default(), Arc::default()).await;

    let mut a = connect_client(port, b"a").await;
    // Topic length byte claims 16 bytes; only 3 follow.
    write_frame(&mut a, PUB, &[0x10, b'a', b'b', b'c']).await;
    assert_silent(&mut a).await;

    write_frame(&mut a, SUB, b"t").await;
    let (packet_type, _, _) = read_frame(&mut a).await;
    assert_eq!(packet_type, SUBACK);
}

#[tokio::test]
async fn eof_removes_subscriptions() {
    let sink = Arc::new(Recorder::default());
    let (port, _broker, _task) = start_broker(Config::default(), sink.clone()).await;

    let mut b = connect_client(port, b"b").await;
    write_frame(&mut b, SUB, b"t").await;
    let (packet_type, _, _) = read_frame(&mut b).await;
    assert_eq!(packet_type, SUBACK);
    drop(b);

    // Give the broker a moment to process the EOF.
    sleep(Duration::from_millis(200)).await;

    let mut a = connect_client(port, b"a").await;
    write_frame(&mut a, PUB, &pub_payload(b"t", b"m")).await;
    let (packet_type, _, _) = read_frame(&mut a).await;
    assert_eq!(packet_type, PUBACK);

    assert!(sink.contains("No subscribers for topic: t"));
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let (port, _broker, _task) = start_broker(Config::default(), Arc::default()).await;

    let mut b = connect_client(port, b"b").await;
    write_frame(&mut b, SUB, b"t").await;
    let (packet_type, _, _) = read_frame(&mut b).await;
    assert_eq!(packet_type, SUBACK);

    write_frame(&mut b, UNSUB, b"t").await;
    let (packet_type, _, _) = read_frame(&mut b).await;
    assert_eq!(packet_type, UNSUBACK);

    let mut a = connect_client(port, b"a").await;
    write_frame(&mut a, PUB, &pub_payload(b"t", b"m")).await;
    let (packet_type, _, _) = read_frame(&mut a).await;
    assert_eq!(packet_type, PUBACK);

    assert_silent(&mut b).await;
}

#[tokio::test]
async fn unsupported_packet_type_is_ignored() {
    let (port, _broker, _task) = start_broker(Config::default(), Arc::default()).await;

    let mut a = connect_client(port, b"a").await;
    write_frame(&mut a, 0x42, b"whatever").await;

    // The connection still works afterwards.
    write_frame(&mut a, SUB, b"t").await;
    let (packet_type, _, _) = read_frame(&mut a).await;
    assert_eq!(packet_type, SUBACK);
}

#[tokio::test]
async fn empty_client_id_closes_the_connection() {
    let (port, _broker, _task) = start_broker(Config::default(), Arc::default()).await;

    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    write_frame(&mut stream, CONN, b"").await;

    // The broker closes without a CONNACK.
    let mut byte = [0u8; 1];
    let read = timeout(Duration::from_secs(5), stream.read(&mut byte))
        .await
        .expect("socket was not closed");
    assert_eq!(read.unwrap(), 0);
}

#[tokio::test]
async fn ack_packet_ids_on_the_wire() {
    let mut cfg = Config::default();
    cfg.session.ack_packet_ids = true;
    let (port, _broker, _task) = start_broker(cfg, Arc::default()).await;

    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    write_frame(&mut stream, CONN, b"a").await;
    let (packet_type, _, payload) = read_frame(&mut stream).await;
    assert_eq!(packet_type, CONNACK);
    assert_eq!(payload, vec![0x00, 0x01]);

    write_frame(&mut stream, SUB, b"t").await;
    let (packet_type, _, payload) = read_frame(&mut stream).await;
    assert_eq!(packet_type, SUBACK);
    assert_eq!(payload, vec![0x00, 0x02]);
}

#[tokio::test]
async fn stop_shuts_the_broker_down() {
    let sink = Arc::new(Recorder::default());
    let (port, broker, task) = start_broker(Config::default(), sink.clone()).await;

    let _a = connect_client(port, b"a").await;
    broker.stop();

    // `run` returns once sessions are gone and the registries are cleared.
    timeout(Duration::from_secs(5), task)
        .await
        .expect("broker did not stop")
        .unwrap();
    assert!(sink.contains("Stopped"));
}
