use bytes::{Buf, BufMut, BytesMut};

pub use ack::{ConnAck, PubAck, SubAck, UnsubAck};
pub use connect::Connect;
pub use publish::Publish;
pub use subscribe::Subscribe;
pub use unsubscribe::Unsubscribe;

mod ack;
mod connect;
mod publish;
mod subscribe;
mod unsubscribe;

/// Fixed header size: type byte, reserved flags byte, big-endian u16 payload
/// length.
pub const HEADER_LEN: usize = 4;
/// The payload length field is a u16.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;
/// Publish frames carry the topic behind a single length byte.
pub const MAX_TOPIC_LEN: usize = u8::MAX as usize;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("At least {0} more bytes required")]
    InsufficientBytes(usize),
    #[error("Payload exceeds {MAX_PAYLOAD_LEN} bytes")]
    PayloadTooLarge,
    #[error("Topic must be 1 to {MAX_TOPIC_LEN} bytes")]
    InvalidTopic,
    #[error("Malformed publish payload")]
    MalformedPublish,
    #[error("Unexpected packet type")]
    UnexpectedPacketType,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Conn = 0x01,
    ConnAck = 0x02,
    Pub = 0x03,
    PubAck = 0x04,
    Sub = 0x05,
    SubAck = 0x06,
    Unsub = 0x07,
    UnsubAck = 0x08,
}

impl PacketType {
    fn from_u8(num: u8) -> Option<Self> {
        match num {
            0x01 => Some(PacketType::Conn),
            0x02 => Some(PacketType::ConnAck),
            0x03 => Some(PacketType::Pub),
            0x04 => Some(PacketType::PubAck),
            0x05 => Some(PacketType::Sub),
            0x06 => Some(PacketType::SubAck),
            0x07 => Some(PacketType::Unsub),
            0x08 => Some(PacketType::UnsubAck),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Packet {
    Connect(Connect),
    ConnAck(ConnAck),
    Publish(Publish),
    PubAck(PubAck),
    Subscribe(Subscribe),
    SubAck(SubAck),
    Unsubscribe(Unsubscribe),
    UnsubAck(UnsubAck),
    /// A frame whose type byte is not one of the enumerated values. The
    /// payload has been consumed; the handler layer logs and discards it.
    Unsupported { packet_type: u8 },
}

impl Packet {
    /// Reads one frame from the buffer. Returns `InsufficientBytes` until the
    /// whole frame is buffered. A fully buffered frame is always consumed,
    /// even when its payload fails to parse, so the stream stays aligned.
    pub fn read(stream: &mut BytesMut) -> Result<Self, Error> {
        if stream.len() < HEADER_LEN {
            return Err(Error::InsufficientBytes(HEADER_LEN - stream.len()));
        }
        let payload_len = u16::from_be_bytes([stream[2], stream[3]]) as usize;
        let frame_len = HEADER_LEN + payload_len;
        if stream.len() < frame_len {
            return Err(Error::InsufficientBytes(frame_len - stream.len()));
        }

        let mut frame = stream.split_to(frame_len).freeze();
        let packet_type = frame.get_u8();
        // Reserved flags byte plus the length field already parsed above.
        frame.advance(3);
        let payload = frame;

        let packet = match PacketType::from_u8(packet_type) {
            Some(PacketType::Conn) => Packet::Connect(Connect::read(payload)),
            Some(PacketType::ConnAck) => Packet::ConnAck(ConnAck::read(payload)),
            Some(PacketType::Pub) => Packet::Publish(Publish::read(payload)?),
            Some(PacketType::PubAck) => Packet::PubAck(PubAck::read(payload)),
            Some(PacketType::Sub) => Packet::Subscribe(Subscribe::read(payload)),
            Some(PacketType::SubAck) => Packet::SubAck(SubAck::read(payload)),
            Some(PacketType::Unsub) => Packet::Unsubscribe(Unsubscribe::read(payload)),
            Some(PacketType::UnsubAck) => Packet::UnsubAck(UnsubAck::read(payload)),
            None => Packet::Unsupported { packet_type },
        };

        Ok(packet)
    }

    pub fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        match self {
            Packet::Connect(connect) => connect.write(stream),
            Packet::ConnAck(ack) => ack.write(stream),
            Packet::Publish(publish) => publish.write(stream),
            Packet::PubAck(ack) => ack.write(stream),
            Packet::Subscribe(subscribe) => subscribe.write(stream),
            Packet::SubAck(ack) => ack.write(stream),
            Packet::Unsubscribe(unsubscribe) => unsubscribe.write(stream),
            Packet::UnsubAck(ack) => ack.write(stream),
            Packet::Unsupported { .. } => Err(Error::UnexpectedPacketType),
        }
    }
}

/// Writes the fixed header. The flags byte is reserved and always zero on the
/// wire.
fn write_header(
    stream: &mut BytesMut,
    packet_type: PacketType,
    payload_len: usize,
) -> Result<(), Error> {
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(Error::PayloadTooLarge);
    }
    stream.reserve(HEADER_LEN + payload_len);
    stream.put_u8(packet_type as u8);
    stream.put_u8(0);
    stream.put_u16(payload_len as u16);
    Ok(())
}

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};

    use super::*;

    fn roundtrip(packet: &Packet) -> Packet {
        let mut buf = BytesMut::new();
        packet.write(&mut buf).unwrap();
        let decoded = Packet::read(&mut buf).unwrap();
        assert!(buf.is_empty(), "frame not fully consumed");
        decoded
    }

    #[test]
    fn connect_roundtrip() {
        let packet = Packet::Connect(Connect {
            client_id: Bytes::from_static(b"sensor-7"),
        });
        match roundtrip(&packet) {
            Packet::Connect(connect) => assert_eq!(connect.client_id, "sensor-7"),
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn publish_roundtrip() {
        let publish = Publish::new(Bytes::from_static(b"weather"), Bytes::from_static(b"72F"))
            .unwrap();
        match roundtrip(&Packet::Publish(publish)) {
            Packet::Publish(publish) => {
                assert_eq!(publish.topic, "weather");
                assert_eq!(publish.message, "72F");
            }
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn publish_max_topic_roundtrip() {
        let topic = Bytes::from(vec![b't'; MAX_TOPIC_LEN]);
        let publish = Publish::new(topic.clone(), Bytes::from_static(b"m")).unwrap();
        let mut buf = BytesMut::new();
        Packet::Publish(publish).write(&mut buf).unwrap();
        assert_eq!(buf[HEADER_LEN], 0xFF);
        match Packet::read(&mut buf).unwrap() {
            Packet::Publish(publish) => {
                assert_eq!(publish.topic, topic);
                assert_eq!(publish.message, "m");
            }
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn publish_empty_message_roundtrip() {
        let publish = Publish::new(Bytes::from_static(b"t"), Bytes::new()).unwrap();
        match roundtrip(&Packet::Publish(publish)) {
            Packet::Publish(publish) => {
                assert_eq!(publish.topic, "t");
                assert!(publish.message.is_empty());
            }
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn publish_rejects_invalid_topics() {
        assert!(matches!(
            Publish::new(Bytes::new(), Bytes::from_static(b"m")),
            Err(Error::InvalidTopic)
        ));
        let oversized = Bytes::from(vec![b't'; MAX_TOPIC_LEN + 1]);
        assert!(matches!(
            Publish::new(oversized, Bytes::new()),
            Err(Error::InvalidTopic)
        ));
    }

    #[test]
    fn ack_roundtrip_without_packet_id() {
        let mut buf = BytesMut::new();
        Packet::PubAck(PubAck { packet_id: None })
            .write(&mut buf)
            .unwrap();
        // Header only, zero-length payload.
        assert_eq!(buf.len(), HEADER_LEN);
        match Packet::read(&mut buf).unwrap() {
            Packet::PubAck(ack) => assert_eq!(ack.packet_id, None),
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn ack_roundtrip_with_packet_id() {
        match roundtrip(&Packet::SubAck(SubAck {
            packet_id: Some(0xBEEF),
        })) {
            Packet::SubAck(ack) => assert_eq!(ack.packet_id, Some(0xBEEF)),
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn subscribe_max_payload_roundtrip() {
        let topic = Bytes::from(vec![b's'; MAX_PAYLOAD_LEN]);
        match roundtrip(&Packet::Subscribe(Subscribe {
            topic: topic.clone(),
        })) {
            Packet::Subscribe(subscribe) => assert_eq!(subscribe.topic, topic),
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn oversized_payload_rejected_on_write() {
        let topic = Bytes::from(vec![b's'; MAX_PAYLOAD_LEN + 1]);
        let mut buf = BytesMut::new();
        assert!(matches!(
            Packet::Subscribe(Subscribe { topic }).write(&mut buf),
            Err(Error::PayloadTooLarge)
        ));
    }

    #[test]
    fn unsupported_type_consumes_frame() {
        let mut buf = BytesMut::from(&[0x42, 0x00, 0x00, 0x03, b'x', b'y', b'z'][..]);
        Packet::UnsubAck(UnsubAck { packet_id: None })
            .write(&mut buf)
            .unwrap();

        match Packet::read(&mut buf).unwrap() {
            Packet::Unsupported { packet_type } => assert_eq!(packet_type, 0x42),
            other => panic!("unexpected packet: {other:?}"),
        }
        // The next frame is still intact behind it.
        assert!(matches!(Packet::read(&mut buf), Ok(Packet::UnsubAck(_))));
    }

    #[test]
    fn partial_frames_request_more_bytes() {
        let mut buf = BytesMut::new();
        assert!(matches!(
            Packet::read(&mut buf),
            Err(Error::InsufficientBytes(4))
        ));

        buf.extend_from_slice(&[0x03, 0x00, 0x00, 0x05, b'a']);
        assert!(matches!(
            Packet::read(&mut buf),
            Err(Error::InsufficientBytes(4))
        ));
    }

    #[test]
    fn malformed_publish_is_consumed() {
        // Topic length byte claims 16 bytes but only 3 follow.
        let mut buf = BytesMut::from(&[0x03, 0x00, 0x00, 0x04, 0x10, b'a', b'b', b'c'][..]);
        assert!(matches!(Packet::read(&mut buf), Err(Error::MalformedPublish)));
        assert!(buf.is_empty());

        // Zero-length topics are not publishable.
        let mut buf = BytesMut::from(&[0x03, 0x00, 0x00, 0x02, 0x00, b'm'][..]);
        assert!(matches!(Packet::read(&mut buf), Err(Error::MalformedPublish)));
        assert!(buf.is_empty());
    }

    #[test]
    fn nonzero_flags_are_tolerated() {
        let mut buf = BytesMut::from(&[0x02, 0x7F, 0x00, 0x00][..]);
        assert!(matches!(Packet::read(&mut buf), Ok(Packet::ConnAck(_))));
    }
}
