//! Acknowledgement packets. All four share the same shape: an empty payload
//! by default, or a big-endian u16 packet id when the broker numbers its acks.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{Error, PacketType};

#[derive(Debug, Clone, Copy, Default)]
pub struct ConnAck {
    pub packet_id: Option<u16>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PubAck {
    pub packet_id: Option<u16>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SubAck {
    pub packet_id: Option<u16>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnsubAck {
    pub packet_id: Option<u16>,
}

fn read_packet_id(mut payload: Bytes) -> Option<u16> {
    (payload.len() >= 2).then(|| payload.get_u16())
}

fn write_ack(
    stream: &mut BytesMut,
    packet_type: PacketType,
    packet_id: Option<u16>,
) -> Result<(), Error> {
    super::write_header(stream, packet_type, if packet_id.is_some() { 2 } else { 0 })?;
    if let Some(id) = packet_id {
        stream.put_u16(id);
    }
    Ok(())
}

impl ConnAck {
    pub(crate) fn read(payload: Bytes) -> Self {
        Self {
            packet_id: read_packet_id(payload),
        }
    }

    pub(crate) fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        write_ack(stream, PacketType::ConnAck, self.packet_id)
    }
}

impl PubAck {
    pub(crate) fn read(payload: Bytes) -> Self {
        Self {
            packet_id: read_packet_id(payload),
        }
    }

    pub(crate) fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        write_ack(stream, PacketType::PubAck, self.packet_id)
    }
}

impl SubAck {
    pub(crate) fn read(payload: Bytes) -> Self {
        Self {
            packet_id: read_packet_id(payload),
        }
    }

    pub(crate) fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        write_ack(stream, PacketType::SubAck, self.packet_id)
    }
}

impl UnsubAck {
    pub(crate) fn read(payload: Bytes) -> Self {
        Self {
            packet_id: read_packet_id(payload),
        }
    }

    pub(crate) fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        write_ack(stream, PacketType::UnsubAck, self.packet_id)
    }
}
