//! MQTT 3.1 / 3.1.1 wire protocol.
//!
//! [`codec`] holds the primitive encoders, [`Packet`] the 14 control packets,
//! and [`PacketReader`] / [`write_packet`] move packets over an async stream.

pub mod codec;
mod io;
mod packet;

pub use io::{PacketReader, write_packet};
pub use packet::{
    ConnAck, Connect, ConnectReturnCode, MAX_CLIENT_ID_LEN, Packet, PubAck, PubComp, PubRec,
    PubRel, Publish, SubAck, Subscribe, SubscribeFilter, SubscribeReturnCode, UnsubAck,
    Unsubscribe,
};

use crate::error::ProtocolError;

/// Maximum packet size (1MB default).
pub const MAX_PACKET_SIZE: usize = 1024 * 1024;

/// Control packet type, the high nibble of the first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

const PACKET_TYPES: [PacketType; 14] = [
    PacketType::Connect,
    PacketType::ConnAck,
    PacketType::Publish,
    PacketType::PubAck,
    PacketType::PubRec,
    PacketType::PubRel,
    PacketType::PubComp,
    PacketType::Subscribe,
    PacketType::SubAck,
    PacketType::Unsubscribe,
    PacketType::UnsubAck,
    PacketType::PingReq,
    PacketType::PingResp,
    PacketType::Disconnect,
];

impl PacketType {
    /// Look up a packet type by its 4-bit code.
    pub fn from_u8(code: u8) -> Result<Self, ProtocolError> {
        match code {
            1..=14 => Ok(PACKET_TYPES[code as usize - 1]),
            other => Err(ProtocolError::InvalidPacketType(other)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PacketType::Connect => "CONNECT",
            PacketType::ConnAck => "CONNACK",
            PacketType::Publish => "PUBLISH",
            PacketType::PubAck => "PUBACK",
            PacketType::PubRec => "PUBREC",
            PacketType::PubRel => "PUBREL",
            PacketType::PubComp => "PUBCOMP",
            PacketType::Subscribe => "SUBSCRIBE",
            PacketType::SubAck => "SUBACK",
            PacketType::Unsubscribe => "UNSUBSCRIBE",
            PacketType::UnsubAck => "UNSUBACK",
            PacketType::PingReq => "PINGREQ",
            PacketType::PingResp => "PINGRESP",
            PacketType::Disconnect => "DISCONNECT",
        }
    }

    /// Reserved flag nibble. Meaningless for PUBLISH, whose flags vary.
    pub fn fixed_flags(&self) -> u8 {
        match self {
            PacketType::PubRel | PacketType::Subscribe | PacketType::Unsubscribe => 0x02,
            _ => 0x00,
        }
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
