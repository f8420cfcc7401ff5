//! MQTT control packets.
//!
//! Every packet type knows its remaining length, how to validate itself
//! before encoding, how to write its variable header and payload, and how to
//! parse them back from a framed body.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::PacketType;
use super::codec::{self, FixedHeader, string_len};
use crate::error::ProtocolError;
use crate::types::{ProtocolVersion, QoS, Will};

type Result<T> = std::result::Result<T, ProtocolError>;

/// Longest client identifier accepted by strict 3.1 brokers.
pub const MAX_CLIENT_ID_LEN: usize = 23;

const CLEAN_SESSION: u8 = 0x02;
const WILL_FLAG: u8 = 0x04;
const WILL_QOS_MASK: u8 = 0x18;
const WILL_RETAIN: u8 = 0x20;
const PASSWORD_FLAG: u8 = 0x40;
const USERNAME_FLAG: u8 = 0x80;

const SUBACK_FAILURE: u8 = 0x80;

// ============================================================================
// Body reader
// ============================================================================

/// Cursor over a framed packet body. Running out of bytes is a truncated
/// packet, never an incomplete read.
struct Body<'a> {
    packet: PacketType,
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Body<'a> {
    fn new(packet: PacketType, buf: &'a [u8]) -> Self {
        Self { packet, buf, pos: 0 }
    }

    fn has_remaining(&self) -> bool {
        self.pos < self.buf.len()
    }

    fn read_u8(&mut self) -> Result<u8> {
        let byte = *self
            .buf
            .get(self.pos)
            .ok_or(ProtocolError::Truncated(self.packet))?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let value = codec::read_u16(&self.buf[self.pos..])
            .ok_or(ProtocolError::Truncated(self.packet))?;
        self.pos += 2;
        Ok(value)
    }

    fn read_pkid(&mut self) -> Result<u16> {
        let pkid = self.read_u16()?;
        check_pkid(self.packet, pkid)?;
        Ok(pkid)
    }

    fn read_binary(&mut self) -> Result<&'a [u8]> {
        let buf: &'a [u8] = self.buf;
        let (raw, consumed) =
            codec::read_binary(&buf[self.pos..]).ok_or(ProtocolError::Truncated(self.packet))?;
        self.pos += consumed;
        Ok(raw)
    }

    fn read_string(&mut self) -> Result<String> {
        let raw = self.read_binary()?;
        Ok(codec::decode_utf8(raw)?.to_string())
    }

    /// The body must be consumed exactly.
    fn finish(self) -> Result<()> {
        if self.pos != self.buf.len() {
            return Err(ProtocolError::RemainingLengthMismatch {
                packet: self.packet,
                expected: self.pos,
                actual: self.buf.len(),
            });
        }
        Ok(())
    }
}

fn check_pkid(packet: PacketType, pkid: u16) -> Result<()> {
    if pkid == 0 {
        return Err(ProtocolError::ZeroPacketId(packet));
    }
    Ok(())
}

fn expect_len(packet: PacketType, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(ProtocolError::RemainingLengthMismatch {
            packet,
            expected,
            actual,
        });
    }
    Ok(())
}

// ============================================================================
// CONNECT / CONNACK
// ============================================================================

/// CONNECT packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    pub protocol: ProtocolVersion,
    pub keep_alive: u16,
    pub client_id: String,
    pub clean_session: bool,
    pub will: Option<Will>,
    pub username: Option<String>,
    pub password: Option<Bytes>,
}

impl Connect {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            protocol: ProtocolVersion::V4,
            keep_alive: 60,
            client_id: client_id.into(),
            clean_session: true,
            will: None,
            username: None,
            password: None,
        }
    }

    /// Connect flags byte.
    pub fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.clean_session {
            flags |= CLEAN_SESSION;
        }
        if let Some(will) = &self.will {
            flags |= WILL_FLAG | ((will.qos as u8) << 3);
            if will.retain {
                flags |= WILL_RETAIN;
            }
        }
        if self.password.is_some() {
            flags |= PASSWORD_FLAG;
        }
        if self.username.is_some() {
            flags |= USERNAME_FLAG;
        }
        flags
    }

    fn remaining_length(&self) -> usize {
        let mut len = string_len(self.protocol.protocol_name().len()) + 1 + 1 + 2;
        len += string_len(self.client_id.len());
        if let Some(will) = &self.will {
            len += string_len(will.topic.len()) + string_len(will.message.len());
        }
        if let Some(username) = &self.username {
            len += string_len(username.len());
        }
        if let Some(password) = &self.password {
            len += string_len(password.len());
        }
        len
    }

    fn validate(&self) -> Result<()> {
        if self.client_id.len() > MAX_CLIENT_ID_LEN {
            return Err(ProtocolError::ClientIdTooLong(self.client_id.len()));
        }
        Ok(())
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        codec::write_string(buf, self.protocol.protocol_name())?;
        buf.put_u8(self.protocol.level());
        buf.put_u8(self.flags());
        buf.put_u16(self.keep_alive);
        codec::write_string(buf, &self.client_id)?;
        if let Some(will) = &self.will {
            codec::write_string(buf, &will.topic)?;
            codec::write_binary(buf, &will.message)?;
        }
        if let Some(username) = &self.username {
            codec::write_string(buf, username)?;
        }
        if let Some(password) = &self.password {
            codec::write_binary(buf, password)?;
        }
        Ok(())
    }

    fn read(buf: &[u8]) -> Result<Self> {
        let mut body = Body::new(PacketType::Connect, buf);

        let name = body.read_string()?;
        let level = body.read_u8()?;
        let protocol = match (name.as_str(), level) {
            ("MQIsdp", 3) => ProtocolVersion::V3,
            ("MQTT", 4) => ProtocolVersion::V4,
            _ => return Err(ProtocolError::InvalidProtocol { name, level }),
        };

        let flags = body.read_u8()?;
        let invalid_flags = ProtocolError::InvalidFlags {
            packet: PacketType::Connect,
            flags,
        };
        if flags & 0x01 != 0 {
            return Err(invalid_flags);
        }
        if flags & WILL_FLAG == 0 && flags & (WILL_QOS_MASK | WILL_RETAIN) != 0 {
            return Err(invalid_flags);
        }

        let keep_alive = body.read_u16()?;
        let client_id = body.read_string()?;

        let will = if flags & WILL_FLAG != 0 {
            let topic = body.read_string()?;
            let message = Bytes::copy_from_slice(body.read_binary()?);
            Some(Will {
                topic,
                message,
                qos: QoS::from_u8((flags & WILL_QOS_MASK) >> 3)?,
                retain: flags & WILL_RETAIN != 0,
            })
        } else {
            None
        };

        let username = if flags & USERNAME_FLAG != 0 {
            Some(body.read_string()?)
        } else {
            None
        };
        let password = if flags & PASSWORD_FLAG != 0 {
            Some(Bytes::copy_from_slice(body.read_binary()?))
        } else {
            None
        };

        body.finish()?;

        Ok(Self {
            protocol,
            keep_alive,
            client_id,
            clean_session: flags & CLEAN_SESSION != 0,
            will,
            username,
            password,
        })
    }
}

/// CONNACK return code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectReturnCode {
    Accepted = 0,
    UnacceptableProtocolVersion = 1,
    IdentifierRejected = 2,
    ServerUnavailable = 3,
    BadUserNameOrPassword = 4,
    NotAuthorized = 5,
}

impl ConnectReturnCode {
    pub fn from_u8(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::Accepted),
            1 => Ok(Self::UnacceptableProtocolVersion),
            2 => Ok(Self::IdentifierRejected),
            3 => Ok(Self::ServerUnavailable),
            4 => Ok(Self::BadUserNameOrPassword),
            5 => Ok(Self::NotAuthorized),
            other => Err(ProtocolError::InvalidConnectReturnCode(other)),
        }
    }
}

impl std::fmt::Display for ConnectReturnCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Accepted => "Connection Accepted",
            Self::UnacceptableProtocolVersion => {
                "Connection Refused: unacceptable protocol version"
            }
            Self::IdentifierRejected => "Connection Refused: identifier rejected",
            Self::ServerUnavailable => "Connection Refused: server unavailable",
            Self::BadUserNameOrPassword => "Connection Refused: bad user name or password",
            Self::NotAuthorized => "Connection Refused: not authorized",
        };
        f.write_str(text)
    }
}

/// CONNACK packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    pub session_present: bool,
    pub code: ConnectReturnCode,
}

impl ConnAck {
    pub fn new(code: ConnectReturnCode, session_present: bool) -> Self {
        Self {
            session_present,
            code,
        }
    }

    fn read(buf: &[u8]) -> Result<Self> {
        expect_len(PacketType::ConnAck, buf.len(), 2)?;
        Ok(Self {
            session_present: buf[0] & 0x01 != 0,
            code: ConnectReturnCode::from_u8(buf[1])?,
        })
    }
}

// ============================================================================
// PUBLISH and its acknowledgments
// ============================================================================

/// PUBLISH packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic: String,
    /// Zero for QoS 0, where no identifier is carried.
    pub pkid: u16,
    pub payload: Bytes,
}

impl Publish {
    pub fn new(topic: impl Into<String>, qos: QoS, payload: impl Into<Bytes>) -> Self {
        Self {
            dup: false,
            qos,
            retain: false,
            topic: topic.into(),
            pkid: 0,
            payload: payload.into(),
        }
    }

    fn flags(&self) -> u8 {
        ((self.dup as u8) << 3) | ((self.qos as u8) << 1) | self.retain as u8
    }

    fn remaining_length(&self) -> usize {
        let pkid_len = if self.qos == QoS::AtMostOnce { 0 } else { 2 };
        string_len(self.topic.len()) + pkid_len + self.payload.len()
    }

    fn validate(&self) -> Result<()> {
        if self.qos != QoS::AtMostOnce {
            check_pkid(PacketType::Publish, self.pkid)?;
        }
        Ok(())
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        codec::write_string(buf, &self.topic)?;
        if self.qos != QoS::AtMostOnce {
            buf.put_u16(self.pkid);
        }
        buf.extend_from_slice(&self.payload);
        Ok(())
    }

    fn read(flags: u8, buf: Bytes) -> Result<Self> {
        let qos = QoS::from_u8((flags >> 1) & 0x03)?;

        let mut body = Body::new(PacketType::Publish, &buf);
        let topic = body.read_string()?;
        let pkid = if qos == QoS::AtMostOnce { 0 } else { body.read_pkid()? };
        let offset = body.pos;

        Ok(Self {
            dup: flags & 0x08 != 0,
            qos,
            retain: flags & 0x01 != 0,
            topic,
            pkid,
            payload: buf.slice(offset..),
        })
    }
}

/// Packets whose only content is a packet identifier.
macro_rules! pkid_packet {
    ($(#[$meta:meta])* $name:ident, $packet_type:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            pub pkid: u16,
        }

        impl $name {
            pub fn new(pkid: u16) -> Self {
                Self { pkid }
            }

            fn validate(&self) -> Result<()> {
                check_pkid($packet_type, self.pkid)
            }

            fn read(buf: &[u8]) -> Result<Self> {
                expect_len($packet_type, buf.len(), 2)?;
                let mut body = Body::new($packet_type, buf);
                Ok(Self {
                    pkid: body.read_pkid()?,
                })
            }
        }
    };
}

pkid_packet!(
    /// PUBACK packet, QoS 1 acknowledgment.
    PubAck,
    PacketType::PubAck
);
pkid_packet!(
    /// PUBREC packet, first QoS 2 acknowledgment.
    PubRec,
    PacketType::PubRec
);
pkid_packet!(
    /// PUBREL packet, QoS 2 release.
    PubRel,
    PacketType::PubRel
);
pkid_packet!(
    /// PUBCOMP packet, final QoS 2 acknowledgment.
    PubComp,
    PacketType::PubComp
);
pkid_packet!(
    /// UNSUBACK packet.
    UnsubAck,
    PacketType::UnsubAck
);

// ============================================================================
// SUBSCRIBE / SUBACK / UNSUBSCRIBE
// ============================================================================

/// Topic filter with requested QoS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeFilter {
    pub filter: String,
    pub qos: QoS,
}

impl SubscribeFilter {
    pub fn new(filter: impl Into<String>, qos: QoS) -> Self {
        Self {
            filter: filter.into(),
            qos,
        }
    }
}

/// SUBSCRIBE packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub pkid: u16,
    pub filters: Vec<SubscribeFilter>,
}

impl Subscribe {
    pub fn new(pkid: u16, filters: Vec<SubscribeFilter>) -> Self {
        Self { pkid, filters }
    }

    fn remaining_length(&self) -> usize {
        2 + self
            .filters
            .iter()
            .map(|f| string_len(f.filter.len()) + 1)
            .sum::<usize>()
    }

    fn validate(&self) -> Result<()> {
        if self.filters.is_empty() {
            return Err(ProtocolError::EmptyTopicList(PacketType::Subscribe));
        }
        check_pkid(PacketType::Subscribe, self.pkid)
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u16(self.pkid);
        for f in &self.filters {
            codec::write_string(buf, &f.filter)?;
            buf.put_u8(f.qos as u8);
        }
        Ok(())
    }

    fn read(buf: &[u8]) -> Result<Self> {
        let mut body = Body::new(PacketType::Subscribe, buf);
        let pkid = body.read_pkid()?;

        let mut filters = Vec::new();
        while body.has_remaining() {
            let filter = body.read_string()?;
            let requested = body.read_u8()?;
            if requested & 0xFC != 0 {
                return Err(ProtocolError::InvalidQoS(requested));
            }
            filters.push(SubscribeFilter::new(filter, QoS::from_u8(requested)?));
        }

        if filters.is_empty() {
            return Err(ProtocolError::EmptyTopicList(PacketType::Subscribe));
        }
        Ok(Self { pkid, filters })
    }
}

/// Per-filter SUBACK result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeReturnCode {
    Success(QoS),
    Failure,
}

impl SubscribeReturnCode {
    pub fn from_u8(code: u8) -> Result<Self> {
        match code {
            SUBACK_FAILURE => Ok(Self::Failure),
            other => Ok(Self::Success(QoS::from_u8(other)?)),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::Success(qos) => qos as u8,
            Self::Failure => SUBACK_FAILURE,
        }
    }
}

/// SUBACK packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAck {
    pub pkid: u16,
    pub return_codes: Vec<SubscribeReturnCode>,
}

impl SubAck {
    pub fn new(pkid: u16, return_codes: Vec<SubscribeReturnCode>) -> Self {
        Self { pkid, return_codes }
    }

    fn read(buf: &[u8]) -> Result<Self> {
        let mut body = Body::new(PacketType::SubAck, buf);
        let pkid = body.read_pkid()?;

        let mut return_codes = Vec::with_capacity(buf.len().saturating_sub(2));
        while body.has_remaining() {
            return_codes.push(SubscribeReturnCode::from_u8(body.read_u8()?)?);
        }
        Ok(Self { pkid, return_codes })
    }
}

/// UNSUBSCRIBE packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsubscribe {
    pub pkid: u16,
    pub filters: Vec<String>,
}

impl Unsubscribe {
    pub fn new(pkid: u16, filters: Vec<String>) -> Self {
        Self { pkid, filters }
    }

    fn remaining_length(&self) -> usize {
        2 + self.filters.iter().map(|f| string_len(f.len())).sum::<usize>()
    }

    fn validate(&self) -> Result<()> {
        if self.filters.is_empty() {
            return Err(ProtocolError::EmptyTopicList(PacketType::Unsubscribe));
        }
        check_pkid(PacketType::Unsubscribe, self.pkid)
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u16(self.pkid);
        for filter in &self.filters {
            codec::write_string(buf, filter)?;
        }
        Ok(())
    }

    fn read(buf: &[u8]) -> Result<Self> {
        let mut body = Body::new(PacketType::Unsubscribe, buf);
        let pkid = body.read_pkid()?;

        let mut filters = Vec::new();
        while body.has_remaining() {
            filters.push(body.read_string()?);
        }

        if filters.is_empty() {
            return Err(ProtocolError::EmptyTopicList(PacketType::Unsubscribe));
        }
        Ok(Self { pkid, filters })
    }
}

// ============================================================================
// Packet
// ============================================================================

/// An MQTT 3.1 / 3.1.1 control packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(Connect),
    ConnAck(ConnAck),
    Publish(Publish),
    PubAck(PubAck),
    PubRec(PubRec),
    PubRel(PubRel),
    PubComp(PubComp),
    Subscribe(Subscribe),
    SubAck(SubAck),
    Unsubscribe(Unsubscribe),
    UnsubAck(UnsubAck),
    PingReq,
    PingResp,
    Disconnect,
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::ConnAck(_) => PacketType::ConnAck,
            Packet::Publish(_) => PacketType::Publish,
            Packet::PubAck(_) => PacketType::PubAck,
            Packet::PubRec(_) => PacketType::PubRec,
            Packet::PubRel(_) => PacketType::PubRel,
            Packet::PubComp(_) => PacketType::PubComp,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::SubAck(_) => PacketType::SubAck,
            Packet::Unsubscribe(_) => PacketType::Unsubscribe,
            Packet::UnsubAck(_) => PacketType::UnsubAck,
            Packet::PingReq => PacketType::PingReq,
            Packet::PingResp => PacketType::PingResp,
            Packet::Disconnect => PacketType::Disconnect,
        }
    }

    fn flags(&self) -> u8 {
        match self {
            Packet::Publish(publish) => publish.flags(),
            other => other.packet_type().fixed_flags(),
        }
    }

    fn remaining_length(&self) -> usize {
        match self {
            Packet::Connect(connect) => connect.remaining_length(),
            Packet::ConnAck(_) => 2,
            Packet::Publish(publish) => publish.remaining_length(),
            Packet::PubAck(_)
            | Packet::PubRec(_)
            | Packet::PubRel(_)
            | Packet::PubComp(_)
            | Packet::UnsubAck(_) => 2,
            Packet::Subscribe(subscribe) => subscribe.remaining_length(),
            Packet::SubAck(suback) => 2 + suback.return_codes.len(),
            Packet::Unsubscribe(unsubscribe) => unsubscribe.remaining_length(),
            Packet::PingReq | Packet::PingResp | Packet::Disconnect => 0,
        }
    }

    /// Full encoded size, fixed header included.
    pub fn size(&self) -> usize {
        let len = self.remaining_length();
        1 + codec::variable_int_len(len) + len
    }

    fn validate(&self) -> Result<()> {
        match self {
            Packet::Connect(connect) => connect.validate(),
            Packet::Publish(publish) => publish.validate(),
            Packet::PubAck(ack) => ack.validate(),
            Packet::PubRec(ack) => ack.validate(),
            Packet::PubRel(ack) => ack.validate(),
            Packet::PubComp(ack) => ack.validate(),
            Packet::UnsubAck(ack) => ack.validate(),
            Packet::Subscribe(subscribe) => subscribe.validate(),
            Packet::SubAck(suback) => check_pkid(PacketType::SubAck, suback.pkid),
            Packet::Unsubscribe(unsubscribe) => unsubscribe.validate(),
            Packet::ConnAck(_) | Packet::PingReq | Packet::PingResp | Packet::Disconnect => Ok(()),
        }
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            Packet::Connect(connect) => connect.write_body(buf)?,
            Packet::ConnAck(connack) => {
                buf.put_u8(connack.session_present as u8);
                buf.put_u8(connack.code as u8);
            }
            Packet::Publish(publish) => publish.write_body(buf)?,
            Packet::PubAck(PubAck { pkid })
            | Packet::PubRec(PubRec { pkid })
            | Packet::PubRel(PubRel { pkid })
            | Packet::PubComp(PubComp { pkid })
            | Packet::UnsubAck(UnsubAck { pkid }) => buf.put_u16(*pkid),
            Packet::Subscribe(subscribe) => subscribe.write_body(buf)?,
            Packet::SubAck(suback) => {
                buf.put_u16(suback.pkid);
                for code in &suback.return_codes {
                    buf.put_u8(code.to_u8());
                }
            }
            Packet::Unsubscribe(unsubscribe) => unsubscribe.write_body(buf)?,
            Packet::PingReq | Packet::PingResp | Packet::Disconnect => {}
        }
        Ok(())
    }

    /// Encode the packet, appending to `buf`.
    ///
    /// Returns the number of bytes written. Nothing is appended on error.
    pub fn write(&self, buf: &mut BytesMut) -> Result<usize> {
        self.validate()?;

        let start = buf.len();
        let result = codec::write_fixed_header(
            buf,
            self.packet_type(),
            self.flags(),
            self.remaining_length(),
        )
        .and_then(|_| self.write_body(buf));

        if let Err(e) = result {
            buf.truncate(start);
            return Err(e);
        }
        Ok(buf.len() - start)
    }

    /// Decode one packet from the front of `buf`.
    ///
    /// Returns `None` when the buffer does not yet hold a whole packet; the
    /// buffer is left untouched in that case.
    pub fn read(buf: &mut BytesMut, max_size: usize) -> Result<Option<Packet>> {
        let Some(header) = codec::read_fixed_header(buf)? else {
            return Ok(None);
        };

        let frame_len = header.frame_len();
        if frame_len > max_size {
            return Err(ProtocolError::PacketTooLarge {
                size: frame_len,
                max: max_size,
            });
        }
        if buf.len() < frame_len {
            buf.reserve(frame_len - buf.len());
            return Ok(None);
        }

        buf.advance(header.header_len);
        let body = buf.split_to(header.remaining_length).freeze();
        Self::parse(header, body).map(Some)
    }

    fn parse(header: FixedHeader, body: Bytes) -> Result<Packet> {
        let packet = match header.packet_type {
            PacketType::Connect => Packet::Connect(Connect::read(&body)?),
            PacketType::ConnAck => Packet::ConnAck(ConnAck::read(&body)?),
            PacketType::Publish => Packet::Publish(Publish::read(header.flags, body)?),
            PacketType::PubAck => Packet::PubAck(PubAck::read(&body)?),
            PacketType::PubRec => Packet::PubRec(PubRec::read(&body)?),
            PacketType::PubRel => Packet::PubRel(PubRel::read(&body)?),
            PacketType::PubComp => Packet::PubComp(PubComp::read(&body)?),
            PacketType::Subscribe => Packet::Subscribe(Subscribe::read(&body)?),
            PacketType::SubAck => Packet::SubAck(SubAck::read(&body)?),
            PacketType::Unsubscribe => Packet::Unsubscribe(Unsubscribe::read(&body)?),
            PacketType::UnsubAck => Packet::UnsubAck(UnsubAck::read(&body)?),
            empty @ (PacketType::PingReq | PacketType::PingResp | PacketType::Disconnect) => {
                expect_len(empty, body.len(), 0)?;
                match empty {
                    PacketType::PingReq => Packet::PingReq,
                    PacketType::PingResp => Packet::PingResp,
                    _ => Packet::Disconnect,
                }
            }
        };
        Ok(packet)
    }
}

// ============================================================================
// Tests
// ============================================================================
