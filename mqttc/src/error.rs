//! Error types for mqttc.

use std::io;

use crate::protocol::{ConnectReturnCode, PacketType};

/// Result type alias for mqttc.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for mqttc operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Wire format or protocol contract violation.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The connection is unusable (repeated EOF, keepalive expired).
    #[error("network error: {0}")]
    Network(String),

    /// Connection refused by broker.
    #[error("connection refused: {0}")]
    ConnectionRefused(ConnectReturnCode),

    /// The transport could not be established.
    #[error("failed to connect to {addr} after {attempts} attempts")]
    ConnectFailed { addr: String, attempts: u32 },

    /// Connection closed by peer in the middle of a packet.
    #[error("connection closed")]
    ConnectionClosed,

    /// Unexpected packet received.
    #[error("unexpected packet: expected {expected}, got {got}")]
    UnexpectedPacket { expected: PacketType, got: PacketType },

    /// Operation requires an established connection.
    #[error("not connected")]
    NotConnected,

    /// Every packet identifier is held by an in-flight exchange.
    #[error("no free packet identifier")]
    PacketIdsExhausted,

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Whether the error comes from the connection itself.
    ///
    /// Network errors are recovered inside the event loop by reconnecting;
    /// everything else is returned to the caller.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Network(_) | Error::ConnectionClosed)
    }
}

/// Violations of the MQTT wire format or of the client's own contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid packet type: {0}")]
    InvalidPacketType(u8),

    #[error("invalid flags {flags:#04x} for {packet}")]
    InvalidFlags { packet: PacketType, flags: u8 },

    #[error("malformed remaining length")]
    MalformedRemainingLength,

    #[error("{packet} remaining length mismatch: expected {expected}, got {actual}")]
    RemainingLengthMismatch {
        packet: PacketType,
        expected: usize,
        actual: usize,
    },

    #[error("{0} body is truncated")]
    Truncated(PacketType),

    #[error("packet too large: {size} bytes (max {max})")]
    PacketTooLarge { size: usize, max: usize },

    #[error("{0} requires at least one topic")]
    EmptyTopicList(PacketType),

    #[error("invalid qos: {0}")]
    InvalidQoS(u8),

    #[error("{0} packet identifier must not be zero")]
    ZeroPacketId(PacketType),

    #[error("client id is {0} bytes, at most 23 allowed")]
    ClientIdTooLong(usize),

    #[error("invalid utf-8 string")]
    InvalidUtf8,

    #[error("string too long: {0} bytes")]
    StringTooLong(usize),

    #[error("invalid connect return code: {0}")]
    InvalidConnectReturnCode(u8),

    #[error("invalid protocol {name:?} level {level}")]
    InvalidProtocol { name: String, level: u8 },

    #[error("invalid topic {topic:?}: {reason}")]
    InvalidTopic { topic: String, reason: &'static str },
}
