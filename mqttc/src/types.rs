//! Common types for mqttc.

use bytes::Bytes;

use crate::error::{Error, ProtocolError, Result};
use crate::topic;

/// MQTT protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    /// MQTT 3.1 ("MQIsdp", level 3)
    V3,
    /// MQTT 3.1.1 ("MQTT", level 4)
    #[default]
    V4,
}

impl ProtocolVersion {
    /// Map a protocol level byte to a version.
    pub fn from_level(level: u8) -> Result<Self> {
        match level {
            3 => Ok(ProtocolVersion::V3),
            4 => Ok(ProtocolVersion::V4),
            other => Err(Error::InvalidConfig(format!(
                "unsupported protocol level {other}, expected 3 or 4"
            ))),
        }
    }

    /// Protocol name carried in the CONNECT variable header.
    pub fn protocol_name(&self) -> &'static str {
        match self {
            ProtocolVersion::V3 => "MQIsdp",
            ProtocolVersion::V4 => "MQTT",
        }
    }

    /// Protocol level byte.
    pub fn level(&self) -> u8 {
        match self {
            ProtocolVersion::V3 => 3,
            ProtocolVersion::V4 => 4,
        }
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolVersion::V3 => write!(f, "MQTT 3.1"),
            ProtocolVersion::V4 => write!(f, "MQTT 3.1.1"),
        }
    }
}

/// Quality of Service level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum QoS {
    /// At most once delivery (fire and forget).
    #[default]
    AtMostOnce = 0,
    /// At least once delivery (PUBACK, retried until acknowledged).
    AtLeastOnce = 1,
    /// Exactly once delivery (PUBREC / PUBREL / PUBCOMP handshake).
    ExactlyOnce = 2,
}

impl QoS {
    pub fn from_u8(value: u8) -> std::result::Result<Self, ProtocolError> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(ProtocolError::InvalidQoS(other)),
        }
    }
}

impl TryFrom<u8> for QoS {
    type Error = ProtocolError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        QoS::from_u8(value)
    }
}

/// Application message.
///
/// Also kept by the pending store so an unacknowledged PUBLISH can be resent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Topic name.
    pub topic: String,
    /// Message payload.
    pub payload: Bytes,
    /// Delivery QoS.
    pub qos: QoS,
    /// Retain flag.
    pub retain: bool,
}

impl Message {
    /// Create a new QoS 0 message.
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            retain: false,
        }
    }

    /// Set delivery QoS.
    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    /// Set retain flag.
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }
}

/// Last will, published by the broker when the client drops uncleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Will {
    pub topic: String,
    pub message: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

impl Will {
    pub fn new(topic: impl Into<String>, message: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            message: message.into(),
            qos: QoS::AtMostOnce,
            retain: false,
        }
    }

    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    /// Check that topic and message are usable.
    pub fn validate(&self) -> Result<()> {
        if self.topic.is_empty() {
            return Err(Error::InvalidConfig("will topic must not be empty".into()));
        }
        if self.message.is_empty() {
            return Err(Error::InvalidConfig("will message must not be empty".into()));
        }
        topic::validate_topic_name(&self.topic)
            .map_err(|e| Error::InvalidConfig(format!("will: {e}")))?;
        Ok(())
    }
}
