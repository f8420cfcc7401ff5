//! Client configuration.

use std::time::Duration;

use tracing::warn;

use crate::error::{Error, ProtocolError, Result};
use crate::protocol::{MAX_CLIENT_ID_LEN, MAX_PACKET_SIZE};
use crate::transport::{self, TransportType};
use crate::types::{ProtocolVersion, Will};

/// Default resend interval for unacknowledged QoS 1/2 packets.
pub const DEFAULT_RETRY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of transport connect attempts.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 10;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Broker address (host:port).
    pub addr: String,
    /// Client ID. Generated on connect if empty.
    pub client_id: String,
    /// Username for authentication.
    pub username: Option<String>,
    /// Password for authentication.
    pub password: Option<Vec<u8>>,
    /// Keep alive interval in seconds, 0 disables PINGREQ.
    pub keep_alive: u16,
    /// Clean session flag.
    pub clean_session: bool,
    /// Last will.
    pub will: Option<Will>,
    /// Protocol version.
    pub protocol_version: ProtocolVersion,
    /// Resend interval for unacknowledged packets.
    pub retry_timeout: Duration,
    /// How long to wait for CONNACK.
    pub connect_timeout: Duration,
    /// Maximum inbound packet size.
    pub max_packet_size: usize,
    /// Transport connect attempts before giving up.
    pub connect_attempts: u32,
}

impl ClientConfig {
    /// Create a new client config (defaults to MQTT 3.1.1).
    pub fn new(addr: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            client_id: client_id.into(),
            username: None,
            password: None,
            keep_alive: 60,
            clean_session: true,
            will: None,
            protocol_version: ProtocolVersion::V4,
            retry_timeout: DEFAULT_RETRY_TIMEOUT,
            connect_timeout: Duration::from_secs(30),
            max_packet_size: MAX_PACKET_SIZE,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
        }
    }

    /// Create a config from a broker URL such as `mqtt://host:1883`.
    ///
    /// Only plain TCP URLs are accepted here. For `mqtts://` build a
    /// `TlsConnector` and pass it to `Client::with_connector`.
    pub fn from_url(url: &str, client_id: impl Into<String>) -> Result<Self> {
        let (transport, host, port) = transport::parse_broker_url(url)?;
        if transport != TransportType::Tcp {
            return Err(Error::InvalidConfig(format!(
                "{url:?} needs a {transport:?} connector, use Client::with_connector"
            )));
        }
        Ok(Self::new(format!("{host}:{port}"), client_id))
    }

    /// Set credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<Vec<u8>>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set username only.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set keep alive interval.
    pub fn with_keep_alive(mut self, seconds: u16) -> Self {
        self.keep_alive = seconds;
        self
    }

    /// Set clean session flag.
    pub fn with_clean_session(mut self, clean: bool) -> Self {
        self.clean_session = clean;
        self
    }

    /// Set protocol version.
    pub fn with_protocol(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }

    /// Set last will.
    pub fn with_will(mut self, will: Will) -> Self {
        self.will = Some(will);
        self
    }

    /// Set the resend interval.
    ///
    /// Values of one second or less are ignored and the previous value kept.
    pub fn with_retry_timeout(mut self, timeout: Duration) -> Self {
        if timeout > Duration::from_secs(1) {
            self.retry_timeout = timeout;
        } else {
            warn!("Ignoring retry timeout {:?}, must be above 1s", timeout);
        }
        self
    }

    /// Set how long to wait for CONNACK.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set maximum inbound packet size.
    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size;
        self
    }

    /// Set the number of transport connect attempts.
    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts;
        self
    }

    /// Check the configuration for values the broker would reject.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.len() > MAX_CLIENT_ID_LEN {
            return Err(ProtocolError::ClientIdTooLong(self.client_id.len()).into());
        }
        if self.client_id.is_empty() && !self.clean_session {
            return Err(Error::InvalidConfig(
                "client id must be provided when clean session is false".into(),
            ));
        }
        if let Some(will) = &self.will {
            will.validate()?;
        }
        if self.connect_attempts == 0 {
            return Err(Error::InvalidConfig("connect attempts must be at least 1".into()));
        }
        Ok(())
    }

    /// Validate and fill in a generated client id if none was given.
    pub(crate) fn prepare(mut self) -> Result<Self> {
        self.validate()?;
        if self.client_id.is_empty() {
            self.client_id = generate_client_id();
        }
        Ok(self)
    }
}

/// `mqtt` followed by 16 random hex characters.
pub fn generate_client_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("mqtt{}", &id[..16])
}
