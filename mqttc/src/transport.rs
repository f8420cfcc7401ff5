//! Transport layer for MQTT connections.
//!
//! The client talks to the broker through a [`Connector`], which opens a
//! fresh byte stream on every (re)connect:
//! - TCP (plain)
//! - TLS (secure, `tls` feature)

use std::future::Future;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Error, Result};

/// Opens duplex byte streams to the broker.
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Open a new stream.
    fn connect(&self) -> impl Future<Output = io::Result<Self::Stream>> + Send;

    /// Address used for logging and errors.
    fn address(&self) -> &str;
}

/// Transport type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    /// Plain TCP connection.
    Tcp,
    /// TLS encrypted connection.
    #[cfg(feature = "tls")]
    Tls,
}

impl TransportType {
    /// Parse transport type from URL scheme.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_lowercase().as_str() {
            "tcp" | "mqtt" | "" => Some(TransportType::Tcp),
            #[cfg(feature = "tls")]
            "tls" | "mqtts" | "ssl" => Some(TransportType::Tls),
            _ => None,
        }
    }

    /// Get default port for this transport type.
    pub fn default_port(&self) -> u16 {
        match self {
            TransportType::Tcp => 1883,
            #[cfg(feature = "tls")]
            TransportType::Tls => 8883,
        }
    }
}

/// Split a broker URL such as `mqtt://host:1883` or `host` into transport,
/// host and port.
pub fn parse_broker_url(url: &str) -> Result<(TransportType, String, u16)> {
    let (scheme, rest) = url.split_once("://").unwrap_or(("", url));
    let transport = TransportType::from_scheme(scheme)
        .ok_or_else(|| Error::InvalidConfig(format!("unsupported scheme {scheme:?}")))?;

    let rest = rest.trim_end_matches('/');
    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| Error::InvalidConfig(format!("invalid port in {url:?}")))?;
            (host, port)
        }
        None => (rest, transport.default_port()),
    };
    if host.is_empty() {
        return Err(Error::InvalidConfig(format!("missing host in {url:?}")));
    }
    Ok((transport, host.to_string(), port))
}

/// Plain TCP connector.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self) -> io::Result<TcpStream> {
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        debug!("TCP connected to {}", self.addr);
        Ok(stream)
    }

    fn address(&self) -> &str {
        &self.addr
    }
}

#[cfg(feature = "tls")]
pub mod tls {
    //! TLS connector.

    use std::io;
    use std::sync::Arc;

    use tokio::net::TcpStream;
    use tokio_rustls::client::TlsStream;
    use tokio_rustls::rustls::pki_types::ServerName;
    use tokio_rustls::rustls::{ClientConfig, RootCertStore};

    use super::Connector;

    /// TLS connector verifying the broker against the webpki roots.
    #[derive(Clone)]
    pub struct TlsConnector {
        addr: String,
        domain: ServerName<'static>,
        connector: tokio_rustls::TlsConnector,
    }

    impl TlsConnector {
        /// Create a connector for `addr` (host:port), verifying `domain`.
        pub fn new(addr: impl Into<String>, domain: &str) -> io::Result<Self> {
            let root_store = RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            };
            let config = ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth();
            Self::with_config(addr, domain, Arc::new(config))
        }

        /// Create a connector with a custom rustls configuration.
        pub fn with_config(
            addr: impl Into<String>,
            domain: &str,
            config: Arc<ClientConfig>,
        ) -> io::Result<Self> {
            let domain = ServerName::try_from(domain.to_string())
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid domain name"))?;
            Ok(Self {
                addr: addr.into(),
                domain,
                connector: tokio_rustls::TlsConnector::from(config),
            })
        }
    }

    impl Connector for TlsConnector {
        type Stream = TlsStream<TcpStream>;

        async fn connect(&self) -> io::Result<Self::Stream> {
            let stream = TcpStream::connect(&self.addr).await?;
            stream.set_nodelay(true)?;
            self.connector.connect(self.domain.clone(), stream).await
        }

        fn address(&self) -> &str {
            &self.addr
        }
    }
}
