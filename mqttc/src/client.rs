//! MQTT 3.1 / 3.1.1 client (mqttc).
//!
//! The client is a single-task event loop: every operation takes `&mut self`,
//! and inbound packets are only processed while the caller drives
//! [`Client::step`], [`Client::run`] or [`Client::publish_sync`].

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::ClientConfig;
use crate::error::{Error, ProtocolError, Result};
use crate::handler::Handler;
use crate::pid::PacketIdGenerator;
use crate::protocol::{
    ConnectReturnCode, Packet, PacketReader, PacketType, PubAck, PubComp, PubRec, PubRel, Publish,
    Subscribe, Unsubscribe, write_packet,
};
use crate::session::Session;
use crate::store::{PendingAck, PendingStore};
use crate::topic;
use crate::transport::{Connector, TcpConnector};
use crate::types::{Message, QoS};

/// Consecutive EOF reads before the connection is considered dead.
const MAX_EOF: u32 = 10;

/// Consecutive EOF reads after which the loop starts backing off.
const EOF_BACKOFF_AFTER: u32 = 5;

/// Pause between transport connect attempts.
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// MQTT client with QoS 0/1/2 delivery, retry and automatic reconnect.
pub struct Client<C: Connector = TcpConnector> {
    connector: C,
    session: Session,
    state: ConnectionState,
    stream: Option<C::Stream>,
    reader: PacketReader,
    store: PendingStore,
    handler: Option<Box<dyn Handler>>,
    qos1_ids: PacketIdGenerator,
    qos2_ids: PacketIdGenerator,
    subscribe_ids: PacketIdGenerator,
    unsubscribe_ids: PacketIdGenerator,
    last_ping_time: Instant,
    ping_queue: VecDeque<Instant>,
    eof_count: u32,
}

impl Client<TcpConnector> {
    /// Create a TCP client. Nothing is sent until [`Client::connect`].
    pub fn new(config: ClientConfig) -> Result<Self> {
        let connector = TcpConnector::new(config.addr.clone());
        Self::with_connector(config, connector)
    }
}

impl<C: Connector> Client<C> {
    /// Create a client over a custom transport.
    pub fn with_connector(config: ClientConfig, connector: C) -> Result<Self> {
        let config = config.prepare()?;
        let reader = PacketReader::new(config.max_packet_size);

        Ok(Self {
            connector,
            session: Session::new(config),
            state: ConnectionState::Disconnected,
            stream: None,
            reader,
            store: PendingStore::new(),
            handler: None,
            qos1_ids: PacketIdGenerator::new(),
            qos2_ids: PacketIdGenerator::new(),
            subscribe_ids: PacketIdGenerator::new(),
            unsubscribe_ids: PacketIdGenerator::new(),
            last_ping_time: Instant::now(),
            ping_queue: VecDeque::new(),
            eof_count: 0,
        })
    }

    /// Register the callback handler.
    pub fn set_handler(&mut self, handler: impl Handler + 'static) {
        self.handler = Some(Box::new(handler));
    }

    /// Builder form of [`Client::set_handler`].
    pub fn with_handler(mut self, handler: impl Handler + 'static) -> Self {
        self.set_handler(handler);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn client_id(&self) -> &str {
        self.session.client_id()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Pending acknowledgments.
    pub fn store(&self) -> &PendingStore {
        &self.store
    }

    /// Whether there is no outstanding work for [`Client::run`].
    pub fn is_idle(&self) -> bool {
        self.store.count_waits() == 0 && self.session.subscriptions().is_idle()
    }

    // ========================================================================
    // Connection lifecycle
    // ========================================================================

    /// Open the transport, send CONNECT and wait for CONNACK.
    ///
    /// A refused connection closes the transport and returns
    /// [`Error::ConnectionRefused`].
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        self.state = ConnectionState::Connecting;
        match self.establish().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                self.stream = None;
                Err(e)
            }
        }
    }

    async fn establish(&mut self) -> Result<()> {
        let mut stream = self.open_transport().await?;

        let config = self.session.config();
        debug!(
            "Connecting to {} as {} ({}, keep_alive={}s, clean_session={})",
            self.connector.address(),
            config.client_id,
            config.protocol_version,
            config.keep_alive,
            config.clean_session
        );
        let connect_timeout = config.connect_timeout;

        write_packet(&mut stream, &Packet::Connect(self.session.connect_packet())).await?;

        self.reader.clear();
        let read = tokio::time::timeout(connect_timeout, self.reader.read(&mut stream));
        let packet = match read.await {
            Ok(result) => result?.ok_or(Error::ConnectionClosed)?,
            Err(_) => {
                let _ = stream.shutdown().await;
                return Err(Error::Network(format!(
                    "no CONNACK within {:?}",
                    connect_timeout
                )));
            }
        };

        let connack = match packet {
            Packet::ConnAck(connack) => connack,
            other => {
                let _ = stream.shutdown().await;
                return Err(Error::UnexpectedPacket {
                    expected: PacketType::ConnAck,
                    got: other.packet_type(),
                });
            }
        };

        if connack.code != ConnectReturnCode::Accepted {
            warn!("Broker {} refused connection: {}", self.connector.address(), connack.code);
            let _ = stream.shutdown().await;
            return Err(Error::ConnectionRefused(connack.code));
        }

        debug!("Connected successfully, session_present={}", connack.session_present);

        // Without a session the broker forgot every inbound QoS 2 flow and
        // may reuse those identifiers for new messages.
        if !connack.session_present {
            let dropped = self.store.clear_type(PacketType::PubRel);
            if dropped > 0 {
                debug!("Dropped {} inbound QoS 2 waits from the previous session", dropped);
            }
        }

        let now = Instant::now();
        self.stream = Some(stream);
        self.state = ConnectionState::Connected;
        self.session.set_connected_at(Some(now));
        self.last_ping_time = now;
        self.ping_queue.clear();
        self.eof_count = 0;

        self.notify(|h, s| h.connack(s, &connack));
        Ok(())
    }

    async fn open_transport(&self) -> Result<C::Stream> {
        let attempts = self.session.config().connect_attempts.max(1);

        for attempt in 1..=attempts {
            match self.connector.connect().await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    warn!(
                        "Connect attempt {}/{} to {} failed: {}",
                        attempt,
                        attempts,
                        self.connector.address(),
                        e
                    );
                    if attempt < attempts {
                        tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                    }
                }
            }
        }

        Err(Error::ConnectFailed {
            addr: self.connector.address().to_string(),
            attempts,
        })
    }

    /// Send DISCONNECT (best effort) and close the transport.
    pub async fn disconnect(&mut self) -> Result<()> {
        let was_connected = self.is_connected();

        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = write_packet(&mut stream, &Packet::Disconnect).await {
                debug!("DISCONNECT not delivered: {}", e);
            }
            let _ = stream.shutdown().await;
        }

        self.state = ConnectionState::Disconnected;
        self.session.set_connected_at(None);
        self.reader.clear();

        if was_connected {
            debug!("Disconnected from {}", self.connector.address());
            self.notify(|h, s| h.disconnect(s));
        }
        Ok(())
    }

    /// Drop the current connection, connect again and queue every
    /// subscription for renewal. Pending publishes are resent with DUP.
    pub async fn reconnect(&mut self) -> Result<()> {
        info!("Reconnecting to {}", self.connector.address());

        self.disconnect().await?;
        self.connect().await?;

        self.session.subscriptions_mut().requeue();
        self.store.reschedule_all(Instant::now());
        Ok(())
    }

    // ========================================================================
    // Publish
    // ========================================================================

    /// Publish and return as soon as the PUBLISH is written.
    ///
    /// Returns the packet identifier (0 for QoS 0). Acknowledgments and
    /// retries are handled by later loop iterations.
    pub async fn publish_async(
        &mut self,
        topic: &str,
        payload: impl Into<Bytes>,
        qos: QoS,
        retain: bool,
    ) -> Result<u16> {
        topic::validate_topic_name(topic)?;
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let message = Message::new(topic, payload).with_qos(qos).with_retain(retain);
        let pkid = match qos {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => self.allocate_pkid(QoS::AtLeastOnce)?,
            QoS::ExactlyOnce => self.allocate_pkid(QoS::ExactlyOnce)?,
        };

        let mut publish = Publish::new(topic, qos, message.payload.clone());
        publish.retain = retain;
        publish.pkid = pkid;
        trace!(
            "Publishing to {} ({} bytes, qos={:?}, pkid={})",
            topic,
            publish.payload.len(),
            qos,
            pkid
        );

        let awaited = match qos {
            QoS::AtMostOnce => None,
            QoS::AtLeastOnce => Some(PacketType::PubAck),
            QoS::ExactlyOnce => Some(PacketType::PubRec),
        };
        if let Some(awaited) = awaited {
            let wait = PendingAck::new(self.retry_deadline()).with_retry(message);
            self.store.add_wait(awaited, pkid, wait);
        }

        let sent = self.send(&Packet::Publish(publish)).await;
        self.recover(sent).await?;
        Ok(pkid)
    }

    /// Publish and drive the loop until the QoS flow for this message completes.
    pub async fn publish_sync(
        &mut self,
        topic: &str,
        payload: impl Into<Bytes>,
        qos: QoS,
        retain: bool,
    ) -> Result<u16> {
        let pkid = self.publish_async(topic, payload, qos, retain).await?;

        while self.publish_in_flight(pkid, qos) {
            self.step().await?;
        }
        Ok(pkid)
    }

    fn publish_in_flight(&self, pkid: u16, qos: QoS) -> bool {
        match qos {
            QoS::AtMostOnce => false,
            QoS::AtLeastOnce => !self.store.is_empty(PacketType::PubAck, Some(pkid)),
            QoS::ExactlyOnce => {
                !self.store.is_empty(PacketType::PubRec, Some(pkid))
                    || !self.store.is_empty(PacketType::PubComp, Some(pkid))
            }
        }
    }

    /// Next identifier from the tier's generator that no in-flight exchange uses.
    fn allocate_pkid(&mut self, qos: QoS) -> Result<u16> {
        let generator = match qos {
            QoS::ExactlyOnce => &mut self.qos2_ids,
            _ => &mut self.qos1_ids,
        };
        for _ in 0..u16::MAX {
            let pkid = generator.next();
            if !self.store.contains_id(pkid) {
                return Ok(pkid);
            }
        }
        Err(Error::PacketIdsExhausted)
    }

    // ========================================================================
    // Subscribe / Unsubscribe
    // ========================================================================

    /// Queue topic filters for subscription.
    ///
    /// The SUBSCRIBE is sent on the next loop iteration.
    pub fn subscribe(&mut self, filters: &[(&str, QoS)]) -> Result<()> {
        if filters.is_empty() {
            return Err(ProtocolError::EmptyTopicList(PacketType::Subscribe).into());
        }
        for (filter, _) in filters {
            topic::validate_topic_filter(filter)?;
        }

        self.session
            .subscriptions_mut()
            .queue_subscribe(filters.iter().map(|(f, qos)| (f.to_string(), *qos)));
        Ok(())
    }

    /// Queue topic filters for unsubscription.
    pub fn unsubscribe(&mut self, filters: &[&str]) -> Result<()> {
        if filters.is_empty() {
            return Err(ProtocolError::EmptyTopicList(PacketType::Unsubscribe).into());
        }
        for filter in filters {
            topic::validate_topic_filter(filter)?;
        }

        self.session
            .subscriptions_mut()
            .queue_unsubscribe(filters.iter().map(|f| f.to_string()));
        Ok(())
    }

    async fn flush_subscriptions(&mut self) -> Result<()> {
        let filters = self.session.subscriptions_mut().take_subscribe();
        if !filters.is_empty() {
            let pkid = self.subscribe_ids.next();
            debug!(
                "Subscribing to {:?} with pkid={}",
                filters.iter().map(|f| f.filter.as_str()).collect::<Vec<_>>(),
                pkid
            );
            self.session.subscriptions_mut().await_subscribe(pkid, filters.clone());
            self.send(&Packet::Subscribe(Subscribe::new(pkid, filters))).await?;
        }

        let filters = self.session.subscriptions_mut().take_unsubscribe();
        if !filters.is_empty() {
            let pkid = self.unsubscribe_ids.next();
            debug!("Unsubscribing from {:?} with pkid={}", filters, pkid);
            self.session.subscriptions_mut().await_unsubscribe(pkid, filters.clone());
            self.send(&Packet::Unsubscribe(Unsubscribe::new(pkid, filters))).await?;
        }
        Ok(())
    }

    // ========================================================================
    // Event loop
    // ========================================================================

    /// Drive the loop until nothing is pending and nothing is subscribed.
    ///
    /// Network failures are handled by reconnecting; only a failed reconnect
    /// or a protocol error ends the loop early.
    pub async fn run(&mut self) -> Result<()> {
        while !self.is_idle() {
            self.step().await?;
        }
        Ok(())
    }

    /// Run one loop iteration: flush subscription requests, keep alive,
    /// wait for one packet, dispatch it and resend overdue packets.
    pub async fn step(&mut self) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let result = self.iterate().await;
        self.recover(result).await
    }

    async fn iterate(&mut self) -> Result<()> {
        self.flush_subscriptions().await?;
        self.keepalive().await?;

        if let Some(packet) = self.poll(self.poll_interval()).await? {
            self.handle_incoming(packet).await?;
        }

        self.retry_expired().await
    }

    /// Turn a network error into a reconnect.
    async fn recover(&mut self, result: Result<()>) -> Result<()> {
        match result {
            Err(e) if e.is_network() => {
                warn!("Network error: {}, reconnecting", e);
                self.reconnect().await
            }
            other => other,
        }
    }

    /// How long one poll may wait: half the keepalive (or the retry timeout
    /// without keepalive), cut short by the next ping or resend deadline.
    fn poll_interval(&self) -> Duration {
        let now = Instant::now();
        let keep_alive = self.session.config().keep_alive;

        let mut interval = if keep_alive > 0 {
            let half = Self::half_keep_alive(keep_alive);
            let last_ping = match self.ping_queue.back() {
                Some(&sent) => sent.max(self.last_ping_time),
                None => self.last_ping_time,
            };
            let mut interval = half.min((last_ping + half).saturating_duration_since(now));
            if let Some(&oldest) = self.ping_queue.front() {
                interval = interval.min((oldest + half * 3).saturating_duration_since(now));
            }
            interval
        } else {
            self.session.config().retry_timeout
        };

        if let Some(deadline) = self.store.next_deadline() {
            interval = interval.min(deadline.saturating_duration_since(now));
        }
        interval
    }

    fn half_keep_alive(keep_alive: u16) -> Duration {
        Duration::from_millis(keep_alive as u64 * 500)
    }

    fn retry_deadline(&self) -> Instant {
        Instant::now() + self.session.config().retry_timeout
    }

    /// Wait up to `timeout` for one packet.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<Packet>> {
        if let Some(packet) = self.reader.try_decode()? {
            return Ok(Some(packet));
        }

        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        match tokio::time::timeout(timeout, self.reader.read(stream)).await {
            Err(_) => Ok(None),
            Ok(Ok(Some(packet))) => {
                self.eof_count = 0;
                Ok(Some(packet))
            }
            Ok(Ok(None)) => {
                self.on_eof().await?;
                Ok(None)
            }
            Ok(Err(e)) => Err(e),
        }
    }

    async fn on_eof(&mut self) -> Result<()> {
        self.eof_count += 1;
        if self.eof_count > MAX_EOF {
            return Err(Error::Network(format!(
                "{} consecutive EOF reads from {}",
                self.eof_count,
                self.connector.address()
            )));
        }
        if self.eof_count > EOF_BACKOFF_AFTER {
            let backoff = Duration::from_millis(1 << self.eof_count);
            trace!("EOF #{}, backing off {:?}", self.eof_count, backoff);
            tokio::time::sleep(backoff).await;
        }
        Ok(())
    }

    async fn keepalive(&mut self) -> Result<()> {
        let keep_alive = self.session.config().keep_alive;
        if keep_alive == 0 {
            return Ok(());
        }

        let now = Instant::now();
        let half = Self::half_keep_alive(keep_alive);
        let expiry = Self::half_keep_alive(keep_alive) * 3;

        if let Some(&oldest) = self.ping_queue.front() {
            if now.duration_since(oldest) >= expiry {
                return Err(Error::Network(format!(
                    "no PINGRESP within {:?}",
                    expiry
                )));
            }
        }

        let due = now.duration_since(self.last_ping_time) >= half;
        let recently_sent = self
            .ping_queue
            .back()
            .is_some_and(|&sent| now.duration_since(sent) < half);
        if due && !recently_sent {
            trace!("Sending PINGREQ");
            self.send(&Packet::PingReq).await?;
            self.ping_queue.push_back(now);
        }
        Ok(())
    }

    async fn retry_expired(&mut self) -> Result<()> {
        let now = Instant::now();

        for (awaited, pkid) in self.store.expired(now) {
            let packet = match awaited {
                PacketType::PubAck | PacketType::PubRec => {
                    let Some(message) = self
                        .store
                        .get_wait(awaited, pkid)
                        .and_then(|wait| wait.retry.clone())
                    else {
                        continue;
                    };
                    debug!("No {} for pkid={}, resending PUBLISH", awaited, pkid);
                    Packet::Publish(Publish {
                        dup: true,
                        qos: message.qos,
                        retain: message.retain,
                        topic: message.topic,
                        pkid,
                        payload: message.payload,
                    })
                }
                PacketType::PubRel => {
                    debug!("No PUBREL for pkid={}, resending PUBREC", pkid);
                    Packet::PubRec(PubRec::new(pkid))
                }
                PacketType::PubComp => {
                    debug!("No PUBCOMP for pkid={}, resending PUBREL", pkid);
                    Packet::PubRel(PubRel::new(pkid))
                }
                _ => continue,
            };

            self.store.refresh(awaited, pkid, now + self.session.config().retry_timeout);
            self.send(&packet).await?;
        }
        Ok(())
    }

    // ========================================================================
    // Inbound dispatch
    // ========================================================================

    /// Process one inbound packet. Returns `false` for packets the client
    /// does not handle.
    pub async fn handle_incoming(&mut self, packet: Packet) -> Result<bool> {
        match packet {
            Packet::PingResp => {
                self.ping_queue.pop_front();
                self.last_ping_time = Instant::now();
                self.notify(|h, s| h.pingresp(s));
            }
            Packet::Publish(publish) => self.handle_publish(publish).await?,
            Packet::PubAck(ack) => {
                if self.store.del_wait(PacketType::PubAck, ack.pkid).is_none() {
                    debug!("PUBACK for unknown pkid={}", ack.pkid);
                }
                self.notify(|h, s| h.puback(s, &ack));
            }
            Packet::PubRec(rec) => {
                let known = self.store.del_wait(PacketType::PubRec, rec.pkid).is_some()
                    || !self.store.is_empty(PacketType::PubComp, Some(rec.pkid));
                if known {
                    let wait = PendingAck::new(self.retry_deadline());
                    if !self.store.add_wait(PacketType::PubComp, rec.pkid, wait) {
                        self.store.refresh(PacketType::PubComp, rec.pkid, self.retry_deadline());
                    }
                } else {
                    debug!("PUBREC for unknown pkid={}", rec.pkid);
                }
                self.send(&Packet::PubRel(PubRel::new(rec.pkid))).await?;
                self.notify(|h, s| h.pubrec(s, &rec));
            }
            Packet::PubRel(rel) => {
                self.send(&Packet::PubComp(PubComp::new(rel.pkid))).await?;
                self.store.del_wait(PacketType::PubRel, rel.pkid);
                self.notify(|h, s| h.pubrel(s, &rel));
            }
            Packet::PubComp(comp) => {
                if self.store.del_wait(PacketType::PubComp, comp.pkid).is_none() {
                    debug!("PUBCOMP for unknown pkid={}", comp.pkid);
                }
                self.notify(|h, s| h.pubcomp(s, &comp));
            }
            Packet::SubAck(suback) => {
                self.session.subscriptions_mut().complete_subscribe(&suback);
                self.notify(|h, s| h.suback(s, &suback));
            }
            Packet::UnsubAck(ack) => {
                self.session.subscriptions_mut().complete_unsubscribe(ack.pkid);
                self.notify(|h, s| h.unsuback(s, &ack));
            }
            Packet::ConnAck(_) => {
                warn!("Ignoring CONNACK outside of connect");
                return Ok(false);
            }
            other => {
                debug!("Ignoring {} packet", other.packet_type());
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn handle_publish(&mut self, publish: Publish) -> Result<()> {
        trace!(
            "Received message on {} (qos={:?}, pkid={})",
            publish.topic,
            publish.qos,
            publish.pkid
        );

        match publish.qos {
            QoS::AtMostOnce => {}
            QoS::AtLeastOnce => {
                self.send(&Packet::PubAck(PubAck::new(publish.pkid))).await?;
            }
            QoS::ExactlyOnce => {
                // A PUBREL wait exists only for messages handed to the handler.
                let fresh = self.store.is_empty(PacketType::PubRel, Some(publish.pkid));
                self.send(&Packet::PubRec(PubRec::new(publish.pkid))).await?;
                if !fresh {
                    debug!("Duplicate QoS 2 PUBLISH pkid={}, not delivered", publish.pkid);
                    return Ok(());
                }
                let wait = PendingAck::new(self.retry_deadline());
                self.store.add_wait(PacketType::PubRel, publish.pkid, wait);
            }
        }

        self.notify(|h, s| h.publish(s, &publish));
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn send(&mut self, packet: &Packet) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        write_packet(stream, packet).await
    }

    fn notify(&mut self, f: impl FnOnce(&mut dyn Handler, &Session)) {
        if let Some(handler) = self.handler.as_mut() {
            f(&mut **handler, &self.session);
        }
    }
}

impl<C: Connector> std::fmt::Debug for Client<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("addr", &self.connector.address())
            .field("client_id", &self.session.client_id())
            .field("state", &self.state)
            .field("pending", &self.store.count_waits())
            .finish()
    }
}
