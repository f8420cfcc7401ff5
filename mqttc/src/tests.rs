//! Integration tests for mqttc.
//!
//! Session engine tests run against a scripted broker over in-memory duplex
//! streams with paused time, so retry and keepalive deadlines elapse
//! instantly. Interop tests run the client against a standard rumqttd broker.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p giztoy-mqttc
//! ```
//!
//! ## Protocol Support
//!
//! | Protocol | Protocol Level | Support |
//! |----------|---------------|---------|
//! | MQTT 3.1 | 3 | ✅ Connect handshake |
//! | MQTT 3.1.1 | 4 (v4) | ✅ Full support |
//! | MQTT 5.0 | 5 (v5) | ❌ Not supported |

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::DuplexStream;

use crate::handler::Handler;
use crate::protocol::{
    ConnAck, ConnectReturnCode, Packet, PacketReader, PacketType, PubAck, PubComp, PubRec, PubRel,
    Publish, SubAck, SubscribeReturnCode, UnsubAck, write_packet,
};
use crate::session::Session;
use crate::transport::Connector;
use crate::{Client, ClientConfig, ConnectionState, Error, ProtocolError, QoS};

/// Find an available port for testing.
fn find_available_port() -> u16 {
    static PORT: AtomicUsize = AtomicUsize::new(18000);
    PORT.fetch_add(1, Ordering::SeqCst) as u16
}

/// Log to the test output, filtered by `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Scripted broker
// ============================================================================

/// Hands out pre-built duplex streams, one per connect.
struct MockConnector {
    streams: Mutex<VecDeque<DuplexStream>>,
}

impl MockConnector {
    fn new(streams: impl IntoIterator<Item = DuplexStream>) -> Self {
        Self {
            streams: Mutex::new(streams.into_iter().collect()),
        }
    }
}

impl Connector for MockConnector {
    type Stream = DuplexStream;

    async fn connect(&self) -> io::Result<DuplexStream> {
        let next = self.streams.lock().unwrap().pop_front();
        next.ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionRefused))
    }

    fn address(&self) -> &str {
        "mock"
    }
}

/// Broker side of a duplex stream.
struct MockBroker {
    stream: DuplexStream,
    reader: PacketReader,
}

impl MockBroker {
    async fn recv(&mut self) -> Packet {
        tokio::time::timeout(Duration::from_secs(3600), self.reader.read(&mut self.stream))
            .await
            .expect("timed out waiting for client packet")
            .unwrap()
            .expect("client closed the connection")
    }

    async fn send(&mut self, packet: Packet) {
        write_packet(&mut self.stream, &packet).await.unwrap();
    }

    /// Whether the client wrote nothing within `wait`.
    async fn silent_for(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.reader.read(&mut self.stream))
            .await
            .is_err()
    }

    /// Next read after the client dropped the stream.
    async fn expect_eof(&mut self) {
        let next = self.reader.read(&mut self.stream).await.unwrap();
        assert!(next.is_none(), "expected EOF, got {:?}", next);
    }
}

/// A duplex pair with CONNACK already queued for the client.
async fn broker_pair(code: ConnectReturnCode) -> (DuplexStream, MockBroker) {
    broker_pair_with_session(code, false).await
}

async fn broker_pair_with_session(
    code: ConnectReturnCode,
    session_present: bool,
) -> (DuplexStream, MockBroker) {
    let (client_io, broker_io) = tokio::io::duplex(64 * 1024);
    let mut broker = MockBroker {
        stream: broker_io,
        reader: PacketReader::default(),
    };
    broker
        .send(Packet::ConnAck(ConnAck::new(code, session_present)))
        .await;
    (client_io, broker)
}

/// A client with two brokers lined up: the first is already connected.
async fn connected_with_fallback(
    fallback_session_present: bool,
    recorder: &Recorder,
) -> (Client<MockConnector>, MockBroker, MockBroker) {
    let (client_io1, mut broker1) = broker_pair(ConnectReturnCode::Accepted).await;
    let (client_io2, broker2) =
        broker_pair_with_session(ConnectReturnCode::Accepted, fallback_session_present).await;
    let connector = MockConnector::new([client_io1, client_io2]);
    let mut client = Client::with_connector(test_config(), connector)
        .unwrap()
        .with_handler(recorder.clone());
    client.connect().await.unwrap();
    assert!(matches!(broker1.recv().await, Packet::Connect(_)));
    (client, broker1, broker2)
}

fn qos2_publish(payload: &'static str, pkid: u16) -> Publish {
    let mut publish = Publish::new("cmd/run", QoS::ExactlyOnce, payload);
    publish.pkid = pkid;
    publish
}

fn test_config() -> ClientConfig {
    ClientConfig::new("mock", "test-client")
        .with_keep_alive(0)
        .with_connect_attempts(1)
}

/// Connect a client to a fresh scripted broker and consume its CONNECT.
async fn connected(
    config: ClientConfig,
    recorder: &Recorder,
) -> (Client<MockConnector>, MockBroker) {
    let (client_io, mut broker) = broker_pair(ConnectReturnCode::Accepted).await;
    let mut client = Client::with_connector(config, MockConnector::new([client_io]))
        .unwrap()
        .with_handler(recorder.clone());
    client.connect().await.unwrap();
    assert!(matches!(broker.recv().await, Packet::Connect(_)));
    (client, broker)
}

/// Records handler callbacks.
#[derive(Clone, Default)]
struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
    messages: Arc<Mutex<Vec<(String, Bytes)>>>,
}

impl Recorder {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn messages(&self) -> Vec<(String, Bytes)> {
        self.messages.lock().unwrap().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl Handler for Recorder {
    fn connack(&mut self, _session: &Session, packet: &ConnAck) {
        self.push(format!("connack {}", packet.session_present));
    }

    fn disconnect(&mut self, _session: &Session) {
        self.push("disconnect".into());
    }

    fn suback(&mut self, _session: &Session, packet: &SubAck) {
        self.push(format!("suback {}", packet.pkid));
    }

    fn unsuback(&mut self, _session: &Session, packet: &UnsubAck) {
        self.push(format!("unsuback {}", packet.pkid));
    }

    fn publish(&mut self, _session: &Session, packet: &Publish) {
        self.messages
            .lock()
            .unwrap()
            .push((packet.topic.clone(), packet.payload.clone()));
    }

    fn puback(&mut self, _session: &Session, packet: &PubAck) {
        self.push(format!("puback {}", packet.pkid));
    }

    fn pubrec(&mut self, _session: &Session, packet: &PubRec) {
        self.push(format!("pubrec {}", packet.pkid));
    }

    fn pubrel(&mut self, _session: &Session, packet: &PubRel) {
        self.push(format!("pubrel {}", packet.pkid));
    }

    fn pubcomp(&mut self, _session: &Session, packet: &PubComp) {
        self.push(format!("pubcomp {}", packet.pkid));
    }

    fn pingresp(&mut self, _session: &Session) {
        self.push("pingresp".into());
    }
}

fn expect_publish(packet: Packet) -> Publish {
    match packet {
        Packet::Publish(publish) => publish,
        other => panic!("expected PUBLISH, got {:?}", other),
    }
}

// ============================================================================
// Tests: session engine against the scripted broker
// ============================================================================

mod session_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_connect_handshake() {
        let recorder = Recorder::default();
        let (client, _broker) = connected(test_config(), &recorder).await;

        assert_eq!(client.state(), ConnectionState::Connected);
        assert!(client.session().connected_at().is_some());
        assert_eq!(recorder.events(), vec!["connack false"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_refused() {
        let (client_io, mut broker) = broker_pair(ConnectReturnCode::NotAuthorized).await;
        let connector = MockConnector::new([client_io]);
        let mut client = Client::with_connector(test_config(), connector).unwrap();

        let err = client.connect().await.unwrap_err();
        assert!(matches!(
            err,
            Error::ConnectionRefused(ConnectReturnCode::NotAuthorized)
        ));
        assert_eq!(client.state(), ConnectionState::Disconnected);

        // The client sent CONNECT and then closed the transport.
        assert!(matches!(broker.recv().await, Packet::Connect(_)));
        broker.expect_eof().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_attempts_exhausted() {
        let config = test_config().with_connect_attempts(3);
        let mut client = Client::with_connector(config, MockConnector::new([])).unwrap();

        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, Error::ConnectFailed { attempts: 3, .. }));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_operations_require_connection() {
        let mut client = Client::with_connector(test_config(), MockConnector::new([])).unwrap();

        let err = client
            .publish_async("a/b", "payload", QoS::AtLeastOnce, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConnected));
        assert!(matches!(client.step().await, Err(Error::NotConnected)));
        assert_eq!(client.store().count_waits(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_rejects_wildcard_topic() {
        let recorder = Recorder::default();
        let (mut client, mut broker) = connected(test_config(), &recorder).await;

        let err = client
            .publish_async("a/+", "payload", QoS::AtMostOnce, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::InvalidTopic { .. })));
        assert!(broker.silent_for(Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_qos0_publish() {
        let recorder = Recorder::default();
        let (mut client, mut broker) = connected(test_config(), &recorder).await;

        let pkid = client
            .publish_async("sensors/temp", "21.5", QoS::AtMostOnce, true)
            .await
            .unwrap();
        assert_eq!(pkid, 0);
        assert_eq!(client.store().count_waits(), 0);

        let publish = expect_publish(broker.recv().await);
        assert_eq!(publish.topic, "sensors/temp");
        assert_eq!(publish.payload, Bytes::from_static(b"21.5"));
        assert_eq!(publish.qos, QoS::AtMostOnce);
        assert!(publish.retain);
        assert!(!publish.dup);
    }

    #[tokio::test(start_paused = true)]
    async fn test_qos1_retry_then_ack() {
        let recorder = Recorder::default();
        let (mut client, mut broker) = connected(test_config(), &recorder).await;

        let pkid = client
            .publish_async("a/b", "hello", QoS::AtLeastOnce, false)
            .await
            .unwrap();
        assert_ne!(pkid, 0);
        assert!(!client.store().is_empty(PacketType::PubAck, Some(pkid)));

        let first = expect_publish(broker.recv().await);
        assert_eq!(first.pkid, pkid);
        assert!(!first.dup);

        // No PUBACK within the retry timeout: resent once with DUP set.
        client.step().await.unwrap();
        let resent = expect_publish(broker.recv().await);
        assert_eq!(resent.pkid, pkid);
        assert!(resent.dup);
        assert_eq!(resent.payload, Bytes::from_static(b"hello"));

        broker.send(Packet::PubAck(PubAck::new(pkid))).await;
        client.step().await.unwrap();
        assert_eq!(client.store().count_waits(), 0);
        assert_eq!(recorder.count("puback"), 1);

        // Nothing left to resend.
        client.step().await.unwrap();
        assert!(broker.silent_for(Duration::from_secs(10)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_qos1_publish_sync() {
        let recorder = Recorder::default();
        let (mut client, mut broker) = connected(test_config(), &recorder).await;

        let broker_side = async {
            let publish = expect_publish(broker.recv().await);
            broker.send(Packet::PubAck(PubAck::new(publish.pkid))).await;
            publish.pkid
        };
        let (result, acked) = tokio::join!(
            client.publish_sync("a/b", "hello", QoS::AtLeastOnce, false),
            broker_side
        );

        assert_eq!(result.unwrap(), acked);
        assert_eq!(client.store().count_waits(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_qos2_outbound_flow() {
        let recorder = Recorder::default();
        let (mut client, mut broker) = connected(test_config(), &recorder).await;

        let pkid = client
            .publish_async("a/b", "once", QoS::ExactlyOnce, false)
            .await
            .unwrap();
        let publish = expect_publish(broker.recv().await);
        assert_eq!(publish.qos, QoS::ExactlyOnce);
        assert_eq!(publish.pkid, pkid);

        broker.send(Packet::PubRec(PubRec::new(pkid))).await;
        client.step().await.unwrap();
        assert!(client.store().is_empty(PacketType::PubRec, None));
        assert!(!client.store().is_empty(PacketType::PubComp, Some(pkid)));
        assert_eq!(broker.recv().await, Packet::PubRel(PubRel::new(pkid)));

        broker.send(Packet::PubComp(PubComp::new(pkid))).await;
        client.step().await.unwrap();
        assert_eq!(client.store().count_waits(), 0);
        assert_eq!(
            recorder.events(),
            vec![
                "connack false".to_string(),
                format!("pubrec {pkid}"),
                format!("pubcomp {pkid}"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_qos2_pubrel_retry() {
        let recorder = Recorder::default();
        let (mut client, mut broker) = connected(test_config(), &recorder).await;

        let pkid = client
            .publish_async("a/b", "once", QoS::ExactlyOnce, false)
            .await
            .unwrap();
        expect_publish(broker.recv().await);

        broker.send(Packet::PubRec(PubRec::new(pkid))).await;
        client.step().await.unwrap();
        assert_eq!(broker.recv().await, Packet::PubRel(PubRel::new(pkid)));

        // PUBCOMP never arrives, so PUBREL is sent again.
        client.step().await.unwrap();
        assert_eq!(broker.recv().await, Packet::PubRel(PubRel::new(pkid)));
        assert!(!client.store().is_empty(PacketType::PubComp, Some(pkid)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_qos2_inbound_delivered_once() {
        let recorder = Recorder::default();
        let (mut client, mut broker) = connected(test_config(), &recorder).await;

        let mut publish = Publish::new("cmd/run", QoS::ExactlyOnce, "go");
        publish.pkid = 7;
        broker.send(Packet::Publish(publish.clone())).await;
        publish.dup = true;
        broker.send(Packet::Publish(publish)).await;
        broker.send(Packet::PubRel(PubRel::new(7))).await;

        for _ in 0..3 {
            client.step().await.unwrap();
        }

        assert_eq!(broker.recv().await, Packet::PubRec(PubRec::new(7)));
        assert_eq!(broker.recv().await, Packet::PubRec(PubRec::new(7)));
        assert_eq!(broker.recv().await, Packet::PubComp(PubComp::new(7)));

        assert_eq!(
            recorder.messages(),
            vec![("cmd/run".to_string(), Bytes::from_static(b"go"))]
        );
        assert_eq!(client.store().count_waits(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_qos1_inbound_acked() {
        let recorder = Recorder::default();
        let (mut client, mut broker) = connected(test_config(), &recorder).await;

        let mut publish = Publish::new("cmd/run", QoS::AtLeastOnce, "go");
        publish.pkid = 42;
        broker.send(Packet::Publish(publish)).await;

        client.step().await.unwrap();
        assert_eq!(broker.recv().await, Packet::PubAck(PubAck::new(42)));
        assert_eq!(recorder.messages().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_qos2_publish_retry_before_pubrec() {
        let recorder = Recorder::default();
        let (mut client, mut broker) = connected(test_config(), &recorder).await;

        let pkid = client
            .publish_async("a/b", "once", QoS::ExactlyOnce, false)
            .await
            .unwrap();
        let first = expect_publish(broker.recv().await);
        assert!(!first.dup);

        // No PUBREC within the retry timeout: PUBLISH goes out again with DUP.
        client.step().await.unwrap();
        let resent = expect_publish(broker.recv().await);
        assert!(resent.dup);
        assert_eq!(resent.pkid, pkid);
        assert_eq!(resent.qos, QoS::ExactlyOnce);
        assert_eq!(resent.payload, Bytes::from_static(b"once"));
        assert!(!client.store().is_empty(PacketType::PubRec, Some(pkid)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_qos2_inbound_pubrec_retry() {
        let recorder = Recorder::default();
        let (mut client, mut broker) = connected(test_config(), &recorder).await;

        broker.send(Packet::Publish(qos2_publish("go", 9))).await;
        client.step().await.unwrap();
        assert_eq!(broker.recv().await, Packet::PubRec(PubRec::new(9)));

        // PUBREL is overdue, so PUBREC is sent again.
        client.step().await.unwrap();
        assert_eq!(broker.recv().await, Packet::PubRec(PubRec::new(9)));
        assert!(!client.store().is_empty(PacketType::PubRel, Some(9)));
        assert_eq!(recorder.messages().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_qos2_inbound_redelivered_after_pubrec_write_fails() {
        let recorder = Recorder::default();
        // The second broker resumes the session, so no wait is dropped on connect.
        let (mut client, mut broker1, mut broker2) =
            connected_with_fallback(true, &recorder).await;

        let publish = qos2_publish("go", 7);
        broker1.send(Packet::Publish(publish.clone())).await;
        drop(broker1);

        // PUBREC cannot be written: nothing is delivered and the client reconnects.
        client.step().await.unwrap();
        assert_eq!(recorder.count("connack"), 2);
        assert!(recorder.messages().is_empty());
        assert!(client.store().is_empty(PacketType::PubRel, None));

        let mut redelivered = publish;
        redelivered.dup = true;
        broker2.send(Packet::Publish(redelivered)).await;
        client.step().await.unwrap();

        assert!(matches!(broker2.recv().await, Packet::Connect(_)));
        assert_eq!(broker2.recv().await, Packet::PubRec(PubRec::new(7)));
        assert_eq!(
            recorder.messages(),
            vec![("cmd/run".to_string(), Bytes::from_static(b"go"))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_session_forgets_inbound_qos2() {
        let recorder = Recorder::default();
        let (mut client, mut broker1, mut broker2) =
            connected_with_fallback(false, &recorder).await;

        broker1.send(Packet::Publish(qos2_publish("first", 7))).await;
        client.step().await.unwrap();
        assert_eq!(broker1.recv().await, Packet::PubRec(PubRec::new(7)));
        assert!(!client.store().is_empty(PacketType::PubRel, Some(7)));

        client.reconnect().await.unwrap();
        assert_eq!(client.store().count_waits(), 0);

        // The fresh session reuses the identifier for a new message.
        broker2.send(Packet::Publish(qos2_publish("second", 7))).await;
        client.step().await.unwrap();

        assert!(matches!(broker2.recv().await, Packet::Connect(_)));
        assert_eq!(broker2.recv().await, Packet::PubRec(PubRec::new(7)));
        assert_eq!(
            recorder.messages(),
            vec![
                ("cmd/run".to_string(), Bytes::from_static(b"first")),
                ("cmd/run".to_string(), Bytes::from_static(b"second")),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_resumed_session_keeps_inbound_qos2() {
        let recorder = Recorder::default();
        let (mut client, mut broker1, mut broker2) =
            connected_with_fallback(true, &recorder).await;

        broker1.send(Packet::Publish(qos2_publish("first", 7))).await;
        client.step().await.unwrap();
        assert_eq!(broker1.recv().await, Packet::PubRec(PubRec::new(7)));

        client.reconnect().await.unwrap();
        assert!(!client.store().is_empty(PacketType::PubRel, Some(7)));

        // Redelivery within the resumed session is not handed over again.
        let mut redelivered = qos2_publish("first", 7);
        redelivered.dup = true;
        broker2.send(Packet::Publish(redelivered)).await;
        client.step().await.unwrap();

        assert!(matches!(broker2.recv().await, Packet::Connect(_)));
        assert_eq!(broker2.recv().await, Packet::PubRec(PubRec::new(7)));
        assert_eq!(recorder.messages().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eof_backoff_then_reconnect() {
        let recorder = Recorder::default();
        let (mut client, broker) = connected(test_config(), &recorder).await;
        drop(broker);

        let start = tokio::time::Instant::now();
        for _ in 0..5 {
            client.step().await.unwrap();
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        // EOF reads 6 to 10 sleep 2^n milliseconds each.
        for _ in 5..10 {
            client.step().await.unwrap();
        }
        let backoff = start.elapsed();
        assert!(backoff >= Duration::from_millis(64 + 128 + 256 + 512 + 1024));
        assert!(backoff < Duration::from_secs(2));
        assert!(client.is_connected());

        // The 11th EOF gives up on the connection; no second broker exists.
        let err = client.step().await.unwrap_err();
        assert!(matches!(err, Error::ConnectFailed { attempts: 1, .. }));
        assert_eq!(recorder.count("disconnect"), 1);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_subscribe_rejected() {
        let recorder = Recorder::default();
        let (mut client, mut broker) = connected(test_config(), &recorder).await;

        let err = client.subscribe(&[]).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::EmptyTopicList(PacketType::Subscribe))
        ));
        let err = client.unsubscribe(&[]).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::EmptyTopicList(PacketType::Unsubscribe))
        ));

        client.step().await.unwrap();
        assert!(!client.session().subscriptions().has_pending());
        assert!(broker.silent_for(Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_partial_failure() {
        let recorder = Recorder::default();
        let (mut client, mut broker) = connected(test_config(), &recorder).await;

        client
            .subscribe(&[("a/#", QoS::AtLeastOnce), ("b/+", QoS::ExactlyOnce)])
            .unwrap();
        client.step().await.unwrap();

        let Packet::Subscribe(subscribe) = broker.recv().await else {
            panic!("expected SUBSCRIBE");
        };
        assert_eq!(subscribe.filters.len(), 2);

        broker
            .send(Packet::SubAck(SubAck::new(
                subscribe.pkid,
                vec![SubscribeReturnCode::Success(QoS::AtLeastOnce), SubscribeReturnCode::Failure],
            )))
            .await;
        client.step().await.unwrap();

        let topics = client.session().topics();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics.get("a/#"), Some(&QoS::AtLeastOnce));
        // Subscribed topics keep the run loop alive.
        assert!(!client.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_suback_count_mismatch_ignored() {
        let recorder = Recorder::default();
        let (mut client, mut broker) = connected(test_config(), &recorder).await;

        client
            .subscribe(&[("a", QoS::AtLeastOnce), ("b", QoS::AtLeastOnce)])
            .unwrap();
        client.step().await.unwrap();
        let Packet::Subscribe(subscribe) = broker.recv().await else {
            panic!("expected SUBSCRIBE");
        };

        broker
            .send(Packet::SubAck(SubAck::new(
                subscribe.pkid,
                vec![SubscribeReturnCode::Success(QoS::AtLeastOnce)],
            )))
            .await;
        client.step().await.unwrap();

        assert!(client.session().topics().is_empty());
        assert!(!client.session().subscriptions().has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe() {
        let recorder = Recorder::default();
        let (mut client, mut broker) = connected(test_config(), &recorder).await;

        client.subscribe(&[("a", QoS::AtMostOnce)]).unwrap();
        client.step().await.unwrap();
        let Packet::Subscribe(subscribe) = broker.recv().await else {
            panic!("expected SUBSCRIBE");
        };
        broker
            .send(Packet::SubAck(SubAck::new(
                subscribe.pkid,
                vec![SubscribeReturnCode::Success(QoS::AtMostOnce)],
            )))
            .await;
        client.step().await.unwrap();
        assert!(client.session().topics().contains_key("a"));

        client.unsubscribe(&["a"]).unwrap();
        client.step().await.unwrap();
        let Packet::Unsubscribe(unsubscribe) = broker.recv().await else {
            panic!("expected UNSUBSCRIBE");
        };
        assert_eq!(unsubscribe.filters, vec!["a".to_string()]);

        broker.send(Packet::UnsubAck(UnsubAck::new(unsubscribe.pkid))).await;
        client.step().await.unwrap();
        assert!(client.session().topics().is_empty());
        assert!(client.is_idle());
        assert_eq!(recorder.count("unsuback"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_connack_ignored() {
        let recorder = Recorder::default();
        let (mut client, _broker) = connected(test_config(), &recorder).await;

        let handled = client
            .handle_incoming(Packet::ConnAck(ConnAck::new(ConnectReturnCode::Accepted, true)))
            .await
            .unwrap();
        assert!(!handled);
        assert_eq!(recorder.count("connack"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_ping() {
        let recorder = Recorder::default();
        let (mut client, mut broker) = connected(test_config().with_keep_alive(2), &recorder).await;

        // Nothing is due during the first half interval.
        client.step().await.unwrap();

        let broker_side = async {
            assert_eq!(broker.recv().await, Packet::PingReq);
            broker.send(Packet::PingResp).await;
        };
        let (result, ()) = tokio::join!(client.step(), broker_side);
        result.unwrap();

        assert_eq!(recorder.count("pingresp"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_timeout_reconnects() {
        init_tracing();
        let recorder = Recorder::default();
        let (mut client, mut broker) = connected(test_config().with_keep_alive(2), &recorder).await;

        // The broker never answers PINGREQ and no second broker is available.
        let mut err = None;
        for _ in 0..20 {
            if let Err(e) = client.step().await {
                err = Some(e);
                break;
            }
        }

        assert!(matches!(err, Some(Error::ConnectFailed { attempts: 1, .. })));
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(broker.recv().await, Packet::PingReq);
        assert_eq!(recorder.count("disconnect"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_resubscribes_and_resends() {
        init_tracing();
        let recorder = Recorder::default();
        let (client_io1, mut broker1) = broker_pair(ConnectReturnCode::Accepted).await;
        let (client_io2, mut broker2) = broker_pair(ConnectReturnCode::Accepted).await;
        let connector = MockConnector::new([client_io1, client_io2]);
        let mut client = Client::with_connector(test_config(), connector)
            .unwrap()
            .with_handler(recorder.clone());
        client.connect().await.unwrap();
        assert!(matches!(broker1.recv().await, Packet::Connect(_)));

        client.subscribe(&[("a/#", QoS::AtLeastOnce)]).unwrap();
        client.step().await.unwrap();
        let Packet::Subscribe(subscribe) = broker1.recv().await else {
            panic!("expected SUBSCRIBE");
        };
        broker1
            .send(Packet::SubAck(SubAck::new(
                subscribe.pkid,
                vec![SubscribeReturnCode::Success(QoS::AtLeastOnce)],
            )))
            .await;
        client.step().await.unwrap();

        let pkid = client
            .publish_async("a/b", "kept", QoS::AtLeastOnce, false)
            .await
            .unwrap();
        expect_publish(broker1.recv().await);

        // Broker goes away without a word.
        drop(broker1);
        for _ in 0..30 {
            if recorder.count("connack") == 2 {
                break;
            }
            client.step().await.unwrap();
        }
        assert_eq!(recorder.count("connack"), 2);
        assert!(client.is_connected());

        client.step().await.unwrap();

        assert!(matches!(broker2.recv().await, Packet::Connect(_)));
        let Packet::Subscribe(resubscribe) = broker2.recv().await else {
            panic!("expected SUBSCRIBE after reconnect");
        };
        assert_eq!(resubscribe.filters[0].filter, "a/#");
        let resent = expect_publish(broker2.recv().await);
        assert_eq!(resent.pkid, pkid);
        assert!(resent.dup);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect() {
        let recorder = Recorder::default();
        let (mut client, mut broker) = connected(test_config(), &recorder).await;

        client.disconnect().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(broker.recv().await, Packet::Disconnect);
        broker.expect_eof().await;
        assert_eq!(recorder.count("disconnect"), 1);

        // A second disconnect is a no-op.
        client.disconnect().await.unwrap();
        assert_eq!(recorder.count("disconnect"), 1);
    }
}

// ============================================================================
// Tests: mqttc against standard rumqttd broker
// ============================================================================

mod rumqttd_tests {
    use super::*;

    /// Test basic connection to rumqttd.
    #[tokio::test]
    async fn test_client_connect_to_rumqttd() {
        let port = find_available_port();
        let addr = format!("127.0.0.1:{}", port);

        // Start rumqttd broker
        let config = create_rumqttd_config(&addr);
        let mut broker = rumqttd::Broker::new(config);
        let _handle = std::thread::spawn(move || {
            broker.start().unwrap();
        });

        // Wait for broker to start
        tokio::time::sleep(Duration::from_millis(200)).await;

        let mut client = Client::new(ClientConfig::new(&addr, "test-client")).unwrap();
        let result = client.connect().await;
        assert!(result.is_ok(), "Failed to connect: {:?}", result.err());

        client.disconnect().await.unwrap();
    }

    /// Test QoS 1 publish and subscribe with rumqttd.
    #[tokio::test]
    async fn test_client_qos1_pub_sub_with_rumqttd() {
        init_tracing();
        let port = find_available_port();
        let addr = format!("127.0.0.1:{}", port);

        let config = create_rumqttd_config(&addr);
        let mut broker = rumqttd::Broker::new(config);
        let _handle = std::thread::spawn(move || {
            broker.start().unwrap();
        });

        tokio::time::sleep(Duration::from_millis(200)).await;

        let recorder = Recorder::default();
        let mut client = Client::new(ClientConfig::new(&addr, "pubsub-client").with_keep_alive(2))
            .unwrap()
            .with_handler(recorder.clone());
        client.connect().await.unwrap();

        client.subscribe(&[("test/#", QoS::AtLeastOnce)]).unwrap();
        for _ in 0..20 {
            if client.session().topics().contains_key("test/#") {
                break;
            }
            client.step().await.unwrap();
        }
        assert!(client.session().topics().contains_key("test/#"));

        client
            .publish_sync("test/topic", "hello", QoS::AtLeastOnce, false)
            .await
            .unwrap();

        for _ in 0..20 {
            if !recorder.messages().is_empty() {
                break;
            }
            client.step().await.unwrap();
        }
        assert_eq!(
            recorder.messages(),
            vec![("test/topic".to_string(), Bytes::from_static(b"hello"))]
        );

        client.disconnect().await.unwrap();
    }

    fn create_rumqttd_config(addr: &str) -> rumqttd::Config {
        use rumqttd::{Config, ConnectionSettings, RouterConfig, ServerSettings};
        use std::collections::HashMap;
        use std::net::SocketAddr;

        let socket_addr: SocketAddr = addr.parse().unwrap();

        let mut servers = HashMap::new();
        servers.insert(
            "tcp".to_string(),
            ServerSettings {
                name: "tcp".to_string(),
                listen: socket_addr,
                tls: None,
                next_connection_delay_ms: 1,
                connections: ConnectionSettings {
                    connection_timeout_ms: 60000,
                    max_payload_size: 1024 * 1024,
                    max_inflight_count: 100,
                    auth: None,
                    external_auth: None,
                    dynamic_filters: false,
                },
            },
        );

        Config {
            id: 0,
            router: RouterConfig {
                max_connections: 1000,
                max_outgoing_packet_count: 200,
                max_segment_size: 1024 * 1024,
                max_segment_count: 10,
                ..Default::default()
            },
            v4: Some(servers),
            v5: None,
            ws: None,
            prometheus: None,
            metrics: None,
            console: None,
            bridge: None,
            cluster: None,
        }
    }
}
