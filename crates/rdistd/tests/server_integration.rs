//! Integration tests for the TCP server.
//!
//! These tests run a real `RdistServer` on an ephemeral localhost port and
//! drive it through raw line-oriented clients: handshakes, consumption,
//! monitor snapshots and disconnects.
//!
//! Tests CAN use `.unwrap()` and `.expect()`. The panic-free behavior of
//! production code is checked through assertions.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use rdist_core::{ConsumerState, ProducerId, ProducerState};
use rdist_protocol::{parse_resource, SnapshotDocument};
use rdistd::producer::{Producer, ProducerStatus};
use rdistd::{RdistServer, ServerConfig, ServerContext};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound for any single expected reply
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between registry polls
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Grace period for server shutdown
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_millis(100);

// ============================================================================
// Test Helpers
// ============================================================================

/// Test server without producer tasks of its own.
///
/// Resources are enqueued explicitly through [`TestServer::produce`], by a
/// producer whose status only the test writes.
struct TestServer {
    addr: SocketAddr,
    context: Arc<ServerContext>,
    producer: Arc<ProducerStatus>,
    cancel_token: CancellationToken,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(ServerConfig {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            buffer_capacity: 2,
            producer_count: 0,
            consume_delay: Duration::ZERO,
            consumer_rest: Duration::ZERO,
            ..Default::default()
        })
        .await
    }

    async fn spawn_with(config: ServerConfig) -> Self {
        let cancel_token = CancellationToken::new();
        let server = RdistServer::new(config, cancel_token.clone()).expect("valid config");
        let listener = server.bind().await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let context = Arc::clone(server.context());

        tokio::spawn(async move {
            let _ = server.serve(listener).await;
        });

        TestServer {
            addr,
            context,
            producer: Arc::new(ProducerStatus::new(ProducerId::new(0))),
            cancel_token,
        }
    }

    async fn connect(&self) -> TestClient {
        let stream = TcpStream::connect(self.addr).await.expect("connect to server");
        TestClient::new(stream)
    }

    fn producer(&self) -> Producer {
        Producer::new(Arc::clone(&self.producer), Arc::clone(&self.context))
    }

    /// Enqueues one resource from producer 0.
    async fn produce(&self) {
        self.producer().produce_once().await;
    }

    async fn wait_for(&self, consumers: usize, monitors: usize) {
        timeout(REPLY_TIMEOUT, async {
            while self.context.consumers().len().await != consumers
                || self.context.monitors().len().await != monitors
            {
                sleep(POLL_INTERVAL).await;
            }
        })
        .await
        .expect("registries did not settle");
    }

    async fn shutdown(self) {
        self.cancel_token.cancel();
        sleep(SHUTDOWN_GRACE_PERIOD).await;
    }
}

/// Raw line client.
struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.expect("write");
        self.writer.write_all(b"\n").await.expect("write");
        self.writer.flush().await.expect("flush");
    }

    /// Reads one line; `None` on close.
    async fn recv(&mut self) -> Option<String> {
        let mut line = String::new();
        let n = timeout(REPLY_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("reply timed out")
            .expect("read");
        (n > 0).then(|| line.trim_end().to_string())
    }

    async fn handshake(&mut self, role: &str) {
        self.send(&format!("handshake:{role}")).await;
        assert_eq!(self.recv().await.as_deref(), Some(format!("handshake:{role}").as_str()));
    }

    async fn snapshot(&mut self) -> SnapshotDocument {
        let line = self.recv().await.expect("snapshot line");
        SnapshotDocument::parse(&line).expect("valid snapshot")
    }
}

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_invalid_handshake_rejected_without_registration() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.send("hello").await;
    assert_eq!(client.recv().await.as_deref(), Some("invalid request"));
    assert_eq!(client.recv().await, None, "connection should be closed");

    assert!(server.context.consumers().is_empty().await);
    assert!(server.context.monitors().is_empty().await);
    server.shutdown().await;
}

#[tokio::test]
async fn test_close_before_handshake_gets_invalid_request() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.writer.shutdown().await.expect("half close");
    assert_eq!(client.recv().await.as_deref(), Some("invalid request"));
    assert_eq!(client.recv().await, None, "connection should be closed");

    assert!(server.context.consumers().is_empty().await);
    assert!(server.context.monitors().is_empty().await);
    server.shutdown().await;
}

#[tokio::test]
async fn test_consumer_and_monitor_handshakes_register() {
    let server = TestServer::spawn().await;

    let mut consumer = server.connect().await;
    consumer.handshake("consumer").await;
    let mut monitor = server.connect().await;
    monitor.handshake("monitor").await;

    server.wait_for(1, 1).await;

    drop(consumer);
    drop(monitor);
    server.wait_for(0, 0).await;
    server.shutdown().await;
}

// ============================================================================
// Consumers
// ============================================================================

#[tokio::test]
async fn test_consume_returns_descriptor() {
    let server = TestServer::spawn().await;
    server.produce().await;

    let mut client = server.connect().await;
    client.handshake("consumer").await;
    client.send("consume").await;

    let line = client.recv().await.expect("descriptor");
    assert_eq!(line, "rid:0;produced_by:0;");
    let resource = parse_resource(&line).unwrap();
    assert_eq!(resource.id.get(), 0);

    assert_eq!(server.context.buffer().len().await, 0);
    server.shutdown().await;
}

#[tokio::test]
async fn test_consume_blocks_until_produce() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;
    client.handshake("consumer").await;

    client.send("consume").await;
    sleep(Duration::from_millis(100)).await;

    let entries: Vec<_> = server.context.consumers().lock().await.values().cloned().collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].state(), ConsumerState::Hungry);

    server.produce().await;
    assert_eq!(client.recv().await.as_deref(), Some("rid:0;produced_by:0;"));
    assert_eq!(entries[0].consumed_count(), 1);
    server.shutdown().await;
}

#[tokio::test]
async fn test_consumers_receive_fifo_without_duplicates() {
    let server = TestServer::spawn().await;
    server.produce().await;
    server.produce().await;

    let mut first = server.connect().await;
    first.handshake("consumer").await;
    let mut second = server.connect().await;
    second.handshake("consumer").await;

    first.send("consume").await;
    let a = parse_resource(&first.recv().await.unwrap()).unwrap();
    second.send("consume").await;
    let b = parse_resource(&second.recv().await.unwrap()).unwrap();

    assert_eq!(a.id.get(), 0);
    assert_eq!(b.id.get(), 1);
    server.shutdown().await;
}

#[tokio::test]
async fn test_full_buffer_blocks_producer_until_consume() {
    let server = TestServer::spawn().await;
    server.produce().await;
    server.produce().await;

    let producer = server.producer();
    let blocked = tokio::spawn(async move { producer.produce_once().await });
    sleep(Duration::from_millis(100)).await;
    assert!(!blocked.is_finished());
    assert_eq!(server.producer.state(), ProducerState::Waiting);

    let mut client = server.connect().await;
    client.handshake("consumer").await;
    client.send("consume").await;
    assert_eq!(client.recv().await.as_deref(), Some("rid:0;produced_by:0;"));

    let third = timeout(REPLY_TIMEOUT, blocked).await.unwrap().unwrap();
    assert_eq!(third.id.get(), 2);
    assert_eq!(server.producer.state(), ProducerState::Producing);
    assert_eq!(server.producer.produced_count(), 3);
    assert_eq!(server.context.buffer().len().await, 2);
    server.shutdown().await;
}

// ============================================================================
// Monitors
// ============================================================================

#[tokio::test]
async fn test_monitor_sees_single_enqueued_resource() {
    let server = TestServer::spawn().await;
    let mut monitor = server.connect().await;
    monitor.handshake("monitor").await;

    monitor.send("report").await;
    server.produce().await;

    // A push already in flight may predate the enqueue; one more report
    // is always answered with state taken after it.
    let mut doc = monitor.snapshot().await;
    if doc.report.buffer.is_empty() {
        monitor.send("report").await;
        doc = monitor.snapshot().await;
    }

    assert_eq!(doc.report.buffer.len(), 1);
    assert_eq!(doc.report.buffer[0].id.get(), 0);
    assert_eq!(doc.report.buffer[0].producer.get(), 0);
    assert!(doc.report.events.is_empty());
    server.shutdown().await;
}

#[tokio::test]
async fn test_one_report_yields_exactly_one_snapshot() {
    let server = TestServer::spawn().await;
    let mut monitor = server.connect().await;
    monitor.handshake("monitor").await;
    server.wait_for(0, 1).await;

    monitor.send("report").await;
    server.produce().await;
    server.produce().await;
    monitor.snapshot().await;

    // More state changes, but no outstanding request.
    let mut consumer = server.connect().await;
    consumer.handshake("consumer").await;
    consumer.send("consume").await;
    consumer.recv().await.expect("descriptor");
    server.wait_for(1, 1).await;

    let mut line = String::new();
    let extra = timeout(Duration::from_millis(300), monitor.reader.read_line(&mut line)).await;
    assert!(extra.is_err(), "unrequested snapshot pushed: {line:?}");

    monitor.send("report").await;
    let doc = monitor.snapshot().await;
    assert_eq!(doc.report.consumers.len(), 1);
    assert_eq!(doc.report.buffer.len(), 1);
    server.shutdown().await;
}

#[tokio::test]
async fn test_monitor_sees_consumer_counts() {
    let server = TestServer::spawn().await;
    server.produce().await;

    let mut consumer = server.connect().await;
    consumer.handshake("consumer").await;
    consumer.send("consume").await;
    consumer.recv().await.expect("descriptor");

    let mut monitor = server.connect().await;
    monitor.handshake("monitor").await;

    let doc = timeout(REPLY_TIMEOUT, async {
        loop {
            monitor.send("report").await;
            let doc = monitor.snapshot().await;
            if doc.report.consumers.iter().any(|c| c.resources_consumed == 1) {
                break doc;
            }
        }
    })
    .await
    .expect("consumer count never reported");

    assert_eq!(doc.report.consumers.len(), 1);
    assert!(doc.report.buffer.is_empty());
    server.shutdown().await;
}

#[tokio::test]
async fn test_monitor_disconnect_while_worker_waits() {
    let server = TestServer::spawn().await;
    let mut monitor = server.connect().await;
    monitor.handshake("monitor").await;
    server.wait_for(0, 1).await;

    // State changes schedule a worker that now waits for `report`.
    server.produce().await;
    sleep(Duration::from_millis(50)).await;

    drop(monitor);
    server.wait_for(0, 0).await;

    // Later broadcasts find nothing to deliver to.
    server.produce().await;
    sleep(Duration::from_millis(50)).await;
    assert!(server.context.monitors().is_empty().await);
    server.shutdown().await;
}

#[tokio::test]
async fn test_slow_monitor_does_not_block_others() {
    let server = TestServer::spawn().await;

    let mut silent = server.connect().await;
    silent.handshake("monitor").await;
    let mut eager = server.connect().await;
    eager.handshake("monitor").await;
    server.wait_for(0, 2).await;

    eager.send("report").await;
    server.produce().await;
    let doc = eager.snapshot().await;
    assert!(doc.report.buffer.len() <= 1);
    assert_eq!(doc.report.consumers.len(), 0);

    drop(silent);
    server.shutdown().await;
}
