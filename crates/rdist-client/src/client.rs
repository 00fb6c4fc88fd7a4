//! Consumer and monitor connections to an rdist server.
//!
//! Both clients speak the line protocol: connect, send a handshake token,
//! wait for the server to echo it, then exchange one command per line.
//!
//! **Panic-Free Policy:** No `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()`, or `todo!()` outside tests.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use rdist_core::Resource;
use rdist_protocol::{
    encode_line, parse_resource, strip_line_ending, FrameError, Handshake, SnapshotDocument, CONSUME,
    MAX_REPLY_LEN, REPORT, UNRECOGNIZED_COMMAND,
};

use crate::error::{ClientError, Result};

// ============================================================================
// Configuration
// ============================================================================

/// Where and how to reach the server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host name or address.
    pub host: String,

    /// Server TCP port.
    pub port: u16,

    /// Deadline for connecting and for the handshake echo.
    pub connect_timeout: Duration,

    /// Longest reply line accepted before the connection is abandoned.
    pub max_line_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 60118,
            connect_timeout: Duration::from_secs(5),
            max_line_len: MAX_REPLY_LEN,
        }
    }
}

impl ClientConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ============================================================================
// Line Connection
// ============================================================================

/// A handshaken connection exchanging `\n`-terminated lines.
struct LineConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    max_line_len: usize,
}

impl LineConnection {
    async fn open(config: &ClientConfig, role: Handshake) -> Result<Self> {
        let addr = config.addr();

        let stream = match timeout(config.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(ClientError::Connect {
                    addr,
                    reason: e.to_string(),
                })
            }
            Err(_) => return Err(ClientError::Timeout("connection")),
        };

        let (reader, writer) = stream.into_split();
        let mut conn = Self {
            reader: BufReader::new(reader),
            writer,
            max_line_len: config.max_line_len,
        };

        conn.send(role.token()).await?;
        let reply = match timeout(config.connect_timeout, conn.recv()).await {
            Ok(reply) => reply?,
            Err(_) => return Err(ClientError::Timeout("handshake")),
        };
        if reply != role.token() {
            return Err(ClientError::HandshakeRejected(reply));
        }

        debug!(addr = %addr, role = %role, "Connected");
        Ok(conn)
    }

    async fn send(&mut self, body: &str) -> Result<()> {
        let line = encode_line(body)?;
        self.writer.write_all(&line).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<String> {
        let mut line = Vec::new();
        (&mut self.reader)
            .take(self.max_line_len as u64)
            .read_until(b'\n', &mut line)
            .await?;

        if line.is_empty() {
            return Err(ClientError::ConnectionClosed);
        }
        if line.last() != Some(&b'\n') && line.len() >= self.max_line_len {
            return Err(FrameError::TooLong {
                size: line.len(),
                max: self.max_line_len,
            }
            .into());
        }
        Ok(strip_line_ending(&String::from_utf8_lossy(&line)).to_string())
    }
}

// ============================================================================
// Consumer Client
// ============================================================================

/// Client connected with `handshake:consumer`.
pub struct ConsumerClient {
    conn: LineConnection,
}

impl ConsumerClient {
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let conn = LineConnection::open(config, Handshake::Consumer).await?;
        Ok(Self { conn })
    }

    /// Requests one resource and waits until the server hands it over.
    ///
    /// Blocks as long as the server's buffer stays empty.
    pub async fn consume(&mut self) -> Result<Resource> {
        self.conn.send(CONSUME).await?;
        let line = self.conn.recv().await?;
        if line == UNRECOGNIZED_COMMAND {
            return Err(ClientError::Rejected(line));
        }
        Ok(parse_resource(&line)?)
    }
}

// ============================================================================
// Monitor Client
// ============================================================================

/// Client connected with `handshake:monitor`.
pub struct MonitorClient {
    conn: LineConnection,
}

impl MonitorClient {
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let conn = LineConnection::open(config, Handshake::Monitor).await?;
        Ok(Self { conn })
    }

    /// Marks this monitor ready for the next pushed snapshot.
    pub async fn request_report(&mut self) -> Result<()> {
        self.conn.send(REPORT).await
    }

    /// Waits for the next pushed snapshot.
    pub async fn next_snapshot(&mut self) -> Result<SnapshotDocument> {
        let line = self.conn.recv().await?;
        if line == UNRECOGNIZED_COMMAND {
            return Err(ClientError::Rejected(line));
        }
        Ok(SnapshotDocument::parse(&line)?)
    }

    /// Requests and waits for one snapshot.
    pub async fn report(&mut self) -> Result<SnapshotDocument> {
        self.request_report().await?;
        self.next_snapshot().await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use rdist_protocol::{ProducerReport, Report};
    use rdist_core::{ProducerId, ProducerState};
    use tokio::net::TcpListener;

    /// Accepts one connection and runs `script` against its lines.
    async fn fake_server<F, Fut>(script: F) -> ClientConfig
    where
        F: FnOnce(BufReader<OwnedReadHalf>, OwnedWriteHalf) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, writer) = stream.into_split();
            script(BufReader::new(reader), writer).await;
        });
        ClientConfig {
            port,
            ..Default::default()
        }
    }

    async fn read(reader: &mut BufReader<OwnedReadHalf>) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        line.trim_end().to_string()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.addr(), "127.0.0.1:60118");
        assert_eq!(config.max_line_len, MAX_REPLY_LEN);
    }

    #[tokio::test]
    async fn test_consume_parses_descriptor() {
        let config = fake_server(|mut reader, mut writer| async move {
            assert_eq!(read(&mut reader).await, "handshake:consumer");
            writer.write_all(b"handshake:consumer\n").await.unwrap();
            assert_eq!(read(&mut reader).await, "consume");
            writer.write_all(b"rid:7;produced_by:2;\n").await.unwrap();
        })
        .await;

        let mut client = ConsumerClient::connect(&config).await.unwrap();
        let resource = client.consume().await.unwrap();
        assert_eq!(resource.id.get(), 7);
        assert_eq!(resource.produced_by.get(), 2);
    }

    #[tokio::test]
    async fn test_invalid_handshake_reply_is_rejected() {
        let config = fake_server(|mut reader, mut writer| async move {
            read(&mut reader).await;
            writer.write_all(b"invalid request\n").await.unwrap();
        })
        .await;

        let err = ConsumerClient::connect(&config).await.err().unwrap();
        assert!(matches!(err, ClientError::HandshakeRejected(reply) if reply == "invalid request"));
    }

    #[tokio::test]
    async fn test_closed_connection_is_reported() {
        let config = fake_server(|mut reader, mut writer| async move {
            read(&mut reader).await;
            writer.write_all(b"handshake:consumer\n").await.unwrap();
            read(&mut reader).await;
        })
        .await;

        let mut client = ConsumerClient::connect(&config).await.unwrap();
        let err = client.consume().await.unwrap_err();
        assert!(matches!(err, ClientError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_oversized_reply_is_rejected() {
        let config = fake_server(|mut reader, mut writer| async move {
            read(&mut reader).await;
            writer.write_all(b"handshake:monitor\n").await.unwrap();
            read(&mut reader).await;
            writer.write_all(&[b'x'; 100]).await.unwrap();
            // Hold the connection open; only the cap may end the read.
            tokio::time::sleep(Duration::from_secs(5)).await;
        })
        .await;
        let config = ClientConfig {
            max_line_len: 32,
            ..config
        };

        let mut client = MonitorClient::connect(&config).await.unwrap();
        let err = timeout(Duration::from_secs(2), client.report()).await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::Frame(FrameError::TooLong { size: 32, max: 32 })));
    }

    #[tokio::test]
    async fn test_monitor_report_parses_snapshot() {
        let document = SnapshotDocument::new(Report {
            consumers: vec![],
            producers: vec![ProducerReport {
                id: ProducerId::new(0),
                status: ProducerState::Waiting,
                count: 3,
            }],
            buffer: vec![],
            events: vec![],
            generated_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        });
        let line = document.render().unwrap();

        let config = fake_server(move |mut reader, mut writer| async move {
            assert_eq!(read(&mut reader).await, "handshake:monitor");
            writer.write_all(b"handshake:monitor\n").await.unwrap();
            assert_eq!(read(&mut reader).await, "report");
            writer.write_all(&line).await.unwrap();
        })
        .await;

        let mut client = MonitorClient::connect(&config).await.unwrap();
        let received = client.report().await.unwrap();
        assert_eq!(received, document);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = ClientConfig {
            port,
            ..Default::default()
        };
        let err = MonitorClient::connect(&config).await.err().unwrap();
        assert!(matches!(err, ClientError::Connect { .. }));
    }
}
