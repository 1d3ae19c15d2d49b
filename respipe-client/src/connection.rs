//! Connection bootstrap.

use crate::client::Client;
use crate::error::ClientError;
use crate::processor::PipelineConfig;
use crate::stream::ClientStream;
use crate::tls::{create_tls_connector, TlsClientConfig};
use std::time::Duration;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;

/// Client over a TCP or TLS connection.
pub type TcpClient = Client<ReadHalf<ClientStream>, WriteHalf<ClientStream>>;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server address, `host:port`.
    pub addr: String,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Disable Nagle's algorithm on the socket.
    pub nodelay: bool,
    /// TLS configuration (optional).
    pub tls: Option<TlsClientConfig>,
    pub pipeline: PipelineConfig,
}

impl ConnectionConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            nodelay: true,
            tls: None,
            pipeline: PipelineConfig::default(),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    pub fn with_tls(mut self, tls_config: TlsClientConfig) -> Self {
        self.tls = Some(tls_config);
        self
    }

    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Host part of `addr`, without brackets for IPv6 literals.
    pub fn host(&self) -> &str {
        let host = match self.addr.rsplit_once(':') {
            Some((host, port)) if port.parse::<u16>().is_ok() => host,
            _ => &self.addr,
        };
        host.trim_start_matches('[').trim_end_matches(']')
    }

    fn tls_enabled(&self) -> Option<&TlsClientConfig> {
        self.tls.as_ref().filter(|tls| tls.enabled)
    }
}

/// Opens a connection and wraps it in a [`Client`].
pub async fn connect(config: ConnectionConfig) -> Result<TcpClient, ClientError> {
    let stream = open_stream(&config).await?;
    Ok(Client::with_config(stream, config.pipeline))
}

/// Opens the TCP socket and performs the TLS handshake if configured.
pub async fn open_stream(config: &ConnectionConfig) -> Result<ClientStream, ClientError> {
    tracing::debug!("Connecting to {}...", config.addr);

    let tcp_stream = tokio::time::timeout(
        config.connect_timeout,
        TcpStream::connect(config.addr.as_str()),
    )
    .await
    .map_err(|_| {
        tracing::debug!("Connection timeout");
        ClientError::Timeout
    })?
    .map_err(|e| {
        tracing::debug!("Connection failed: {}", e);
        ClientError::Io(e)
    })?;

    if config.nodelay {
        tcp_stream.set_nodelay(true)?;
    }

    let Some(tls_config) = config.tls_enabled() else {
        tracing::debug!("TCP connected to {}", config.addr);
        return Ok(ClientStream::Plain { stream: tcp_stream });
    };

    let (connector, server_name) = create_tls_connector(tls_config, config.host())?;

    tracing::debug!("Performing TLS handshake...");
    let tls_stream = connector
        .connect(server_name, tcp_stream)
        .await
        .map_err(|e| ClientError::TlsHandshake(e.to_string()))?;

    tracing::debug!("TLS connected to {}", config.addr);
    Ok(ClientStream::Tls { stream: tls_stream })
}

#[cfg(test)]
mod tests {
    use super::*;
    use respipe_protocol::command;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_config_defaults() {
        let config = ConnectionConfig::new("127.0.0.1:6379");
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert!(config.nodelay);
        assert!(config.tls.is_none());
        assert!(config.tls_enabled().is_none());
    }

    #[test]
    fn test_host() {
        assert_eq!(ConnectionConfig::new("127.0.0.1:6379").host(), "127.0.0.1");
        assert_eq!(ConnectionConfig::new("cache.local:6380").host(), "cache.local");
        assert_eq!(ConnectionConfig::new("[::1]:6379").host(), "::1");
        assert_eq!(ConnectionConfig::new("localhost").host(), "localhost");
    }

    #[test]
    fn test_disabled_tls_is_ignored() {
        let config = ConnectionConfig::new("127.0.0.1:6379").with_tls(TlsClientConfig::new());
        assert!(config.tls_enabled().is_none());
    }

    #[tokio::test]
    async fn test_connect_and_ping() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let expected = b"*1\r\n$4\r\nPING\r\n";
            let mut buf = vec![0u8; expected.len()];
            socket.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf[..], &expected[..]);
            socket.write_all(b"+PONG\r\n").await.unwrap();
        });

        let client = connect(ConnectionConfig::new(addr.to_string()))
            .await
            .unwrap();
        client.send(command!("PING"));

        let reply = client.read().await.unwrap().unwrap();
        assert_eq!(reply.as_str(), Some("PONG"));
        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = connect(ConnectionConfig::new(addr.to_string())).await;
        assert!(matches!(result, Err(ClientError::Io(_))));
    }
}
