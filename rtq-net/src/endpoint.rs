use anyhow::{anyhow, Context, Result};
use quinn::VarInt;
use rtq_core::transport::{END_OF_SESSION_CODE, END_OF_SESSION_REASON};
use std::{
    net::{SocketAddr, UdpSocket},
    sync::Arc,
    time::Duration,
};

use crate::{config::TransportConfig, quic::config::QuinnConfig, quic::connection::QuicConnection};

/// A QUIC endpoint that establishes datagram connections.
///
/// Must be created from within a tokio runtime.
#[derive(Debug, Clone)]
pub struct Endpoint {
    endpoint: quinn::Endpoint,
    connection_timeout: Duration,
}

impl Endpoint {
    /// Binds an endpoint that accepts incoming connections and may also
    /// connect out.
    pub fn server(bind_addr: SocketAddr, config: &TransportConfig) -> Result<Self> {
        let quinn_config = QuinnConfig::try_from(config)?;
        let server_config = quinn_config.server_config.clone();
        let endpoint = Self::with_socket(bind_addr, Some(server_config), quinn_config, config)?;
        tracing::info!("Listening on {}/UDP(QUIC)", endpoint.local_addr()?);
        Ok(endpoint)
    }

    /// Binds an endpoint that only connects out.
    pub fn client(bind_addr: SocketAddr, config: &TransportConfig) -> Result<Self> {
        let quinn_config = QuinnConfig::try_from(config)?;
        Self::with_socket(bind_addr, None, quinn_config, config)
    }

    fn with_socket(
        bind_addr: SocketAddr,
        server_config: Option<quinn::ServerConfig>,
        quinn_config: QuinnConfig,
        config: &TransportConfig,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr)
            .with_context(|| format!("Failed to bind UDP socket on {}", bind_addr))?;
        let runtime = Arc::new(quinn::TokioRuntime);
        let mut endpoint =
            quinn::Endpoint::new(quinn_config.endpoint_config, server_config, socket, runtime)?;
        endpoint.set_default_client_config(quinn_config.client_config);
        Ok(Self {
            endpoint,
            connection_timeout: config.connection_timeout,
        })
    }

    /// Connects to `addr`, verifying its certificate against `server_name`.
    pub async fn connect(&self, addr: SocketAddr, server_name: &str) -> Result<QuicConnection> {
        let connecting = self.endpoint.connect(addr, server_name)?;
        let connection = match tokio::time::timeout(self.connection_timeout, connecting).await {
            Ok(connect_result) => {
                connect_result.with_context(|| format!("Failed to connect to {}", addr))?
            }
            Err(_) => {
                return Err(anyhow!(
                    "QUIC connection to {} timed out after {:?}",
                    addr,
                    self.connection_timeout
                ))
            }
        };
        if connection.max_datagram_size().is_none() {
            connection.close(VarInt::from_u32(1), b"datagrams unsupported");
            return Err(anyhow!("Peer {} does not support datagrams", addr));
        }
        tracing::info!("Connected to {}", connection.remote_address());
        Ok(QuicConnection::new(connection))
    }

    /// Waits for the next incoming connection. `Ok(None)` once the endpoint
    /// is closed.
    pub async fn accept(&self) -> Result<Option<QuicConnection>> {
        let Some(incoming) = self.endpoint.accept().await else {
            tracing::warn!("No incoming connection; endpoint may have been closed");
            return Ok(None);
        };
        let remote_addr = incoming.remote_address();
        let connection = incoming
            .await
            .with_context(|| format!("Failed to accept connection from {}", remote_addr))?;
        tracing::info!("Accepted connection from {}", connection.remote_address());
        Ok(Some(QuicConnection::new(connection)))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.endpoint.local_addr()?)
    }

    /// Closes every connection of this endpoint with the end-of-session code.
    pub fn close(&self) {
        let code = VarInt::from_u64(END_OF_SESSION_CODE).unwrap_or(VarInt::from_u32(0));
        self.endpoint.close(code, END_OF_SESSION_REASON);
    }

    /// Waits until every connection has finished closing.
    pub async fn wait_idle(&self) {
        self.endpoint.wait_idle().await;
    }
}
