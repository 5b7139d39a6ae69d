use crate::tls::{self, Identity, ServerVerification};
use anyhow::Result;
use rtq_core::default::{
    DEFAULT_ALPN, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_DATAGRAM_RECEIVE_BUFFER_SIZE,
    DEFAULT_DATAGRAM_SEND_BUFFER_SIZE, DEFAULT_KEEP_ALIVE_INTERVAL, DEFAULT_MAX_IDLE_TIMEOUT,
    DEFAULT_SERVER_NAME,
};
use std::time::Duration;

/// The configuration for the QUIC transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// How long `connect` waits for the handshake.
    pub connection_timeout: Duration,
    pub max_idle_timeout: Duration,
    /// Must be lower than the idle timeout of both peers to be effective.
    pub keep_alive_interval: Option<Duration>,
    /// Bytes of incoming datagrams buffered before the oldest are dropped.
    pub datagram_receive_buffer_size: usize,
    /// Bytes of outgoing datagrams buffered before the oldest are dropped.
    pub datagram_send_buffer_size: usize,
    pub mtu_upper_bound: Option<u16>,
    pub enable_mtu_discovery: Option<bool>,
    pub alpn: Vec<u8>,
    pub server_verification: ServerVerification,
    identity: Identity,
}

impl TransportConfig {
    /// Creates a new configuration with default values and a fresh
    /// self-signed certificate for [`DEFAULT_SERVER_NAME`].
    pub fn new() -> Result<Self> {
        let identity = tls::generate_self_signed(&[DEFAULT_SERVER_NAME])?;
        Ok(Self::with_identity(identity))
    }

    pub fn with_identity(identity: Identity) -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            max_idle_timeout: DEFAULT_MAX_IDLE_TIMEOUT,
            keep_alive_interval: Some(DEFAULT_KEEP_ALIVE_INTERVAL),
            datagram_receive_buffer_size: DEFAULT_DATAGRAM_RECEIVE_BUFFER_SIZE,
            datagram_send_buffer_size: DEFAULT_DATAGRAM_SEND_BUFFER_SIZE,
            mtu_upper_bound: None,
            enable_mtu_discovery: None,
            alpn: DEFAULT_ALPN.to_vec(),
            server_verification: ServerVerification::default(),
            identity,
        }
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_server_verification(mut self, verification: ServerVerification) -> Self {
        self.server_verification = verification;
        self
    }

    /// Trust the given certificate in addition to any already trusted.
    pub fn trust_certificate(mut self, cert: rustls::pki_types::CertificateDer<'static>) -> Self {
        match &mut self.server_verification {
            ServerVerification::Trusted(certs) => certs.push(cert),
            ServerVerification::Insecure => {
                self.server_verification = ServerVerification::Trusted(vec![cert]);
            }
        }
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn set_identity(&mut self, identity: Identity) {
        self.identity = identity;
    }

    pub fn client_tls_config(&self) -> Result<rustls::ClientConfig> {
        Ok(tls::make_client_config(&self.server_verification, &self.alpn)?)
    }

    pub fn server_tls_config(&self) -> Result<rustls::ServerConfig> {
        Ok(tls::make_server_config(&self.identity, &self.alpn)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trust_certificate_replaces_insecure() {
        let config = TransportConfig::new()
            .unwrap()
            .with_server_verification(ServerVerification::Insecure);
        let cert = config.identity().certificate().unwrap().clone();
        let config = config.trust_certificate(cert.clone());
        match &config.server_verification {
            ServerVerification::Trusted(certs) => assert_eq!(certs, &vec![cert]),
            other => panic!("unexpected verification: {:?}", other),
        }
        assert!(config.client_tls_config().is_ok());
        assert!(config.server_tls_config().is_ok());
    }
}
