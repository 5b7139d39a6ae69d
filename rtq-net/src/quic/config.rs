use std::sync::Arc;

use anyhow::{anyhow, Result};
use quinn::{
    crypto::rustls::{QuicClientConfig, QuicServerConfig},
    IdleTimeout,
};

use crate::config::TransportConfig;

/// Represents the inner configuration for [`quinn`].
#[derive(Debug, Clone)]
pub(crate) struct QuinnConfig {
    pub(crate) client_config: quinn::ClientConfig,
    pub(crate) server_config: quinn::ServerConfig,
    pub(crate) endpoint_config: quinn::EndpointConfig,
}

impl TryFrom<&TransportConfig> for QuinnConfig {
    type Error = anyhow::Error;

    fn try_from(config: &TransportConfig) -> Result<QuinnConfig> {
        let client_tls_config = Arc::new(QuicClientConfig::try_from(config.client_tls_config()?)?);
        let server_tls_config = Arc::new(QuicServerConfig::try_from(config.server_tls_config()?)?);

        let mut transport = quinn::TransportConfig::default();
        // Datagrams only; the peer may not open streams.
        transport.max_concurrent_uni_streams(0u32.into());
        transport.max_concurrent_bidi_streams(0u32.into());
        transport.datagram_receive_buffer_size(Some(config.datagram_receive_buffer_size));
        transport.datagram_send_buffer_size(config.datagram_send_buffer_size);
        transport.keep_alive_interval(config.keep_alive_interval);
        transport.max_idle_timeout(Some(IdleTimeout::try_from(config.max_idle_timeout)?));
        transport.allow_spin(false);
        let mut mtu_discovery_config = quinn::MtuDiscoveryConfig::default();
        if let Some(upper_bound) = config.mtu_upper_bound {
            mtu_discovery_config.upper_bound(upper_bound);
        }
        match config.enable_mtu_discovery {
            Some(false) => transport.mtu_discovery_config(None),
            _ => transport.mtu_discovery_config(Some(mtu_discovery_config)),
        };
        let transport = Arc::new(transport);

        let mut server_config = quinn::ServerConfig::with_crypto(server_tls_config);
        server_config.transport = Arc::clone(&transport);
        server_config.migration(false);

        let mut client_config = quinn::ClientConfig::new(client_tls_config);
        client_config.transport_config(transport);

        let rng = ring::rand::SystemRandom::new();
        let reset_key = ring::hmac::Key::generate(ring::hmac::HMAC_SHA256, &rng)
            .map_err(|_| anyhow!("Failed to generate stateless reset key"))?;
        let endpoint_config = quinn::EndpointConfig::new(Arc::new(reset_key));

        Ok(QuinnConfig {
            client_config,
            server_config,
            endpoint_config,
        })
    }
}
