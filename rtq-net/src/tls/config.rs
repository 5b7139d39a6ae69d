use std::sync::Arc;

use rustls::{pki_types::CertificateDer, RootCertStore};

use super::{
    cert::Identity,
    verifier::{self, InsecureServerVerification},
};

/// How a client checks the server's certificate.
#[derive(Debug, Clone)]
pub enum ServerVerification {
    /// Accept only certificates issued by (or equal to) one of these.
    Trusted(Vec<CertificateDer<'static>>),
    /// Accept any certificate.
    Insecure,
}

impl Default for ServerVerification {
    fn default() -> Self {
        ServerVerification::Trusted(Vec::new())
    }
}

/// Create a TLS client configuration for rtq.
pub fn make_client_config(
    verification: &ServerVerification,
    alpn: &[u8],
) -> Result<rustls::ClientConfig, rustls::Error> {
    let builder = rustls::ClientConfig::builder_with_provider(verifier::crypto_provider().into())
        .with_protocol_versions(verifier::PROTOCOL_VERSIONS)?;

    let mut crypto = match verification {
        ServerVerification::Trusted(certs) => {
            let mut roots = RootCertStore::empty();
            for cert in certs {
                roots.add(cert.clone())?;
            }
            builder.with_root_certificates(roots).with_no_client_auth()
        }
        ServerVerification::Insecure => builder
            .dangerous()
            .with_custom_certificate_verifier(InsecureServerVerification::new())
            .with_no_client_auth(),
    };
    crypto.alpn_protocols = vec![alpn.to_vec()];

    Ok(crypto)
}

/// Create a TLS server configuration for rtq. Clients are not authenticated.
pub fn make_server_config(
    identity: &Identity,
    alpn: &[u8],
) -> Result<rustls::ServerConfig, rustls::Error> {
    let mut crypto = rustls::ServerConfig::builder_with_provider(Arc::new(verifier::crypto_provider()))
        .with_protocol_versions(verifier::PROTOCOL_VERSIONS)?
        .with_no_client_auth()
        .with_single_cert(identity.cert_chain().to_vec(), identity.key().clone_key())?;
    crypto.alpn_protocols = vec![alpn.to_vec()];

    Ok(crypto)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::generate_self_signed;

    #[test]
    fn test_configs_are_tls13_only() {
        let identity = generate_self_signed(&["localhost"]).unwrap();
        let server = make_server_config(&identity, b"rtq").unwrap();
        assert_eq!(server.alpn_protocols, vec![b"rtq".to_vec()]);

        let trusted = ServerVerification::Trusted(identity.cert_chain().to_vec());
        for verification in [trusted, ServerVerification::Insecure] {
            let client = make_client_config(&verification, b"rtq").unwrap();
            assert_eq!(client.alpn_protocols, vec![b"rtq".to_vec()]);
            assert!(client
                .crypto_provider()
                .cipher_suites
                .iter()
                .all(|suite| suite.version().version == rustls::ProtocolVersion::TLSv1_3));
        }
    }
}
