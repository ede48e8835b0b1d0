//! TLS client configuration for the handshake probe.
//!
//! The probe only needs to know whether the node speaks TLS on its HTTP
//! port. Nodes launched for tests use self-signed certificates, so the
//! server certificate is accepted without verification.

use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::{Certificate, ClientConfig, ServerName};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::SystemTime;
use tokio_rustls::TlsConnector;

struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

/// Build a connector that completes handshakes with any certificate.
pub(super) fn insecure_connector() -> TlsConnector {
    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

/// Server name to present for `host`, which may be an IP literal.
pub(super) fn server_name(host: &str) -> Option<ServerName> {
    match host.parse::<IpAddr>() {
        Ok(ip) => Some(ServerName::IpAddress(ip)),
        Err(_) => ServerName::try_from(host).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_name_for_ip_and_dns() {
        assert!(matches!(
            server_name("127.0.0.1"),
            Some(ServerName::IpAddress(_))
        ));
        assert!(matches!(
            server_name("localhost"),
            Some(ServerName::DnsName(_))
        ));
        assert!(server_name("not a host!").is_none());
    }
}
