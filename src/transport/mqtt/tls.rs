//! TLS transport selection for `mqtts://` brokers
//!
//! Three modes, picked from [`TlsSection`]:
//! - default: system roots via rumqttc's built-in rustls configuration
//! - `ca_file`: a PEM bundle trusted instead of the system roots
//! - `verify_certificates = false`: encrypted but unauthenticated; requires
//!   `allow_insecure = true` and logs a warning every time it is built

use super::connection::MqttError;
use crate::config::TlsSection;
use rumqttc::tokio_rustls::rustls;
use rumqttc::tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use rumqttc::tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rumqttc::tokio_rustls::rustls::{DigitallySignedStruct, SignatureScheme};
use rumqttc::{TlsConfiguration, Transport};
use std::sync::Arc;
use tracing::warn;

/// Build the rumqttc transport for a TLS session
pub fn build_transport(tls: &TlsSection) -> Result<Transport, MqttError> {
    if !tls.verify_certificates {
        if !tls.allow_insecure {
            return Err(MqttError::Tls(
                "certificate verification disabled without allow_insecure".to_string(),
            ));
        }
        warn!("TLS certificate verification is DISABLED; the broker is not authenticated");
        return Ok(Transport::tls_with_config(TlsConfiguration::Rustls(
            Arc::new(insecure_client_config()),
        )));
    }

    match &tls.ca_file {
        Some(path) => {
            let ca = std::fs::read(path).map_err(|e| {
                MqttError::Tls(format!("failed to read CA bundle {path}: {e}"))
            })?;
            Ok(Transport::tls(ca, None, None))
        }
        None => Ok(Transport::tls_with_default_config()),
    }
}

fn insecure_client_config() -> rustls::ClientConfig {
    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert::new()))
        .with_no_client_auth()
}

/// Accepts any server certificate and host name
///
/// Signatures are still checked against the presented certificate so the
/// handshake itself stays well-formed.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<rustls::crypto::CryptoProvider>,
}

impl AcceptAnyServerCert {
    fn new() -> Self {
        Self {
            provider: Arc::new(rustls::crypto::ring::default_provider()),
        }
    }
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_transport_is_tls() {
        let transport = build_transport(&TlsSection::default()).unwrap();
        assert!(matches!(transport, Transport::Tls(_)));
    }

    #[test]
    fn test_insecure_requires_opt_in() {
        let tls = TlsSection {
            verify_certificates: false,
            allow_insecure: false,
            ca_file: None,
        };
        assert!(matches!(build_transport(&tls), Err(MqttError::Tls(_))));
    }

    #[test]
    fn test_insecure_with_opt_in() {
        let tls = TlsSection {
            verify_certificates: false,
            allow_insecure: true,
            ca_file: None,
        };
        let transport = build_transport(&tls).unwrap();
        assert!(matches!(
            transport,
            Transport::Tls(TlsConfiguration::Rustls(_))
        ));
    }

    #[test]
    fn test_ca_file_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "-----BEGIN CERTIFICATE-----").unwrap();
        writeln!(file, "-----END CERTIFICATE-----").unwrap();

        let tls = TlsSection {
            verify_certificates: true,
            allow_insecure: false,
            ca_file: Some(file.path().to_string_lossy().into_owned()),
        };
        let transport = build_transport(&tls).unwrap();
        assert!(matches!(
            transport,
            Transport::Tls(TlsConfiguration::Simple { .. })
        ));
    }

    #[test]
    fn test_missing_ca_file() {
        let tls = TlsSection {
            verify_certificates: true,
            allow_insecure: false,
            ca_file: Some("/nonexistent/ca.pem".to_string()),
        };
        assert!(matches!(build_transport(&tls), Err(MqttError::Tls(_))));
    }
}
