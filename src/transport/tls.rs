//! TLS configuration for graph server connections.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::error::{GraphError, Result};

/// Accepts any server certificate while still checking handshake signatures.
///
/// **WARNING:** exposes the connection to man-in-the-middle attacks. Use only
/// against test servers with self-signed certificates.
#[derive(Debug)]
struct TrustAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for TrustAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// TLS settings for a connection.
///
/// With no custom roots, server certificates are checked against the
/// Mozilla root store.
#[derive(Clone, Debug, Default)]
pub struct TlsConfig {
    /// Skip server certificate validation.
    ///
    /// **Warning:** insecure, for testing only.
    pub trust_server_certificate: bool,

    /// Root certificates to trust instead of the Mozilla roots.
    pub root_certificates: Vec<CertificateDer<'static>>,

    /// Name to verify the server certificate against.
    ///
    /// Defaults to the endpoint host.
    pub server_name: Option<String>,
}

impl TlsConfig {
    /// Create a new TLS configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust the server certificate without validation.
    #[must_use]
    pub fn trust_server_certificate(mut self, trust: bool) -> Self {
        self.trust_server_certificate = trust;
        self
    }

    /// Add a custom root certificate to trust.
    #[must_use]
    pub fn add_root_certificate(mut self, cert: CertificateDer<'static>) -> Self {
        self.root_certificates.push(cert);
        self
    }

    /// Set the server name for certificate validation.
    #[must_use]
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// Resolve the name to verify for a connection to `host`.
    pub(crate) fn server_name_for(&self, host: &str) -> Result<ServerName<'static>> {
        let name = self.server_name.as_deref().unwrap_or(host);
        let name = name.trim_start_matches('[').trim_end_matches(']');
        ServerName::try_from(name.to_owned())
            .map_err(|e| GraphError::InvalidServerName(format!("{name}: {e}")))
    }

    /// Build the rustls client configuration.
    pub(crate) fn client_config(&self) -> Result<Arc<ClientConfig>> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?;

        let config = if self.trust_server_certificate {
            tracing::warn!("TLS server certificate validation is disabled");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(TrustAnyServerCert { provider }))
                .with_no_client_auth()
        } else {
            let roots = if self.root_certificates.is_empty() {
                RootCertStore {
                    roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
                }
            } else {
                let mut roots = RootCertStore::empty();
                for cert in &self.root_certificates {
                    roots.add(cert.clone())?;
                }
                roots
            };
            builder.with_root_certificates(roots).with_no_client_auth()
        };

        Ok(Arc::new(config))
    }
}
