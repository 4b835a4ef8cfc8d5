//! TLS context factory (spec §4.1).
//!
//! Pure and stateless: every call builds a fresh `rustls::ClientConfig`. When
//! `verify` is false (the default — targets are typically disposable test
//! instances with self-signed certs) both hostname verification and
//! chain validation are disabled via a custom `ServerCertVerifier` that
//! accepts anything.

use std::sync::{Arc, Once};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

static CRYPTO_PROVIDER_INIT: Once = Once::new();

/// Install the process-wide default `ring` crypto provider exactly once.
/// `rustls::ClientConfig::builder()` panics without one installed.
fn ensure_crypto_provider() {
    CRYPTO_PROVIDER_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Accepts any certificate chain and any signature. Only reachable when the
/// caller explicitly asked for `verify: false`.
#[derive(Debug)]
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
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
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        use SignatureScheme::*;
        vec![
            RSA_PKCS1_SHA256,
            RSA_PKCS1_SHA384,
            RSA_PKCS1_SHA512,
            ECDSA_NISTP256_SHA256,
            ECDSA_NISTP384_SHA384,
            RSA_PSS_SHA256,
            RSA_PSS_SHA384,
            RSA_PSS_SHA512,
            ED25519,
        ]
    }
}

/// Build a client TLS configuration for the given ALPN protocol list.
///
/// `verify = false` disables both chain and hostname validation — the
/// common case for probing test/staging intermediaries with self-signed
/// certificates. `alpn` is typically `[b"http/1.1"]` or `[b"h2",
/// b"http/1.1"]`.
pub fn build_tls_config(verify: bool, alpn: &[Vec<u8>]) -> Arc<ClientConfig> {
    ensure_crypto_provider();

    let mut config = if verify {
        let mut roots = RootCertStore::empty();
        roots.extend(rustls_native_certs::load_native_certs().certs);
        ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth()
    } else {
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
            .with_no_client_auth()
    };

    config.alpn_protocols = alpn.to_vec();
    Arc::new(config)
}

/// Compute the SNI `ServerName` for a target host (IP literals pass through
/// as-is, hostnames are used verbatim).
pub fn server_name(host: &str) -> Result<ServerName<'static>, rustls::pki_types::InvalidDnsNameError> {
    ServerName::try_from(host.to_string()).map(ServerName::to_owned)
}

/// Read the ALPN protocol negotiated on a connected TLS stream, if any.
pub fn negotiated_protocol<T>(stream: &tokio_rustls::client::TlsStream<T>) -> Option<String> {
    let (_, conn) = stream.get_ref();
    conn.alpn_protocol()
        .map(|p| String::from_utf8_lossy(p).into_owned())
}
