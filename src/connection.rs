//! IMAP connection and TLS helpers
//!
//! Opens a session to an endpoint's IMAP server, upgrading the plain
//! TCP stream with STARTTLS when the endpoint asks for it.

use crate::config::{Endpoint, ProbeOptions};
use crate::error::{Error, Result};
use async_imap::Session;
use rustls::ClientConfig;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, info};

/// An IMAP session upgraded with STARTTLS.
pub type TlsImapSession = Session<Compat<tokio_rustls::client::TlsStream<TcpStream>>>;

/// An IMAP session over plain TCP.
pub type PlainImapSession = Session<Compat<TcpStream>>;

/// A logged-in IMAP session, encrypted or not.
pub enum ImapSession {
    Tls(TlsImapSession),
    Plain(PlainImapSession),
}

/// Build a rustls connector.
///
/// Verifies against the bundled Mozilla roots unless
/// `accept_invalid_certs` is set, in which case any certificate is
/// accepted but handshake signatures are still checked.
pub fn tls_connector(accept_invalid_certs: bool) -> Result<TlsConnector> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(format!("Unsupported protocol versions: {e}")))?;

    let config = if accept_invalid_certs {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert::new(&provider)))
            .with_no_client_auth()
    } else {
        let roots = rustls::RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        builder.with_root_certificates(roots).with_no_client_auth()
    };

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Open a TCP connection, bounded by the probe timeout.
async fn connect_tcp(addr: &str, options: &ProbeOptions) -> Result<TcpStream> {
    debug!("Connecting to {}", addr);
    tokio::time::timeout(options.timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| Error::Timeout(options.timeout))?
        .map_err(Error::from)
}

/// Connect to the endpoint's IMAP server and log in.
///
/// When `endpoint.starttls` is set, issues STARTTLS on the plain
/// connection and performs the TLS handshake before LOGIN.
pub async fn connect(endpoint: &Endpoint, options: &ProbeOptions) -> Result<ImapSession> {
    let addr = endpoint.imap.socket_addr();
    let tcp_stream = connect_tcp(&addr, options).await?;
    let mut client = async_imap::Client::new(tcp_stream.compat());

    if !endpoint.starttls {
        let session = client
            .login(&endpoint.username, &endpoint.password)
            .await
            .map_err(|(e, _)| Error::Imap(format!("Login to {addr} failed: {e}")))?;
        info!("Connected to IMAP server {} without TLS", addr);
        return Ok(ImapSession::Plain(session));
    }

    client
        .run_command_and_check_ok("STARTTLS", None)
        .await
        .map_err(|e| Error::Tls(format!("STARTTLS on {addr} failed: {e}")))?;

    let connector = tls_connector(options.accept_invalid_certs)?;
    let server_name = ServerName::try_from(endpoint.imap.host.clone())
        .map_err(|e| Error::Tls(format!("Invalid server name: {e}")))?;

    let inner = client.into_inner().into_inner();
    let tls_stream = connector
        .connect(server_name, inner)
        .await
        .map_err(|e| Error::Tls(format!("TLS handshake with {addr} failed: {e}")))?;

    let tls_client = async_imap::Client::new(tls_stream.compat());

    let session = tls_client
        .login(&endpoint.username, &endpoint.password)
        .await
        .map_err(|(e, _)| Error::Imap(format!("Login to {addr} failed: {e}")))?;

    info!("Connected to IMAP server {}", addr);
    Ok(ImapSession::Tls(session))
}

/// Certificate verifier that trusts any server certificate.
///
/// Monitoring targets often run with self-signed certificates.
#[derive(Debug)]
struct AcceptAnyCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl AcceptAnyCert {
    fn new(provider: &CryptoProvider) -> Self {
        Self {
            algorithms: provider.signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for AcceptAnyCert {
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
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
