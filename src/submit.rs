//! Probe submission over SMTP

use crate::config::{Endpoint, ProbeOptions};
use crate::error::{Error, Result};
use crate::probe::ProbeMessage;
use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::future::Future;
use tracing::{debug, info};

/// Delivers a probe through an endpoint's submission server.
pub trait MailSubmitter {
    /// Send `probe` from `endpoint` to `probe.to`.
    fn send(&self, endpoint: &Endpoint, probe: &ProbeMessage) -> impl Future<Output = Result<()>>;
}

/// [`MailSubmitter`] using lettre's async SMTP transport.
///
/// Each call opens a fresh connection and closes it with QUIT.
#[derive(Debug, Clone)]
pub struct SmtpSubmitter {
    options: ProbeOptions,
}

impl SmtpSubmitter {
    #[must_use]
    pub const fn new(options: ProbeOptions) -> Self {
        Self { options }
    }

    fn transport(&self, endpoint: &Endpoint) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&endpoint.smtp.host)
                .port(endpoint.smtp.port)
                .credentials(Credentials::new(
                    endpoint.username.clone(),
                    endpoint.password.clone(),
                ))
                .timeout(Some(self.options.timeout));

        if endpoint.starttls {
            let tls = TlsParameters::builder(endpoint.smtp.host.clone())
                .dangerous_accept_invalid_certs(self.options.accept_invalid_certs)
                .build_rustls()
                .map_err(|e| Error::Tls(format!("Invalid TLS parameters: {e}")))?;
            builder = builder.tls(Tls::Required(tls));
        }

        Ok(builder.build())
    }
}

/// SMTP envelope for a probe, validating both addresses.
fn envelope(probe: &ProbeMessage) -> Result<Envelope> {
    let from: Address = probe
        .from
        .parse()
        .map_err(|e| Error::Config(format!("Invalid sender address '{}': {e}", probe.from)))?;
    let to: Address = probe
        .to
        .parse()
        .map_err(|e| Error::Config(format!("Invalid recipient address '{}': {e}", probe.to)))?;
    Envelope::new(Some(from), vec![to]).map_err(|e| Error::Config(e.to_string()))
}

impl MailSubmitter for SmtpSubmitter {
    async fn send(&self, endpoint: &Endpoint, probe: &ProbeMessage) -> Result<()> {
        let envelope = envelope(probe)?;
        let mailer = self.transport(endpoint)?;

        debug!("Submitting probe via {}", endpoint.smtp.socket_addr());
        mailer
            .send_raw(&envelope, probe.encode().as_bytes())
            .await
            .map_err(|e| Error::Smtp(format!("Sending via {} failed: {e}", endpoint.smtp)))?;

        info!("Probe sent from {} to {}", probe.from, probe.to);
        Ok(())
    }
}
