//! Round-trip prober
//!
//! One run checks both mailboxes for the probe the other side sent
//! last time, then sends a fresh probe each way. Every leg is isolated:
//! an error or timeout turns that leg into `false` and nothing else.

use crate::config::{Endpoint, ProbeOptions};
use crate::error::{Error, Result};
use crate::probe::{ProbeMessage, unix_now};
use crate::scanner::MailboxScanner;
use crate::submit::MailSubmitter;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use tracing::{info, warn};

/// One of the four independent operations of a run, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Leg {
    /// Host 1's mailbox received host 2's probe.
    RecvHost1,
    /// Host 2's mailbox received host 1's probe.
    RecvHost2,
    /// Host 1 sent a probe to host 2.
    SendHost1,
    /// Host 2 sent a probe to host 1.
    SendHost2,
}

impl Leg {
    pub const ALL: [Self; 4] = [
        Self::RecvHost1,
        Self::RecvHost2,
        Self::SendHost1,
        Self::SendHost2,
    ];

    /// Short name used on the command line.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::RecvHost1 => "recv1",
            Self::RecvHost2 => "recv2",
            Self::SendHost1 => "send1",
            Self::SendHost2 => "send2",
        }
    }

    /// Human sentence for this leg's result.
    #[must_use]
    pub const fn describe(self, ok: bool) -> &'static str {
        match (self, ok) {
            (Self::RecvHost1, true) => "recv on host 1 found",
            (Self::RecvHost1, false) => "recv on host 1 not found",
            (Self::RecvHost2, true) => "recv on host 2 found",
            (Self::RecvHost2, false) => "recv on host 2 not found",
            (Self::SendHost1, true) => "send on host 1 ok",
            (Self::SendHost1, false) => "send on host 1 failed",
            (Self::SendHost2, true) => "send on host 2 ok",
            (Self::SendHost2, false) => "send on host 2 failed",
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            Self::RecvHost1 => 0,
            Self::RecvHost2 => 1,
            Self::SendHost1 => 2,
            Self::SendHost2 => 3,
        }
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Leg {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|leg| leg.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                Error::Config(format!(
                    "Unknown leg '{s}' (expected one of recv1, recv2, send1, send2)"
                ))
            })
    }
}

/// Result of one run: one slot per leg, always fully populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Outcome {
    pub recv_from_b_into_a: bool,
    pub recv_from_a_into_b: bool,
    pub sent_a_to_b: bool,
    pub sent_b_to_a: bool,
}

impl Outcome {
    #[must_use]
    pub const fn get(&self, leg: Leg) -> bool {
        match leg {
            Leg::RecvHost1 => self.recv_from_b_into_a,
            Leg::RecvHost2 => self.recv_from_a_into_b,
            Leg::SendHost1 => self.sent_a_to_b,
            Leg::SendHost2 => self.sent_b_to_a,
        }
    }

    #[must_use]
    pub const fn all_ok(&self) -> bool {
        self.recv_from_b_into_a && self.recv_from_a_into_b && self.sent_a_to_b && self.sent_b_to_a
    }
}

/// Drives one run across an ordered pair of endpoints.
pub struct RoundTripProber<S, M> {
    a: Endpoint,
    b: Endpoint,
    scanner: S,
    submitter: M,
    options: ProbeOptions,
}

impl<S: MailboxScanner, M: MailSubmitter> RoundTripProber<S, M> {
    #[must_use]
    pub const fn new(
        a: Endpoint,
        b: Endpoint,
        scanner: S,
        submitter: M,
        options: ProbeOptions,
    ) -> Self {
        Self {
            a,
            b,
            scanner,
            submitter,
            options,
        }
    }

    /// Run all four legs and collect their outcomes.
    ///
    /// Both checks complete before either send starts, so a probe
    /// sent in this run is never consumed by this run's own check.
    /// Each phase is bounded by the timeout, so the whole run takes at
    /// most twice that.
    pub async fn probe(&self) -> Outcome {
        let now = unix_now();
        let (recv_from_b_into_a, recv_from_a_into_b) = tokio::join!(
            self.check_recv(Leg::RecvHost1, &self.a, &self.b, now),
            self.check_recv(Leg::RecvHost2, &self.b, &self.a, now),
        );

        let now = unix_now();
        let (sent_a_to_b, sent_b_to_a) = tokio::join!(
            self.send(Leg::SendHost1, &self.a, &self.b, now),
            self.send(Leg::SendHost2, &self.b, &self.a, now),
        );

        let outcome = Outcome {
            recv_from_b_into_a,
            recv_from_a_into_b,
            sent_a_to_b,
            sent_b_to_a,
        };
        info!("Run finished: {:?}", outcome);
        outcome
    }

    /// Did `receiver`'s mailbox get the probe `sender` sent last run?
    async fn check_recv(&self, leg: Leg, receiver: &Endpoint, sender: &Endpoint, now: f64) -> bool {
        let key = sender.sender_key();
        let scan = self.scanner.scan_and_purge(receiver, &key, now);
        let found = self.isolate(leg, receiver, scan).await.unwrap_or(false);
        if !found {
            info!(
                "No fresh probe from {} in mailbox {} ({})",
                key, receiver.address, receiver.imap
            );
        }
        found
    }

    /// Send a new probe from `sender` to `receiver`.
    ///
    /// The result is the submission's own success.
    async fn send(&self, leg: Leg, sender: &Endpoint, receiver: &Endpoint, now: f64) -> bool {
        let probe = ProbeMessage::new(
            sender.address.clone(),
            receiver.address.clone(),
            self.options.monitoring_host.clone(),
            sender.sender_key(),
            now,
        );
        let submit = self.submitter.send(sender, &probe);
        self.isolate(leg, sender, submit).await.is_some()
    }

    /// Bound a leg by the timeout and swallow its error after logging.
    async fn isolate<T>(
        &self,
        leg: Leg,
        endpoint: &Endpoint,
        fut: impl Future<Output = Result<T>>,
    ) -> Option<T> {
        let result = tokio::time::timeout(self.options.timeout, fut)
            .await
            .unwrap_or_else(|_| Err(Error::Timeout(self.options.timeout)));

        match result {
            Ok(value) => Some(value),
            Err(e) => {
                let server = match leg {
                    Leg::RecvHost1 | Leg::RecvHost2 => &endpoint.imap,
                    Leg::SendHost1 | Leg::SendHost2 => &endpoint.smtp,
                };
                warn!("Leg {} failed for {} via {}: {}", leg, endpoint.address, server, e);
                None
            }
        }
    }
}
