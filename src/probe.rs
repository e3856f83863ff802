//! Probe message codec
//!
//! A probe is a tiny plain-text mail carrying its origin and creation
//! time in custom headers. A later, independent run reads those
//! headers back to decide whether a message in the mailbox is the
//! probe it is waiting for, an expired one, or unrelated mail.

use chrono::Utc;
use mailparse::MailHeaderMap;
use std::time::Duration;

/// Header naming the machine that ran the probe.
pub const MONITORING_HOST_HEADER: &str = "X-TWM-Monitoring-Host";

/// Header carrying the sending endpoint's submission address.
pub const SENDER_HOST_HEADER: &str = "X-TWM-Sender-Host";

/// Header carrying the creation time in unix seconds.
pub const UNIXTIME_HEADER: &str = "X-TWM-Unixtime";

const BODY: &str = "KTHXBYE";

/// One probe mail, as sent by one endpoint to the other.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeMessage {
    pub from: String,
    pub to: String,
    pub monitoring_host: String,
    pub sender_host: String,
    pub unixtime: f64,
}

impl ProbeMessage {
    #[must_use]
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        monitoring_host: impl Into<String>,
        sender_host: impl Into<String>,
        unixtime: f64,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            monitoring_host: monitoring_host.into(),
            sender_host: sender_host.into(),
            unixtime,
        }
    }

    /// Render the complete RFC 5322 message with CRLF line endings.
    #[must_use]
    pub fn encode(&self) -> String {
        [
            format!("From: {}", self.from),
            format!("To: {}", self.to),
            format!("Subject: Monitoring probe from {}", self.monitoring_host),
            format!("{MONITORING_HOST_HEADER}: {}", self.monitoring_host),
            format!("{SENDER_HOST_HEADER}: {}", self.sender_host),
            format!("{UNIXTIME_HEADER}: {}", self.unixtime),
            String::new(),
            BODY.to_string(),
        ]
        .join("\r\n")
            + "\r\n"
    }
}

/// What a retrieved message means to the checking side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The probe we were waiting for, inside the staleness window.
    Match,
    /// Our probe, but too old (or undated) to count.
    Stale,
    /// Anything else in the mailbox.
    NotOurs,
}

impl Verdict {
    /// Probes are removed once seen, whether they counted or not.
    #[must_use]
    pub const fn should_delete(self) -> bool {
        matches!(self, Self::Match | Self::Stale)
    }
}

/// Classify a raw message against the sender key we expect.
///
/// `now` is in unix seconds. Age is compared strictly, so a probe
/// exactly `staleness` old still matches.
#[must_use]
pub fn classify(raw: &[u8], expected_sender_host: &str, now: f64, staleness: Duration) -> Verdict {
    let Ok((headers, _)) = mailparse::parse_headers(raw) else {
        return Verdict::NotOurs;
    };

    let sender = headers.get_first_value(SENDER_HOST_HEADER);
    if sender.as_deref().map(str::trim) != Some(expected_sender_host) {
        return Verdict::NotOurs;
    }

    let sent_at = headers
        .get_first_value(UNIXTIME_HEADER)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|t| t.is_finite());

    match sent_at {
        Some(t) if now - t <= staleness.as_secs_f64() => Verdict::Match,
        _ => Verdict::Stale,
    }
}

/// Current time in fractional unix seconds.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
