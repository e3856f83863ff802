//! Plugin-style status reporting
//!
//! Grades an [`Outcome`] the way monitoring plugins expect: a status
//! with a fixed exit code and a one-line summary.

use crate::prober::{Leg, Outcome};
use serde::Serialize;
use std::fmt;

const ALL_OK: &str = "both mails found, both new mails sent";

/// Monitoring status, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl Status {
    /// Monitoring-plugin exit code: 0, 1, 2 or 3.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Warning => 1,
            Self::Critical => 2,
            Self::Unknown => 3,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "OK",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
            Self::Unknown => "UNKNOWN",
        })
    }
}

/// Status each leg reports when it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityPolicy {
    on_failure: [Status; 4],
}

impl Default for SeverityPolicy {
    fn default() -> Self {
        Self {
            on_failure: [Status::Critical; 4],
        }
    }
}

impl SeverityPolicy {
    /// Report a failure of `leg` as a warning instead of critical.
    #[must_use]
    pub const fn warn_on(mut self, leg: Leg) -> Self {
        self.on_failure[leg.index()] = Status::Warning;
        self
    }

    #[must_use]
    pub const fn on_failure(&self, leg: Leg) -> Status {
        self.on_failure[leg.index()]
    }
}

/// Graded result of a single leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LegReport {
    pub leg: Leg,
    pub ok: bool,
    pub status: Status,
}

/// Graded result of a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub status: Status,
    pub summary: String,
    pub legs: Vec<LegReport>,
}

impl Report {
    /// Grade `outcome` under `policy`.
    ///
    /// The overall status is the worst leg status. The summary names
    /// the first failing leg in [`Leg::ALL`] order.
    #[must_use]
    pub fn evaluate(outcome: &Outcome, policy: &SeverityPolicy) -> Self {
        let legs: Vec<LegReport> = Leg::ALL
            .into_iter()
            .map(|leg| {
                let ok = outcome.get(leg);
                let status = if ok { Status::Ok } else { policy.on_failure(leg) };
                LegReport { leg, ok, status }
            })
            .collect();

        let status = legs
            .iter()
            .map(|l| l.status)
            .max()
            .unwrap_or(Status::Unknown);

        let summary = legs
            .iter()
            .find(|l| !l.ok)
            .map_or(ALL_OK, |l| l.leg.describe(false))
            .to_string();

        Self {
            status,
            summary,
            legs,
        }
    }

    /// Report for a run that could not be carried out at all.
    #[must_use]
    pub fn unknown(reason: impl Into<String>) -> Self {
        Self {
            status: Status::Unknown,
            summary: reason.into(),
            legs: Vec::new(),
        }
    }

    /// `TWOWAYMAIL <STATUS> - <summary>`
    #[must_use]
    pub fn headline(&self) -> String {
        format!("TWOWAYMAIL {} - {}", self.status, self.summary)
    }

    /// One line per leg, for verbose output.
    #[must_use]
    pub fn details(&self) -> Vec<String> {
        self.legs
            .iter()
            .map(|l| format!("{}: {} ({})", l.leg, l.leg.describe(l.ok), l.status))
            .collect()
    }
}
