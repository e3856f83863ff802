//! Two-way mail delivery probe
//!
//! Checks that two independently operated mail servers can deliver to
//! each other. Each run looks in both IMAP mailboxes for the probe the
//! other server submitted on the previous run, deletes it, and then
//! submits a fresh probe in each direction over SMTP.
//!
//! Nothing is stored locally between runs: every probe carries its
//! sender and creation time in `X-TWM-*` headers, and the mailboxes
//! themselves hold the only state.
//!
//! ```no_run
//! use twowaymail::{
//!     Endpoint, ImapScanner, ProbeOptions, Report, RoundTripProber, SeverityPolicy,
//!     SmtpSubmitter,
//! };
//!
//! # async fn run() -> twowaymail::Result<()> {
//! let options = ProbeOptions::default();
//! let a = Endpoint::new("smtp.a.example", "imap.a.example", "probe@a.example", "probe", "pw", true)?;
//! let b = Endpoint::new("smtp.b.example", "imap.b.example", "probe@b.example", "probe", "pw", true)?;
//!
//! let prober = RoundTripProber::new(
//!     a,
//!     b,
//!     ImapScanner::new(options.clone()),
//!     SmtpSubmitter::new(options.clone()),
//!     options,
//! );
//! let outcome = prober.probe().await;
//! println!("{}", Report::evaluate(&outcome, &SeverityPolicy::default()).headline());
//! # Ok(())
//! # }
//! ```

mod config;
mod connection;
mod error;
mod probe;
mod prober;
mod report;
mod scanner;
mod submit;

pub use config::{
    DEFAULT_TIMEOUT, Endpoint, IMAP_PORT, ProbeOptions, STALENESS_WINDOW, SUBMISSION_PORT,
    ServerAddress, local_hostname,
};
pub use error::{Error, Result};
pub use probe::{ProbeMessage, Verdict, classify, unix_now};
pub use prober::{Leg, Outcome, RoundTripProber};
pub use report::{LegReport, Report, SeverityPolicy, Status};
pub use scanner::{ImapScanner, MailboxScanner, ScanReport};
pub use submit::{MailSubmitter, SmtpSubmitter};
