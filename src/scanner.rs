//! Mailbox scanning
//!
//! Looks through an endpoint's INBOX for the probe sent by the other
//! endpoint, deletes every probe it recognizes and reports whether a
//! fresh one was among them.

use crate::config::{Endpoint, ProbeOptions};
use crate::connection::{self, ImapSession};
use crate::error::{Error, Result};
use crate::probe::{Verdict, classify};
use async_imap::Session;
use futures::TryStreamExt;
use futures::io::{AsyncRead, AsyncWrite};
use std::fmt::Debug;
use std::future::Future;
use tracing::{debug, info, warn};

const INBOX: &str = "INBOX";

/// Reads a mailbox and purges probe messages.
pub trait MailboxScanner {
    /// Scan every message in `endpoint`'s mailbox.
    ///
    /// Probes from `expected_sender_host` are deleted; the result is
    /// `true` iff at least one of them was younger than the staleness
    /// window at `now` (unix seconds).
    fn scan_and_purge(
        &self,
        endpoint: &Endpoint,
        expected_sender_host: &str,
        now: f64,
    ) -> impl Future<Output = Result<bool>>;
}

/// What one pass over a mailbox found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub matched: Vec<u32>,
    pub stale: Vec<u32>,
    pub ignored: usize,
}

impl ScanReport {
    /// Record the verdict for one message.
    pub fn record(&mut self, uid: u32, verdict: Verdict) {
        match verdict {
            Verdict::Match => self.matched.push(uid),
            Verdict::Stale => self.stale.push(uid),
            Verdict::NotOurs => self.ignored += 1,
        }
    }

    /// At least one fresh probe was seen.
    #[must_use]
    pub fn found(&self) -> bool {
        !self.matched.is_empty()
    }

    /// UIDs flagged for deletion, in ascending order.
    #[must_use]
    pub fn flagged(&self) -> Vec<u32> {
        let mut uids: Vec<u32> = self.matched.iter().chain(&self.stale).copied().collect();
        uids.sort_unstable();
        uids
    }
}

/// [`MailboxScanner`] over IMAP.
#[derive(Debug, Clone)]
pub struct ImapScanner {
    options: ProbeOptions,
}

impl ImapScanner {
    #[must_use]
    pub const fn new(options: ProbeOptions) -> Self {
        Self { options }
    }

    /// Scan and purge, returning the full per-message breakdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection, login, SELECT, SEARCH,
    /// STORE or EXPUNGE fails. Messages whose body cannot be fetched
    /// are skipped.
    pub async fn scan(
        &self,
        endpoint: &Endpoint,
        expected_sender_host: &str,
        now: f64,
    ) -> Result<ScanReport> {
        match connection::connect(endpoint, &self.options).await? {
            ImapSession::Tls(mut session) => {
                self.scan_session(&mut session, expected_sender_host, now)
                    .await
            }
            ImapSession::Plain(mut session) => {
                self.scan_session(&mut session, expected_sender_host, now)
                    .await
            }
        }
    }

    async fn scan_session<T>(
        &self,
        session: &mut Session<T>,
        expected_sender_host: &str,
        now: f64,
    ) -> Result<ScanReport>
    where
        T: AsyncRead + AsyncWrite + Unpin + Debug + Send,
    {
        session
            .select(INBOX)
            .await
            .map_err(|e| Error::Imap(format!("Failed to select {INBOX}: {e}")))?;

        let mut uids: Vec<u32> = session
            .uid_search("ALL")
            .await
            .map_err(|e| Error::Imap(format!("Search failed: {e}")))?
            .into_iter()
            .collect();
        uids.sort_unstable();
        debug!("{} messages in {}", uids.len(), INBOX);

        let mut report = ScanReport::default();
        for uid in uids {
            let raw = match fetch_raw(session, uid).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Failed to fetch UID {}: {}", uid, e);
                    continue;
                }
            };

            let verdict = classify(&raw, expected_sender_host, now, self.options.staleness);
            debug!("UID {} classified as {:?}", uid, verdict);
            if verdict.should_delete() {
                mark_deleted(session, uid).await?;
            }
            report.record(uid, verdict);
        }

        if !report.flagged().is_empty() {
            expunge(session).await?;
            info!(
                "Purged {} probe(s), {} fresh",
                report.flagged().len(),
                report.matched.len()
            );
        }

        session.logout().await.ok();
        Ok(report)
    }
}

impl MailboxScanner for ImapScanner {
    async fn scan_and_purge(
        &self,
        endpoint: &Endpoint,
        expected_sender_host: &str,
        now: f64,
    ) -> Result<bool> {
        let report = self.scan(endpoint, expected_sender_host, now).await?;
        Ok(report.found())
    }
}

async fn fetch_raw<T>(session: &mut Session<T>, uid: u32) -> Result<Vec<u8>>
where
    T: AsyncRead + AsyncWrite + Unpin + Debug + Send,
{
    let messages: Vec<_> = session
        .uid_fetch(uid.to_string(), "(BODY.PEEK[])")
        .await
        .map_err(|e| Error::Imap(format!("Fetch failed: {e}")))?
        .try_collect()
        .await
        .map_err(|e| Error::Imap(format!("Fetch error: {e}")))?;

    messages
        .iter()
        .find_map(|msg| msg.body().map(<[u8]>::to_vec))
        .ok_or_else(|| Error::Protocol(format!("No body found for UID {uid}")))
}

async fn mark_deleted<T>(session: &mut Session<T>, uid: u32) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin + Debug + Send,
{
    let _: Vec<_> = session
        .uid_store(uid.to_string(), "+FLAGS.SILENT (\\Deleted)")
        .await
        .map_err(|e| Error::Imap(format!("Store failed for UID {uid}: {e}")))?
        .try_collect()
        .await
        .map_err(|e| Error::Imap(format!("Store error for UID {uid}: {e}")))?;
    Ok(())
}

async fn expunge<T>(session: &mut Session<T>) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin + Debug + Send,
{
    let _: Vec<_> = session
        .expunge()
        .await
        .map_err(|e| Error::Imap(format!("Expunge failed: {e}")))?
        .try_collect()
        .await
        .map_err(|e| Error::Imap(format!("Expunge error: {e}")))?;
    Ok(())
}
