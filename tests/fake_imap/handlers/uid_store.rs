//! UID STORE command handler.
//!
//! Only `\Deleted` is tracked, which is what the scanner sets before
//! EXPUNGE. `.SILENT` suppresses the untagged FETCH responses.

use crate::fake_imap::io::write_line;
use crate::fake_imap::mailbox::Mailbox;
use imap_codec::imap_types::flag::{Flag, StoreResponse, StoreType};
use imap_codec::imap_types::sequence::{SeqOrUid, Sequence, SequenceSet};
use std::sync::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// The parts of a parsed STORE command the handler looks at.
pub struct StoreArgs<'a> {
    pub sequence_set: &'a SequenceSet,
    pub kind: &'a StoreType,
    pub response: &'a StoreResponse,
    pub flags: &'a [Flag<'a>],
}

/// Expand a UID set, resolving `*` to the highest UID in the folder.
fn extract_uids(seq_set: &SequenceSet, max_uid: u32) -> Vec<u32> {
    let resolve = |s: &SeqOrUid| match s {
        SeqOrUid::Value(v) => v.get(),
        SeqOrUid::Asterisk => max_uid,
    };

    let mut uids = Vec::new();
    for seq in seq_set.0.as_ref() {
        match seq {
            Sequence::Single(s) => uids.push(resolve(s)),
            Sequence::Range(a, b) => {
                let (lo, hi) = (resolve(a).min(resolve(b)), resolve(a).max(resolve(b)));
                uids.extend(lo..=hi);
            }
        }
    }
    uids
}

pub async fn handle_uid_store<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    args: &StoreArgs<'_>,
    mailbox: &Mutex<Mailbox>,
    selected_folder: Option<&str>,
    stream: &mut BufReader<S>,
) {
    let Some(folder_name) = selected_folder else {
        let resp = format!("{tag} BAD No folder selected\r\n");
        let _ = write_line(stream, &resp).await;
        return;
    };

    let wants_deleted = args.flags.iter().any(|f| matches!(f, Flag::Deleted));

    // Mutate under lock, write responses after releasing it.
    let updated = {
        let mut mb = mailbox.lock().unwrap();
        mb.get_folder_mut(folder_name).map(|folder| {
            let max_uid = folder.emails.iter().map(|e| e.uid).max().unwrap_or(0);
            let mut updated = Vec::new();
            for uid in extract_uids(args.sequence_set, max_uid) {
                let Some((idx, email)) = folder
                    .emails
                    .iter_mut()
                    .enumerate()
                    .find(|(_, e)| e.uid == uid)
                else {
                    continue;
                };

                email.deleted = match args.kind {
                    StoreType::Add => email.deleted || wants_deleted,
                    StoreType::Remove => email.deleted && !wants_deleted,
                    StoreType::Replace => wants_deleted,
                };
                updated.push((idx + 1, uid, email.deleted));
            }
            updated
        })
    };

    let Some(updated) = updated else {
        let resp = format!("{tag} BAD Folder not found\r\n");
        let _ = write_line(stream, &resp).await;
        return;
    };

    if !matches!(args.response, StoreResponse::Silent) {
        for (seq, uid, deleted) in &updated {
            let flags = if *deleted { "\\Deleted" } else { "" };
            let line = format!("* {seq} FETCH (UID {uid} FLAGS ({flags}))\r\n");
            if write_line(stream, &line).await.is_err() {
                return;
            }
        }
    }

    let resp = format!("{tag} OK STORE completed\r\n");
    let _ = write_line(stream, &resp).await;
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{duplex, make_raw_email, output};
    use super::*;
    use crate::fake_imap::mailbox::MailboxBuilder;
    use std::num::NonZeroU32;

    fn uid_set(uid: u32) -> SequenceSet {
        SequenceSet(
            vec![Sequence::Single(SeqOrUid::Value(
                NonZeroU32::new(uid).unwrap(),
            ))]
            .try_into()
            .unwrap(),
        )
    }

    async fn run(
        uid: u32,
        kind: &StoreType,
        response: &StoreResponse,
        mailbox: &Mutex<Mailbox>,
    ) -> String {
        let seq = uid_set(uid);
        let flags = [Flag::Deleted];
        let args = StoreArgs {
            sequence_set: &seq,
            kind,
            response,
            flags: &flags,
        };

        let (mut stream, client) = duplex();
        handle_uid_store("A1", &args, mailbox, Some("INBOX"), &mut stream).await;
        drop(stream);
        output(client).await
    }

    fn inbox_with_two() -> Mutex<Mailbox> {
        let raw = make_raw_email();
        Mutex::new(
            MailboxBuilder::new()
                .folder("INBOX")
                .email(1, &raw)
                .email(2, &raw)
                .build(),
        )
    }

    #[tokio::test]
    async fn silent_add_sets_deleted_without_fetch_lines() {
        let mb = inbox_with_two();

        let out = run(2, &StoreType::Add, &StoreResponse::Silent, &mb).await;

        assert!(!out.contains("FETCH"));
        assert!(out.contains("A1 OK STORE completed"));
        let locked = mb.lock().unwrap();
        let inbox = locked.get_folder("INBOX").unwrap();
        assert!(!inbox.emails[0].deleted);
        assert!(inbox.emails[1].deleted);
    }

    #[tokio::test]
    async fn answered_add_reports_flags() {
        let mb = inbox_with_two();
        let out = run(1, &StoreType::Add, &StoreResponse::Answer, &mb).await;
        assert!(out.contains("* 1 FETCH (UID 1 FLAGS (\\Deleted))"));
    }

    #[tokio::test]
    async fn remove_clears_deleted() {
        let mb = inbox_with_two();
        mb.lock().unwrap().get_folder_mut("INBOX").unwrap().emails[0].deleted = true;

        let _ = run(1, &StoreType::Remove, &StoreResponse::Silent, &mb).await;

        assert!(!mb.lock().unwrap().get_folder("INBOX").unwrap().emails[0].deleted);
    }
}
