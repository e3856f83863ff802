//! SELECT command handler.
//!
//! Opens a folder and responds with the metadata RFC 3501 requires:
//! FLAGS, EXISTS, RECENT, UIDVALIDITY, UIDNEXT and PERMANENTFLAGS.
//!
//! Returns the selected folder name (or `None` if not found).

use crate::fake_imap::io::write_line;
use crate::fake_imap::mailbox::Mailbox;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

pub async fn handle_select<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    folder_name: &str,
    mailbox: &Mailbox,
    stream: &mut BufReader<S>,
) -> Option<String> {
    let Some(folder) = mailbox.get_folder(folder_name) else {
        let resp = format!("{tag} NO Folder not found\r\n");
        let _ = write_line(stream, &resp).await;
        return None;
    };

    let lines = [
        "* FLAGS (\\Seen \\Answered \\Flagged \\Deleted \\Draft)\r\n".to_string(),
        format!("* {} EXISTS\r\n", folder.emails.len()),
        "* 0 RECENT\r\n".to_string(),
        "* OK [UIDVALIDITY 1]\r\n".to_string(),
        format!("* OK [UIDNEXT {}]\r\n", folder.uid_next()),
        "* OK [PERMANENTFLAGS (\\Seen \\Deleted)] Limited\r\n".to_string(),
        format!("{tag} OK [READ-WRITE] SELECT completed\r\n"),
    ];
    for line in &lines {
        if write_line(stream, line).await.is_err() {
            return None;
        }
    }

    Some(folder_name.to_string())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{duplex, make_raw_email, output};
    use super::*;
    use crate::fake_imap::mailbox::MailboxBuilder;

    async fn run(folder_name: &str, mailbox: &Mailbox) -> (String, Option<String>) {
        let (mut stream, client) = duplex();
        let selected = handle_select("A1", folder_name, mailbox, &mut stream).await;
        drop(stream);
        (output(client).await, selected)
    }

    #[tokio::test]
    async fn selects_existing_folder() {
        let raw = make_raw_email();
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .email(5, &raw)
            .email(10, &raw)
            .build();

        let (out, selected) = run("INBOX", &mailbox).await;

        assert_eq!(selected.as_deref(), Some("INBOX"));
        assert!(out.contains("* 2 EXISTS"));
        assert!(out.contains("* OK [UIDNEXT 11]"));
        assert!(out.contains("A1 OK [READ-WRITE] SELECT completed"));
    }

    #[tokio::test]
    async fn returns_none_for_missing_folder() {
        let mailbox = MailboxBuilder::new().folder("INBOX").build();
        let (out, selected) = run("Nope", &mailbox).await;
        assert!(selected.is_none());
        assert!(out.contains("A1 NO Folder not found"));
    }
}
