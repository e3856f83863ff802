//! LOGIN command handler.
//!
//! Accepts any credentials; the scanner's authentication is exercised
//! against real servers only.

use crate::fake_imap::io::write_line;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle the LOGIN command. Returns `false` if the client went away.
pub async fn handle_login<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    stream: &mut BufReader<S>,
) -> bool {
    let resp = format!("{tag} OK LOGIN completed\r\n");
    write_line(stream, &resp).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{duplex, output};
    use super::*;

    #[tokio::test]
    async fn responds_with_ok_and_echoes_tag() {
        let (mut stream, client) = duplex();
        assert!(handle_login("TAG42", &mut stream).await);
        drop(stream);
        assert_eq!(output(client).await, "TAG42 OK LOGIN completed\r\n");
    }
}
