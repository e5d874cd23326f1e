//! Line-based conversation over a reader/writer pair (stdin/stdout in the CLI)

use async_trait::async_trait;
use skyrelay_domain::{Conversation, ConversationError};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines, Stdin, Stdout,
};
use tokio::sync::Mutex;

pub struct LineConversation<R, W> {
    lines: Mutex<Lines<R>>,
    out: Mutex<W>,
}

/// Conversation with the terminal
pub type StdioConversation = LineConversation<BufReader<Stdin>, Stdout>;

impl StdioConversation {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> LineConversation<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            lines: Mutex::new(reader.lines()),
            out: Mutex::new(writer),
        }
    }

    /// Give back the writer, for inspecting what was sent
    pub fn into_writer(self) -> W {
        self.out.into_inner()
    }
}

#[async_trait]
impl<R, W> Conversation for LineConversation<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, text: &str) -> Result<(), ConversationError> {
        let mut out = self.out.lock().await;
        out.write_all(text.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
        Ok(())
    }

    async fn receive(&self) -> Result<Option<String>, ConversationError> {
        let mut lines = self.lines.lock().await;
        let line = lines.next_line().await?;
        Ok(line.map(|l| l.trim_end_matches('\r').to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_lines_until_eof() {
        let conversation = LineConversation::new(&b"123\r\nyes\n"[..], Vec::new());

        assert_eq!(conversation.receive().await.unwrap().as_deref(), Some("123"));
        assert_eq!(conversation.receive().await.unwrap().as_deref(), Some("yes"));
        assert!(conversation.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_send_writes_one_line() {
        let conversation = LineConversation::new(&b""[..], Vec::new());
        conversation.send("Channel set to: <#1>.").await.unwrap();

        let written = conversation.into_writer();
        assert_eq!(written, b"Channel set to: <#1>.\n");
    }
}
