//! Newline-delimited JSON transport.
//!
//! MCP's stdio transport sends one JSON-RPC message per line: the client
//! writes to our stdin, we answer on stdout, and stderr is left to logging.
//! [`Transport`] is generic over its streams so that the framing can be
//! exercised against in-memory buffers.

use std::io;

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};

/// Line-framed message reader and writer.
pub struct Transport<R, W> {
    reader: R,
    writer: W,
}

/// The transport used by the server: stdin in, stdout out.
pub type StdioTransport = Transport<BufReader<Stdin>, Stdout>;

impl StdioTransport {
    /// Transport over the process's stdin and stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Transport::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> Transport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub const fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Reads the next line without its terminator. `None` means the client
    /// closed its end.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the line is not UTF-8.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }

    /// Writes one message as a single line and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be serialised or written.
    pub async fn write_message<T: Serialize>(&mut self, message: &T) -> io::Result<()> {
        // Compact serde_json output escapes newlines inside strings, so the
        // frame is always one line.
        let mut frame = serde_json::to_vec(message).map_err(io::Error::other)?;
        frame.push(b'\n');
        self.writer.write_all(&frame).await?;
        self.writer.flush().await
    }

    #[cfg(test)]
    fn into_writer(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::{JsonRpcError, JsonRpcResponse, RequestId};
    use serde_json::json;

    #[tokio::test]
    async fn lines_lose_their_terminators() {
        let input: &[u8] = b"{\"a\":1}\r\n\n{\"b\":2}";
        let mut transport = Transport::new(input, Vec::new());

        assert_eq!(
            transport.read_line().await.unwrap().as_deref(),
            Some("{\"a\":1}")
        );
        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(
            transport.read_line().await.unwrap().as_deref(),
            Some("{\"b\":2}")
        );
        assert_eq!(transport.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn each_message_is_one_line() {
        let input: &[u8] = b"";
        let mut transport = Transport::new(input, Vec::new());

        let response = JsonRpcResponse::success(
            RequestId::Number(1),
            json!({"content": [{"type": "text", "text": "line one\nline two"}]}),
        );
        transport.write_message(&response).await.unwrap();
        transport
            .write_message(&JsonRpcError::method_not_found(RequestId::Number(2), "x"))
            .await
            .unwrap();

        let written = String::from_utf8(transport.into_writer()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(written.ends_with('\n'));

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["result"]["content"][0]["text"], "line one\nline two");
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["error"]["code"], -32601);
    }
}
