//! Line framing shared by the server and the client
//!
//! One JSON document per line. Reads are capped, so a peer can never grow a
//! buffer past the limit, and lines are returned as raw bytes so the caller
//! decides how to answer text that is not UTF-8.

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::Result;

/// Slack on top of the base64-inflated upload limit for the JSON envelope
const ENVELOPE_SLACK: usize = 64 * 1024;

/// Longest response line a client accepts
pub const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

/// Longest request line accepted for a given upload limit
pub fn max_request_bytes(max_upload_bytes: usize) -> usize {
    max_upload_bytes / 3 * 4 + 4 + ENVELOPE_SLACK
}

/// One read from a framed stream
#[derive(Debug, PartialEq, Eq)]
pub enum Frame {
    /// A complete line, without its terminator
    Line(Vec<u8>),
    /// The line did not end within the limit
    Oversized,
    /// The peer closed the stream
    Closed,
}

/// Read the next line, giving up after `limit` bytes
pub async fn read_frame<R>(reader: &mut R, limit: usize) -> Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let read = (&mut *reader)
        .take(limit as u64)
        .read_until(b'\n', &mut line)
        .await?;

    if read == 0 {
        return Ok(Frame::Closed);
    }

    match line.last() {
        Some(b'\n') => {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }
        _ if read >= limit => return Ok(Frame::Oversized),
        _ => {}
    }
    Ok(Frame::Line(line))
}

/// Write `value` as one JSON line and flush
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut json = serde_json::to_vec(value)?;
    json.push(b'\n');
    writer.write_all(&json).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[test]
    fn test_request_limit_covers_max_upload() {
        for upload in [1, 2, 3, 1000, 16 * 1024 * 1024] {
            let encoded = (upload + 2) / 3 * 4;
            assert!(max_request_bytes(upload) > encoded);
        }
    }

    #[tokio::test]
    async fn test_reads_lines_then_closed() {
        let input: &[u8] = b"{\"a\":1}\r\n\xff\xfe\ntail";
        let mut reader = BufReader::new(input);

        assert_eq!(
            read_frame(&mut reader, 64).await.unwrap(),
            Frame::Line(b"{\"a\":1}".to_vec())
        );
        // Bytes come back untouched, even when they are not UTF-8
        assert_eq!(
            read_frame(&mut reader, 64).await.unwrap(),
            Frame::Line(vec![0xff, 0xfe])
        );
        assert_eq!(
            read_frame(&mut reader, 64).await.unwrap(),
            Frame::Line(b"tail".to_vec())
        );
        assert_eq!(read_frame(&mut reader, 64).await.unwrap(), Frame::Closed);
    }

    #[tokio::test]
    async fn test_long_line_is_oversized() {
        let input = vec![b'x'; 100];
        let mut reader = BufReader::new(input.as_slice());
        assert_eq!(read_frame(&mut reader, 10).await.unwrap(), Frame::Oversized);
    }

    #[tokio::test]
    async fn test_write_frame_appends_newline() {
        let mut out = Vec::new();
        write_frame(&mut out, &serde_json::json!({"type": "Ping"}))
            .await
            .unwrap();
        assert_eq!(out, b"{\"type\":\"Ping\"}\n");
    }
}
