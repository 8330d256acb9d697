//! Wire framing
//!
//! Two framings share one byte stream:
//! ```text
//! Content-Length: 46\r\n
//! \r\n
//! {"seq":1,"type":"request","command":"version"}
//! ```
//! and a bare JSON object starting with `{`, delimited by brace balance.
//! Header blocks may carry other `key: value` lines (the runtime's greeting
//! does); only the length is used. A zero length is a header-only frame and
//! is skipped.

use crate::constants::framing::{CONTENT_LENGTH, MAX_FRAME_LEN};
use crate::{Error, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, trace};

/// Reads complete message payloads from a byte stream
pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read the next non-empty payload.
    ///
    /// Returns `Ok(None)` on a clean end of stream. `Error::Protocol` means one
    /// frame was malformed and has been skipped; the reader can be polled again.
    /// `Error::Transport` means the stream is unusable.
    pub async fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            let first = match self.skip_whitespace().await? {
                Some(byte) => byte,
                None => return Ok(None),
            };

            if first == b'{' {
                return self.read_json_value().await.map(Some);
            }

            let length = match self.read_header_block().await? {
                Some(length) => length,
                None => return Ok(None),
            };

            if length == 0 {
                trace!("Skipping header-only frame");
                continue;
            }

            if length > MAX_FRAME_LEN {
                self.discard(length).await?;
                return Err(Error::Protocol(format!(
                    "Frame of {} bytes exceeds limit of {} bytes",
                    length, MAX_FRAME_LEN
                )));
            }

            let mut payload = vec![0u8; length];
            self.reader.read_exact(&mut payload).await?;
            return Ok(Some(payload));
        }
    }

    /// Consume leading whitespace and return the next byte without consuming it
    async fn skip_whitespace(&mut self) -> Result<Option<u8>> {
        loop {
            let (skipped, first) = {
                let buf = self.reader.fill_buf().await?;
                if buf.is_empty() {
                    return Ok(None);
                }
                let skipped = buf.iter().take_while(|b| b.is_ascii_whitespace()).count();
                (skipped, buf.get(skipped).copied())
            };
            self.reader.consume(skipped);
            if first.is_some() {
                return Ok(first);
            }
        }
    }

    /// Read `key: value` lines up to the blank line and return the length field.
    ///
    /// The whole block is consumed even when it is malformed, so the next
    /// read starts at the payload (or the next frame).
    async fn read_header_block(&mut self) -> Result<Option<usize>> {
        let mut content_length: Option<usize> = None;
        let mut malformed: Option<String> = None;
        let mut line = Vec::new();
        let mut lines_read = 0usize;

        loop {
            line.clear();
            let bytes_read = self.reader.read_until(b'\n', &mut line).await?;
            if bytes_read == 0 {
                if lines_read == 0 {
                    return Ok(None);
                }
                return Err(Error::Transport(
                    "Connection closed inside a header block".to_string(),
                ));
            }
            lines_read += 1;

            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            if text.is_empty() {
                break;
            }

            match text.split_once(':') {
                Some((key, value)) if key.trim().eq_ignore_ascii_case(CONTENT_LENGTH) => {
                    let value = value.trim();
                    match value.parse() {
                        Ok(length) => content_length = Some(length),
                        Err(_) => {
                            malformed = Some(format!("Invalid {}: {}", CONTENT_LENGTH, value))
                        }
                    }
                }
                Some((key, value)) => {
                    debug!(header = key.trim(), value = value.trim(), "Ignoring header");
                }
                None => malformed = Some(format!("Malformed header line: {}", text)),
            }
        }

        if let Some(reason) = malformed {
            return Err(Error::Protocol(reason));
        }

        content_length
            .map(Some)
            .ok_or_else(|| Error::Protocol(format!("Missing {} header", CONTENT_LENGTH)))
    }

    /// Read exactly one balanced-brace JSON value
    async fn read_json_value(&mut self) -> Result<Vec<u8>> {
        let mut scanner = BraceScanner::default();
        let mut out = Vec::new();

        loop {
            let (consumed, done) = {
                let buf = self.reader.fill_buf().await?;
                if buf.is_empty() {
                    return Err(Error::Transport(
                        "Connection closed inside a JSON message".to_string(),
                    ));
                }
                match scanner.scan(buf) {
                    Some(end) => {
                        out.extend_from_slice(&buf[..end]);
                        (end, true)
                    }
                    None => {
                        out.extend_from_slice(buf);
                        (buf.len(), false)
                    }
                }
            };
            self.reader.consume(consumed);

            if done {
                return Ok(out);
            }
            if out.len() > MAX_FRAME_LEN {
                return Err(Error::Transport(format!(
                    "Unframed JSON message exceeds limit of {} bytes",
                    MAX_FRAME_LEN
                )));
            }
        }
    }

    async fn discard(&mut self, length: usize) -> Result<()> {
        let mut limited = (&mut self.reader).take(length as u64);
        tokio::io::copy(&mut limited, &mut tokio::io::sink()).await?;
        Ok(())
    }
}

/// Incremental scanner that finds the end of one top-level JSON object.
///
/// Tracks string literals and escapes so braces inside strings do not count.
#[derive(Debug, Default)]
struct BraceScanner {
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl BraceScanner {
    /// Feed a chunk; returns the index just past the closing brace, if reached
    fn scan(&mut self, chunk: &[u8]) -> Option<usize> {
        for (i, &byte) in chunk.iter().enumerate() {
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }
            match byte {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        return Some(i + 1);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

/// Prefix a payload with its `Content-Length` header
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let header = format!("{}: {}\r\n\r\n", CONTENT_LENGTH, payload.len());
    let mut frame = Vec::with_capacity(header.len() + payload.len());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Write one framed payload as a single write, then flush
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_frame(payload)).await?;
    writer.flush().await?;
    Ok(())
}
