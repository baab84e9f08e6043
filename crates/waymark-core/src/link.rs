//! Sensor-link line framing.
//!
//! The receiver delivers newline-delimited text over a byte stream. The
//! core only ever needs "the next line of text": partial lines are
//! buffered until their newline arrives, carriage returns and blank lines
//! are dropped, and invalid UTF-8 is replaced rather than rejected (the
//! parser strips non-printable bytes anyway).

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::Result;

/// Initial capacity of the read buffer. Lines are short (well under 256
/// bytes) so this avoids reallocation in the steady state.
const READ_BUFFER_CAPACITY: usize = 1024;

/// Frames a raw byte stream into newline-delimited text lines.
pub struct LineFramer<R> {
    inner: R,
    buffer: BytesMut,
    eof: bool,
}

impl<R: AsyncRead + Unpin> LineFramer<R> {
    /// Wrap a byte stream.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            eof: false,
        }
    }

    /// Next non-empty line of text, or `None` once the stream has ended.
    ///
    /// A partial line at the tail of the stream (no trailing newline) is
    /// returned before `None`.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            while let Some(raw) = self.buffered_line() {
                let line = raw.trim();
                if !line.is_empty() {
                    return Ok(Some(line.to_string()));
                }
            }

            if self.eof {
                if !self.buffer.is_empty() {
                    let tail = self.buffer.split();
                    let line = String::from_utf8_lossy(&tail).trim().to_string();
                    if !line.is_empty() {
                        return Ok(Some(line));
                    }
                }
                return Ok(None);
            }

            let read = self.inner.read_buf(&mut self.buffer).await?;
            if read == 0 {
                self.eof = true;
            }
        }
    }

    /// Split one complete line off the buffer, newline consumed.
    fn buffered_line(&mut self) -> Option<String> {
        let pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let chunk = self.buffer.split_to(pos + 1);
        Some(String::from_utf8_lossy(&chunk[..pos]).into_owned())
    }
}
