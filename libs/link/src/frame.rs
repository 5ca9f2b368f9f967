//! Newline-delimited framing over a byte stream
//!
//! One frame is one line of codec text terminated by `\n`. There is no length prefix;
//! a trailing `\r` is tolerated and stripped.

use std::time::Duration;

use futures::FutureExt;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{Error, Result};

/// Reads whole lines, keeping a partially received line across calls
pub(crate) struct FrameReader<R> {
    inner: BufReader<R>,
    partial: Vec<u8>,
    max_len: usize,
    frame_timeout: Duration,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub(crate) fn new(reader: R, max_len: usize, frame_timeout: Duration) -> Self {
        Self {
            inner: BufReader::new(reader),
            partial: Vec::new(),
            max_len,
            frame_timeout,
        }
    }

    /// Read one frame if inbound bytes are already available
    ///
    /// Returns `Ok(None)` without waiting when nothing has arrived. Once bytes are
    /// present, waits up to the frame timeout for the rest of the line; a line that is
    /// still incomplete after that is kept and resumed on the next call.
    pub(crate) async fn try_read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        if self.partial.is_empty() {
            match self.inner.fill_buf().now_or_never() {
                None => return Ok(None),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok([])) => return Err(Error::ConnectionClosed),
                Some(Ok(_)) => {}
            }
        }

        match tokio::time::timeout(self.frame_timeout, self.read_line()).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }

    // Cancel-safe: bytes only move out of the BufReader after fill_buf resolves.
    async fn read_line(&mut self) -> Result<Vec<u8>> {
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                return Err(Error::ConnectionClosed);
            }

            if let Some(pos) = available.iter().position(|b| *b == b'\n') {
                self.partial.extend_from_slice(&available[..pos]);
                self.inner.consume(pos + 1);
                self.check_len()?;

                let mut frame = std::mem::take(&mut self.partial);
                if frame.last() == Some(&b'\r') {
                    frame.pop();
                }
                return Ok(frame);
            }

            let len = available.len();
            self.partial.extend_from_slice(available);
            self.inner.consume(len);
            self.check_len()?;
        }
    }

    fn check_len(&self) -> Result<()> {
        if self.partial.len() > self.max_len {
            return Err(Error::InvalidFrame(format!(
                "Line exceeds {} bytes",
                self.max_len
            )));
        }
        Ok(())
    }
}

/// Writes one line per frame and flushes it
pub(crate) struct FrameWriter<W> {
    inner: W,
    write_timeout: Duration,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub(crate) fn new(writer: W, write_timeout: Duration) -> Self {
        Self {
            inner: writer,
            write_timeout,
        }
    }

    pub(crate) async fn write_frame(&mut self, line: &str) -> Result<()> {
        if line.contains('\n') {
            return Err(Error::Codec(
                "Encoded message contains a newline".to_string(),
            ));
        }

        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');

        let timeout = self.write_timeout;
        let write_op = async {
            self.inner.write_all(&bytes).await?;
            self.inner.flush().await?;
            Ok::<(), Error>(())
        };

        tokio::time::timeout(timeout, write_op)
            .await
            .map_err(|_| Error::WriteTimeout(timeout))?
    }
}
