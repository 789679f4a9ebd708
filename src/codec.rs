//! Newline-delimited text codec
//!
//! Unlike `tokio_util::codec::LinesCodec`, an over-length line is not a
//! stream error: its bytes are skipped up to the next newline and a
//! single [`InputLine::Overlong`] item is yielded, so the connection
//! survives and the client can be asked to retry.

use std::io;

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::DEFAULT_MAX_LINE_LENGTH;

/// One decoded unit of client input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputLine {
    /// A complete line with its terminator removed
    Text(String),
    /// A line longer than the configured maximum (contents dropped)
    Overlong,
}

/// Line codec with a bounded line length
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_length: usize,
    /// Offset already scanned for `\n` in the current buffer
    next_index: usize,
    /// Skipping the tail of an over-length line
    discarding: bool,
}

impl LineCodec {
    /// Create a codec accepting lines of at most `max_length` bytes
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }

    /// Maximum accepted line length in bytes
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    fn finish_line(&self, raw: &[u8]) -> InputLine {
        let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        if raw.len() > self.max_length {
            InputLine::Overlong
        } else {
            InputLine::Text(String::from_utf8_lossy(raw).into_owned())
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LENGTH)
    }
}

impl Decoder for LineCodec {
    type Item = InputLine;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<InputLine>, io::Error> {
        let newline = buf[self.next_index..]
            .iter()
            .position(|b| *b == b'\n')
            .map(|offset| self.next_index + offset);

        match newline {
            Some(end) => {
                let line = buf.split_to(end + 1);
                self.next_index = 0;
                if self.discarding {
                    self.discarding = false;
                    return Ok(Some(InputLine::Overlong));
                }
                Ok(Some(self.finish_line(&line)))
            }
            None if self.discarding => {
                buf.clear();
                self.next_index = 0;
                Ok(None)
            }
            // Even with a trailing `\r` this can no longer fit.
            None if buf.len() > self.max_length + 1 => {
                buf.clear();
                self.next_index = 0;
                self.discarding = true;
                Ok(None)
            }
            None => {
                self.next_index = buf.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<InputLine>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if self.discarding {
            self.discarding = false;
            return Ok(Some(InputLine::Overlong));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        let rest = buf.split_to(buf.len());
        self.next_index = 0;
        Ok(Some(self.finish_line(&rest)))
    }
}

impl Encoder<String> for LineCodec {
    type Error = io::Error;

    fn encode(&mut self, line: String, buf: &mut BytesMut) -> Result<(), io::Error> {
        buf.reserve(line.len() + 1);
        buf.put_slice(line.as_bytes());
        buf.put_u8(b'\n');
        Ok(())
    }
}
