use std::time::Duration;

use log::warn;
use rppal::uart::{Parity, Uart};

use crate::error::Result;

// Longest unterminated run we keep before giving up on it.
const MAX_LINE_LEN: usize = 4096;
const READ_CHUNK_LEN: usize = 256;

/// Anything the frame reader can pull bytes from.
/// `Ok(0)` means the read timed out with no data.
pub trait ByteSource {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize>;
}

impl ByteSource for Uart {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.read(buf)?)
    }
}

/// Opens the board's serial line as 8N1. Reads return after `timeout`
/// when nothing arrives.
pub fn open_serial(path: &str, baud_rate: u32, timeout: Duration) -> Result<Uart> {
    let mut uart = Uart::with_path(path, baud_rate, Parity::None, 8, 1)?;
    uart.set_read_mode(0, timeout)?;
    Ok(uart)
}

/// Splits the byte stream on `\n`. Partial lines survive a timeout and are
/// completed by the next read.
pub struct FrameReader<S> {
    source: S,
    buffer: Vec<u8>,
    scratch: [u8; READ_CHUNK_LEN],
}

impl<S: ByteSource> FrameReader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            buffer: Vec::with_capacity(MAX_LINE_LEN),
            scratch: [0; READ_CHUNK_LEN],
        }
    }

    /// Next trimmed line, or an empty string when the read timed out.
    /// Lines that are not valid UTF-8 are skipped and also come back empty.
    pub fn read_line(&mut self) -> Result<String> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=pos).collect();
                return Ok(decode_line(&line));
            }
            if self.buffer.len() > MAX_LINE_LEN {
                warn!("dropping {} bytes without a line break", self.buffer.len());
                self.buffer.clear();
            }

            let n = self.source.read_bytes(&mut self.scratch)?;
            if n == 0 {
                return Ok(String::new());
            }
            self.buffer.extend_from_slice(&self.scratch[..n]);
        }
    }
}

fn decode_line(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.trim().to_string(),
        Err(err) => {
            warn!("skipping undecodable line ({} bytes): {}", bytes.len(), err);
            String::new()
        }
    }
}
