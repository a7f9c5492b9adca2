//! Line framing over a byte stream: CR/LF boundaries, the unterminated
//! SMS prompt special case, partial-line compaction and overflow handling.

use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Buf, BytesMut};

use crate::config::LINE_BUFFER_SIZE;
use crate::{AtResult, Error};

const READ_CHUNK_SIZE: usize = 512;

/// Accumulates bytes from `R` and yields complete lines, matching the
/// original channel's `readline()`/`findNextEOL()` framing rules.
pub(crate) struct LineReader<R> {
    inner: R,
    buf: BytesMut,
}

impl<R: Read> LineReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(LINE_BUFFER_SIZE),
        }
    }

    /// Blocks until a line is available, the stream closes, or `shutdown`
    /// becomes true. `Ok(None)` means the stream closed or shutdown was
    /// observed; the caller should stop reading either way.
    pub(crate) fn read_line(&mut self, shutdown: &AtomicBool) -> AtResult<Option<String>> {
        loop {
            if let Some(line) = self.take_line()? {
                return Ok(Some(line));
            }
            if shutdown.load(Ordering::Relaxed) {
                return Ok(None);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            match self.inner.read(&mut chunk) {
                Ok(0) => return Ok(None),
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    continue;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    /// Tries to pull one complete line out of the buffer without touching
    /// the stream. Leading CR/LF left over from the previous terminator is
    /// skipped first.
    fn take_line(&mut self) -> AtResult<Option<String>> {
        while matches!(self.buf.first(), Some(b'\r') | Some(b'\n')) {
            self.buf.advance(1);
        }

        // The SMS prompt "> " is sent without a terminator; it is complete
        // exactly when it is the entirety of what's buffered so far.
        if self.buf.len() == 2 && &self.buf[..] == b"> " {
            let line = std::str::from_utf8(&self.buf)?.to_string();
            self.buf.clear();
            return Ok(Some(line));
        }

        if let Some(pos) = self.buf.iter().position(|&b| b == b'\r' || b == b'\n') {
            let line = std::str::from_utf8(&self.buf[..pos])?.to_string();
            self.buf.advance(pos + 1);
            return Ok(Some(line));
        }

        if self.buf.len() >= LINE_BUFFER_SIZE {
            log::warn!(
                "discarding {} buffered bytes with no line terminator",
                self.buf.len()
            );
            self.buf.clear();
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn no_shutdown() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn splits_crlf_lines() {
        let mut r = LineReader::new(Cursor::new(b"OK\r\n+CSQ: 15,99\r\n".to_vec()));
        let flag = no_shutdown();
        assert_eq!(r.read_line(&flag).unwrap().as_deref(), Some("OK"));
        assert_eq!(r.read_line(&flag).unwrap().as_deref(), Some("+CSQ: 15,99"));
        assert_eq!(r.read_line(&flag).unwrap(), None);
    }

    #[test]
    fn recognizes_sms_prompt() {
        let mut r = LineReader::new(Cursor::new(b"> ".to_vec()));
        let flag = no_shutdown();
        assert_eq!(r.read_line(&flag).unwrap().as_deref(), Some("> "));
    }

    #[test]
    fn skips_leading_blank_lines() {
        let mut r = LineReader::new(Cursor::new(b"\r\n\r\nOK\r\n".to_vec()));
        let flag = no_shutdown();
        assert_eq!(r.read_line(&flag).unwrap().as_deref(), Some("OK"));
    }

    #[test]
    fn overflow_without_terminator_is_discarded() {
        let mut junk = vec![b'x'; LINE_BUFFER_SIZE + 16];
        junk.extend_from_slice(b"OK\r\n");
        let mut r = LineReader::new(Cursor::new(junk));
        let flag = no_shutdown();
        assert_eq!(r.read_line(&flag).unwrap().as_deref(), Some("OK"));
    }

    #[test]
    fn shutdown_flag_stops_blocking_read() {
        struct NeverReady;
        impl Read for NeverReady {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(ErrorKind::WouldBlock, "no data"))
            }
        }
        let mut r = LineReader::new(NeverReady);
        let flag = AtomicBool::new(true);
        assert_eq!(r.read_line(&flag).unwrap(), None);
    }
}
