//! The byte-oriented transport the channel reads from and writes to, plus
//! the reader's line-framing logic.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::unix::net::UnixStream;
use std::time::Duration;

mod reader;

pub(crate) use reader::LineReader;

/// An opaque full-duplex byte stream the channel can transact over.
///
/// Implementations must be able to hand out an independent writable handle
/// (`try_clone_writer`) so the command thread can write while the reader
/// thread blocks on reads of the original handle, and must support a read
/// timeout so the reader thread can periodically notice a shutdown request
/// instead of blocking forever.
pub trait Stream: Read + Write + Send + 'static {
    /// A second handle onto the same underlying connection, usable for
    /// writes concurrently with reads on `self`.
    fn try_clone_writer(&self) -> io::Result<Box<dyn Write + Send>>;

    /// Bounds how long a single `read` call may block. `None` blocks
    /// indefinitely.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
}

impl Stream for TcpStream {
    fn try_clone_writer(&self) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(self.try_clone()?))
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }
}

impl Stream for UnixStream {
    fn try_clone_writer(&self) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(self.try_clone()?))
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        UnixStream::set_read_timeout(self, timeout)
    }
}

#[cfg(feature = "serial")]
impl Stream for serial2::SerialPort {
    fn try_clone_writer(&self) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(self.try_clone()?))
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        // serial2 has no "block forever" sentinel; an hour is effectively
        // indefinite for a command channel and keeps the underlying
        // millisecond conversion well within range.
        self.set_read_timeout(timeout.unwrap_or(Duration::from_secs(3600)))
    }
}
