//! A client-side channel for conversing with a modem (or any device that
//! speaks the Hayes/3GPP TS 27.007 "AT" command set) over a byte-oriented
//! serial transport.
//!
//! The channel multiplexes a single full-duplex byte stream between a
//! foreground command issuer that sends requests and waits for their
//! responses synchronously, and a background reader that classifies every
//! incoming line into an intermediate response, a final response, an SMS
//! prompt, an SMS unsolicited pair, or an unsolicited notification.
//!
//! # Example
//!
//! ```no_run
//! use atchan::ChannelBuilder;
//!
//! # fn example() -> atchan::AtResult<()> {
//! let channel = ChannelBuilder::new()
//!     .with_serial("/dev/ttyUSB0")
//!     .baud(115_200)?
//!     .open()?;
//!
//! channel.handshake(None, None, None)?;
//! let resp = channel.send_singleline("AT+CSQ?", "+CSQ:", None)?;
//! println!("{:?}", resp.intermediates());
//! # Ok(())
//! # }
//! ```

use std::str::Utf8Error;

use thiserror::Error;

mod builder;
mod channel;
mod config;
mod dispatch;
mod response;
mod transaction;
mod transport;

pub use builder::{ChannelBuilder, Init, Net, Ready, Serial};
pub use channel::{
    Channel, CloseHandler, LogSink, TimeoutHandler, UnsolicitedHandler, UnsolicitedSmsHandler,
};
pub use config::LogLevel;
pub use response::AtResponse;
pub use transport::Stream;

/// Errors produced by the channel. One variant per entry of the error
/// taxonomy the channel is specified against, so callers can match on
/// cause rather than parse a message string.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A command is already pending on this channel.
    #[error("command already pending on this channel")]
    CommandPending,
    /// The channel is closed (detached, or the reader observed EOF/error).
    #[error("channel is closed")]
    ChannelClosed,
    /// The command's deadline elapsed before a final response arrived.
    #[error("command timed out")]
    Timeout,
    /// Send attempted from the reader thread (e.g. from inside a callback).
    #[error("send operations may not be issued from the reader thread")]
    InvalidThread,
    /// A line could not be classified, or was not valid UTF-8.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// A caller-supplied argument failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The operation is not valid in the channel's current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    /// A command expecting an intermediate line (numeric/single-line/SMS)
    /// had a successful final response but no intermediate line.
    #[error("successful response carried no intermediate line")]
    InvalidResponse,
}

impl From<Utf8Error> for Error {
    fn from(e: Utf8Error) -> Self {
        Error::MalformedResponse(e.to_string())
    }
}

/// Result alias used throughout the crate.
pub type AtResult<T> = std::result::Result<T, Error>;
