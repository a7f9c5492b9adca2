//! Type-state builder for opening a [`Channel`], generalizing the
//! familiar `Init -> {Serial, Network} -> build()` builder shape to an
//! arbitrary [`Stream`] as well as a concrete serial device or TCP peer.

use std::marker::PhantomData;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use crate::channel::{ChannelConfig, CloseHandler, LogSink, TimeoutHandler, UnsolicitedHandler, UnsolicitedSmsHandler};
use crate::config::{baud_is_valid, LogLevel};
use crate::{AtResult, Channel, Error};

const DEFAULT_BAUD: u32 = 115_200;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Initial builder state: no transport chosen yet.
pub struct Init;
/// A serial device path (and optionally a non-default baud) has been
/// chosen.
pub struct Serial;
/// A network peer address has been chosen.
pub struct Net;
/// An already-constructed [`Stream`] has been supplied directly.
pub struct Ready;

/// Type-state builder for a [`Channel`].
///
/// ```no_run
/// # fn example() -> atchan::AtResult<()> {
/// use atchan::ChannelBuilder;
/// let channel = ChannelBuilder::new()
///     .with_serial("/dev/ttyUSB0")
///     .baud(115_200)?
///     .open()?;
/// # Ok(())
/// # }
/// ```
pub struct ChannelBuilder<T> {
    com_port: Option<String>,
    baud_rate: Option<u32>,
    net_addr: Option<SocketAddr>,
    stream: Option<Box<dyn crate::transport::Stream>>,
    unsolicited: Option<UnsolicitedHandler>,
    unsolicited_sms: Option<UnsolicitedSmsHandler>,
    on_timeout: Option<TimeoutHandler>,
    on_close: Option<CloseHandler>,
    log_sink: Option<LogSink>,
    log_level: LogLevel,
    _marker: PhantomData<T>,
}

impl<T> ChannelBuilder<T> {
    fn with_marker<U>(self) -> ChannelBuilder<U> {
        ChannelBuilder {
            com_port: self.com_port,
            baud_rate: self.baud_rate,
            net_addr: self.net_addr,
            stream: self.stream,
            unsolicited: self.unsolicited,
            unsolicited_sms: self.unsolicited_sms,
            on_timeout: self.on_timeout,
            on_close: self.on_close,
            log_sink: self.log_sink,
            log_level: self.log_level,
            _marker: PhantomData,
        }
    }

    /// Registers the callback invoked on the reader thread for lines
    /// received while no command is pending.
    pub fn on_unsolicited(mut self, f: UnsolicitedHandler) -> Self {
        self.unsolicited = Some(f);
        self
    }

    /// Registers the callback invoked for two-line SMS unsolicited
    /// notifications (e.g. `+CMT:`).
    pub fn on_unsolicited_sms(mut self, f: UnsolicitedSmsHandler) -> Self {
        self.unsolicited_sms = Some(f);
        self
    }

    /// Registers the callback invoked on the command thread when a
    /// transaction times out.
    pub fn on_timeout(mut self, f: TimeoutHandler) -> Self {
        self.on_timeout = Some(f);
        self
    }

    /// Registers the callback invoked exactly once when the reader
    /// observes the stream closing before [`Channel::close`] is called.
    pub fn on_close(mut self, f: CloseHandler) -> Self {
        self.on_close = Some(f);
        self
    }

    /// Registers the channel's own verbosity-gated log sink, independent
    /// of the crate's internal `log` facade output.
    pub fn log_sink(mut self, level: LogLevel, f: LogSink) -> Self {
        self.log_level = level;
        self.log_sink = Some(f);
        self
    }

    fn into_config(self) -> (Option<Box<dyn crate::transport::Stream>>, ChannelConfig) {
        (
            self.stream,
            ChannelConfig {
                unsolicited: self.unsolicited,
                unsolicited_sms: self.unsolicited_sms,
                on_timeout: self.on_timeout,
                on_close: self.on_close,
                log_sink: self.log_sink,
                log_level: self.log_level,
            },
        )
    }
}

impl Default for ChannelBuilder<Init> {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelBuilder<Init> {
    /// Starts the builder.
    pub fn new() -> Self {
        Self {
            com_port: None,
            baud_rate: None,
            net_addr: None,
            stream: None,
            unsolicited: None,
            unsolicited_sms: None,
            on_timeout: None,
            on_close: None,
            log_sink: None,
            log_level: LogLevel::Info,
            _marker: PhantomData,
        }
    }

    /// Continues toward opening a local serial device at `path`.
    pub fn with_serial(self, path: &str) -> ChannelBuilder<Serial> {
        let mut builder = self.with_marker::<Serial>();
        builder.com_port = Some(path.to_string());
        builder.baud_rate = Some(DEFAULT_BAUD);
        builder
    }

    /// Continues toward connecting to a TCP peer speaking the AT protocol
    /// over a raw socket (e.g. a modem emulator).
    pub fn with_network(self, addr: &str) -> AtResult<ChannelBuilder<Net>> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("invalid network address: {addr}")))?;
        let mut builder = self.with_marker::<Net>();
        builder.net_addr = Some(addr);
        Ok(builder)
    }

    /// Continues toward attaching directly to an already-open [`Stream`],
    /// e.g. a test double or a transport this crate has no built-in
    /// support for.
    pub fn with_stream(self, stream: Box<dyn crate::transport::Stream>) -> ChannelBuilder<Ready> {
        let mut builder = self.with_marker::<Ready>();
        builder.stream = Some(stream);
        builder
    }
}

impl ChannelBuilder<Serial> {
    /// Overrides the default baud rate (115200). Rejected if not one of
    /// the device's supported rates.
    pub fn baud(mut self, baud: u32) -> AtResult<Self> {
        if !baud_is_valid(baud) {
            return Err(Error::InvalidArgument(format!(
                "unsupported baud rate: {baud}"
            )));
        }
        self.baud_rate = Some(baud);
        Ok(self)
    }

    /// Opens the serial device and attaches the channel to it.
    #[cfg(feature = "serial")]
    pub fn open(self) -> AtResult<Channel> {
        let path = self
            .com_port
            .clone()
            .expect("com_port set by with_serial");
        let baud = self.baud_rate.unwrap_or(DEFAULT_BAUD);
        let (_, config) = self.into_config();
        let port = serial2::SerialPort::open(&path, baud)?;
        Channel::attach(Box::new(port), config)
    }
}

impl ChannelBuilder<Net> {
    /// Connects to the configured address and attaches the channel to it.
    pub fn open(self) -> AtResult<Channel> {
        let addr = self.net_addr.expect("net_addr set by with_network");
        let (_, config) = self.into_config();
        let stream = TcpStream::connect_timeout(&addr, DEFAULT_CONNECT_TIMEOUT)?;
        Channel::attach(Box::new(stream), config)
    }
}

impl ChannelBuilder<Ready> {
    /// Attaches the channel to the supplied stream.
    pub fn open(self) -> AtResult<Channel> {
        let (stream, config) = self.into_config();
        let stream = stream.expect("stream set by with_stream");
        Channel::attach(stream, config)
    }
}
