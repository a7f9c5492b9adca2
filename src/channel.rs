//! The open channel: pending-command bookkeeping, the reader thread, and
//! the two close paths (user-initiated vs. reader-observed).

use std::any::Any;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crate::config::{LogLevel, READER_POLL_TIMEOUT_MSEC};
use crate::dispatch::{self, Classification, CommandKind};
use crate::transport::{LineReader, Stream};
use crate::{AtResult, Error};

/// Invoked on the reader thread for every line received while no command
/// is pending. Must not block.
pub type UnsolicitedHandler = Box<dyn Fn(&Channel, &str) + Send + Sync>;
/// Invoked on the reader thread for a two-line SMS unsolicited notification
/// (e.g. `+CMT:` followed by its PDU). Falls back to [`UnsolicitedHandler`]
/// with just the first line if unset.
pub type UnsolicitedSmsHandler = Box<dyn Fn(&Channel, &str, &str) + Send + Sync>;
/// Invoked on the command thread when a transaction's deadline elapses.
/// Callers typically reset or re-handshake here to resynchronize.
pub type TimeoutHandler = Box<dyn Fn(&Channel) + Send + Sync>;
/// Invoked exactly once, on the reader thread, when the stream closes
/// before the caller calls [`Channel::close`].
pub type CloseHandler = Box<dyn Fn(&Channel) + Send + Sync>;
/// The channel's own pluggable diagnostic sink, independent of the crate's
/// internal `log` facade output.
pub type LogSink = Box<dyn Fn(&Channel, LogLevel, &str) + Send + Sync>;

/// Bookkeeping for the command currently awaiting a response.
pub(crate) struct PendingCommand {
    pub(crate) kind: CommandKind,
    pub(crate) prefix: Option<String>,
    pub(crate) sms_pdu: Option<String>,
    pub(crate) intermediates: Vec<String>,
    pub(crate) final_response: Option<(bool, String)>,
}

impl PendingCommand {
    pub(crate) fn new(kind: CommandKind, prefix: Option<String>, sms_pdu: Option<String>) -> Self {
        Self {
            kind,
            prefix,
            sms_pdu,
            intermediates: Vec::new(),
            final_response: None,
        }
    }
}

pub(crate) struct ChannelState {
    pub(crate) pending: Option<PendingCommand>,
    pub(crate) closed: bool,
    pub(crate) writer: Box<dyn Write + Send>,
}

struct Callbacks {
    unsolicited: Option<UnsolicitedHandler>,
    unsolicited_sms: Option<UnsolicitedSmsHandler>,
    on_timeout: Option<TimeoutHandler>,
    on_close: Option<CloseHandler>,
    log_sink: Option<LogSink>,
    log_level: LogLevel,
}

pub(crate) struct Inner {
    pub(crate) state: Mutex<ChannelState>,
    pub(crate) cv: Condvar,
    shutdown: Arc<AtomicBool>,
    reader_thread: Mutex<Option<ThreadId>>,
    callbacks: Callbacks,
    cookie: Mutex<Option<Box<dyn Any + Send + Sync>>>,
    close_fired: AtomicBool,
}

/// A handle to an open AT command channel.
///
/// Cloning a `Channel` is cheap and shares the same underlying connection,
/// pending-command state, and callbacks as the original.
#[derive(Clone)]
pub struct Channel {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct ChannelConfig {
    pub(crate) unsolicited: Option<UnsolicitedHandler>,
    pub(crate) unsolicited_sms: Option<UnsolicitedSmsHandler>,
    pub(crate) on_timeout: Option<TimeoutHandler>,
    pub(crate) on_close: Option<CloseHandler>,
    pub(crate) log_sink: Option<LogSink>,
    pub(crate) log_level: LogLevel,
}

impl Channel {
    /// Attaches to an already-open stream, starting the detached reader
    /// thread. This is the Rust analogue of `at_open` + `at_attach`.
    pub(crate) fn attach(stream: Box<dyn Stream>, config: ChannelConfig) -> AtResult<Channel> {
        stream.set_read_timeout(Some(Duration::from_millis(READER_POLL_TIMEOUT_MSEC)))?;
        let writer = stream.try_clone_writer()?;
        let shutdown = Arc::new(AtomicBool::new(false));

        let inner = Arc::new(Inner {
            state: Mutex::new(ChannelState {
                pending: None,
                closed: false,
                writer,
            }),
            cv: Condvar::new(),
            shutdown,
            reader_thread: Mutex::new(None),
            callbacks: Callbacks {
                unsolicited: config.unsolicited,
                unsolicited_sms: config.unsolicited_sms,
                on_timeout: config.on_timeout,
                on_close: config.on_close,
                log_sink: config.log_sink,
                log_level: config.log_level,
            },
            cookie: Mutex::new(None),
            close_fired: AtomicBool::new(false),
        });

        let channel = Channel { inner };
        let reader_channel = channel.clone();
        thread::Builder::new()
            .name("atchan-reader".into())
            .spawn(move || reader_channel.reader_loop(stream))
            .map_err(Error::Io)?;

        Ok(channel)
    }

    /// Stores an arbitrary user value on the channel, analogous to the
    /// original `param` field threaded through every callback.
    pub fn set_cookie<T: Any + Send + Sync>(&self, value: T) {
        *self.inner.cookie.lock().unwrap() = Some(Box::new(value));
    }

    /// Retrieves a previously stored cookie of type `T`.
    pub fn cookie<T: Any + Send + Sync + Clone>(&self) -> Option<T> {
        self.inner
            .cookie
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|b| b.downcast_ref::<T>())
            .cloned()
    }

    /// Closes the channel from the caller's side. Idempotent: calling this
    /// more than once, or after the reader already observed a close, has
    /// no further effect. Unlike a reader-observed close, this never
    /// invokes the close callback.
    pub fn close(&self) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.inner.shutdown.store(true, Ordering::Relaxed);
        self.inner.cv.notify_all();
    }

    /// `true` once the channel has been closed, from either side.
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().unwrap().closed
    }

    pub(crate) fn check_not_reader_thread(&self) -> AtResult<()> {
        let reader_id = *self.inner.reader_thread.lock().unwrap();
        if reader_id == Some(thread::current().id()) {
            return Err(Error::InvalidThread);
        }
        Ok(())
    }

    pub(crate) fn fire_timeout_callback(&self) {
        if let Some(cb) = &self.inner.callbacks.on_timeout {
            cb(self);
        }
    }

    fn reader_loop(self, stream: Box<dyn Stream>) {
        *self.inner.reader_thread.lock().unwrap() = Some(thread::current().id());
        let mut reader = LineReader::new(stream);

        loop {
            match reader.read_line(&self.inner.shutdown) {
                Ok(Some(line)) => {
                    self.log(LogLevel::Trace, &format!("AT< {line}"));
                    if dispatch::is_sms_unsolicited(&line) {
                        match reader.read_line(&self.inner.shutdown) {
                            Ok(Some(pdu)) => {
                                self.log(LogLevel::Trace, &format!("AT< {pdu}"));
                                self.deliver_sms_unsolicited(&line, &pdu);
                            }
                            _ => break,
                        }
                    } else {
                        self.process_line(&line);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    self.log(LogLevel::Warn, &format!("reader thread stopping: {e}"));
                    break;
                }
            }
        }

        self.reader_close_path();
    }

    fn process_line(&self, line: &str) {
        let mut state = self.inner.state.lock().unwrap();
        let pending_info = state.pending.as_ref().map(|p| dispatch::PendingInfo {
            kind: p.kind,
            prefix: p.prefix.as_deref(),
            has_intermediate: !p.intermediates.is_empty(),
            sms_pdu_pending: p.sms_pdu.is_some(),
        });
        let classification = dispatch::classify(line, pending_info);

        match classification {
            Classification::Unsolicited => {
                drop(state);
                self.deliver_unsolicited(line);
            }
            Classification::Final { success } => {
                if let Some(pending) = state.pending.as_mut() {
                    pending.final_response = Some((success, line.to_string()));
                }
                self.inner.cv.notify_all();
            }
            Classification::SmsPrompt => {
                let pdu = state.pending.as_ref().and_then(|p| p.sms_pdu.clone());
                if let Some(pdu) = pdu {
                    if let Err(e) = write_sms_pdu(&mut state.writer, &pdu) {
                        drop(state);
                        self.log(LogLevel::Warn, &format!("failed writing SMS PDU: {e}"));
                        return;
                    }
                    if let Some(pending) = state.pending.as_mut() {
                        pending.sms_pdu = None;
                    }
                }
            }
            Classification::Intermediate => {
                if let Some(pending) = state.pending.as_mut() {
                    pending.intermediates.push(line.to_string());
                }
            }
        }
    }

    fn deliver_unsolicited(&self, line: &str) {
        if let Some(cb) = &self.inner.callbacks.unsolicited {
            cb(self, line);
        }
    }

    fn deliver_sms_unsolicited(&self, line: &str, pdu: &str) {
        if let Some(cb) = &self.inner.callbacks.unsolicited_sms {
            cb(self, line, pdu);
        } else if let Some(cb) = &self.inner.callbacks.unsolicited {
            cb(self, line);
        }
    }

    fn reader_close_path(&self) {
        let already_closed_by_user = {
            let mut state = self.inner.state.lock().unwrap();
            let was_closed = state.closed;
            state.closed = true;
            was_closed
        };
        self.inner.shutdown.store(true, Ordering::Relaxed);
        self.inner.cv.notify_all();

        if !already_closed_by_user && !self.inner.close_fired.swap(true, Ordering::SeqCst) {
            if let Some(cb) = &self.inner.callbacks.on_close {
                cb(self);
            }
        }
    }

    pub(crate) fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Error => log::error!("{message}"),
            LogLevel::Warn => log::warn!("{message}"),
            LogLevel::Info => log::info!("{message}"),
            LogLevel::Debug => log::debug!("{message}"),
            LogLevel::Trace => log::trace!("{message}"),
        }
        if level <= self.inner.callbacks.log_level {
            if let Some(sink) = &self.inner.callbacks.log_sink {
                sink(self, level, message);
            }
        }
    }
}

fn write_sms_pdu(writer: &mut Box<dyn Write + Send>, pdu: &str) -> AtResult<()> {
    writer.write_all(pdu.as_bytes())?;
    writer.write_all(&[0x1A])?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;
    use std::sync::mpsc;

    fn open_pair() -> (Channel, UnixStream) {
        let (client, server) = UnixStream::pair().unwrap();
        let channel = Channel::attach(
            Box::new(client),
            ChannelConfig {
                unsolicited: None,
                unsolicited_sms: None,
                on_timeout: None,
                on_close: None,
                log_sink: None,
                log_level: LogLevel::Trace,
            },
        )
        .unwrap();
        (channel, server)
    }

    #[test]
    fn two_line_sms_unsolicited_delivered_together() {
        let (tx, rx) = mpsc::channel();
        let (client, mut server) = UnixStream::pair().unwrap();
        let channel = Channel::attach(
            Box::new(client),
            ChannelConfig {
                unsolicited: None,
                unsolicited_sms: Some(Box::new(move |_c, line, pdu| {
                    tx.send((line.to_string(), pdu.to_string())).unwrap();
                })),
                on_timeout: None,
                on_close: None,
                log_sink: None,
                log_level: LogLevel::Trace,
            },
        )
        .unwrap();

        use std::io::Write as _;
        server.write_all(b"+CMT: ,23\r\n07919171907320F3\r\n").unwrap();

        let (line, pdu) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(line, "+CMT: ,23");
        assert_eq!(pdu, "07919171907320F3");
        channel.close();
    }

    #[test]
    fn close_is_idempotent_and_fires_no_callback() {
        let (tx, rx) = mpsc::channel();
        let (client, _server) = UnixStream::pair().unwrap();
        let channel = Channel::attach(
            Box::new(client),
            ChannelConfig {
                unsolicited: None,
                unsolicited_sms: None,
                on_timeout: None,
                on_close: Some(Box::new(move |_c| {
                    tx.send(()).unwrap();
                })),
                log_sink: None,
                log_level: LogLevel::Trace,
            },
        )
        .unwrap();

        channel.close();
        channel.close();
        assert!(channel.is_closed());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unsolicited_line_is_delivered_with_no_pending_command() {
        let (tx, rx) = mpsc::channel();
        let (client, mut server) = UnixStream::pair().unwrap();
        let channel = Channel::attach(
            Box::new(client),
            ChannelConfig {
                unsolicited: Some(Box::new(move |_c, line| {
                    tx.send(line.to_string()).unwrap();
                })),
                unsolicited_sms: None,
                on_timeout: None,
                on_close: None,
                log_sink: None,
                log_level: LogLevel::Trace,
            },
        )
        .unwrap();

        use std::io::Write as _;
        server.write_all(b"+CREG: 1\r\n").unwrap();

        let line = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(line, "+CREG: 1");
        channel.close();
    }

    #[test]
    fn reader_observed_close_fires_callback_once() {
        let (tx, rx) = mpsc::channel();
        let (client, server) = UnixStream::pair().unwrap();
        let channel = Channel::attach(
            Box::new(client),
            ChannelConfig {
                unsolicited: None,
                unsolicited_sms: None,
                on_timeout: None,
                on_close: Some(Box::new(move |_c| {
                    tx.send(()).unwrap();
                })),
                log_sink: None,
                log_level: LogLevel::Trace,
            },
        )
        .unwrap();

        drop(server);
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(channel.is_closed());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn reentrant_send_from_callback_is_rejected() {
        let (tx, rx) = mpsc::channel();
        let (client, mut server) = UnixStream::pair().unwrap();
        let channel = Channel::attach(
            Box::new(client),
            ChannelConfig {
                unsolicited: Some(Box::new(move |c, _line| {
                    tx.send(c.check_not_reader_thread()).unwrap();
                })),
                unsolicited_sms: None,
                on_timeout: None,
                on_close: None,
                log_sink: None,
                log_level: LogLevel::Trace,
            },
        )
        .unwrap();

        use std::io::Write as _;
        server.write_all(b"+CREG: 1\r\n").unwrap();

        let result = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(matches!(result, Err(Error::InvalidThread)));
        channel.close();
    }

    #[test]
    fn send_from_command_thread_is_accepted() {
        let (channel, _server) = open_pair();
        assert!(channel.check_not_reader_thread().is_ok());
        channel.close();
    }
}
