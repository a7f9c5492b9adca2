//! The command transactor: the public `send_*`/`handshake` API and the
//! write-then-wait transaction body they share.

use std::io::Write;
use std::sync::MutexGuard;
use std::time::{Duration, Instant};

use crate::channel::{Channel, ChannelState, PendingCommand};
use crate::config::{
    DEFAULT_HANDSHAKE_COMMAND, HANDSHAKE_RETRY_COUNT, HANDSHAKE_TIMEOUT_MSEC, LogLevel,
};
use crate::dispatch::CommandKind;
use crate::response::AtResponse;
use crate::{AtResult, Error};

impl Channel {
    /// Sends a command that produces no intermediate response, only a
    /// final one.
    pub fn send(&self, command: &str, timeout: Option<Duration>) -> AtResult<()> {
        self.transact(CommandKind::NoResult, command, None, None, timeout)?;
        Ok(())
    }

    /// Sends a command expecting a single numeric intermediate line with
    /// no prefix, e.g. `AT+CSQ` style bare-number replies.
    pub fn send_numeric(&self, command: &str, timeout: Option<Duration>) -> AtResult<AtResponse> {
        let resp = self.transact(CommandKind::Numeric, command, None, None, timeout)?;
        require_intermediate(resp)
    }

    /// Sends a command expecting exactly one intermediate line matching
    /// `response_prefix` before the final response.
    pub fn send_singleline(
        &self,
        command: &str,
        response_prefix: &str,
        timeout: Option<Duration>,
    ) -> AtResult<AtResponse> {
        let resp = self.transact(
            CommandKind::SingleLine,
            command,
            Some(response_prefix.to_string()),
            None,
            timeout,
        )?;
        require_intermediate(resp)
    }

    /// Sends a command that may produce zero or more intermediate lines
    /// matching `response_prefix`. Unlike the singleline/numeric/sms
    /// variants, a success with no intermediates is not an error here.
    pub fn send_multiline(
        &self,
        command: &str,
        response_prefix: &str,
        timeout: Option<Duration>,
    ) -> AtResult<AtResponse> {
        self.transact(
            CommandKind::MultiLine,
            command,
            Some(response_prefix.to_string()),
            None,
            timeout,
        )
    }

    /// Runs the two-step SMS submission: writes `command`, waits for the
    /// `"> "` prompt, writes `pdu` followed by Ctrl-Z, then waits for the
    /// final response as with `send_singleline`.
    pub fn send_sms(
        &self,
        command: &str,
        pdu: &str,
        response_prefix: &str,
        timeout: Option<Duration>,
    ) -> AtResult<AtResponse> {
        let resp = self.transact(
            CommandKind::Sms,
            command,
            Some(response_prefix.to_string()),
            Some(pdu.to_string()),
            timeout,
        )?;
        require_intermediate(resp)
    }

    /// Repeatedly issues `command` (default `"ATE0Q0V1"`) until one attempt
    /// succeeds or `retry_count` (default 8) attempts at `timeout`
    /// (default 250ms) each have been exhausted, then sleeps one more
    /// timeout interval to let the device settle before returning.
    ///
    /// Holds the channel's state lock for the entire call so no other
    /// command can interleave with the handshake, matching the original's
    /// single-lock retry loop.
    pub fn handshake(
        &self,
        command: Option<&str>,
        retry_count: Option<u32>,
        timeout: Option<Duration>,
    ) -> AtResult<()> {
        self.check_not_reader_thread()?;
        let command = command.unwrap_or(DEFAULT_HANDSHAKE_COMMAND).to_string();
        let retry_count = retry_count.unwrap_or(HANDSHAKE_RETRY_COUNT);
        let timeout = timeout.unwrap_or_else(|| Duration::from_millis(HANDSHAKE_TIMEOUT_MSEC));

        let mut state = self.inner.state.lock().unwrap();
        if state.closed {
            return Err(Error::ChannelClosed);
        }

        let mut last_err = Error::Timeout;
        for _ in 0..retry_count {
            let (next_state, result) = self.transact_locked(
                state,
                CommandKind::NoResult,
                &command,
                None,
                None,
                Some(timeout),
            );
            state = next_state;
            match result {
                Ok(_) => {
                    std::thread::sleep(timeout);
                    return Ok(());
                }
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    fn transact(
        &self,
        kind: CommandKind,
        command: &str,
        prefix: Option<String>,
        sms_pdu: Option<String>,
        timeout: Option<Duration>,
    ) -> AtResult<AtResponse> {
        self.check_not_reader_thread()?;
        let state = self.inner.state.lock().unwrap();
        if state.closed {
            return Err(Error::ChannelClosed);
        }
        let (state, result) = self.transact_locked(state, kind, command, prefix, sms_pdu, timeout);
        drop(state);
        if matches!(result, Err(Error::Timeout)) {
            self.fire_timeout_callback();
        }
        result
    }

    /// The shared transaction body, assuming the caller already holds the
    /// state lock. Always clears the pending-command slot before
    /// returning, whatever the outcome, except when it bails out early
    /// because a different command was already pending (that command's
    /// slot is not ours to clear).
    fn transact_locked<'a>(
        &self,
        mut state: MutexGuard<'a, ChannelState>,
        kind: CommandKind,
        command: &str,
        prefix: Option<String>,
        sms_pdu: Option<String>,
        timeout: Option<Duration>,
    ) -> (MutexGuard<'a, ChannelState>, AtResult<AtResponse>) {
        if state.pending.is_some() {
            return (state, Err(Error::CommandPending));
        }
        state.pending = Some(PendingCommand::new(kind, prefix, sms_pdu));

        self.log(LogLevel::Trace, &format!("AT> {command}"));
        if let Err(e) = write_command(&mut state.writer, command) {
            state.pending = None;
            return (state, Err(e));
        }

        let still_waiting = |s: &mut ChannelState| {
            !s.closed
                && s.pending
                    .as_ref()
                    .map(|p| p.final_response.is_none())
                    .unwrap_or(false)
        };

        let mut state = match timeout {
            Some(d) => {
                let (s, _timed_out) = self
                    .inner
                    .cv
                    .wait_timeout_while(state, d, still_waiting)
                    .unwrap();
                s
            }
            None => self.inner.cv.wait_while(state, still_waiting).unwrap(),
        };

        let pending = state.pending.take();
        let result = match pending {
            None => Err(Error::ChannelClosed),
            Some(p) => match p.final_response {
                Some((success, final_line)) => {
                    Ok(AtResponse::new(success, final_line, p.intermediates))
                }
                None if state.closed => Err(Error::ChannelClosed),
                None => Err(Error::Timeout),
            },
        };

        (state, result)
    }
}

fn write_command(writer: &mut Box<dyn Write + Send>, command: &str) -> AtResult<()> {
    writer.write_all(command.as_bytes())?;
    writer.write_all(b"\r")?;
    writer.flush()?;
    Ok(())
}

fn require_intermediate(resp: AtResponse) -> AtResult<AtResponse> {
    if resp.success() && resp.intermediates().is_empty() {
        return Err(Error::InvalidResponse);
    }
    Ok(resp)
}
