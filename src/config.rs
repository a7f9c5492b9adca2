//! Constants and small enums shared across the channel implementation.

/// Size of the reader's line-accumulation buffer.
pub(crate) const LINE_BUFFER_SIZE: usize = 8 * 1024;

/// Handshake command used to align V1 numeric/verbose response mode and
/// silence echo, matching the original `atchannel.c` default.
pub(crate) const DEFAULT_HANDSHAKE_COMMAND: &str = "ATE0Q0V1";

/// Number of handshake attempts before giving up.
pub(crate) const HANDSHAKE_RETRY_COUNT: u32 = 8;

/// Per-attempt handshake timeout, in milliseconds.
pub(crate) const HANDSHAKE_TIMEOUT_MSEC: u64 = 250;

/// Read timeout applied to the underlying stream so the reader thread can
/// periodically check the shutdown flag. Short enough not to add
/// perceptible latency to close(), long enough not to busy-loop.
pub(crate) const READER_POLL_TIMEOUT_MSEC: u64 = 200;

/// The full set of baud rates the builder accepts, taken verbatim from the
/// external interface definition. Anything else is rejected at build time.
pub const VALID_BAUD_RATES: &[u32] = &[
    0, 50, 75, 110, 134, 150, 200, 300, 600, 1200, 1800, 2400, 4800, 9600, 19200, 38400, 57600,
    115_200, 230_400, 460_800, 500_000, 576_000, 921_600, 1_000_000, 1_152_000, 1_500_000,
    2_000_000, 2_500_000, 3_000_000, 3_500_000, 4_000_000,
];

/// Verbosity levels for the channel's own [`crate::LogSink`] callback,
/// independent of the crate-internal `log` facade diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, derive_more::Display)]
pub enum LogLevel {
    #[display("error")]
    Error,
    #[display("warn")]
    Warn,
    #[display("info")]
    Info,
    #[display("debug")]
    Debug,
    #[display("trace")]
    Trace,
}

pub(crate) fn baud_is_valid(baud: u32) -> bool {
    VALID_BAUD_RATES.contains(&baud)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_baud_accepted() {
        assert!(baud_is_valid(115_200));
        assert!(baud_is_valid(0));
    }

    #[test]
    fn unknown_baud_rejected() {
        assert!(!baud_is_valid(12_345));
    }

    #[test]
    fn log_level_ordering() {
        assert!(LogLevel::Error < LogLevel::Debug);
        assert!(LogLevel::Trace > LogLevel::Info);
    }
}
