//! Classification of a single line into final/intermediate/unsolicited,
//! mirroring `processLine()` of the original channel implementation.

/// Final response prefixes that indicate the command failed.
const FINAL_ERROR_RESPONSES: &[&str] = &[
    "ERROR",
    "+CMS ERROR:",
    "+CME ERROR:",
    "NO CARRIER",
    "NO ANSWER",
    "NO DIALTONE",
];

/// Final response prefixes that indicate the command succeeded.
const FINAL_SUCCESS_RESPONSES: &[&str] = &["OK", "CONNECT"];

/// Prefixes of unsolicited lines that are followed by a second line (an SMS
/// PDU) the reader must also consume and deliver together with the first.
const SMS_UNSOLICITED_PREFIXES: &[&str] = &["+CMT:", "+CDS:", "+CBM:"];

/// How a freshly-read line was classified against the currently pending
/// command, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Classification {
    /// No command is pending, or the line did not match the pending
    /// command in any of the ways below; either way it is delivered to
    /// the unsolicited handler.
    Unsolicited,
    /// This line is a final response. `success` reflects which table it
    /// matched.
    Final { success: bool },
    /// The SMS PDU prompt (`"> "`), for a pending SMS submission.
    SmsPrompt,
    /// An ordinary intermediate line to be recorded against the pending
    /// command.
    Intermediate,
}

pub(crate) fn is_final_success(line: &str) -> bool {
    FINAL_SUCCESS_RESPONSES
        .iter()
        .any(|prefix| line.starts_with(prefix))
}

pub(crate) fn is_final_error(line: &str) -> bool {
    FINAL_ERROR_RESPONSES
        .iter()
        .any(|prefix| line.starts_with(prefix))
}

pub(crate) fn is_sms_unsolicited(line: &str) -> bool {
    SMS_UNSOLICITED_PREFIXES
        .iter()
        .any(|prefix| line.starts_with(prefix))
}

/// The kind of command a pending transaction expects a response for,
/// controlling how intermediate lines are classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommandKind {
    /// No intermediate response is expected, only a final response.
    NoResult,
    /// A single numeric intermediate line with no prefix to match.
    Numeric,
    /// A single intermediate line matching a known prefix.
    SingleLine,
    /// Zero or more intermediate lines matching a known prefix.
    MultiLine,
    /// The two-step SMS PDU submission.
    Sms,
}

/// Everything `classify` needs to know about the currently pending command.
pub(crate) struct PendingInfo<'a> {
    pub(crate) kind: CommandKind,
    pub(crate) prefix: Option<&'a str>,
    /// Whether an intermediate line has already been recorded for this
    /// command. `Numeric`/`SingleLine`/`Sms` only ever record the first
    /// matching line; a later one falls through to unsolicited.
    pub(crate) has_intermediate: bool,
    /// Whether a PDU is queued and still awaiting the `"> "` prompt.
    pub(crate) sms_pdu_pending: bool,
}

/// Classifies `line` against a pending command, replicating
/// `processLine()`'s decision order: final responses are recognized
/// unconditionally before anything else, then the SMS prompt, then a
/// per-kind match on the line. Every fallback — no command pending, a kind
/// that expects no intermediate, a line that doesn't match the expected
/// prefix or digit, or a second line once one has already been recorded —
/// is delivered to the unsolicited handler rather than dropped.
pub(crate) fn classify(line: &str, pending: Option<PendingInfo>) -> Classification {
    let Some(info) = pending else {
        return Classification::Unsolicited;
    };

    if is_final_success(line) {
        return Classification::Final { success: true };
    }
    if is_final_error(line) {
        return Classification::Final { success: false };
    }
    if info.sms_pdu_pending && line == "> " {
        return Classification::SmsPrompt;
    }

    match info.kind {
        CommandKind::NoResult => Classification::Unsolicited,
        CommandKind::Numeric => {
            if info.has_intermediate {
                return Classification::Unsolicited;
            }
            match line.as_bytes().first() {
                Some(b) if b.is_ascii_digit() => Classification::Intermediate,
                _ => Classification::Unsolicited,
            }
        }
        CommandKind::SingleLine | CommandKind::Sms => {
            if info.has_intermediate {
                return Classification::Unsolicited;
            }
            match info.prefix {
                Some(p) if line.starts_with(p) => Classification::Intermediate,
                Some(_) => Classification::Unsolicited,
                None => Classification::Intermediate,
            }
        }
        CommandKind::MultiLine => match info.prefix {
            Some(p) if line.starts_with(p) => Classification::Intermediate,
            Some(_) => Classification::Unsolicited,
            None => Classification::Intermediate,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(kind: CommandKind, prefix: Option<&str>) -> Option<PendingInfo<'_>> {
        Some(PendingInfo {
            kind,
            prefix,
            has_intermediate: false,
            sms_pdu_pending: kind == CommandKind::Sms,
        })
    }

    #[test]
    fn no_pending_is_unsolicited() {
        assert_eq!(classify("+CREG: 1", None), Classification::Unsolicited);
    }

    #[test]
    fn ok_is_final_success_even_without_pending_kind_match() {
        assert_eq!(
            classify("OK", pending(CommandKind::NoResult, None)),
            Classification::Final { success: true }
        );
    }

    #[test]
    fn cme_error_is_final_failure() {
        assert_eq!(
            classify(
                "+CME ERROR: 10",
                pending(CommandKind::SingleLine, Some("+CSQ:"))
            ),
            Classification::Final { success: false }
        );
    }

    #[test]
    fn no_result_unmatched_line_is_unsolicited() {
        assert_eq!(
            classify("+CREG: 1", pending(CommandKind::NoResult, None)),
            Classification::Unsolicited
        );
    }

    #[test]
    fn sms_prompt_recognized_only_while_pdu_pending() {
        assert_eq!(
            classify("> ", pending(CommandKind::Sms, None)),
            Classification::SmsPrompt
        );
        let pdu_already_sent = PendingInfo {
            kind: CommandKind::Sms,
            prefix: None,
            has_intermediate: false,
            sms_pdu_pending: false,
        };
        assert_eq!(
            classify("> ", Some(pdu_already_sent)),
            Classification::Unsolicited
        );
        let no_pdu_queued = PendingInfo {
            kind: CommandKind::SingleLine,
            prefix: Some("+CSQ:"),
            has_intermediate: false,
            sms_pdu_pending: false,
        };
        assert_eq!(
            classify("> ", Some(no_pdu_queued)),
            Classification::Unsolicited
        );
    }

    #[test]
    fn singleline_matches_prefix() {
        assert_eq!(
            classify(
                "+CSQ: 15,99",
                pending(CommandKind::SingleLine, Some("+CSQ:"))
            ),
            Classification::Intermediate
        );
        assert_eq!(
            classify("+CREG: 1", pending(CommandKind::SingleLine, Some("+CSQ:"))),
            Classification::Unsolicited
        );
    }

    #[test]
    fn singleline_second_match_is_unsolicited() {
        let info = PendingInfo {
            kind: CommandKind::SingleLine,
            prefix: Some("+CSQ:"),
            has_intermediate: true,
            sms_pdu_pending: false,
        };
        assert_eq!(
            classify("+CSQ: 15,99", Some(info)),
            Classification::Unsolicited
        );
    }

    #[test]
    fn numeric_requires_leading_digit() {
        assert_eq!(
            classify("5", pending(CommandKind::Numeric, None)),
            Classification::Intermediate
        );
        assert_eq!(
            classify("+CREG: 1", pending(CommandKind::Numeric, None)),
            Classification::Unsolicited
        );
    }

    #[test]
    fn numeric_second_line_is_unsolicited() {
        let info = PendingInfo {
            kind: CommandKind::Numeric,
            prefix: None,
            has_intermediate: true,
            sms_pdu_pending: false,
        };
        assert_eq!(classify("5", Some(info)), Classification::Unsolicited);
    }

    #[test]
    fn multiline_allows_repeated_matches() {
        let info = PendingInfo {
            kind: CommandKind::MultiLine,
            prefix: Some("+CLCC:"),
            has_intermediate: true,
            sms_pdu_pending: false,
        };
        assert_eq!(classify("+CLCC: 1", Some(info)), Classification::Intermediate);
    }

    #[test]
    fn sms_unsolicited_prefixes_detected() {
        assert!(is_sms_unsolicited("+CMT: ,23"));
        assert!(!is_sms_unsolicited("+CREG: 1"));
    }
}
