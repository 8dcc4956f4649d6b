//! Response classification
//!
//! Every framed line is either part of the transaction for the command that is
//! currently outstanding on its channel, or an unsolicited notification. The
//! decision depends only on the line text and on what the outstanding command
//! expects, so it is expressed here as a pure function.

use crate::framer::SMS_PROMPT;

/// Final result codes that mean success
pub const FINAL_SUCCESS: &[&str] = &["OK", "CONNECT"];

/// Final result codes that mean failure
///
/// `NO CARRIER`, `NO ANSWER` and `NO DIALTONE` can also arrive unsolicited;
/// while a command is outstanding they are always taken as its final result.
pub const FINAL_ERROR: &[&str] = &[
    "ERROR",
    "+CMS ERROR:",
    "+CME ERROR:",
    "NO CARRIER",
    "NO ANSWER",
    "NO DIALTONE",
];

/// Unsolicited notifications that are followed by a PDU line
pub const SMS_UNSOLICITED: &[&str] = &["+CMT:", "+CDS:", "+CBM:", "+CMGR:"];

/// Byte that completes an SMS PDU after the prompt
pub const CTRL_Z: u8 = 0x1A;

/// Terminator appended to every command
pub const COMMAND_TERMINATOR: &[u8] = b"\r";

/// Shape of the answer a command expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResponseShape {
    /// Only a final result code; any data line is unsolicited
    NoResult,
    /// One line starting with a digit (e.g. `AT+CGSN`)
    Numeric,
    /// One line starting with the command's prefix
    SingleLine,
    /// Any number of lines starting with the prefix or containing no `:`
    MultiLine,
}

/// What the outstanding command on a channel is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expectation<'a> {
    /// Expected answer shape
    pub shape: ResponseShape,
    /// Prefix identifying data lines for this command
    pub prefix: Option<&'a str>,
    /// Whether an intermediate line has already been recorded
    pub has_intermediate: bool,
    /// Whether an SMS PDU is waiting for the `"> "` prompt
    pub pdu_pending: bool,
}

impl<'a> Expectation<'a> {
    /// Expectation for a freshly written command
    pub fn new(shape: ResponseShape, prefix: Option<&'a str>) -> Self {
        Self {
            shape,
            prefix,
            has_intermediate: false,
            pdu_pending: false,
        }
    }
}

/// Classification of one framed line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    /// Final result code for the outstanding command
    Final {
        /// `true` for `OK`/`CONNECT`
        success: bool,
    },
    /// The SMS prompt; the pending PDU should be written now
    SmsPrompt,
    /// Data line belonging to the outstanding command
    Intermediate,
    /// Not related to any outstanding command
    Unsolicited,
}

/// Check whether a line is a success result code
pub fn is_final_success(line: &str) -> bool {
    FINAL_SUCCESS.iter().any(|token| line.starts_with(token))
}

/// Check whether a line is a failure result code
pub fn is_final_error(line: &str) -> bool {
    FINAL_ERROR.iter().any(|token| line.starts_with(token))
}

/// Check whether a line ends a command transaction
pub fn is_final_response(line: &str) -> bool {
    is_final_success(line) || is_final_error(line)
}

/// Check whether a line starts a two-line unsolicited SMS notification
pub fn is_sms_unsolicited<S: AsRef<str>>(line: &str, prefixes: &[S]) -> bool {
    prefixes.iter().any(|p| line.starts_with(p.as_ref()))
}

/// Classify a framed line against the channel's outstanding command
///
/// `pending` is `None` when no command is outstanding, in which case every
/// line is unsolicited.
pub fn classify(line: &str, pending: Option<&Expectation<'_>>) -> LineClass {
    let Some(pending) = pending else {
        return LineClass::Unsolicited;
    };

    if is_final_success(line) {
        return LineClass::Final { success: true };
    }
    if is_final_error(line) {
        return LineClass::Final { success: false };
    }
    if pending.pdu_pending && line == SMS_PROMPT {
        return LineClass::SmsPrompt;
    }

    let prefix = pending.prefix.unwrap_or("");
    let is_data = match pending.shape {
        ResponseShape::NoResult => false,
        ResponseShape::Numeric => {
            !pending.has_intermediate && line.bytes().next().is_some_and(|b| b.is_ascii_digit())
        }
        ResponseShape::SingleLine => !pending.has_intermediate && line.starts_with(prefix),
        ResponseShape::MultiLine => line.starts_with(prefix) || !line.contains(':'),
    };

    if is_data {
        LineClass::Intermediate
    } else {
        LineClass::Unsolicited
    }
}
