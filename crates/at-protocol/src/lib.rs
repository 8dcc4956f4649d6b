//! AT Protocol Library
//!
//! This crate provides the synchronous wire layer for modem AT command
//! channels:
//!
//! - **Framing**: turning an unframed byte stream into logical lines, including
//!   the non-terminated `"> "` SMS prompt and lines longer than the static
//!   read buffer
//! - **Classification**: deciding whether a framed line is a final response,
//!   an intermediate data line, the SMS prompt, or an unsolicited notification
//! - **Tokenizing**: pulling comma-separated fields out of response lines
//!
//! Nothing in this crate performs I/O; the engine in `at-channel` drives it.
//!
//! # Example
//!
//! ```rust
//! use at_protocol::{classify, Expectation, LineClass, LineFramer, ResponseShape};
//!
//! let mut framer = LineFramer::new();
//! let lines = framer.push_bytes(b"\r\n+CSQ: 17,99\r\nOK\r\n");
//! assert_eq!(lines, vec!["+CSQ: 17,99".to_string(), "OK".to_string()]);
//!
//! let pending = Expectation::new(ResponseShape::SingleLine, Some("+CSQ:"));
//! assert_eq!(classify(&lines[0], Some(&pending)), LineClass::Intermediate);
//! assert_eq!(classify(&lines[1], Some(&pending)), LineClass::Final { success: true });
//! ```

pub mod classify;
pub mod error;
pub mod framer;
pub mod tokenizer;

pub use classify::{
    classify, is_final_error, is_final_response, is_final_success, is_sms_unsolicited,
    Expectation, LineClass, ResponseShape, COMMAND_TERMINATOR, CTRL_Z, FINAL_ERROR,
    FINAL_SUCCESS, SMS_UNSOLICITED,
};
pub use error::ParseError;
pub use framer::{LineFramer, DEFAULT_LINE_CAPACITY, SMS_PROMPT};
pub use tokenizer::LineTokenizer;
