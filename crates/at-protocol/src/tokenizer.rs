//! Response line tokenizer
//!
//! Information responses follow the pattern `+NAME: field,field,...` where a
//! field is a number, a bare word, or a double-quoted string that may itself
//! contain commas.
//!
//! ```rust
//! use at_protocol::LineTokenizer;
//!
//! let mut tok = LineTokenizer::new("+COPS: 0,2,\"310,260\",7").unwrap();
//! assert_eq!(tok.next_int().unwrap(), 0);
//! assert_eq!(tok.next_int().unwrap(), 2);
//! assert_eq!(tok.next_str().unwrap(), "310,260");
//! assert!(tok.has_more());
//! assert_eq!(tok.next_int().unwrap(), 7);
//! assert!(!tok.has_more());
//! ```

use crate::error::ParseError;

/// Cursor over the comma-separated fields of a response line
#[derive(Debug, Clone)]
pub struct LineTokenizer<'a> {
    rest: Option<&'a str>,
}

impl<'a> LineTokenizer<'a> {
    /// Start tokenizing after the `NAME:` prefix
    pub fn new(line: &'a str) -> Result<Self, ParseError> {
        let colon = line
            .find(':')
            .ok_or_else(|| ParseError::MissingPrefix(line.to_string()))?;
        Ok(Self {
            rest: Some(&line[colon + 1..]),
        })
    }

    /// Tokenize a line that has no prefix (e.g. a numeric response)
    pub fn raw(line: &'a str) -> Self {
        Self { rest: Some(line) }
    }

    /// Whether any unread text remains
    pub fn has_more(&self) -> bool {
        self.rest.is_some_and(|r| !r.is_empty())
    }

    /// Next field as a string; quotes are removed from quoted fields
    pub fn next_str(&mut self) -> Result<&'a str, ParseError> {
        let cur = self.rest.ok_or(ParseError::NoMoreTokens)?.trim_start();

        if let Some(quoted) = cur.strip_prefix('"') {
            let close = quoted.find('"').ok_or(ParseError::UnterminatedString)?;
            let after = &quoted[close + 1..];
            self.rest = after.find(',').map(|comma| &after[comma + 1..]);
            return Ok(&quoted[..close]);
        }

        match cur.find(',') {
            Some(comma) => {
                self.rest = Some(&cur[comma + 1..]);
                Ok(&cur[..comma])
            }
            None => {
                self.rest = None;
                Ok(cur)
            }
        }
    }

    /// Next field as a decimal integer
    pub fn next_int(&mut self) -> Result<i64, ParseError> {
        self.next_int_radix(10)
    }

    /// Next field as a hexadecimal integer (no `0x` prefix)
    pub fn next_hex_int(&mut self) -> Result<i64, ParseError> {
        self.next_int_radix(16)
    }

    /// Next field as `0` (false) or `1` (true)
    pub fn next_bool(&mut self) -> Result<bool, ParseError> {
        let token = self.next_str()?;
        match token.trim() {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(ParseError::InvalidBool(other.to_string())),
        }
    }

    fn next_int_radix(&mut self, radix: u32) -> Result<i64, ParseError> {
        let token = self.next_str()?.trim();
        i64::from_str_radix(token, radix).map_err(|_| ParseError::InvalidInteger(token.to_string()))
    }
}
