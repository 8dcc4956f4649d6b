//! Error types for AT response parsing

use thiserror::Error;

/// Errors that can occur while tokenizing a response line
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Line has no `:` separating the prefix from the fields
    #[error("missing response prefix in {0:?}")]
    MissingPrefix(String),

    /// All tokens have already been consumed
    #[error("no more tokens")]
    NoMoreTokens,

    /// Token is not a valid integer in the requested base
    #[error("invalid integer: {0:?}")]
    InvalidInteger(String),

    /// Token is not `0` or `1`
    #[error("invalid boolean: {0:?}")]
    InvalidBool(String),

    /// Quoted string has no closing quote
    #[error("unterminated quoted string")]
    UnterminatedString,
}
