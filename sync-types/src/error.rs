//! Error types for tally-sync query handling.

use thiserror::Error;

/// Errors produced while parsing a query expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Input ended where more tokens were required.
    #[error("unexpected end of query")]
    UnexpectedEnd,

    /// A token appeared where the grammar does not allow it.
    #[error("unexpected token '{token}' at byte {position}")]
    UnexpectedToken {
        /// The offending token text.
        token: String,
        /// Byte offset of the token.
        position: usize,
    },

    /// A string literal was never closed.
    #[error("unterminated string literal starting at byte {0}")]
    UnterminatedString(usize),

    /// Backslash followed by something other than `\` or `"`.
    #[error("invalid escape sequence at byte {0}")]
    InvalidEscape(usize),

    /// `limit` / `offset` argument is not an unsigned integer.
    #[error("invalid number '{value}' at byte {position}")]
    InvalidNumber {
        /// The text that failed to parse.
        value: String,
        /// Byte offset of the number.
        position: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = QueryError::UnexpectedToken {
            token: ")".into(),
            position: 7,
        };
        assert_eq!(err.to_string(), "unexpected token ')' at byte 7");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<QueryError>();
    }
}
