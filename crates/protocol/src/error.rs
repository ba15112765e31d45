// DBGp Client - Remote Script Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Protocol and engine error types.
//!
//! [`ProtocolError`] covers data that cannot be interpreted at all, while
//! [`EngineError`] is a well-formed error reported by the engine. The DBGp
//! error codes are collected in [`error_codes`].

use thiserror::Error;

use crate::command::TransactionId;

/// Malformed or unexpected protocol data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The message is not a well-formed document.
    #[error("malformed response: {0}")]
    Parse(String),
    /// A required attribute is absent.
    #[error("<{element}> is missing attribute `{attribute}`")]
    MissingAttribute {
        /// Element name
        element: String,
        /// Attribute name
        attribute: &'static str,
    },
    /// The `transaction_id` attribute is not a number.
    #[error("invalid transaction id {0:?}")]
    InvalidTransactionId(String),
    /// No pending transaction matches the response.
    #[error("unmatched response{}", transaction_suffix(.0))]
    Unmatched(Option<TransactionId>),
    /// A command line that cannot be parsed.
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    /// A file URI that does not map to a path, or a path that cannot be a URI.
    #[error("invalid file path or URI: {0}")]
    InvalidPath(String),
    /// The transport had no engine to send to.
    #[error("no engine connected")]
    NotConnected,
}

fn transaction_suffix(id: &Option<TransactionId>) -> String {
    id.map(|id| format!(" for transaction {id}")).unwrap_or_default()
}

/// An error response from the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("engine error {code}: {message}")]
pub struct EngineError {
    /// DBGp error code, see [`error_codes`]
    pub code: u32,
    /// Message from the engine, or the standard description of the code
    pub message: String,
}

impl EngineError {
    /// Creates an error, falling back to the standard description when the engine sent no message.
    pub fn new(code: u32, message: Option<String>) -> Self {
        let message = match message {
            Some(message) if !message.trim().is_empty() => message,
            _ => error_codes::description(code).to_string(),
        };
        Self { code, message }
    }
}

/// DBGp error codes.
///
/// Codes are grouped by hundreds: 0xx command parsing, 1xx file related,
/// 2xx breakpoints, 3xx data, 9xx protocol.
pub mod error_codes {
    // Command parsing errors

    /// Parse error in command
    pub const PARSE_ERROR: u32 = 1;
    /// Duplicate arguments in command
    pub const DUPLICATE_ARGUMENTS: u32 = 2;
    /// Invalid options (missing a required option, invalid value, ...)
    pub const INVALID_OPTIONS: u32 = 3;
    /// Unimplemented command
    pub const UNIMPLEMENTED_COMMAND: u32 = 4;
    /// Command not available (not valid in the current state)
    pub const COMMAND_NOT_AVAILABLE: u32 = 5;

    // File related errors

    /// Can not open file
    pub const CANNOT_OPEN_FILE: u32 = 100;
    /// Stream redirect failed
    pub const STREAM_REDIRECT_FAILED: u32 = 101;

    // Breakpoint or code flow errors

    /// Breakpoint could not be set
    pub const BREAKPOINT_NOT_SET: u32 = 200;
    /// Breakpoint type not supported
    pub const BREAKPOINT_TYPE_UNSUPPORTED: u32 = 201;
    /// Invalid breakpoint
    pub const INVALID_BREAKPOINT: u32 = 202;
    /// No code on breakpoint line
    pub const NO_CODE_ON_LINE: u32 = 203;
    /// Invalid breakpoint state
    pub const INVALID_BREAKPOINT_STATE: u32 = 204;
    /// No such breakpoint
    pub const NO_SUCH_BREAKPOINT: u32 = 205;
    /// Error evaluating code
    pub const EVALUATION_ERROR: u32 = 206;
    /// Invalid expression
    pub const INVALID_EXPRESSION: u32 = 207;

    // Data errors

    /// Can not get property
    pub const CANNOT_GET_PROPERTY: u32 = 300;
    /// Stack depth invalid
    pub const STACK_DEPTH_INVALID: u32 = 301;
    /// Context invalid
    pub const CONTEXT_INVALID: u32 = 302;

    // Protocol errors

    /// Encoding not supported
    pub const ENCODING_NOT_SUPPORTED: u32 = 900;
    /// An internal exception in the debugger occurred
    pub const INTERNAL_EXCEPTION: u32 = 998;
    /// Unknown error
    pub const UNKNOWN_ERROR: u32 = 999;

    /// Standard description of a code.
    pub fn description(code: u32) -> &'static str {
        match code {
            PARSE_ERROR => "parse error in command",
            DUPLICATE_ARGUMENTS => "duplicate arguments in command",
            INVALID_OPTIONS => "invalid options",
            UNIMPLEMENTED_COMMAND => "unimplemented command",
            COMMAND_NOT_AVAILABLE => "command not available",
            CANNOT_OPEN_FILE => "can not open file",
            STREAM_REDIRECT_FAILED => "stream redirect failed",
            BREAKPOINT_NOT_SET => "breakpoint could not be set",
            BREAKPOINT_TYPE_UNSUPPORTED => "breakpoint type not supported",
            INVALID_BREAKPOINT => "invalid breakpoint",
            NO_CODE_ON_LINE => "no code on breakpoint line",
            INVALID_BREAKPOINT_STATE => "invalid breakpoint state",
            NO_SUCH_BREAKPOINT => "no such breakpoint",
            EVALUATION_ERROR => "error evaluating code",
            INVALID_EXPRESSION => "invalid expression",
            CANNOT_GET_PROPERTY => "can not get property",
            STACK_DEPTH_INVALID => "stack depth invalid",
            CONTEXT_INVALID => "context invalid",
            ENCODING_NOT_SUPPORTED => "encoding not supported",
            INTERNAL_EXCEPTION => "internal exception in the debugger",
            _ => "unknown error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_falls_back_to_description() {
        let err = EngineError::new(error_codes::STACK_DEPTH_INVALID, None);
        assert_eq!(err.message, "stack depth invalid");
        assert_eq!(err.to_string(), "engine error 301: stack depth invalid");

        let err = EngineError::new(206, Some("Undefined variable $x".to_string()));
        assert_eq!(err.message, "Undefined variable $x");

        assert_eq!(EngineError::new(12345, Some("  ".to_string())).message, "unknown error");
    }

    #[test]
    fn test_unmatched_display() {
        assert_eq!(
            ProtocolError::Unmatched(Some(TransactionId(7))).to_string(),
            "unmatched response for transaction 7"
        );
        assert_eq!(ProtocolError::Unmatched(None).to_string(), "unmatched response");
    }
}
