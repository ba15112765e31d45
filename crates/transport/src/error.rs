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

use std::{io, string::FromUtf8Error};

use thiserror::Error;

/// Errors decoding the inbound byte stream.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The length prefix is not a decimal number.
    #[error("invalid length prefix: {0:?}")]
    BadLength(String),
    /// The declared length exceeds the decoder limit.
    #[error("message of {len} bytes exceeds limit of {max} bytes")]
    Oversize {
        /// Declared payload length
        len: usize,
        /// Configured limit
        max: usize,
    },
    /// The byte after the payload was not NUL.
    #[error("payload not followed by NUL terminator")]
    MissingTerminator,
    /// The payload is not UTF-8.
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),
}

/// Failures of the socket transport, reported through
/// [`TransportListener::on_error`](crate::TransportListener::on_error).
#[derive(Debug, Error)]
pub enum TransportError {
    /// Binding the listening socket failed.
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        /// Address that was requested
        addr: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
    /// Accepting a peer failed.
    #[error("failed to accept engine connection: {0}")]
    Accept(#[source] io::Error),
    /// Reading or writing the connected stream failed.
    #[error("connection error: {0}")]
    Stream(#[source] io::Error),
    /// The peer sent bytes that do not frame.
    #[error("malformed message from engine: {0}")]
    Framing(#[from] FrameError),
    /// The I/O thread or its runtime could not be started.
    #[error("transport runtime error: {0}")]
    Runtime(String),
}
