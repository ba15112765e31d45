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

//! Wire framing for DBGp messages.
//!
//! Engine messages are `<decimal length>\0<payload>\0`. Commands sent to the
//! engine are plain NUL-terminated strings by default, or use the same length
//! prefix when [`FramingMode::LengthPrefixed`] is configured.

use dbgp_common::FramingMode;

use crate::error::FrameError;

/// Maximum payload size accepted from a peer (64 MB).
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Longest accepted length prefix, enough for any `usize`.
const MAX_LENGTH_DIGITS: usize = 20;

/// Frame a payload as `<len>\0<payload>\0`.
pub fn encode_message(payload: &str) -> Vec<u8> {
    let length = payload.len().to_string();
    let mut buf = Vec::with_capacity(length.len() + payload.len() + 2);
    buf.extend_from_slice(length.as_bytes());
    buf.push(0);
    buf.extend_from_slice(payload.as_bytes());
    buf.push(0);
    buf
}

/// Frame an outbound command according to `mode`.
pub fn encode_command(command: &str, mode: FramingMode) -> Vec<u8> {
    match mode {
        FramingMode::NulTerminated => {
            let mut buf = Vec::with_capacity(command.len() + 1);
            buf.extend_from_slice(command.as_bytes());
            buf.push(0);
            buf
        }
        FramingMode::LengthPrefixed => encode_message(command),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    ReadingLength,
    ReadingPayload { len: usize },
}

/// Incremental decoder for length-prefixed messages.
///
/// Bytes can arrive in arbitrary chunks; the decoder keeps whatever is
/// incomplete until the next [`MessageDecoder::feed`].
#[derive(Debug)]
pub struct MessageDecoder {
    buf: Vec<u8>,
    state: DecodeState,
    max_len: usize,
}

impl MessageDecoder {
    /// Create a decoder with the default size limit.
    pub fn new() -> Self {
        Self::with_max_len(MAX_MESSAGE_SIZE)
    }

    /// Create a decoder rejecting payloads longer than `max_len`.
    pub fn with_max_len(max_len: usize) -> Self {
        Self { buf: Vec::new(), state: DecodeState::ReadingLength, max_len }
    }

    /// Feed bytes and return every message completed by them.
    ///
    /// # Errors
    ///
    /// A malformed prefix, an oversize payload, a missing terminator or
    /// non-UTF-8 payload. The decoder is reset and the stream should be
    /// considered unusable.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<String>, FrameError> {
        self.buf.extend_from_slice(bytes);
        let mut messages = Vec::new();

        loop {
            match self.state {
                DecodeState::ReadingLength => {
                    let Some(nul) = self.buf.iter().position(|b| *b == 0) else {
                        if self.buf.len() > MAX_LENGTH_DIGITS {
                            let text = prefix_text(&self.buf);
                            return Err(self.fail(FrameError::BadLength(text)));
                        }
                        break;
                    };

                    let len = match parse_length(&self.buf[..nul], self.max_len) {
                        Ok(len) => len,
                        Err(e) => return Err(self.fail(e)),
                    };

                    self.buf.drain(..=nul);
                    self.state = DecodeState::ReadingPayload { len };
                }
                DecodeState::ReadingPayload { len } => {
                    if self.buf.len() < len + 1 {
                        break;
                    }
                    if self.buf[len] != 0 {
                        return Err(self.fail(FrameError::MissingTerminator));
                    }

                    let payload: Vec<u8> = self.buf.drain(..=len).take(len).collect();
                    self.state = DecodeState::ReadingLength;
                    match String::from_utf8(payload) {
                        Ok(message) => messages.push(message),
                        Err(e) => return Err(self.fail(FrameError::InvalidUtf8(e))),
                    }
                }
            }
        }

        Ok(messages)
    }

    /// Returns true if part of a message is buffered.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty() || self.state != DecodeState::ReadingLength
    }

    /// Drop any buffered partial message.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.state = DecodeState::ReadingLength;
    }

    fn fail(&mut self, error: FrameError) -> FrameError {
        self.reset();
        error
    }
}

impl Default for MessageDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_length(digits: &[u8], max_len: usize) -> Result<usize, FrameError> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(FrameError::BadLength(prefix_text(digits)));
    }
    let len = prefix_text(digits)
        .parse::<usize>()
        .map_err(|_| FrameError::BadLength(prefix_text(digits)))?;
    if len > max_len {
        return Err(FrameError::Oversize { len, max: max_len });
    }
    Ok(len)
}

fn prefix_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(&bytes[..bytes.len().min(MAX_LENGTH_DIGITS)]).into_owned()
}
