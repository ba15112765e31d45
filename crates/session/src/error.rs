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

//! Errors returned synchronously by session operations.

use dbgp_common::{BreakpointError, BreakpointLocation};
use dbgp_protocol::ProtocolError;
use dbgp_transport::TransportError;
use thiserror::Error;

/// A request the session rejected before sending anything.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The breakpoint cannot be submitted.
    #[error("invalid breakpoint: {0}")]
    InvalidBreakpoint(#[from] BreakpointError),
    /// No breakpoint at this location.
    #[error("no breakpoint at {0}")]
    UnknownBreakpoint(BreakpointLocation),
    /// The operation needs an attached engine.
    #[error("no engine is connected")]
    NotConnected,
    /// The stack has no frame with this index.
    #[error("no stack frame #{0}")]
    UnknownFrame(usize),
    /// The frame holds no variable with this full name.
    #[error("no variable {full_name} in frame #{frame}")]
    UnknownVariable {
        /// Frame index
        frame: usize,
        /// Full name that was looked up
        full_name: String,
    },
    /// Nothing to evaluate.
    #[error("expression is empty")]
    EmptyExpression,
    /// A path that cannot be sent to the engine.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The transport could not be created.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
