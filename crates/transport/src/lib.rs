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

//! DBGp Transport - the socket layer of the DBGp client
//!
//! Listens for one engine connection at a time, frames and deframes
//! messages, and runs all I/O on a dedicated background thread. The
//! transport knows nothing about transactions; it moves strings.

/// Transport failure and framing error types
pub mod error;
/// Length-prefixed message codec
pub mod framing;
/// Listener and transport contracts
pub mod listener;
/// TCP implementation on a dedicated I/O thread
pub mod socket;

pub use error::*;
pub use framing::*;
pub use listener::*;
pub use socket::*;
