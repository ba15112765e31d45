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

//! DBGp protocol client.
//!
//! Commands are built with [`Command`], tagged with a [`TransactionId`] and
//! sent by a [`ProtocolClient`]. Engine messages are parsed into [`Response`]
//! documents and matched back to the handler of the command they answer.

pub mod client;
pub mod command;
pub mod error;
pub mod response;
pub mod uri;
pub mod xml;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::*;
pub use command::*;
pub use error::*;
pub use response::*;
pub use uri::*;
pub use xml::Element;
