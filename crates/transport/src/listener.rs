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

use std::net::SocketAddr;

use crate::error::TransportError;

/// Receiver of transport events.
///
/// Every callback runs on the transport's I/O thread, in the order the
/// events happened. Implementations must not block; they are expected to
/// hand the event to their owning context and return.
pub trait TransportListener: Send + Sync + 'static {
    /// The listening socket is bound.
    fn on_listening(&self, addr: SocketAddr);

    /// An engine connected.
    fn on_connected(&self, peer: SocketAddr);

    /// A complete message arrived.
    fn on_message(&self, message: String);

    /// The transport went back to idle. Fires exactly once per listen or
    /// connection that ends, whatever the cause.
    fn on_disconnected(&self);

    /// Bind, accept or stream failure. Followed by
    /// [`on_disconnected`](Self::on_disconnected) when it ends a connection.
    fn on_error(&self, error: TransportError);
}

/// A message transport the protocol layer can drive.
///
/// All methods return immediately; outcomes arrive through the
/// [`TransportListener`] the transport was created with.
pub trait Transport: Send {
    /// Start listening. Does nothing if already listening or connected.
    fn connect(&self);

    /// Close the listener or connection and drop queued output. Does nothing when idle.
    fn disconnect(&self);

    /// Queue a command for the connected peer. Returns false, dropping the
    /// command, when no peer is connected.
    fn send(&self, payload: String) -> bool;

    /// Address of the listening socket, once bound.
    fn local_addr(&self) -> Option<SocketAddr>;
}
