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

//! Transaction-correlated command/response client.
//!
//! [`ProtocolClient`] tags every outgoing [`Command`] with a fresh
//! [`TransactionId`] and keeps the caller's handler in a pending table. The
//! transport's I/O thread only classifies inbound messages and pushes a
//! [`Delivery`] onto a queue; the owner drains that queue and runs the
//! handlers and notifications on its own context through
//! [`Delivery::deliver`]. Nothing the owner sees ever runs on the I/O thread.
//!
//! ```text
//! owner context                      I/O thread
//! -------------                      ----------
//! send_command ──lock/insert──▶ pending ◀──lock/remove── on_message
//!      │                                                     │
//!      └──────────▶ transport.send            deliveries ◀───┘
//! next_delivery ◀──────────────────────────────────┘
//! ```

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use dbgp_transport::{SocketTransport, Transport, TransportConfig, TransportError, TransportListener};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::{
    command::{Command, TransactionId},
    error::{EngineError, ProtocolError},
    response::Response,
};

/// Callback run on the owner with the matching response.
pub type Handler<C> = Box<dyn FnOnce(&mut C, Response) + Send>;

type PendingTable<C> = Arc<Mutex<HashMap<TransactionId, Handler<C>>>>;

/// Notifications from the protocol client, invoked on the owning context.
///
/// Replies to commands go to their own handlers, not here.
pub trait ProtocolClientListener {
    /// The transport is accepting connections on `addr`.
    fn on_listening(&mut self, _addr: SocketAddr) {}

    /// An engine connected. Its handshake follows.
    fn on_connected(&mut self, _peer: SocketAddr) {}

    /// The transaction-less first message of a connection.
    fn on_handshake(&mut self, init: Response);

    /// An error the engine reported outside any transaction.
    fn on_engine_error(&mut self, _error: EngineError) {}

    /// A message that could not be parsed or matched.
    fn on_protocol_error(&mut self, _error: ProtocolError) {}

    /// A bind, accept or stream failure.
    fn on_transport_error(&mut self, _error: TransportError) {}

    /// The connection or listener closed. Pending handlers were dropped.
    fn on_disconnected(&mut self) {}
}

/// One queued event for the owner.
pub enum Delivery<C> {
    /// See [`ProtocolClientListener::on_listening`].
    Listening(SocketAddr),
    /// See [`ProtocolClientListener::on_connected`].
    Connected(SocketAddr),
    /// See [`ProtocolClientListener::on_handshake`].
    Handshake(Response),
    /// A response and the handler registered for it.
    Reply {
        /// Matched transaction
        transaction_id: TransactionId,
        /// Handler registered by [`ProtocolClient::send_command`]
        handler: Handler<C>,
        /// The response
        response: Response,
    },
    /// See [`ProtocolClientListener::on_engine_error`].
    EngineError(EngineError),
    /// See [`ProtocolClientListener::on_protocol_error`].
    ProtocolError(ProtocolError),
    /// See [`ProtocolClientListener::on_transport_error`].
    TransportError(TransportError),
    /// See [`ProtocolClientListener::on_disconnected`].
    Disconnected,
}

impl<C: ProtocolClientListener> Delivery<C> {
    /// Runs the handler or notification against the owner.
    pub fn deliver(self, owner: &mut C) {
        match self {
            Self::Listening(addr) => owner.on_listening(addr),
            Self::Connected(peer) => owner.on_connected(peer),
            Self::Handshake(init) => owner.on_handshake(init),
            Self::Reply { transaction_id, handler, response } => {
                trace!(txn = %transaction_id, "Running response handler");
                handler(owner, response)
            }
            Self::EngineError(error) => owner.on_engine_error(error),
            Self::ProtocolError(error) => owner.on_protocol_error(error),
            Self::TransportError(error) => owner.on_transport_error(error),
            Self::Disconnected => owner.on_disconnected(),
        }
    }
}

impl<C> std::fmt::Debug for Delivery<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Listening(addr) => f.debug_tuple("Listening").field(addr).finish(),
            Self::Connected(peer) => f.debug_tuple("Connected").field(peer).finish(),
            Self::Handshake(init) => f.debug_tuple("Handshake").field(init).finish(),
            Self::Reply { transaction_id, response, .. } => f
                .debug_struct("Reply")
                .field("transaction_id", transaction_id)
                .field("response", response)
                .finish_non_exhaustive(),
            Self::EngineError(e) => f.debug_tuple("EngineError").field(e).finish(),
            Self::ProtocolError(e) => f.debug_tuple("ProtocolError").field(e).finish(),
            Self::TransportError(e) => f.debug_tuple("TransportError").field(e).finish(),
            Self::Disconnected => f.write_str("Disconnected"),
        }
    }
}

/// Transport listener living on the I/O thread.
struct ClientBridge<C> {
    pending: PendingTable<C>,
    deliveries: mpsc::UnboundedSender<Delivery<C>>,
    awaiting_handshake: AtomicBool,
}

impl<C: 'static> ClientBridge<C> {
    fn push(&self, delivery: Delivery<C>) {
        if self.deliveries.send(delivery).is_err() {
            trace!("Protocol client dropped, discarding delivery");
        }
    }

    fn classify(&self, message: &str, first: bool) -> Result<Delivery<C>, ProtocolError> {
        let response = Response::parse(message)?;
        match response.transaction_id()? {
            Some(id) => {
                let handler = self.pending.lock().remove(&id);
                match handler {
                    Some(handler) => Ok(Delivery::Reply { transaction_id: id, handler, response }),
                    None => Err(ProtocolError::Unmatched(Some(id))),
                }
            }
            None if first => Ok(Delivery::Handshake(response)),
            None if response.is_async_error() => match response.error() {
                Some(error) => Ok(Delivery::EngineError(error)),
                None => Err(ProtocolError::Unmatched(None)),
            },
            None => Err(ProtocolError::Unmatched(None)),
        }
    }
}

impl<C: 'static> TransportListener for ClientBridge<C> {
    fn on_listening(&self, addr: SocketAddr) {
        self.push(Delivery::Listening(addr));
    }

    fn on_connected(&self, peer: SocketAddr) {
        self.pending.lock().clear();
        self.awaiting_handshake.store(true, Ordering::Release);
        self.push(Delivery::Connected(peer));
    }

    fn on_message(&self, message: String) {
        let first = self.awaiting_handshake.swap(false, Ordering::AcqRel);
        match self.classify(&message, first) {
            Ok(delivery) => self.push(delivery),
            Err(error) => {
                warn!("Dropping engine message: {error}");
                self.push(Delivery::ProtocolError(error));
            }
        }
    }

    fn on_disconnected(&self) {
        let abandoned = {
            let mut pending = self.pending.lock();
            let count = pending.len();
            pending.clear();
            count
        };
        if abandoned > 0 {
            debug!("Abandoned {abandoned} pending transaction(s)");
        }
        self.awaiting_handshake.store(false, Ordering::Release);
        self.push(Delivery::Disconnected);
    }

    fn on_error(&self, error: TransportError) {
        self.push(Delivery::TransportError(error));
    }
}

/// Issues transaction-tagged commands and routes responses back to the owner `C`.
pub struct ProtocolClient<C: 'static> {
    transport: Box<dyn Transport>,
    pending: PendingTable<C>,
    next_id: AtomicU64,
    deliveries: mpsc::UnboundedReceiver<Delivery<C>>,
}

impl<C: 'static> ProtocolClient<C> {
    /// Creates a client over a [`SocketTransport`].
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        Self::with_transport(|listener| {
            SocketTransport::spawn(config, listener).map(|t| Box::new(t) as Box<dyn Transport>)
        })
    }

    /// Creates a client over the transport built by `factory`, which receives
    /// the listener the transport must report to.
    pub fn with_transport<F>(factory: F) -> Result<Self, TransportError>
    where
        F: FnOnce(Arc<dyn TransportListener>) -> Result<Box<dyn Transport>, TransportError>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending: PendingTable<C> = Arc::new(Mutex::new(HashMap::new()));
        let bridge = Arc::new(ClientBridge {
            pending: pending.clone(),
            deliveries: tx,
            awaiting_handshake: AtomicBool::new(false),
        });
        let transport = factory(bridge)?;

        Ok(Self { transport, pending, next_id: AtomicU64::new(1), deliveries: rx })
    }

    /// Starts listening for an engine.
    pub fn connect(&self) {
        info!("Listening for engine connections");
        self.transport.connect();
    }

    /// Closes the connection or listener. Pending handlers are dropped, not called.
    pub fn disconnect(&self) {
        self.transport.disconnect();
    }

    /// Sends `command`; `handler` runs on the owner with the matching response.
    ///
    /// The handler is registered only if the transport queued the command.
    /// The id is consumed either way, so ids are never reused.
    pub fn send_command<F>(&self, command: Command, handler: F) -> Result<TransactionId, ProtocolError>
    where
        F: FnOnce(&mut C, Response) + Send + 'static,
    {
        let id = TransactionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let line = command.serialize(id)?;
        // Registered before sending: the reply may arrive before `send` returns.
        self.pending.lock().insert(id, Box::new(handler));

        debug!(txn = %id, "-> {line}");
        if !self.transport.send(line) {
            self.pending.lock().remove(&id);
            return Err(ProtocolError::NotConnected);
        }
        Ok(id)
    }

    /// Sends `command` and discards its response.
    pub fn send_command_detached(&self, command: Command) -> Result<TransactionId, ProtocolError> {
        self.send_command(command, |_: &mut C, _| {})
    }

    /// Number of commands still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether `id` is still waiting for a response.
    pub fn is_pending(&self, id: TransactionId) -> bool {
        self.pending.lock().contains_key(&id)
    }

    /// Address of the listening socket, once bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr()
    }

    /// Next queued delivery, without waiting.
    pub fn try_next_delivery(&mut self) -> Option<Delivery<C>> {
        self.deliveries.try_recv().ok()
    }

    /// Waits for the next delivery.
    pub async fn next_delivery(&mut self) -> Option<Delivery<C>> {
        self.deliveries.recv().await
    }
}
