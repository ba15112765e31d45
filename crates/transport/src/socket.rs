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

//! TCP transport driven by a dedicated I/O thread.
//!
//! The thread runs its own single-threaded tokio runtime and owns the
//! listening socket and the accepted stream. Callers talk to it through a
//! control channel and a shared outbound queue, so no public method ever
//! waits on the network.

use std::{
    collections::VecDeque,
    io,
    net::SocketAddr,
    sync::Arc,
    thread::{self, JoinHandle},
};

use dbgp_common::{DebuggerConfig, FramingMode};
use parking_lot::Mutex;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{mpsc, Notify},
};
use tracing::{debug, error, info, warn};

use crate::{
    error::TransportError,
    framing::{encode_command, MessageDecoder, MAX_MESSAGE_SIZE},
    listener::{Transport, TransportListener},
};

const READ_CHUNK: usize = 16 * 1024;

/// Where and how the transport listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Address to bind
    pub bind_address: String,
    /// Port to bind; 0 picks a free port once and keeps it for re-listens
    pub port: u16,
    /// Framing of outbound commands
    pub framing: FramingMode,
    /// Largest inbound message accepted
    pub max_message_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::from(&DebuggerConfig::default())
    }
}

impl From<&DebuggerConfig> for TransportConfig {
    fn from(config: &DebuggerConfig) -> Self {
        Self {
            bind_address: config.bind_address.clone(),
            port: config.port,
            framing: config.command_framing,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

/// Coarse state of the transport, readable from any thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Neither listening nor connected
    Idle,
    /// Waiting for an engine
    Listening,
    /// An engine is connected
    Connected,
}

#[derive(Debug)]
enum Control {
    Listen,
    Disconnect,
    Shutdown,
}

/// State shared between callers and the I/O thread. Every lock is held
/// only for the duration of a queue or field access.
#[derive(Debug)]
struct Shared {
    outbound: Mutex<VecDeque<Vec<u8>>>,
    wake: Notify,
    state: Mutex<TransportState>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl Shared {
    fn set_state(&self, state: TransportState) {
        *self.state.lock() = state;
    }
}

/// Handle to the socket transport.
///
/// Dropping the handle stops the I/O thread without notifying the listener.
#[derive(Debug)]
pub struct SocketTransport {
    shared: Arc<Shared>,
    control: mpsc::UnboundedSender<Control>,
    framing: FramingMode,
    thread: Option<JoinHandle<()>>,
}

impl SocketTransport {
    /// Start the I/O thread. The transport stays idle until [`Transport::connect`].
    pub fn spawn(
        config: TransportConfig,
        listener: Arc<dyn TransportListener>,
    ) -> Result<Self, TransportError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TransportError::Runtime(e.to_string()))?;

        let shared = Arc::new(Shared {
            outbound: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            state: Mutex::new(TransportState::Idle),
            local_addr: Mutex::new(None),
        });
        let (control, control_rx) = mpsc::unbounded_channel();

        let io_loop = IoLoop {
            bind_address: config.bind_address,
            port: config.port,
            max_message_size: config.max_message_size,
            listener,
            shared: shared.clone(),
            control: control_rx,
        };

        let thread = thread::Builder::new()
            .name("dbgp-io".to_string())
            .spawn(move || runtime.block_on(io_loop.run()))
            .map_err(|e| TransportError::Runtime(e.to_string()))?;

        Ok(Self { shared, control, framing: config.framing, thread: Some(thread) })
    }

    /// Current state of the transport.
    pub fn state(&self) -> TransportState {
        *self.shared.state.lock()
    }

    fn control(&self, message: Control) {
        if self.control.send(message).is_err() {
            warn!("I/O thread already stopped");
        }
    }
}

impl Transport for SocketTransport {
    fn connect(&self) {
        self.control(Control::Listen);
    }

    fn disconnect(&self) {
        self.control(Control::Disconnect);
    }

    fn send(&self, payload: String) -> bool {
        if self.state() != TransportState::Connected {
            warn!(command = %payload, "No engine connected, dropping command");
            return false;
        }

        debug!(command = %payload, "Queueing command");
        let bytes = encode_command(&payload, self.framing);
        self.shared.outbound.lock().push_back(bytes);
        self.shared.wake.notify_one();
        true
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        *self.shared.local_addr.lock()
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        let _ = self.control.send(Control::Shutdown);
        if let Some(thread) = self.thread.take() {
            // Joining from the I/O thread itself would deadlock.
            if thread.thread().id() != thread::current().id() && thread.join().is_err() {
                error!("I/O thread panicked");
            }
        }
    }
}

enum Phase {
    Idle,
    Listening(TcpListener),
    Connected(TcpStream, SocketAddr),
    Shutdown,
}

/// A command being written, possibly across several writable events.
struct PendingWrite {
    bytes: Vec<u8>,
    offset: usize,
}

impl PendingWrite {
    fn remaining(&self) -> &[u8] {
        &self.bytes[self.offset..]
    }

    fn is_done(&self) -> bool {
        self.offset >= self.bytes.len()
    }
}

struct IoLoop {
    bind_address: String,
    port: u16,
    max_message_size: usize,
    listener: Arc<dyn TransportListener>,
    shared: Arc<Shared>,
    control: mpsc::UnboundedReceiver<Control>,
}

impl IoLoop {
    async fn run(mut self) {
        debug!("I/O loop started");
        let mut phase = Phase::Idle;
        loop {
            phase = match phase {
                Phase::Idle => self.idle().await,
                Phase::Listening(socket) => self.accept(socket).await,
                Phase::Connected(stream, peer) => self.serve(stream, peer).await,
                Phase::Shutdown => break,
            };
        }
        self.shared.set_state(TransportState::Idle);
        self.shared.outbound.lock().clear();
        debug!("I/O loop finished");
    }

    async fn idle(&mut self) -> Phase {
        match self.control.recv().await {
            Some(Control::Listen) => self.bind().await,
            Some(Control::Disconnect) => Phase::Idle,
            Some(Control::Shutdown) | None => Phase::Shutdown,
        }
    }

    async fn bind(&mut self) -> Phase {
        let addr = format!("{}:{}", self.bind_address, self.port);
        let bound = match TcpListener::bind(addr.as_str()).await {
            Ok(socket) => socket.local_addr().map(|local| (socket, local)),
            Err(e) => Err(e),
        };

        match bound {
            Ok((socket, local)) => {
                self.port = local.port();
                *self.shared.local_addr.lock() = Some(local);
                self.shared.set_state(TransportState::Listening);
                info!(addr = %local, "Listening for engine connections");
                self.listener.on_listening(local);
                Phase::Listening(socket)
            }
            Err(source) => {
                error!(addr = %addr, error = %source, "Failed to bind");
                self.listener.on_error(TransportError::Bind { addr, source });
                Phase::Idle
            }
        }
    }

    async fn accept(&mut self, socket: TcpListener) -> Phase {
        tokio::select! {
            accepted = socket.accept() => match accepted {
                Ok((stream, peer)) => {
                    // One engine at a time: stop listening while connected.
                    drop(socket);
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!(error = %e, "Failed to set TCP_NODELAY");
                    }
                    self.shared.outbound.lock().clear();
                    self.shared.set_state(TransportState::Connected);
                    info!(peer = %peer, "Engine connected");
                    self.listener.on_connected(peer);
                    Phase::Connected(stream, peer)
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept engine connection");
                    self.listener.on_error(TransportError::Accept(e));
                    self.finish()
                }
            },
            control = self.control.recv() => match control {
                Some(Control::Listen) => Phase::Listening(socket),
                Some(Control::Disconnect) => {
                    info!("Stopped listening");
                    self.finish()
                }
                Some(Control::Shutdown) | None => Phase::Shutdown,
            },
        }
    }

    async fn serve(&mut self, stream: TcpStream, peer: SocketAddr) -> Phase {
        let mut decoder = MessageDecoder::with_max_len(self.max_message_size);
        let mut read_buf = vec![0u8; READ_CHUNK];
        let mut pending: Option<PendingWrite> = None;

        loop {
            if pending.is_none() {
                pending = self
                    .shared
                    .outbound
                    .lock()
                    .pop_front()
                    .map(|bytes| PendingWrite { bytes, offset: 0 });
            }
            let writing = pending.is_some();

            tokio::select! {
                ready = stream.readable() => {
                    if let Err(e) = ready {
                        return self.fail(TransportError::Stream(e), peer);
                    }
                    match stream.try_read(&mut read_buf) {
                        Ok(0) => {
                            info!(peer = %peer, "Engine closed the connection");
                            return self.finish();
                        }
                        Ok(n) => {
                            debug!(peer = %peer, bytes = n, "Read from engine");
                            match decoder.feed(&read_buf[..n]) {
                                Ok(messages) => {
                                    for message in messages {
                                        debug!(message = %message, "Received message");
                                        self.listener.on_message(message);
                                    }
                                }
                                Err(e) => return self.fail(e.into(), peer),
                            }
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                        Err(e) => return self.fail(TransportError::Stream(e), peer),
                    }
                }
                ready = stream.writable(), if writing => {
                    if let Err(e) = ready {
                        return self.fail(TransportError::Stream(e), peer);
                    }
                    if let Some(write) = pending.as_mut() {
                        match stream.try_write(write.remaining()) {
                            Ok(n) => {
                                write.offset += n;
                                if write.is_done() {
                                    debug!(bytes = write.bytes.len(), "Command flushed");
                                    pending = None;
                                }
                            }
                            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                            Err(e) => return self.fail(TransportError::Stream(e), peer),
                        }
                    }
                }
                _ = self.shared.wake.notified(), if !writing => {}
                control = self.control.recv() => match control {
                    Some(Control::Listen) => {}
                    Some(Control::Disconnect) => {
                        info!(peer = %peer, "Disconnecting from engine");
                        return self.finish();
                    }
                    Some(Control::Shutdown) | None => return Phase::Shutdown,
                },
            }
        }
    }

    fn fail(&self, error: TransportError, peer: SocketAddr) -> Phase {
        error!(peer = %peer, error = %error, "Connection failed");
        self.listener.on_error(error);
        self.finish()
    }

    /// Back to idle: queued output is dropped and the listener hears about it once.
    fn finish(&self) -> Phase {
        self.shared.outbound.lock().clear();
        self.shared.set_state(TransportState::Idle);
        self.listener.on_disconnected();
        Phase::Idle
    }
}
