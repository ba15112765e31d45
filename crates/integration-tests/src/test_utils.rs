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

//! Test utilities for integration tests

use std::time::Duration;

/// How long any single wait may take before a test fails.
pub const WAIT: Duration = Duration::from_secs(5);

/// Initialization utilities for tests
pub mod init {
    /// Initialize logging for a test
    pub fn init_test_environment() {
        dbgp_common::logging::ensure_test_logging(None);
    }
}

/// A scripted engine connecting over TCP
pub mod engine {
    use std::{net::SocketAddr, time::Duration};

    use dbgp_protocol::{testing::init_xml, Command, TransactionId};
    use dbgp_transport::encode_message;
    use eyre::{bail, eyre, Result, WrapErr};
    use tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        net::{
            tcp::{OwnedReadHalf, OwnedWriteHalf},
            TcpStream,
        },
        time::{sleep, timeout},
    };
    use tracing::debug;

    use super::WAIT;

    /// Engine end of a debugging connection. Reads NUL-terminated commands
    /// and writes length-prefixed messages.
    pub struct FakeEngine {
        reader: BufReader<OwnedReadHalf>,
        writer: OwnedWriteHalf,
    }

    impl FakeEngine {
        /// Connects to a listening client.
        pub async fn connect(addr: SocketAddr) -> Result<Self> {
            let stream = timeout(WAIT, TcpStream::connect(addr))
                .await
                .map_err(|_| eyre!("timed out connecting to {addr}"))?
                .wrap_err_with(|| format!("failed to connect to {addr}"))?;
            let (read, writer) = stream.into_split();
            Ok(Self { reader: BufReader::new(read), writer })
        }

        /// Sends the `<init>` handshake.
        pub async fn handshake(&mut self, file_uri: &str) -> Result<()> {
            self.send(&init_xml(file_uri)).await
        }

        /// Sends one framed message.
        pub async fn send(&mut self, xml: &str) -> Result<()> {
            self.writer.write_all(&encode_message(xml)).await?;
            self.writer.flush().await?;
            Ok(())
        }

        /// Sends one framed message in pieces of `chunk` bytes with pauses in between.
        pub async fn send_chunked(&mut self, xml: &str, chunk: usize) -> Result<()> {
            for piece in encode_message(xml).chunks(chunk) {
                self.writer.write_all(piece).await?;
                self.writer.flush().await?;
                sleep(Duration::from_millis(2)).await;
            }
            Ok(())
        }

        /// Reads the next command.
        pub async fn recv_command(&mut self) -> Result<(Command, TransactionId)> {
            let mut line = Vec::new();
            let read = timeout(WAIT, self.reader.read_until(0, &mut line))
                .await
                .map_err(|_| eyre!("timed out waiting for a command"))??;
            if read == 0 || line.pop() != Some(0) {
                bail!("connection closed while waiting for a command");
            }
            let line = String::from_utf8(line)?;
            debug!(%line, "Engine received");
            Ok(Command::parse(&line)?)
        }

        /// Reads the next command and checks its verb.
        pub async fn expect(&mut self, verb: &str) -> Result<(Command, TransactionId)> {
            let (command, id) = self.recv_command().await?;
            if command.kind().verb() != verb {
                bail!("expected `{verb}`, got `{}`", command.serialize(id)?);
            }
            Ok((command, id))
        }

        /// Closes the connection.
        pub async fn hang_up(mut self) -> Result<()> {
            self.writer.shutdown().await?;
            Ok(())
        }
    }
}

/// A session listening on an ephemeral port
pub mod harness {
    use std::net::SocketAddr;

    use dbgp_common::{Breakpoint, DebuggerConfig};
    use dbgp_session::{Session, SessionEvent};
    use eyre::{bail, Result};
    use tokio::{
        sync::mpsc::{self, UnboundedReceiver},
        time::{sleep_until, Instant},
    };

    use super::WAIT;

    /// Owns a session and pumps it until expected events show up.
    pub struct SessionHarness {
        /// The session under test
        pub session: Session,
        events: UnboundedReceiver<SessionEvent>,
        /// Every event seen so far
        pub seen: Vec<SessionEvent>,
        /// Address the session listens on
        pub addr: SocketAddr,
    }

    impl SessionHarness {
        /// Starts a session on `127.0.0.1:0` with the given breakpoints registered.
        pub async fn start(mut config: DebuggerConfig, breakpoints: &[&str]) -> Result<Self> {
            config.bind_address = "127.0.0.1".to_string();
            config.port = 0;

            let (tx, events) = mpsc::unbounded_channel::<SessionEvent>();
            let mut session = Session::new(config, tx)?;
            for location in breakpoints {
                session.add_breakpoint(location.parse::<Breakpoint>()?)?;
            }
            session.start();

            let mut harness = Self {
                session,
                events,
                seen: Vec::new(),
                addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            };
            harness.addr = harness.wait_listening().await?;
            Ok(harness)
        }

        /// Pumps until the session listens again and returns the address.
        pub async fn wait_listening(&mut self) -> Result<SocketAddr> {
            let event = self.pump_until(|e| matches!(e, SessionEvent::Listening { .. })).await?;
            let SessionEvent::Listening { addr } = event else {
                bail!("expected a listening event, got {event:?}");
            };
            Ok(addr)
        }

        /// Runs deliveries until an event matches `pred`, and returns it.
        pub async fn pump_until<F>(&mut self, mut pred: F) -> Result<SessionEvent>
        where
            F: FnMut(&SessionEvent) -> bool,
        {
            let deadline = Instant::now() + WAIT;
            loop {
                while let Ok(event) = self.events.try_recv() {
                    self.seen.push(event.clone());
                    if pred(&event) {
                        return Ok(event);
                    }
                }
                tokio::select! {
                    alive = self.session.process_next() => {
                        if !alive {
                            bail!("session transport stopped");
                        }
                    }
                    _ = sleep_until(deadline) => bail!("timed out; events so far: {:?}", self.seen),
                }
            }
        }
    }
}
