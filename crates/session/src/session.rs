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

//! The debugger session.
//!
//! A [`Session`] owns the protocol client, the breakpoint set and the model.
//! It is driven from one context: callers invoke verbs, and the same context
//! pumps deliveries with [`Session::process_pending`] or
//! [`Session::process_next`]. Response handlers therefore run with exclusive
//! access to the session and never race with the caller.
//!
//! Every handler captures the connection epoch (and, for lazy loads, the stack
//! generation) it was issued under; replies that arrive after either moved on
//! are dropped.

use std::{
    fmt::Display,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use dbgp_common::{Breakpoint, BreakpointLocation, DebuggerConfig, StackFrame};
use dbgp_protocol::{
    file_uri, Command, EngineError, EngineStatus, ProtocolClient, ProtocolClientListener,
    ProtocolError, Response, TransactionId,
};
use dbgp_transport::{Transport, TransportConfig, TransportError, TransportListener};
use tracing::{debug, error, info, warn};

use crate::{
    breakpoints::{Assignment, BreakpointManager},
    error::SessionError,
    model::{LoadOutcome, SessionModel},
    observer::{SessionEvent, SessionObserver},
    parse::{format_eval, local_path, parse_properties, parse_property, parse_stack},
    status::SessionStatus,
};

/// Context id of local variables.
const LOCAL_CONTEXT: u32 = 0;

/// What the engine said about itself in the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineInfo {
    /// Debuggee language
    pub language: Option<String>,
    /// Script being debugged, after path mapping
    pub file: Option<PathBuf>,
    /// IDE key
    pub idekey: Option<String>,
    /// Engine application id
    pub appid: Option<String>,
    /// Engine name and version
    pub engine: Option<String>,
}

/// A debugging session with at most one engine at a time.
pub struct Session {
    client: ProtocolClient<Session>,
    config: DebuggerConfig,
    observer: Box<dyn SessionObserver>,
    breakpoints: BreakpointManager,
    model: SessionModel,
    engine: Option<EngineInfo>,
    /// Bumped on every connect and disconnect.
    epoch: u64,
    listen_requested: bool,
}

impl Session {
    /// Creates a session listening on a socket as configured.
    pub fn new(
        config: DebuggerConfig,
        observer: impl SessionObserver + 'static,
    ) -> Result<Self, SessionError> {
        let client = ProtocolClient::new(TransportConfig::from(&config))?;
        Ok(Self::with_client(config, client, observer))
    }

    /// Creates a session over the transport built by `factory`.
    pub fn with_transport<F>(
        config: DebuggerConfig,
        observer: impl SessionObserver + 'static,
        factory: F,
    ) -> Result<Self, SessionError>
    where
        F: FnOnce(Arc<dyn TransportListener>) -> Result<Box<dyn Transport>, TransportError>,
    {
        let client = ProtocolClient::with_transport(factory)?;
        Ok(Self::with_client(config, client, observer))
    }

    fn with_client(
        config: DebuggerConfig,
        client: ProtocolClient<Session>,
        observer: impl SessionObserver + 'static,
    ) -> Self {
        Self {
            client,
            config,
            observer: Box::new(observer),
            breakpoints: BreakpointManager::new(),
            model: SessionModel::default(),
            engine: None,
            epoch: 0,
            listen_requested: false,
        }
    }

    // Lifecycle

    /// Starts listening for engines.
    pub fn start(&mut self) {
        self.listen_requested = true;
        self.client.connect();
    }

    /// Stops listening and drops any engine connection.
    pub fn close(&mut self) {
        self.listen_requested = false;
        self.client.disconnect();
    }

    /// Runs every queued delivery. Returns how many ran.
    pub fn process_pending(&mut self) -> usize {
        let mut processed = 0;
        while let Some(delivery) = self.client.try_next_delivery() {
            delivery.deliver(self);
            processed += 1;
        }
        processed
    }

    /// Waits for one delivery and runs it. Returns false once the transport is gone.
    pub async fn process_next(&mut self) -> bool {
        match self.client.next_delivery().await {
            Some(delivery) => {
                delivery.deliver(self);
                true
            }
            None => false,
        }
    }

    // Accessors

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        self.model.status()
    }

    /// Last error message, if not cleared since.
    pub fn last_error(&self) -> Option<&str> {
        self.model.last_error()
    }

    /// Current stack, innermost first.
    pub fn stack(&self) -> &[StackFrame] {
        self.model.stack()
    }

    /// Frame by index.
    pub fn frame(&self, index: usize) -> Option<&StackFrame> {
        self.model.frame(index)
    }

    /// Status, stack and in-flight loads.
    pub fn model(&self) -> &SessionModel {
        &self.model
    }

    /// Registered breakpoints.
    pub fn breakpoints(&self) -> &BreakpointManager {
        &self.breakpoints
    }

    /// Handshake details of the attached engine.
    pub fn engine(&self) -> Option<&EngineInfo> {
        self.engine.as_ref()
    }

    /// Configuration the session was created with.
    pub fn config(&self) -> &DebuggerConfig {
        &self.config
    }

    /// Whether an engine is connected.
    pub fn is_connected(&self) -> bool {
        self.model.status().is_connected()
    }

    /// Address of the listening socket, once bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.client.local_addr()
    }

    /// Commands still waiting for a response.
    pub fn pending_commands(&self) -> usize {
        self.client.pending_count()
    }

    // Continuation

    /// Runs to the next breakpoint.
    pub fn run(&mut self) -> Result<TransactionId, SessionError> {
        self.continue_with(Command::run())
    }

    /// Steps into the next call.
    pub fn step_in(&mut self) -> Result<TransactionId, SessionError> {
        self.continue_with(Command::step_into())
    }

    /// Steps over the next statement.
    pub fn step_over(&mut self) -> Result<TransactionId, SessionError> {
        self.continue_with(Command::step_over())
    }

    /// Runs until the current function returns.
    pub fn step_out(&mut self) -> Result<TransactionId, SessionError> {
        self.continue_with(Command::step_out())
    }

    /// Ends the script.
    pub fn stop(&mut self) -> Result<TransactionId, SessionError> {
        self.ensure_connected()?;
        self.send_terminating(Command::stop())
    }

    /// Lets the script run to completion without the debugger.
    pub fn detach(&mut self) -> Result<TransactionId, SessionError> {
        self.ensure_connected()?;
        self.send_terminating(Command::detach())
    }

    fn continue_with(&mut self, command: Command) -> Result<TransactionId, SessionError> {
        self.ensure_connected()?;
        let epoch = self.epoch;
        let id = self.send(command, move |s: &mut Session, r| s.on_continuation(epoch, r))?;
        self.set_status(SessionStatus::Running);
        Ok(id)
    }

    fn on_continuation(&mut self, epoch: u64, response: Response) {
        if epoch != self.epoch {
            return;
        }
        if let Some(error) = response.error() {
            self.report(&error);
            let status = response.status().map(SessionStatus::from_engine);
            self.set_status(status.unwrap_or(SessionStatus::Break));
            return;
        }

        match response.status() {
            Some(status) => self.apply_engine_status(status),
            None => self.report(&ProtocolError::MissingAttribute {
                element: response.root().name.clone(),
                attribute: "status",
            }),
        }
    }

    fn apply_engine_status(&mut self, status: EngineStatus) {
        self.set_status(SessionStatus::from_engine(status));
        match status {
            EngineStatus::Break => {
                self.set_error(None);
                self.request_stack();
            }
            EngineStatus::Stopping => {
                self.drop_stack();
                info!("Script finished, stopping engine");
                if let Err(e) = self.send_terminating(Command::stop()) {
                    self.report(&e);
                }
            }
            EngineStatus::Stopped => self.drop_stack(),
            EngineStatus::Starting | EngineStatus::Running => {}
        }
    }

    fn send_terminating(&mut self, command: Command) -> Result<TransactionId, SessionError> {
        let epoch = self.epoch;
        self.send(command, move |s: &mut Session, response| {
            if epoch != s.epoch {
                return;
            }
            if let Some(error) = response.error() {
                s.report(&error);
                return;
            }
            let status = response.status().map(SessionStatus::from_engine);
            s.set_status(status.unwrap_or(SessionStatus::Stopped));
            s.drop_stack();
        })
    }

    // Stack and variables

    fn request_stack(&mut self) {
        let epoch = self.epoch;
        if let Err(e) = self.send(Command::stack_get(), move |s: &mut Session, r| s.on_stack(epoch, r)) {
            self.report(&e);
        }
    }

    fn on_stack(&mut self, epoch: u64, response: Response) {
        if epoch != self.epoch {
            return;
        }
        if let Some(error) = response.error() {
            self.report(&error);
            return;
        }

        let frames = parse_stack(&response, &self.config);
        let inherited = self.model.replace_stack(frames);
        debug!(depth = self.model.stack().len(), inherited, "Stack replaced");

        let frames = self.model.stack().to_vec();
        self.emit(SessionEvent::StackReplaced { frames });
    }

    fn drop_stack(&mut self) {
        if self.model.clear_stack() {
            self.emit(SessionEvent::StackReplaced { frames: Vec::new() });
        }
    }

    /// Fetches the variables of a frame, once.
    pub fn load_stack_frame(&mut self, index: usize) -> Result<LoadOutcome, SessionError> {
        self.ensure_connected()?;
        let frame = self.model.frame(index).ok_or(SessionError::UnknownFrame(index))?;
        if frame.loaded {
            return Ok(LoadOutcome::AlreadyLoaded);
        }
        if let Some(id) = self.model.frame_load(index) {
            return Ok(LoadOutcome::Coalesced(id));
        }

        let (epoch, generation) = (self.epoch, self.model.generation());
        let id = self.send(Command::context_get(index, LOCAL_CONTEXT), move |s: &mut Session, r| {
            s.on_frame_loaded(epoch, generation, index, r)
        })?;
        self.model.start_frame_load(index, id);
        Ok(LoadOutcome::Requested(id))
    }

    fn on_frame_loaded(&mut self, epoch: u64, generation: u64, index: usize, response: Response) {
        if !self.is_current(epoch, generation) {
            debug!(frame = index, "Dropping variables for a replaced stack");
            return;
        }
        self.model.finish_frame_load(index);
        if let Some(error) = response.error() {
            self.report(&error);
            return;
        }

        let variables = parse_properties(response.root());
        let Some(frame) = self.model.frame_mut(index) else { return };
        frame.variables = variables;
        frame.loaded = true;
        let frame = frame.clone();
        self.emit(SessionEvent::FrameLoaded { frame });
    }

    /// Fetches the next page of children of the variable `full_name` in a frame.
    pub fn load_variable_children(
        &mut self,
        frame: usize,
        full_name: &str,
    ) -> Result<LoadOutcome, SessionError> {
        self.ensure_connected()?;
        let node = self
            .model
            .frame(frame)
            .ok_or(SessionError::UnknownFrame(frame))?
            .variable(full_name)
            .ok_or_else(|| SessionError::UnknownVariable {
                frame,
                full_name: full_name.to_string(),
            })?;
        if node.is_fully_loaded() {
            return Ok(LoadOutcome::AlreadyLoaded);
        }
        if let Some(id) = self.model.variable_load(frame, full_name) {
            return Ok(LoadOutcome::Coalesced(id));
        }

        let command = Command::property_get(full_name, frame, LOCAL_CONTEXT, node.next_page());
        let (epoch, generation) = (self.epoch, self.model.generation());
        let name = full_name.to_string();
        let id = self.send(command, move |s: &mut Session, r| {
            s.on_children_loaded(epoch, generation, frame, name, r)
        })?;
        self.model.start_variable_load(frame, full_name, id);
        Ok(LoadOutcome::Requested(id))
    }

    fn on_children_loaded(
        &mut self,
        epoch: u64,
        generation: u64,
        frame: usize,
        full_name: String,
        response: Response,
    ) {
        if !self.is_current(epoch, generation) {
            debug!(frame, %full_name, "Dropping children for a replaced stack");
            return;
        }
        self.model.finish_variable_load(frame, &full_name);
        if let Some(error) = response.error() {
            self.report(&error);
            return;
        }

        let fetched = response.root().child("property").map(parse_property).unwrap_or_default();
        let Some(node) = self.model.frame_mut(frame).and_then(|f| f.variable_mut(&full_name)) else {
            return;
        };
        if node.page_size == 0 {
            node.page_size = fetched.page_size;
        }
        node.declared_child_count = node.declared_child_count.max(fetched.declared_child_count);
        let added = node.merge_children(fetched.children);
        debug!(frame, %full_name, added, total = node.children.len(), "Merged children");

        let variable = node.clone();
        self.emit(SessionEvent::VariableLoaded { frame, variable });
    }

    fn is_current(&self, epoch: u64, generation: u64) -> bool {
        epoch == self.epoch && generation == self.model.generation()
    }

    // Data

    /// Evaluates `expression` in the current context. The callback receives
    /// the rendered result.
    pub fn evaluate<F>(&mut self, expression: &str, callback: F) -> Result<TransactionId, SessionError>
    where
        F: FnOnce(Result<String, EngineError>) + Send + 'static,
    {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(SessionError::EmptyExpression);
        }
        self.ensure_connected()?;

        self.send(Command::eval(expression), move |_: &mut Session, response| {
            callback(response.into_result().map(|r| format_eval(&r)))
        })
    }

    /// Fetches the engine's copy of a source file.
    pub fn fetch_source<F>(&mut self, file: &Path, callback: F) -> Result<TransactionId, SessionError>
    where
        F: FnOnce(Result<String, EngineError>) + Send + 'static,
    {
        self.ensure_connected()?;
        let uri = file_uri(&self.config.to_remote(file))?;
        self.send(Command::source(&uri), move |_: &mut Session, response| {
            callback(response.into_result().map(|r| r.root().decoded_text()))
        })
    }

    /// Sends any command; the callback receives the raw response.
    pub fn send_custom<F>(&mut self, command: Command, callback: F) -> Result<TransactionId, SessionError>
    where
        F: FnOnce(Response) + Send + 'static,
    {
        self.ensure_connected()?;
        self.send(command, move |_: &mut Session, response| callback(response))
    }

    // Breakpoints

    /// Registers a breakpoint and submits it if an engine is attached.
    /// Returns false if one already exists at that location.
    pub fn add_breakpoint(&mut self, breakpoint: Breakpoint) -> Result<bool, SessionError> {
        breakpoint.validate()?;
        let command = self.breakpoint_command(&breakpoint)?;
        let (loc, enabled) = (breakpoint.loc.clone(), breakpoint.enabled);
        if !self.breakpoints.add(breakpoint)? {
            return Ok(false);
        }

        if self.engine.is_some() {
            self.submit_breakpoint(loc, enabled, command);
        }
        self.emit_breakpoints();
        Ok(true)
    }

    /// Unregisters a breakpoint. The engine copy is removed if it has an id;
    /// an add still in flight is cancelled without contacting the engine.
    pub fn remove_breakpoint(&mut self, loc: &BreakpointLocation) -> Result<Breakpoint, SessionError> {
        let removed =
            self.breakpoints.remove(loc).ok_or_else(|| SessionError::UnknownBreakpoint(loc.clone()))?;
        if let (Some(engine_id), true) = (&removed.engine_id, self.engine.is_some()) {
            self.send_checked(Command::breakpoint_remove(engine_id));
        }
        self.emit_breakpoints();
        Ok(removed)
    }

    /// Enables or disables a breakpoint.
    pub fn set_breakpoint_enabled(
        &mut self,
        loc: &BreakpointLocation,
        enabled: bool,
    ) -> Result<(), SessionError> {
        let engine_id = self
            .breakpoints
            .set_enabled(loc, enabled)
            .ok_or_else(|| SessionError::UnknownBreakpoint(loc.clone()))?;
        if let (Some(engine_id), true) = (engine_id, self.engine.is_some()) {
            self.send_checked(Command::breakpoint_update(&engine_id, enabled));
        }
        self.emit_breakpoints();
        Ok(())
    }

    fn breakpoint_command(&self, breakpoint: &Breakpoint) -> Result<Command, SessionError> {
        match &breakpoint.loc {
            BreakpointLocation::Line { file, line } => {
                let uri = file_uri(&self.config.to_remote(file))?;
                Ok(Command::breakpoint_set_line(&uri, *line, breakpoint.enabled))
            }
            BreakpointLocation::FunctionEntry { function } => {
                Ok(Command::breakpoint_set_call(function, breakpoint.enabled))
            }
        }
    }

    fn submit_breakpoint(&mut self, loc: BreakpointLocation, enabled: bool, command: Command) {
        let epoch = self.epoch;
        match self.send(command, move |s: &mut Session, r| s.on_breakpoint_set(epoch, r)) {
            Ok(id) => self.breakpoints.submitted(id, loc, enabled),
            Err(e) => self.report(&format!("{loc}: {e}")),
        }
    }

    fn replay_breakpoints(&mut self) {
        let all = self.breakpoints.all().to_vec();
        if !all.is_empty() {
            info!("Replaying {} breakpoint(s)", all.len());
        }
        for breakpoint in all {
            match self.breakpoint_command(&breakpoint) {
                Ok(command) => self.submit_breakpoint(breakpoint.loc, breakpoint.enabled, command),
                Err(e) => warn!("Skipping breakpoint {breakpoint}: {e}"),
            }
        }
    }

    fn on_breakpoint_set(&mut self, epoch: u64, response: Response) {
        if epoch != self.epoch {
            return;
        }
        let Ok(Some(id)) = response.transaction_id() else { return };

        if let Some(error) = response.error() {
            let loc = self.breakpoints.rejected(id);
            let what = loc.map(|l| l.to_string()).unwrap_or_else(|| "breakpoint".to_string());
            self.report(&format!("{what}: {error}"));
            return;
        }
        let Some(engine_id) = response.root().attr("id").map(str::to_string) else {
            self.breakpoints.rejected(id);
            self.report(&ProtocolError::MissingAttribute {
                element: response.root().name.clone(),
                attribute: "id",
            });
            return;
        };

        match self.breakpoints.assign(id, engine_id.clone()) {
            Assignment::Assigned { loc, update } => {
                debug!(%engine_id, "Breakpoint {loc} registered");
                if let Some(enabled) = update {
                    self.send_checked(Command::breakpoint_update(&engine_id, enabled));
                }
                self.emit_breakpoints();
            }
            Assignment::Orphaned => {
                debug!(%engine_id, "Removing engine breakpoint deleted while pending");
                self.send_checked(Command::breakpoint_remove(&engine_id));
            }
            Assignment::Unknown => {}
        }
    }

    fn negotiate_features(&mut self) {
        let features = self.config.features.clone();
        let wanted = [
            ("max_children", features.max_children),
            ("max_depth", features.max_depth),
            ("max_data", features.max_data),
        ];
        for (name, value) in wanted {
            if name == "max_data" && value == 0 {
                continue;
            }
            let epoch = self.epoch;
            let sent = self.send(Command::feature_set(name, value), move |s: &mut Session, r| {
                if epoch == s.epoch {
                    if let Some(error) = r.error() {
                        warn!("Engine did not accept {name}={value}: {error}");
                    }
                }
            });
            if let Err(e) = sent {
                warn!("Could not negotiate {name}: {e}");
            }
        }
    }

    // Helpers

    fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }

    fn send<F>(&self, command: Command, handler: F) -> Result<TransactionId, SessionError>
    where
        F: FnOnce(&mut Session, Response) + Send + 'static,
    {
        self.client.send_command(command, handler).map_err(|e| match e {
            ProtocolError::NotConnected => SessionError::NotConnected,
            e => SessionError::Protocol(e),
        })
    }

    /// Sends a command whose only interesting reply is an error.
    fn send_checked(&mut self, command: Command) {
        let epoch = self.epoch;
        let sent = self.send(command, move |s: &mut Session, response| {
            if epoch == s.epoch {
                if let Some(error) = response.error() {
                    s.report(&error);
                }
            }
        });
        if let Err(e) = sent {
            self.report(&e);
        }
    }

    fn emit(&mut self, event: SessionEvent) {
        self.observer.on_event(event);
    }

    fn emit_breakpoints(&mut self) {
        let breakpoints = self.breakpoints.all().to_vec();
        self.emit(SessionEvent::BreakpointsChanged { breakpoints });
    }

    fn set_status(&mut self, status: SessionStatus) {
        if self.model.set_status(status) {
            info!("Session status: {status}");
            self.emit(SessionEvent::StatusChanged { status });
        }
    }

    fn set_error(&mut self, message: Option<String>) {
        if self.model.set_error(message.clone()) {
            self.emit(SessionEvent::ErrorChanged { message });
        }
    }

    fn report(&mut self, error: &dyn Display) {
        warn!("{error}");
        self.set_error(Some(error.to_string()));
    }

    /// Forgets everything tied to the previous engine.
    fn reset(&mut self) {
        self.epoch += 1;
        self.engine = None;
        self.breakpoints.clear_engine_ids();
        self.drop_stack();
    }
}

impl ProtocolClientListener for Session {
    fn on_listening(&mut self, addr: SocketAddr) {
        info!(%addr, "Waiting for an engine");
        self.set_status(SessionStatus::Listening);
        self.emit(SessionEvent::Listening { addr });
    }

    fn on_connected(&mut self, peer: SocketAddr) {
        info!(%peer, "Engine connected");
        self.reset();
        self.set_error(None);
        self.set_status(SessionStatus::Connected);
        self.emit(SessionEvent::Connected { peer });
    }

    fn on_handshake(&mut self, init: Response) {
        let root = init.root();
        let info = EngineInfo {
            language: root.attr("language").map(str::to_string),
            file: root.attr("fileuri").map(|uri| local_path(uri, &self.config)),
            idekey: root.attr("idekey").map(str::to_string),
            appid: root.attr("appid").map(str::to_string),
            engine: root.child("engine").map(|e| e.text.clone()).filter(|e| !e.is_empty()),
        };
        info!(language = ?info.language, file = ?info.file, "Engine attached");
        self.emit(SessionEvent::EngineAttached {
            language: info.language.clone(),
            file: info.file.clone(),
            idekey: info.idekey.clone(),
        });
        self.engine = Some(info);

        self.negotiate_features();
        self.replay_breakpoints();

        let first = if self.config.break_on_first_line { Command::step_into() } else { Command::run() };
        if let Err(e) = self.continue_with(first) {
            self.report(&e);
        }
    }

    fn on_engine_error(&mut self, error: EngineError) {
        self.report(&error);
    }

    fn on_protocol_error(&mut self, error: ProtocolError) {
        self.report(&error);
    }

    fn on_transport_error(&mut self, err: TransportError) {
        error!("Transport error: {err}");
        self.set_error(Some(err.to_string()));
    }

    fn on_disconnected(&mut self) {
        let was_connected = self.is_connected();
        self.reset();
        self.set_status(SessionStatus::Disconnected);
        self.emit(SessionEvent::Disconnected);

        if was_connected {
            info!("Engine disconnected");
            self.emit_breakpoints();
            if self.config.auto_attach && self.listen_requested {
                self.client.connect();
            }
        }
    }
}
