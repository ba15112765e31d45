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

//! In-process engine double for tests.
//!
//! [`MockEngine`] hands out a [`LoopbackTransport`] factory for
//! [`ProtocolClient::with_transport`](crate::ProtocolClient::with_transport).
//! The transport reports to its listener synchronously, so a test drives the
//! engine side, then drains the client's deliveries, with no threads or sockets.

use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use dbgp_transport::{Transport, TransportError, TransportListener};
use parking_lot::Mutex;
use tracing::trace;

use crate::command::{Command, TransactionId};

/// Port the loopback transport pretends to listen on.
pub const LOOPBACK_PORT: u16 = 9000;

#[derive(Default)]
struct LoopbackState {
    listener: Option<Arc<dyn TransportListener>>,
    listening: bool,
    connected: bool,
    sent: Vec<String>,
}

/// Transport whose peer is a [`MockEngine`].
pub struct LoopbackTransport {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackTransport {
    fn listener(&self) -> Option<Arc<dyn TransportListener>> {
        self.state.lock().listener.clone()
    }
}

impl Transport for LoopbackTransport {
    fn connect(&self) {
        {
            let mut state = self.state.lock();
            if state.listening || state.connected {
                return;
            }
            state.listening = true;
        }
        if let Some(listener) = self.listener() {
            listener.on_listening(loopback_addr(LOOPBACK_PORT));
        }
    }

    fn disconnect(&self) {
        {
            let mut state = self.state.lock();
            if !state.listening && !state.connected {
                return;
            }
            state.listening = false;
            state.connected = false;
        }
        if let Some(listener) = self.listener() {
            listener.on_disconnected();
        }
    }

    fn send(&self, payload: String) -> bool {
        let mut state = self.state.lock();
        if state.connected {
            state.sent.push(payload);
        } else {
            trace!("No engine attached, dropping {payload:?}");
        }
        state.connected
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.state.lock().listening.then(|| loopback_addr(LOOPBACK_PORT))
    }
}

fn loopback_addr(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

/// Engine side of a [`LoopbackTransport`].
#[derive(Clone, Default)]
pub struct MockEngine {
    state: Arc<Mutex<LoopbackState>>,
}

impl MockEngine {
    /// Creates an engine with no transport attached yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport factory for [`ProtocolClient::with_transport`](crate::ProtocolClient::with_transport).
    pub fn factory(
        &self,
    ) -> impl FnOnce(Arc<dyn TransportListener>) -> Result<Box<dyn Transport>, TransportError> {
        let state = self.state.clone();
        move |listener| {
            state.lock().listener = Some(listener);
            Ok(Box::new(LoopbackTransport { state }) as Box<dyn Transport>)
        }
    }

    fn listener(&self) -> Arc<dyn TransportListener> {
        self.state.lock().listener.clone().expect("transport not created from this engine")
    }

    /// Connects to the listening client.
    pub fn accept(&self) {
        {
            let mut state = self.state.lock();
            assert!(state.listening, "client is not listening");
            state.listening = false;
            state.connected = true;
            state.sent.clear();
        }
        self.listener().on_connected(loopback_addr(50000));
    }

    /// Sends one message to the client.
    pub fn deliver(&self, message: &str) {
        self.listener().on_message(message.to_string());
    }

    /// Closes the connection from the engine side.
    pub fn hang_up(&self) {
        {
            let mut state = self.state.lock();
            if !state.connected {
                return;
            }
            state.connected = false;
        }
        self.listener().on_disconnected();
    }

    /// Fails the connection with a stream error.
    pub fn fail(&self, message: &str) {
        self.listener().on_error(TransportError::Runtime(message.to_string()));
        self.hang_up();
    }

    /// Whether the client is listening.
    pub fn is_listening(&self) -> bool {
        self.state.lock().listening
    }

    /// Whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Command lines received since the last take.
    pub fn sent_commands(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    /// Removes and returns the received command lines.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut self.state.lock().sent)
    }

    /// Removes and returns the received commands, parsed.
    pub fn take_commands(&self) -> Vec<(Command, TransactionId)> {
        self.take_sent()
            .iter()
            .map(|line| Command::parse(line).expect("client sent an unparsable command"))
            .collect()
    }

    /// The most recent command received.
    pub fn last_command(&self) -> Option<(Command, TransactionId)> {
        self.state.lock().sent.last().and_then(|line| Command::parse(line).ok())
    }

    /// The most recent command with the given verb.
    pub fn find_command(&self, verb: &str) -> Option<(Command, TransactionId)> {
        self.state
            .lock()
            .sent
            .iter()
            .rev()
            .filter_map(|line| Command::parse(line).ok())
            .find(|(cmd, _)| cmd.kind().verb() == verb)
    }
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// `<init>` handshake for a script at `file_uri`.
pub fn init_xml(file_uri: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="iso-8859-1"?>
<init xmlns="urn:debugger_protocol_v1" appid="4242" idekey="dbgp" language="PHP" protocol_version="1.0" fileuri="{}"><engine version="3.3.0"><![CDATA[Xdebug]]></engine></init>"#,
        escape_attr(file_uri)
    )
}

/// Bare response carrying only command, transaction id and status.
pub fn status_xml(command: &str, id: TransactionId, status: &str) -> String {
    format!(
        r#"<response xmlns="urn:debugger_protocol_v1" command="{command}" transaction_id="{id}" status="{status}" reason="ok"/>"#
    )
}

/// Error response. Without `id` it is an asynchronous error notification.
pub fn error_xml(command: Option<&str>, id: Option<TransactionId>, code: u32, message: &str) -> String {
    let mut attrs = String::new();
    if let Some(command) = command {
        attrs.push_str(&format!(r#" command="{command}""#));
    }
    if let Some(id) = id {
        attrs.push_str(&format!(r#" transaction_id="{id}""#));
    }
    format!(
        r#"<response xmlns="urn:debugger_protocol_v1"{attrs}><error code="{code}"><message><![CDATA[{message}]]></message></error></response>"#
    )
}

/// `breakpoint_set` response assigning `engine_id`.
pub fn breakpoint_set_xml(id: TransactionId, engine_id: &str) -> String {
    format!(
        r#"<response xmlns="urn:debugger_protocol_v1" command="breakpoint_set" transaction_id="{id}" state="enabled" id="{}"/>"#,
        escape_attr(engine_id)
    )
}

/// One `<stack>` entry.
#[derive(Debug, Clone)]
pub struct FrameXml {
    /// Function name
    pub function: String,
    /// File URI
    pub file_uri: String,
    /// 1-based line
    pub line: u32,
}

impl FrameXml {
    /// Frame in `function` at `file_uri:line`.
    pub fn new(function: &str, file_uri: &str, line: u32) -> Self {
        Self { function: function.to_string(), file_uri: file_uri.to_string(), line }
    }
}

/// `stack_get` response, innermost frame first.
pub fn stack_xml(id: TransactionId, frames: &[FrameXml]) -> String {
    let body: String = frames
        .iter()
        .enumerate()
        .map(|(level, f)| {
            format!(
                r#"<stack where="{}" level="{level}" type="file" filename="{}" lineno="{}"/>"#,
                escape_attr(&f.function),
                escape_attr(&f.file_uri),
                f.line
            )
        })
        .collect();
    format!(
        r#"<response xmlns="urn:debugger_protocol_v1" command="stack_get" transaction_id="{id}">{body}</response>"#
    )
}

/// Builder for a `<property>` element.
#[derive(Debug, Clone, Default)]
pub struct PropertyXml {
    name: String,
    full_name: String,
    var_type: String,
    class_name: Option<String>,
    value: Option<String>,
    num_children: usize,
    page: usize,
    page_size: usize,
    children: Vec<PropertyXml>,
}

impl PropertyXml {
    /// Scalar or container named `name`, addressed as `full_name`.
    pub fn new(name: &str, full_name: &str, var_type: &str) -> Self {
        Self {
            name: name.to_string(),
            full_name: full_name.to_string(),
            var_type: var_type.to_string(),
            page_size: 32,
            ..Default::default()
        }
    }

    /// Value, sent base64-encoded.
    pub fn value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    /// Class name for objects.
    pub fn class(mut self, class_name: &str) -> Self {
        self.class_name = Some(class_name.to_string());
        self
    }

    /// Declared child count, which may exceed the children included.
    pub fn num_children(mut self, n: usize) -> Self {
        self.num_children = n;
        self
    }

    /// Page of children this element carries.
    pub fn page(mut self, page: usize, page_size: usize) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    /// Adds an inline child.
    pub fn child(mut self, child: PropertyXml) -> Self {
        self.children.push(child);
        self
    }

    /// Renders the element.
    pub fn to_xml(&self) -> String {
        let mut out = format!(
            r#"<property name="{}" fullname="{}" type="{}""#,
            escape_attr(&self.name),
            escape_attr(&self.full_name),
            escape_attr(&self.var_type)
        );
        if let Some(class_name) = &self.class_name {
            out.push_str(&format!(r#" classname="{}""#, escape_attr(class_name)));
        }
        let num_children = self.num_children.max(self.children.len());
        out.push_str(&format!(
            r#" children="{}" numchildren="{num_children}" page="{}" pagesize="{}""#,
            u8::from(num_children > 0),
            self.page,
            self.page_size
        ));
        match &self.value {
            Some(value) => out.push_str(&format!(
                r#" encoding="base64"><![CDATA[{}]]>"#,
                BASE64.encode(value.as_bytes())
            )),
            None => out.push('>'),
        }
        for child in &self.children {
            out.push_str(&child.to_xml());
        }
        out.push_str("</property>");
        out
    }
}

/// `context_get` response.
pub fn context_xml(id: TransactionId, properties: &[PropertyXml]) -> String {
    let body: String = properties.iter().map(PropertyXml::to_xml).collect();
    format!(
        r#"<response xmlns="urn:debugger_protocol_v1" command="context_get" context="0" transaction_id="{id}">{body}</response>"#
    )
}

/// `property_get` response.
pub fn property_xml(id: TransactionId, property: &PropertyXml) -> String {
    format!(
        r#"<response xmlns="urn:debugger_protocol_v1" command="property_get" transaction_id="{id}">{}</response>"#,
        property.to_xml()
    )
}

/// `eval` response.
pub fn eval_xml(id: TransactionId, property: &PropertyXml) -> String {
    format!(
        r#"<response xmlns="urn:debugger_protocol_v1" command="eval" transaction_id="{id}">{}</response>"#,
        property.to_xml()
    )
}

/// `source` response.
pub fn source_xml(id: TransactionId, text: &str) -> String {
    format!(
        r#"<response xmlns="urn:debugger_protocol_v1" command="source" transaction_id="{id}" success="1" encoding="base64"><![CDATA[{}]]></response>"#,
        BASE64.encode(text.as_bytes())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{response::Response, ProtocolClient, ProtocolClientListener};

    struct Nobody;

    impl ProtocolClientListener for Nobody {
        fn on_handshake(&mut self, _init: Response) {}
    }

    #[test]
    fn test_commands_dropped_until_accept() {
        let engine = MockEngine::new();
        let client: ProtocolClient<Nobody> = ProtocolClient::with_transport(engine.factory()).unwrap();
        assert!(client.local_addr().is_none());

        client.connect();
        assert!(engine.is_listening());
        assert_eq!(client.local_addr().map(|a| a.port()), Some(LOOPBACK_PORT));
        assert!(client.send_command_detached(Command::status()).is_err());
        assert!(engine.sent_commands().is_empty());

        engine.accept();
        assert!(engine.is_connected());
        let id = client.send_command_detached(Command::stack_get()).unwrap();
        assert_eq!(engine.find_command("stack_get").map(|(_, i)| i), Some(id));
        assert_eq!(engine.take_sent(), vec![format!("stack_get -i {id}")]);
    }

    #[test]
    fn test_builders_parse() {
        let prop = PropertyXml::new("$o", "$o", "object")
            .class("Foo")
            .num_children(3)
            .child(PropertyXml::new("a", "$o->a", "int").value("1"));
        for xml in [
            init_xml("file:///a b.php"),
            status_xml("run", TransactionId(1), "break"),
            error_xml(None, None, 999, "x"),
            breakpoint_set_xml(TransactionId(2), "1"),
            stack_xml(TransactionId(3), &[FrameXml::new("{main}", "file:///a.php", 3)]),
            context_xml(TransactionId(4), &[prop.clone()]),
            property_xml(TransactionId(5), &prop),
            eval_xml(TransactionId(6), &prop),
            source_xml(TransactionId(7), "<?php\necho 1;"),
        ] {
            Response::parse(&xml).unwrap();
        }
    }
}
