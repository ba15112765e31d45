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

//! Engine response documents.

use std::{fmt::Display, str::FromStr};

use crate::{
    command::TransactionId,
    error::{EngineError, ProtocolError},
    xml::Element,
};

/// Execution status reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineStatus {
    /// Before the first line runs
    Starting,
    /// Executing
    Running,
    /// Suspended at a breakpoint or after a step
    Break,
    /// Script finished, engine still attached
    Stopping,
    /// Engine is gone
    Stopped,
}

impl FromStr for EngineStatus {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            "break" => Ok(Self::Break),
            "stopping" => Ok(Self::Stopping),
            "stopped" => Ok(Self::Stopped),
            other => Err(ProtocolError::Parse(format!("unknown status {other:?}"))),
        }
    }
}

impl Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Break => "break",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// A parsed message from the engine: `<init>`, `<response>` or `<stream>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    root: Element,
}

impl Response {
    /// Parses a raw message.
    pub fn parse(message: &str) -> Result<Self, ProtocolError> {
        Element::parse(message).map(|root| Self { root })
    }

    /// Wraps an already parsed element.
    pub fn from_element(root: Element) -> Self {
        Self { root }
    }

    /// Top-level element.
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Whether this is the connection handshake.
    pub fn is_init(&self) -> bool {
        self.root.name == "init"
    }

    /// The `transaction_id` attribute, if present.
    pub fn transaction_id(&self) -> Result<Option<TransactionId>, ProtocolError> {
        match self.root.attr("transaction_id") {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(|id| Some(TransactionId(id)))
                .map_err(|_| ProtocolError::InvalidTransactionId(raw.to_string())),
        }
    }

    /// The `command` attribute.
    pub fn command(&self) -> Option<&str> {
        self.root.attr("command")
    }

    /// The `status` attribute, when it names a known status.
    pub fn status(&self) -> Option<EngineStatus> {
        self.root.attr("status").and_then(|s| s.parse().ok())
    }

    /// The `reason` attribute (`ok`, `error`, `aborted`, `exception`).
    pub fn reason(&self) -> Option<&str> {
        self.root.attr("reason")
    }

    /// The `<error>` child, if the engine reported one.
    pub fn error(&self) -> Option<EngineError> {
        let error = self.root.child("error")?;
        let code = error.attr("code").and_then(|c| c.trim().parse().ok()).unwrap_or(0);
        let message = error.child("message").map(|m| m.decoded_text());
        Some(EngineError::new(code, message))
    }

    /// An error notification the engine sent on its own.
    pub fn is_async_error(&self) -> bool {
        self.root.attr("transaction_id").is_none() && self.root.child("error").is_some()
    }

    /// `Ok(self)` unless the response carries an error.
    pub fn into_result(self) -> Result<Self, EngineError> {
        match self.error() {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_codes;

    #[test]
    fn test_init_has_no_transaction() {
        let init = Response::parse(
            r#"<init appid="1" idekey="k" language="PHP" protocol_version="1.0" fileuri="file:///a.php"/>"#,
        )
        .unwrap();
        assert!(init.is_init());
        assert_eq!(init.transaction_id().unwrap(), None);
        assert!(!init.is_async_error());
    }

    #[test]
    fn test_status_response() {
        let r = Response::parse(
            r#"<response command="step_into" transaction_id="5" status="break" reason="ok"/>"#,
        )
        .unwrap();
        assert_eq!(r.transaction_id().unwrap(), Some(TransactionId(5)));
        assert_eq!(r.command(), Some("step_into"));
        assert_eq!(r.status(), Some(EngineStatus::Break));
        assert_eq!(r.reason(), Some("ok"));
        assert!(r.error().is_none());
    }

    #[test]
    fn test_bad_transaction_id() {
        let r = Response::parse(r#"<response transaction_id="abc"/>"#).unwrap();
        assert_eq!(r.transaction_id(), Err(ProtocolError::InvalidTransactionId("abc".to_string())));
    }

    #[test]
    fn test_error_child() {
        let r = Response::parse(
            r#"<response command="property_get" transaction_id="9"><error code="300"><message><![CDATA[can not get property]]></message></error></response>"#,
        )
        .unwrap();
        let err = r.error().unwrap();
        assert_eq!(err.code, error_codes::CANNOT_GET_PROPERTY);
        assert_eq!(err.message, "can not get property");
        assert!(!r.is_async_error());
        assert!(r.into_result().is_err());
    }

    #[test]
    fn test_error_without_message_uses_description() {
        let r = Response::parse(r#"<response><error code="999"/></response>"#).unwrap();
        assert!(r.is_async_error());
        assert_eq!(r.error().unwrap().message, "unknown error");
    }

    #[test]
    fn test_status_strings() {
        for s in ["starting", "running", "break", "stopping", "stopped"] {
            assert_eq!(s.parse::<EngineStatus>().unwrap().to_string(), s);
        }
        assert!("paused".parse::<EngineStatus>().is_err());
    }
}
