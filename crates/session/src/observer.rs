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

//! Session notifications.

use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
};

use dbgp_common::{Breakpoint, StackFrame, VariableNode};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::status::SessionStatus;

/// Something observers may want to react to. Payloads are snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Waiting for an engine on `addr`.
    Listening {
        /// Bound address
        addr: SocketAddr,
    },
    /// An engine connected; the session was reset.
    Connected {
        /// Engine address
        peer: SocketAddr,
    },
    /// The engine introduced itself.
    EngineAttached {
        /// Language of the debuggee
        language: Option<String>,
        /// Script being debugged, after path mapping
        file: Option<PathBuf>,
        /// IDE key the engine was started with
        idekey: Option<String>,
    },
    /// The engine connection ended.
    Disconnected,
    /// The session status changed.
    StatusChanged {
        /// New status
        status: SessionStatus,
    },
    /// The last error changed; `None` when cleared.
    ErrorChanged {
        /// Error text
        message: Option<String>,
    },
    /// A new call stack replaced the old one.
    StackReplaced {
        /// Frames, innermost first
        frames: Vec<StackFrame>,
    },
    /// A frame's variables arrived.
    FrameLoaded {
        /// The loaded frame
        frame: StackFrame,
    },
    /// More children of a variable arrived.
    VariableLoaded {
        /// Index of the owning frame
        frame: usize,
        /// The variable with its children so far
        variable: VariableNode,
    },
    /// The breakpoint set or an engine id changed.
    BreakpointsChanged {
        /// All breakpoints in registration order
        breakpoints: Vec<Breakpoint>,
    },
}

/// Receives session notifications on the session's own context.
pub trait SessionObserver: Send {
    /// Called for every notification, in order.
    fn on_event(&mut self, event: SessionEvent);
}

impl<F> SessionObserver for F
where
    F: FnMut(SessionEvent) + Send,
{
    fn on_event(&mut self, event: SessionEvent) {
        self(event)
    }
}

impl SessionObserver for mpsc::UnboundedSender<SessionEvent> {
    fn on_event(&mut self, event: SessionEvent) {
        // Receiver gone means nobody is watching anymore.
        let _ = self.send(event);
    }
}

/// Observer that keeps every event, for inspection from another handle.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl RecordingObserver {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the events so far.
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().clone()
    }

    /// Removes and returns the events so far.
    pub fn take(&self) -> Vec<SessionEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl SessionObserver for RecordingObserver {
    fn on_event(&mut self, event: SessionEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let event = SessionEvent::StatusChanged { status: SessionStatus::Break };
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"event":"status_changed","status":"break"}"#
        );

        let event = SessionEvent::ErrorChanged { message: None };
        assert_eq!(serde_json::to_string(&event).unwrap(), r#"{"event":"error_changed","message":null}"#);
    }

    #[test]
    fn test_closure_and_channel_observers() {
        let mut seen = Vec::new();
        {
            let mut observer = |event: SessionEvent| seen.push(event);
            observer.on_event(SessionEvent::Disconnected);
        }
        assert_eq!(seen, vec![SessionEvent::Disconnected]);

        let (mut tx, mut rx) = mpsc::unbounded_channel();
        tx.on_event(SessionEvent::Disconnected);
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::Disconnected);
    }

    #[test]
    fn test_recording_observer_shares_events() {
        let recorder = RecordingObserver::new();
        let mut handle = recorder.clone();
        handle.on_event(SessionEvent::Disconnected);
        assert_eq!(recorder.events().len(), 1);
        assert_eq!(recorder.take().len(), 1);
        assert!(recorder.events().is_empty());
    }
}
