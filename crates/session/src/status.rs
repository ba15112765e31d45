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

use std::fmt::Display;

use dbgp_protocol::EngineStatus;
use serde::{Deserialize, Serialize};

/// User-visible state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Not listening
    #[default]
    Disconnected,
    /// Waiting for an engine to connect
    Listening,
    /// Engine attached, handshake in progress or not yet started
    Connected,
    /// Engine is executing
    Running,
    /// Engine is suspended
    Break,
    /// Script finished, engine waiting to be stopped
    Stopping,
    /// Engine ended the script and is closing
    Stopped,
}

impl SessionStatus {
    /// Whether an engine is attached.
    pub fn is_connected(&self) -> bool {
        !matches!(self, Self::Disconnected | Self::Listening)
    }

    /// Status the session takes when the engine reports `status`.
    pub fn from_engine(status: EngineStatus) -> Self {
        match status {
            EngineStatus::Starting => Self::Connected,
            EngineStatus::Running => Self::Running,
            EngineStatus::Break => Self::Break,
            EngineStatus::Stopping => Self::Stopping,
            EngineStatus::Stopped => Self::Stopped,
        }
    }
}

impl Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "Disconnected",
            Self::Listening => "Listening",
            Self::Connected => "Connected",
            Self::Running => "Running",
            Self::Break => "Break",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
        };
        f.write_str(s)
    }
}
