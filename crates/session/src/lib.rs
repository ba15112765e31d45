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

//! Debugger session for DBGp engines.
//!
//! [`Session`] turns debugger verbs into protocol commands and keeps a model
//! of the engine: its status, the call stack with lazily loaded variables, and
//! the breakpoint set, which survives reconnects and is replayed to every new
//! engine. Observers receive [`SessionEvent`]s as the model changes.

pub mod breakpoints;
pub mod error;
pub mod model;
pub mod observer;
pub mod parse;
pub mod reconcile;
pub mod session;
pub mod status;

pub use breakpoints::{Assignment, BreakpointManager};
pub use error::SessionError;
pub use model::{LoadOutcome, SessionModel};
pub use observer::*;
pub use reconcile::{reconcile, Reconciled};
pub use session::{EngineInfo, Session};
pub use status::SessionStatus;
