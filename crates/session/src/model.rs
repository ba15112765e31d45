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

//! Session state visible to observers, plus the bookkeeping for loads in flight.

use std::collections::HashMap;

use dbgp_common::StackFrame;
use dbgp_protocol::TransactionId;

use crate::{reconcile::reconcile, status::SessionStatus};

/// Outcome of a lazy load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Nothing to fetch; no command was sent.
    AlreadyLoaded,
    /// A fetch for the same target is already in flight; no command was sent.
    Coalesced(TransactionId),
    /// A fetch was sent.
    Requested(TransactionId),
}

impl LoadOutcome {
    /// The transaction carrying the data, if any.
    pub fn transaction_id(&self) -> Option<TransactionId> {
        match self {
            Self::AlreadyLoaded => None,
            Self::Coalesced(id) | Self::Requested(id) => Some(*id),
        }
    }
}

/// Status, last error, and the current stack.
#[derive(Debug, Default)]
pub struct SessionModel {
    status: SessionStatus,
    last_error: Option<String>,
    stack: Vec<StackFrame>,
    /// Bumped whenever `stack` is replaced or cleared.
    generation: u64,
    frame_loads: HashMap<usize, TransactionId>,
    variable_loads: HashMap<(usize, String), TransactionId>,
}

impl SessionModel {
    /// Current status.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Sets the status; returns whether it changed.
    pub fn set_status(&mut self, status: SessionStatus) -> bool {
        std::mem::replace(&mut self.status, status) != status
    }

    /// Last error message, kept until cleared.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Sets or clears the error; returns whether it changed.
    pub fn set_error(&mut self, message: Option<String>) -> bool {
        if self.last_error == message {
            return false;
        }
        self.last_error = message;
        true
    }

    /// Current stack, innermost frame first.
    pub fn stack(&self) -> &[StackFrame] {
        &self.stack
    }

    /// Frame by index.
    pub fn frame(&self, index: usize) -> Option<&StackFrame> {
        self.stack.get(index)
    }

    pub(crate) fn frame_mut(&mut self, index: usize) -> Option<&mut StackFrame> {
        self.stack.get_mut(index)
    }

    /// Identifies the current stack; replies for an older one are stale.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Installs a new stack, carrying over state of matching frames.
    pub fn replace_stack(&mut self, frames: Vec<StackFrame>) -> usize {
        let old = std::mem::take(&mut self.stack);
        let reconciled = reconcile(old, frames);
        self.stack = reconciled.frames;
        self.new_generation();
        reconciled.matches.iter().filter(|m| m.is_some()).count()
    }

    /// Drops the stack. Returns whether there was one.
    pub fn clear_stack(&mut self) -> bool {
        let had_stack = !self.stack.is_empty();
        self.stack.clear();
        self.new_generation();
        had_stack
    }

    fn new_generation(&mut self) {
        self.generation += 1;
        self.frame_loads.clear();
        self.variable_loads.clear();
    }

    pub(crate) fn frame_load(&self, index: usize) -> Option<TransactionId> {
        self.frame_loads.get(&index).copied()
    }

    pub(crate) fn start_frame_load(&mut self, index: usize, id: TransactionId) {
        self.frame_loads.insert(index, id);
    }

    pub(crate) fn finish_frame_load(&mut self, index: usize) {
        self.frame_loads.remove(&index);
    }

    pub(crate) fn variable_load(&self, frame: usize, full_name: &str) -> Option<TransactionId> {
        self.variable_loads.get(&(frame, full_name.to_string())).copied()
    }

    pub(crate) fn start_variable_load(&mut self, frame: usize, full_name: &str, id: TransactionId) {
        self.variable_loads.insert((frame, full_name.to_string()), id);
    }

    pub(crate) fn finish_variable_load(&mut self, frame: usize, full_name: &str) {
        self.variable_loads.remove(&(frame, full_name.to_string()));
    }

    /// Number of frame and variable loads in flight.
    pub fn loads_in_flight(&self) -> usize {
        self.frame_loads.len() + self.variable_loads.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_and_error_change_detection() {
        let mut model = SessionModel::default();
        assert_eq!(model.status(), SessionStatus::Disconnected);
        assert!(model.set_status(SessionStatus::Listening));
        assert!(!model.set_status(SessionStatus::Listening));

        assert!(model.set_error(Some("boom".to_string())));
        assert!(!model.set_error(Some("boom".to_string())));
        assert_eq!(model.last_error(), Some("boom"));
        assert!(model.set_error(None));
    }

    #[test]
    fn test_replacing_stack_drops_in_flight_loads() {
        let mut model = SessionModel::default();
        model.replace_stack(vec![StackFrame::new(0, "/a.php", 1, "{main}")]);
        let generation = model.generation();

        model.start_frame_load(0, TransactionId(4));
        model.start_variable_load(0, "$x", TransactionId(5));
        assert_eq!(model.loads_in_flight(), 2);

        let inherited = model.replace_stack(vec![StackFrame::new(0, "/a.php", 2, "{main}")]);
        assert_eq!(inherited, 1);
        assert!(model.generation() > generation);
        assert_eq!(model.frame_load(0), None);
        assert_eq!(model.variable_load(0, "$x"), None);
        assert_eq!(model.frame(0).map(|f| f.line), Some(2));

        assert!(model.clear_stack());
        assert!(!model.clear_stack());
    }
}
