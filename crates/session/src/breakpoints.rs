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

//! Breakpoint bookkeeping for one session.
//!
//! Breakpoints outlive engine connections. Each connection assigns fresh
//! engine ids, so ids are cleared on reset and filled in again as the
//! replayed `breakpoint_set` commands are answered.

use std::{collections::HashMap, path::Path};

use dbgp_common::{Breakpoint, BreakpointError, BreakpointLocation};
use dbgp_protocol::TransactionId;

#[derive(Debug, Clone)]
struct PendingAdd {
    loc: BreakpointLocation,
    enabled: bool,
    cancelled: bool,
}

/// What to do with an engine id returned by `breakpoint_set`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    /// The id was recorded. `Some(enabled)` means the breakpoint was toggled
    /// while the add was in flight and the engine needs that state.
    Assigned {
        /// The breakpoint that received the id
        loc: BreakpointLocation,
        /// Enabled state to push to the engine
        update: Option<bool>,
    },
    /// The breakpoint was removed before its id arrived; the engine copy must go.
    Orphaned,
    /// Not an add this manager is waiting for.
    Unknown,
}

/// The breakpoint set plus in-flight `breakpoint_set` commands.
#[derive(Debug, Default)]
pub struct BreakpointManager {
    breakpoints: Vec<Breakpoint>,
    pending: HashMap<TransactionId, PendingAdd>,
}

impl BreakpointManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a breakpoint. Returns false if one already exists at the location.
    pub fn add(&mut self, breakpoint: Breakpoint) -> Result<bool, BreakpointError> {
        breakpoint.validate()?;
        if self.get(&breakpoint.loc).is_some() {
            return Ok(false);
        }
        self.breakpoints.push(Breakpoint { engine_id: None, ..breakpoint });
        Ok(true)
    }

    /// Unregisters a breakpoint. An add still in flight for it is cancelled.
    pub fn remove(&mut self, loc: &BreakpointLocation) -> Option<Breakpoint> {
        let pos = self.breakpoints.iter().position(|b| &b.loc == loc)?;
        for pending in self.pending.values_mut().filter(|p| &p.loc == loc) {
            pending.cancelled = true;
        }
        Some(self.breakpoints.remove(pos))
    }

    /// Enables or disables a breakpoint, returning its engine id if it has one.
    pub fn set_enabled(
        &mut self,
        loc: &BreakpointLocation,
        enabled: bool,
    ) -> Option<Option<String>> {
        let bp = self.breakpoints.iter_mut().find(|b| &b.loc == loc)?;
        bp.enabled = enabled;
        Some(bp.engine_id.clone())
    }

    /// Records that `breakpoint_set` for `loc` went out as transaction `id`.
    pub fn submitted(&mut self, id: TransactionId, loc: BreakpointLocation, enabled: bool) {
        self.pending.insert(id, PendingAdd { loc, enabled, cancelled: false });
    }

    /// Applies the engine id from the response to transaction `id`.
    pub fn assign(&mut self, id: TransactionId, engine_id: String) -> Assignment {
        let Some(pending) = self.pending.remove(&id) else {
            return Assignment::Unknown;
        };
        if pending.cancelled {
            return Assignment::Orphaned;
        }
        match self.breakpoints.iter_mut().find(|b| b.loc == pending.loc) {
            Some(bp) => {
                bp.engine_id = Some(engine_id);
                let update = (bp.enabled != pending.enabled).then_some(bp.enabled);
                Assignment::Assigned { loc: pending.loc, update }
            }
            None => Assignment::Orphaned,
        }
    }

    /// Forgets an add the engine rejected.
    pub fn rejected(&mut self, id: TransactionId) -> Option<BreakpointLocation> {
        self.pending.remove(&id).map(|p| p.loc)
    }

    /// Whether an add for transaction `id` is outstanding.
    pub fn is_pending(&self, id: TransactionId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Whether any add for `loc` is outstanding.
    pub fn has_pending_add(&self, loc: &BreakpointLocation) -> bool {
        self.pending.values().any(|p| &p.loc == loc && !p.cancelled)
    }

    /// Drops all engine ids and in-flight adds, as when a new engine connects.
    pub fn clear_engine_ids(&mut self) {
        self.pending.clear();
        for bp in &mut self.breakpoints {
            bp.engine_id = None;
        }
    }

    /// Breakpoint at `loc`.
    pub fn get(&self, loc: &BreakpointLocation) -> Option<&Breakpoint> {
        self.breakpoints.iter().find(|b| &b.loc == loc)
    }

    /// Breakpoint with the given engine id.
    pub fn by_engine_id(&self, engine_id: &str) -> Option<&Breakpoint> {
        self.breakpoints.iter().find(|b| b.engine_id.as_deref() == Some(engine_id))
    }

    /// All breakpoints in registration order.
    pub fn all(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    /// Line breakpoints in `file`.
    pub fn for_file<'a>(&'a self, file: &'a Path) -> impl Iterator<Item = &'a Breakpoint> + 'a {
        self.breakpoints.iter().filter(move |b| b.loc.file() == Some(file))
    }

    /// Whether a line breakpoint exists at `file:line`.
    pub fn has_breakpoint_at(&self, file: &Path, line: u32) -> bool {
        self.breakpoints.iter().any(|b| b.is_at(file, line))
    }

    /// Number of breakpoints.
    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    /// Whether no breakpoints are registered.
    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(file: &str, n: u32) -> BreakpointLocation {
        BreakpointLocation::line(file, n)
    }

    #[test]
    fn test_add_is_unique_per_location() {
        let mut mgr = BreakpointManager::new();
        assert!(mgr.add(Breakpoint::new(line("/a.php", 3))).unwrap());
        assert!(!mgr.add(Breakpoint::new(line("/a.php", 3))).unwrap());
        assert!(mgr.add(Breakpoint::new(line("/a.php", 4))).unwrap());
        assert!(mgr.add(Breakpoint::new(BreakpointLocation::function("main"))).unwrap());
        assert!(!mgr.add(Breakpoint::new(BreakpointLocation::function("main"))).unwrap());
        assert_eq!(mgr.len(), 3);
    }

    #[test]
    fn test_invalid_breakpoints_rejected() {
        let mut mgr = BreakpointManager::new();
        assert!(matches!(mgr.add(Breakpoint::new(line("rel.php", 1))), Err(BreakpointError::RelativePath(_))));
        assert!(matches!(mgr.add(Breakpoint::new(line("/a.php", 0))), Err(BreakpointError::ZeroLine)));
        assert!(mgr.is_empty());
    }

    #[test]
    fn test_assign_and_clear() {
        let mut mgr = BreakpointManager::new();
        mgr.add(Breakpoint::new(line("/a.php", 3))).unwrap();
        mgr.submitted(TransactionId(7), line("/a.php", 3), true);
        assert!(mgr.has_pending_add(&line("/a.php", 3)));

        assert_eq!(
            mgr.assign(TransactionId(7), "100".to_string()),
            Assignment::Assigned { loc: line("/a.php", 3), update: None }
        );
        assert_eq!(mgr.by_engine_id("100").map(|b| b.loc.clone()), Some(line("/a.php", 3)));
        assert_eq!(mgr.assign(TransactionId(7), "101".to_string()), Assignment::Unknown);

        mgr.clear_engine_ids();
        assert!(mgr.all().iter().all(|b| b.engine_id.is_none()));
    }

    #[test]
    fn test_remove_while_pending_orphans_late_id() {
        let mut mgr = BreakpointManager::new();
        mgr.add(Breakpoint::new(line("/a.php", 3))).unwrap();
        mgr.submitted(TransactionId(1), line("/a.php", 3), true);

        assert!(mgr.remove(&line("/a.php", 3)).is_some());
        assert!(!mgr.has_pending_add(&line("/a.php", 3)));

        // Re-adding must not let the stale response claim the new breakpoint.
        mgr.add(Breakpoint::new(line("/a.php", 3))).unwrap();
        mgr.submitted(TransactionId(2), line("/a.php", 3), true);
        assert_eq!(mgr.assign(TransactionId(1), "50".to_string()), Assignment::Orphaned);
        assert!(mgr.get(&line("/a.php", 3)).unwrap().engine_id.is_none());
        assert!(matches!(mgr.assign(TransactionId(2), "51".to_string()), Assignment::Assigned { .. }));
    }

    #[test]
    fn test_toggle_while_pending_requests_update() {
        let mut mgr = BreakpointManager::new();
        mgr.add(Breakpoint::new(line("/a.php", 3))).unwrap();
        mgr.submitted(TransactionId(1), line("/a.php", 3), true);
        assert_eq!(mgr.set_enabled(&line("/a.php", 3), false), Some(None));

        assert_eq!(
            mgr.assign(TransactionId(1), "9".to_string()),
            Assignment::Assigned { loc: line("/a.php", 3), update: Some(false) }
        );
        assert_eq!(mgr.set_enabled(&line("/a.php", 3), true), Some(Some("9".to_string())));
        assert_eq!(mgr.set_enabled(&line("/b.php", 1), true), None);
    }

    #[test]
    fn test_queries() {
        let mut mgr = BreakpointManager::new();
        mgr.add(Breakpoint::new(line("/a.php", 3))).unwrap();
        mgr.add(Breakpoint::new(line("/a.php", 9))).unwrap();
        mgr.add(Breakpoint::new(line("/b.php", 3))).unwrap();

        assert_eq!(mgr.for_file(Path::new("/a.php")).count(), 2);
        assert!(mgr.has_breakpoint_at(Path::new("/b.php"), 3));
        assert!(!mgr.has_breakpoint_at(Path::new("/b.php"), 4));
        assert_eq!(mgr.rejected(TransactionId(4)), None);
    }
}
