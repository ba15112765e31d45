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

//! Carrying loaded frame state across a stack replacement.
//!
//! After every continuation the engine reports a fresh stack. Frames that
//! belong to the same activation as a frame of the previous stack keep that
//! frame's variables and `loaded` flag so they are not fetched again.
//!
//! Matching depends on whether the depth changed:
//!
//! 1. *Unshifted*: at equal depth, frames at the same index with the same
//!    function and file.
//! 2. *Shifted*: when the depth changed, frames are aligned from the
//!    outermost frame inwards, stopping at the first divergence. This covers
//!    stepping into or out of a call, where every caller moves by one. Index
//!    alignment is never used here, since a recursive call puts a new
//!    activation of the same function at the old caller's index.

use dbgp_common::StackFrame;

/// Result of [`reconcile`].
#[derive(Debug, Default)]
pub struct Reconciled {
    /// The new stack with inherited state.
    pub frames: Vec<StackFrame>,
    /// For each new frame, the index of the old frame it inherited from.
    pub matches: Vec<Option<usize>>,
}

impl Reconciled {
    /// Number of frames that kept previous state.
    pub fn inherited(&self) -> usize {
        self.matches.iter().filter(|m| m.is_some()).count()
    }
}

/// Merges `old` into `new`, see the module docs.
pub fn reconcile(old: Vec<StackFrame>, mut new: Vec<StackFrame>) -> Reconciled {
    let mut matches = vec![None; new.len()];

    if old.len() == new.len() {
        for (i, (frame, prev)) in new.iter_mut().zip(old).enumerate() {
            if frame.is_same_activation(&prev) {
                frame.inherit(prev);
                matches[i] = Some(i);
            }
        }
    } else {
        let (new_len, old_len) = (new.len(), old.len());
        for (k, prev) in old.into_iter().rev().take(new_len).enumerate() {
            let ni = new_len - 1 - k;
            if !new[ni].is_same_activation(&prev) {
                break;
            }
            new[ni].inherit(prev);
            matches[ni] = Some(old_len - 1 - k);
        }
    }

    Reconciled { frames: new, matches }
}

#[cfg(test)]
mod tests {
    use dbgp_common::VariableNode;

    use super::*;

    fn frame(index: usize, function: &str) -> StackFrame {
        StackFrame::new(index, format!("/srv/{function}.php"), 10 + index as u32, function)
    }

    fn loaded(index: usize, function: &str) -> StackFrame {
        let mut f = frame(index, function);
        f.loaded = true;
        f.variables = vec![VariableNode {
            name: format!("${function}"),
            full_name: format!("${function}"),
            var_type: "int".to_string(),
            value: Some(index.to_string()),
            ..Default::default()
        }];
        f
    }

    #[test]
    fn test_same_depth_keeps_matching_prefix() {
        let old = vec![loaded(0, "a"), loaded(1, "b"), loaded(2, "c")];
        let mut new = vec![frame(0, "a"), frame(1, "b"), frame(2, "d")];
        new[0].line = 99;

        let r = reconcile(old, new);
        assert_eq!(r.matches, vec![Some(0), Some(1), None]);
        assert!(r.frames[0].loaded && r.frames[1].loaded);
        assert_eq!(r.frames[0].variables[0].name, "$a");
        assert_eq!(r.frames[0].line, 99);
        assert!(!r.frames[2].loaded);
        assert!(r.frames[2].variables.is_empty());
        assert_eq!(r.inherited(), 2);
    }

    #[test]
    fn test_step_into_shifts_callers() {
        let old = vec![loaded(0, "main")];
        let new = vec![frame(0, "f"), frame(1, "main")];

        let r = reconcile(old, new);
        assert_eq!(r.matches, vec![None, Some(0)]);
        assert!(!r.frames[0].loaded);
        assert!(r.frames[1].loaded);
        assert_eq!(r.frames[1].index, 1);
    }

    #[test]
    fn test_step_out_shifts_callers() {
        let old = vec![loaded(0, "g"), loaded(1, "f"), loaded(2, "main")];
        let new = vec![frame(0, "f"), frame(1, "main")];

        let r = reconcile(old, new);
        assert_eq!(r.matches, vec![Some(1), Some(2)]);
        assert_eq!(r.frames[0].variables[0].name, "$f");
    }

    #[test]
    fn test_shifted_pass_stops_at_divergence() {
        let old = vec![loaded(0, "x"), loaded(1, "other"), loaded(2, "main")];
        let new = vec![frame(0, "x"), frame(1, "main")];

        // Depth changed, so `x` at index 0 is not matched in place.
        let r = reconcile(old, new);
        assert_eq!(r.matches, vec![None, Some(2)]);
        assert!(!r.frames[0].loaded);
        assert!(r.frames[0].variables.is_empty());

        let old = vec![loaded(0, "x"), loaded(1, "main")];
        let new = vec![frame(0, "x"), frame(1, "y"), frame(2, "other_main")];
        let r = reconcile(old, new);
        assert_eq!(r.matches, vec![None, None, None]);
    }

    #[test]
    fn test_recursive_step_into_starts_new_activation_empty() {
        let old = vec![loaded(0, "f"), loaded(1, "main")];
        let new = vec![frame(0, "f"), frame(1, "f"), frame(2, "main")];

        let r = reconcile(old, new);
        assert_eq!(r.matches, vec![None, Some(0), Some(1)]);
        assert!(!r.frames[0].loaded);
        assert!(r.frames[0].variables.is_empty());
        assert!(r.frames[1].loaded);
        assert_eq!(r.frames[1].variables[0].value.as_deref(), Some("0"));
        assert_eq!(r.frames[1].index, 1);
    }

    #[test]
    fn test_recursive_step_out_keeps_caller_state() {
        let mut old = vec![loaded(0, "f"), loaded(1, "f"), loaded(2, "main")];
        old[0].variables[0].value = Some("inner".to_string());
        old[1].variables[0].value = Some("outer".to_string());
        let new = vec![frame(0, "f"), frame(1, "main")];

        let r = reconcile(old, new);
        assert_eq!(r.matches, vec![Some(1), Some(2)]);
        assert_eq!(r.frames[0].variables[0].value.as_deref(), Some("outer"));
        assert_eq!(r.frames[0].index, 0);
    }

    #[test]
    fn test_different_file_is_a_different_activation() {
        let old = vec![loaded(0, "a")];
        let mut new = vec![frame(0, "a")];
        new[0].file = "/elsewhere/a.php".into();

        assert_eq!(reconcile(old, new).inherited(), 0);
    }

    #[test]
    fn test_empty_stacks() {
        assert!(reconcile(Vec::new(), Vec::new()).frames.is_empty());
        let r = reconcile(vec![loaded(0, "a")], Vec::new());
        assert!(r.frames.is_empty());
        let r = reconcile(Vec::new(), vec![frame(0, "a")]);
        assert_eq!(r.matches, vec![None]);
    }
}
