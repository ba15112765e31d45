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

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::variable::{find_variable, find_variable_mut, VariableNode};

/// One level of the debuggee's call stack at a break.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackFrame {
    /// Position in the stack, 0 is the innermost frame.
    pub index: usize,
    /// Local path of the executing file (after path mapping).
    pub file: PathBuf,
    /// Current line (1-based).
    pub line: u32,
    /// Executing function, `{main}` at top level.
    pub function: String,
    /// True once the frame's variables have been fetched.
    pub loaded: bool,
    /// Variables of the frame, in engine order.
    pub variables: Vec<VariableNode>,
}

impl StackFrame {
    /// A summary frame from a stack listing; variables are fetched later.
    pub fn new(index: usize, file: impl Into<PathBuf>, line: u32, function: impl Into<String>) -> Self {
        Self {
            index,
            file: file.into(),
            line,
            function: function.into(),
            loaded: false,
            variables: Vec::new(),
        }
    }

    /// Two frames describe the same activation if they run the same function in the same file.
    pub fn is_same_activation(&self, other: &Self) -> bool {
        self.function == other.function && self.file == other.file
    }

    /// Takes over the loaded state and variables of a matched previous frame.
    pub fn inherit(&mut self, previous: Self) {
        self.loaded = previous.loaded;
        self.variables = previous.variables;
    }

    /// Finds a variable by full name anywhere in the frame.
    pub fn variable(&self, full_name: &str) -> Option<&VariableNode> {
        find_variable(&self.variables, full_name)
    }

    /// Mutable variant of [`StackFrame::variable`].
    pub fn variable_mut(&mut self, full_name: &str) -> Option<&mut VariableNode> {
        find_variable_mut(&mut self.variables, full_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_activation_ignores_line_and_index() {
        let a = StackFrame::new(0, "/srv/a.php", 10, "run");
        let b = StackFrame::new(2, "/srv/a.php", 14, "run");
        let c = StackFrame::new(0, "/srv/b.php", 10, "run");
        assert!(a.is_same_activation(&b));
        assert!(!a.is_same_activation(&c));
    }

    #[test]
    fn test_inherit_keeps_own_position() {
        let mut old = StackFrame::new(1, "/srv/a.php", 3, "f");
        old.loaded = true;
        old.variables.push(VariableNode { full_name: "$x".to_string(), ..Default::default() });

        let mut new = StackFrame::new(1, "/srv/a.php", 4, "f");
        new.inherit(old);

        assert!(new.loaded);
        assert_eq!(new.line, 4);
        assert!(new.variable("$x").is_some());
    }
}
